use approx::assert_relative_eq;
use dasp_signal::{self as signal, Signal};
use mischpult::nodes::{Gain, LatencyDelay, Sine, SlewLimiter};
use mischpult::{
    engine, AudioBuffer, AudioProcessor, AutomationPoint, AutomationTarget, ConnectError, Controller, EngineConfig,
    Error, NodeKind, NoteEvent, Plugin, PluginError, TransportContext,
};

const RATE: u32 = 48_000;
const BLOCK: usize = 512;

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn setup() -> (Controller, AudioProcessor) {
    init_logging();
    engine(EngineConfig::default().with_sample_rate(RATE).with_block_size(BLOCK)).unwrap()
}

struct Failing;

impl Plugin for Failing {
    fn name(&self) -> &str {
        "failing"
    }

    fn process(&mut self, _: &TransportContext, _: &[NoteEvent], _: &mut AudioBuffer) -> Result<(), PluginError> {
        Err(PluginError::Failed("always"))
    }
}

struct Panicking;

impl Plugin for Panicking {
    fn name(&self) -> &str {
        "panicking"
    }

    fn process(&mut self, _: &TransportContext, _: &[NoteEvent], _: &mut AudioBuffer) -> Result<(), PluginError> {
        panic!("plugin bug");
    }
}

#[test]
fn track_into_bus_without_plugins_is_silent() {
    let (mut c, mut p) = setup();
    let t1 = c.create_node(NodeKind::AudioTrack, 2).unwrap();
    let b1 = c.create_node(NodeKind::Bus, 2).unwrap();
    c.connect(t1.audio_out(), b1.audio_in()).unwrap();

    assert_eq!(c.processing_order().unwrap(), vec![t1, b1]);
    for _ in 0..4 {
        let master = p.process();
        assert_eq!(master.channels(), 2);
        assert_eq!(master.frames(), BLOCK);
        assert!(master.is_silent());
    }
}

#[test]
fn tone_passes_through_at_unity_gain() {
    let (mut c, mut p) = setup();
    let t1 = c.create_node(NodeKind::AudioTrack, 2).unwrap();
    let b1 = c.create_node(NodeKind::Bus, 2).unwrap();
    c.connect(t1.audio_out(), b1.audio_in()).unwrap();
    c.add_plugin(t1, Sine::new(440.0).with_amplitude(1.0), None).unwrap();

    let mut reference = signal::rate(RATE as f64).const_hz(440.0).sine();
    for _ in 0..8 {
        let master = p.process().clone();
        let expected: Vec<f64> = (0..BLOCK).map(|_| reference.next()).collect();
        for ch in 0..2 {
            for (got, want) in master.channel(ch).iter().zip(&expected) {
                assert_relative_eq!(*got as f64, *want, epsilon = 1e-3);
            }
        }
    }
}

#[test]
fn back_edge_is_rejected_and_order_kept() {
    let (mut c, mut p) = setup();
    let t1 = c.create_node(NodeKind::AudioTrack, 2).unwrap();
    let b1 = c.create_node(NodeKind::Bus, 2).unwrap();
    c.connect(t1.audio_out(), b1.audio_in()).unwrap();

    let result = c.connect(b1.audio_out(), t1.audio_in());
    assert!(matches!(result, Err(Error::Connect(ConnectError::WouldCycle))));
    assert_eq!(c.connection_count(), 1);
    assert_eq!(c.processing_order().unwrap(), vec![t1, b1]);

    p.process();
    assert_eq!(p.graph().edge_count(), 1);
    assert!(p.graph().validate().is_empty());
}

#[test]
fn parallel_paths_are_latency_aligned() {
    let (mut c, mut p) = setup();
    let slow = c.create_node(NodeKind::AudioTrack, 2).unwrap();
    let fast = c.create_node(NodeKind::AudioTrack, 2).unwrap();
    let bus = c.create_node(NodeKind::Bus, 2).unwrap();
    c.connect(slow.audio_out(), bus.audio_in()).unwrap();
    c.connect(fast.audio_out(), bus.audio_in()).unwrap();
    c.add_plugin(slow, Sine::new(220.0), None).unwrap();
    c.add_plugin(slow, LatencyDelay::new(2, 64), None).unwrap();
    c.add_plugin(fast, Sine::new(220.0), None).unwrap();

    assert_eq!(c.total_latency_samples(), 64);
    assert_eq!(c.accumulated_latency(bus), 64);
    assert_eq!(c.compensation(bus), 0);

    for block in 0..4 {
        let master = p.process().clone();
        let slow_out = p.graph().node(slow).unwrap().output().clone();
        if block == 0 {
            assert!(master.channel(0)[..64].iter().all(|&s| s == 0.0));
        }
        for (m, s) in master.channel(0).iter().zip(slow_out.channel(0)) {
            assert_relative_eq!(*m, 2.0 * s, epsilon = 1e-6);
        }
    }
}

#[test]
fn failing_plugins_only_silence_their_node() {
    let (mut c, mut p) = setup();
    let good = c.create_node(NodeKind::AudioTrack, 2).unwrap();
    let bad = c.create_node(NodeKind::AudioTrack, 2).unwrap();
    let worse = c.create_node(NodeKind::AudioTrack, 2).unwrap();
    c.add_plugin(good, Sine::new(440.0), None).unwrap();
    c.add_plugin(bad, Sine::new(440.0), None).unwrap();
    c.add_plugin(bad, Failing, None).unwrap();
    c.add_plugin(worse, Panicking, None).unwrap();

    for _ in 0..3 {
        assert!(!p.process().is_silent());
    }
    let graph = p.graph();
    assert!(graph.node(bad).unwrap().output().is_silent());
    assert!(graph.node(bad).unwrap().is_faulted());
    assert!(graph.node(worse).unwrap().output().is_silent());
    assert!(!graph.node(good).unwrap().is_faulted());
    assert_eq!(c.monitor().node_faults(), 6);
}

#[test]
fn mute_and_bypass() {
    let (mut c, mut p) = setup();
    let t1 = c.create_node(NodeKind::AudioTrack, 2).unwrap();
    c.add_plugin(t1, Sine::new(440.0), None).unwrap();
    let gain = c.add_plugin(t1, Gain::new(0.0), None).unwrap();
    assert!(p.process().is_silent());

    c.set_plugin_bypass(t1, gain, true).unwrap();
    assert!(!p.process().is_silent());

    c.set_mute(t1, true).unwrap();
    assert!(p.process().is_silent());
}

#[test]
fn pan_hard_left_empties_right_channel() {
    let (mut c, mut p) = setup();
    let t1 = c.create_node(NodeKind::AudioTrack, 2).unwrap();
    c.add_plugin(t1, Sine::new(440.0), None).unwrap();
    c.set_pan(t1, -1.0).unwrap();

    // the first block ramps from center
    p.process();
    let master = p.process();
    assert!(master.channel(1).iter().all(|s| s.abs() < 1e-6));
    assert!(master.channel(0).iter().any(|s| s.abs() > 0.1));
}

#[test]
fn monitored_track_receives_host_input() {
    let (mut c, mut p) = setup();
    let track = c.create_node(NodeKind::AudioTrack, 2).unwrap();
    let bus = c.create_node(NodeKind::Bus, 2).unwrap();
    assert!(matches!(c.set_input_monitoring(bus, true), Err(Error::WrongNodeKind { .. })));

    let mut input = AudioBuffer::new(1, BLOCK);
    input.channel_mut(0).fill(0.25);
    assert!(p.process_with_input(&input).is_silent());

    c.set_input_monitoring(track, true).unwrap();
    let master = p.process_with_input(&input);
    assert!(master.channel(1).iter().all(|&s| s == 0.25));
}

#[test]
fn clear_project_empties_both_sides() {
    let (mut c, mut p) = setup();
    let t1 = c.create_node(NodeKind::AudioTrack, 2).unwrap();
    let b1 = c.create_node(NodeKind::Bus, 2).unwrap();
    c.connect(t1.audio_out(), b1.audio_in()).unwrap();
    c.add_plugin(t1, Sine::new(440.0), None).unwrap();
    assert!(!p.process().is_silent());

    c.clear_project();
    assert_eq!(c.node_count(), 0);
    assert!(p.process().is_silent());
    assert_eq!(p.graph().node_count(), 0);
    assert!(c.collect_garbage() >= 2);
}

#[test]
fn removed_node_stops_sounding() {
    let (mut c, mut p) = setup();
    let t1 = c.create_node(NodeKind::AudioTrack, 2).unwrap();
    c.add_plugin(t1, Sine::new(440.0), None).unwrap();
    assert!(!p.process().is_silent());

    assert!(c.remove_node(t1));
    assert!(!c.remove_node(t1));
    assert!(p.process().is_silent());
    assert_eq!(c.monitor().stale_commands(), 0);
}

#[test]
fn gain_automation_follows_the_timeline() {
    let (mut c, mut p) = setup();
    let t1 = c.create_node(NodeKind::AudioTrack, 2).unwrap();
    c.add_plugin(t1, Sine::new(440.0).with_amplitude(1.0), None).unwrap();
    let ramp = vec![AutomationPoint::new(0.0, 0.0), AutomationPoint::new(4.0, 1.0)];
    c.set_automation(t1, AutomationTarget::Gain, ramp).unwrap();
    c.seek(2.0).unwrap();

    let mut reference = signal::rate(RATE as f64).const_hz(440.0).sine();
    // first block ramps from unity down to the automated level
    p.process();
    (0..BLOCK).for_each(|_| {
        reference.next();
    });

    let master = p.process().clone();
    assert_eq!(p.graph().node(t1).unwrap().mix().gain(), 0.5);
    for got in master.channel(0) {
        let want = reference.next() * 0.5;
        assert_relative_eq!(*got as f64, want, epsilon = 1e-3);
    }

    // automation wins over a value set by hand
    c.set_gain(t1, 0.1).unwrap();
    p.process();
    assert_eq!(p.graph().node(t1).unwrap().mix().gain(), 0.5);

    // past the last point the final value holds
    c.play();
    for _ in 0..200 {
        p.process();
    }
    assert_eq!(p.graph().node(t1).unwrap().mix().gain(), 1.0);

    assert!(c.clear_automation(t1, AutomationTarget::Gain));
    c.set_gain(t1, 0.1).unwrap();
    p.process();
    assert_eq!(p.graph().node(t1).unwrap().mix().gain(), 0.1);
}

#[test]
fn plugin_parameter_automation_is_clamped() {
    let (mut c, mut p) = setup();
    let t1 = c.create_node(NodeKind::AudioTrack, 2).unwrap();
    let sine = c.add_plugin(t1, Sine::new(440.0).with_amplitude(1.0), None).unwrap();
    let gain = c.add_plugin(t1, Gain::new(1.0), None).unwrap();
    c.automate_plugin_parameter(t1, gain, "gain", vec![AutomationPoint::new(0.0, 0.0)])
        .unwrap();
    c.automate_plugin_parameter(t1, sine, "amplitude", vec![AutomationPoint::new(0.0, 9.0)])
        .unwrap();

    for _ in 0..8 {
        p.process();
    }
    // gain smooths towards zero; the amplitude stayed inside its range
    assert!(p.process().peak() < 1e-3);
    let lane = p
        .graph()
        .node(t1)
        .unwrap()
        .automation(AutomationTarget::Plugin { plugin: sine, index: 1 })
        .unwrap();
    assert_eq!(lane.points()[0].value, 1.0);
}

#[test]
fn edits_alone_keep_the_disposal_ring_moving() {
    init_logging();
    let config = EngineConfig::default()
        .with_sample_rate(RATE)
        .with_block_size(BLOCK)
        .with_garbage_capacity(8);
    let (mut c, mut p) = engine(config).unwrap();

    // no flush() or collect_garbage(): every edit frees what came back
    for _ in 0..40 {
        let t = c.create_node(NodeKind::AudioTrack, 2).unwrap();
        p.process();
        c.remove_node(t);
        p.process();
    }
    assert_eq!(c.monitor().dropped_garbage(), 0);
}

#[test]
fn long_editing_session_with_default_config() {
    let (mut c, mut p) = setup();
    let bus = c.create_node(NodeKind::Bus, 2).unwrap();
    let dry = c.create_node(NodeKind::AudioTrack, 2).unwrap();
    c.connect(dry.audio_out(), bus.audio_in()).unwrap();
    c.add_plugin(dry, Sine::new(220.0), None).unwrap();

    // each round retires a node and the alignment delay it caused
    for _ in 0..2_000 {
        let t = c.create_node(NodeKind::AudioTrack, 2).unwrap();
        c.add_plugin(t, LatencyDelay::new(2, 64), None).unwrap();
        c.connect(t.audio_out(), bus.audio_in()).unwrap();
        p.process();
        c.remove_node(t);
        p.process();
    }

    assert_eq!(c.monitor().dropped_garbage(), 0);
    assert_eq!(c.pending_commands(), 0);
    assert_eq!(p.graph().node_count(), 2);
    assert!(p.graph().validate().is_empty());
    assert!(!p.process().is_silent());
}

#[test]
fn slew_limiter_tames_a_loud_tone() {
    let (mut c, mut p) = setup();
    let t1 = c.create_node(NodeKind::AudioTrack, 2).unwrap();
    c.add_plugin(t1, Sine::new(480.0).with_amplitude(1.0), None).unwrap();
    let slew = c.add_plugin(t1, SlewLimiter::new(0.0001), None).unwrap();

    for _ in 0..4 {
        let peak = p.process().peak();
        assert!(peak > 0.0 && peak < 0.01, "peak {}", peak);
    }

    c.set_plugin_parameter(t1, slew, "rate", 1.0).unwrap();
    p.process();
    assert!(p.process().peak() > 0.9);
}
