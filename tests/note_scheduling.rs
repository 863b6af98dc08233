use mischpult::nodes::{LatencyDelay, SineSynth};
use mischpult::{engine, AudioProcessor, Controller, EngineConfig, NodeId, NodeKind, NoteEventKind};

const RATE: u32 = 48_000;

/// (absolute sample, kind, pitch) of every event the node saw.
type Seen = Vec<(u64, NoteEventKind, u8)>;

fn setup(block: usize) -> (Controller, AudioProcessor, NodeId) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let (mut c, p) = engine(EngineConfig::default().with_sample_rate(RATE).with_block_size(block)).unwrap();
    let inst = c.create_node(NodeKind::InstrumentTrack, 2).unwrap();
    c.add_plugin(inst, SineSynth::new(), None).unwrap();
    (c, p, inst)
}

fn run(p: &mut AudioProcessor, node: NodeId, blocks: usize, seen: &mut Seen) {
    let block = p.graph().block_size() as u64;
    for _ in 0..blocks {
        let start = p.graph().stats().blocks_processed * block;
        p.process();
        let events = p.graph().node(node).unwrap().events();
        seen.extend(events.as_slice().iter().map(|e| (start + e.offset as u64, e.kind, e.pitch)));
    }
}

fn count(seen: &Seen, kind: NoteEventKind, pitch: u8) -> usize {
    seen.iter().filter(|(_, k, p)| *k == kind && *p == pitch).count()
}

#[test]
fn notes_fire_exactly_once_at_their_sample() {
    // 333 does not divide any note position, so boundaries fall mid-note
    let (mut c, mut p, inst) = setup(333);
    let clip = c.add_clip(inst, 0.0, 8.0).unwrap();
    // 120 bpm at 48 kHz: one beat is 24000 samples
    c.add_note(inst, clip, 60, 100, 0.5, 0.25).unwrap();
    c.add_note(inst, clip, 64, 90, 1.0, 1.0).unwrap();
    c.add_note(inst, clip, 67, 80, 2.0, 0.001).unwrap();
    c.play();

    let mut seen = Seen::new();
    run(&mut p, inst, 4 * 24_000 / 333, &mut seen);

    for pitch in [60, 64, 67] {
        assert_eq!(count(&seen, NoteEventKind::On, pitch), 1, "note-on for {}", pitch);
        assert_eq!(count(&seen, NoteEventKind::Off, pitch), 1, "note-off for {}", pitch);
    }
    let at = |kind, pitch| seen.iter().find(|(_, k, p)| *k == kind && *p == pitch).map(|e| e.0);
    assert_eq!(at(NoteEventKind::On, 60), Some(12_000));
    assert_eq!(at(NoteEventKind::Off, 60), Some(18_000));
    assert_eq!(at(NoteEventKind::On, 64), Some(24_000));
    assert_eq!(at(NoteEventKind::Off, 64), Some(48_000));
    // a note shorter than a block starts and ends in the same one
    assert_eq!(at(NoteEventKind::On, 67), Some(48_000));
    assert_eq!(at(NoteEventKind::Off, 67), Some(48_024));
}

#[test]
fn note_at_block_boundary_fires_in_the_later_block() {
    let (mut c, mut p, inst) = setup(480);
    let clip = c.add_clip(inst, 0.0, 4.0).unwrap();
    // 0.02 beats = 480 samples: exactly the start of the second block
    c.add_note(inst, clip, 72, 100, 0.02, 0.5).unwrap();
    c.play();

    let mut seen = Seen::new();
    run(&mut p, inst, 1, &mut seen);
    assert!(seen.is_empty());
    run(&mut p, inst, 1, &mut seen);
    assert_eq!(seen, vec![(480, NoteEventKind::On, 72)]);
}

#[test]
fn notes_follow_tempo_changes() {
    let (mut c, mut p, inst) = setup(256);
    // 120 bpm for one beat (0.5 s), then 60 bpm: beat 2 is at 1.5 s
    c.set_tempo(1.0, 60.0).unwrap();
    let clip = c.add_clip(inst, 0.0, 4.0).unwrap();
    c.add_note(inst, clip, 48, 100, 2.0, 0.5).unwrap();
    c.play();

    let mut seen = Seen::new();
    run(&mut p, inst, 2 * RATE as usize / 256, &mut seen);
    let on = seen.iter().find(|(_, k, _)| *k == NoteEventKind::On).map(|e| e.0);
    assert_eq!(on, Some(72_000));
}

#[test]
fn stop_and_seek_release_sounding_notes() {
    let (mut c, mut p, inst) = setup(512);
    let clip = c.add_clip(inst, 0.0, 16.0).unwrap();
    c.add_note(inst, clip, 60, 100, 0.0, 8.0).unwrap();
    c.play();

    let mut seen = Seen::new();
    run(&mut p, inst, 2, &mut seen);
    assert_eq!(count(&seen, NoteEventKind::On, 60), 1);
    assert!(!p.graph().node(inst).unwrap().output().is_silent());

    c.stop();
    run(&mut p, inst, 1, &mut seen);
    assert_eq!(count(&seen, NoteEventKind::Off, 60), 1);

    // stopped: no window, nothing new fires
    run(&mut p, inst, 3, &mut seen);
    assert_eq!(seen.len(), 2);

    // playing again from the top retriggers the note once
    c.play();
    run(&mut p, inst, 2, &mut seen);
    assert_eq!(count(&seen, NoteEventKind::On, 60), 2);

    c.seek(12.0).unwrap();
    run(&mut p, inst, 1, &mut seen);
    assert_eq!(count(&seen, NoteEventKind::Off, 60), 2);
}

#[test]
fn seek_during_a_delayed_note_cuts_the_tail() {
    let (mut c, mut p, inst) = setup(512);
    c.add_plugin(inst, LatencyDelay::new(2, 2048), None).unwrap();
    let clip = c.add_clip(inst, 0.0, 8.0).unwrap();
    c.add_note(inst, clip, 60, 100, 0.0, 8.0).unwrap();
    c.play();

    for _ in 0..8 {
        p.process();
    }
    assert!(!p.process().is_silent());

    // nothing plays at beat 100; the old position must not leak through
    c.seek(100.0).unwrap();
    assert!(p.process().is_silent());
    assert!(p.process().is_silent());
}

#[test]
fn removing_a_sounding_note_releases_it() {
    let (mut c, mut p, inst) = setup(512);
    let clip = c.add_clip(inst, 0.0, 16.0).unwrap();
    let long = c.add_note(inst, clip, 60, 100, 0.0, 8.0).unwrap();
    c.play();

    let mut seen = Seen::new();
    run(&mut p, inst, 2, &mut seen);
    c.remove_notes(inst, clip, &[long]).unwrap();
    run(&mut p, inst, 1, &mut seen);

    assert_eq!(count(&seen, NoteEventKind::Off, 60), 1);
    assert_eq!(p.graph().node(inst).unwrap().instrument().unwrap().sounding_notes(), 0);
}

#[test]
fn midi_connection_forwards_events() {
    let (mut c, mut p, inst) = setup(512);
    let synth = c.create_node(NodeKind::Plugin, 2).unwrap();
    c.connect(inst.midi_out(), synth.midi_in()).unwrap();
    let clip = c.add_clip(inst, 0.0, 4.0).unwrap();
    c.add_note(inst, clip, 65, 100, 0.0, 1.0).unwrap();
    c.play();

    let mut seen = Seen::new();
    run(&mut p, synth, 1, &mut seen);
    assert_eq!(seen, vec![(0, NoteEventKind::On, 65)]);
}
