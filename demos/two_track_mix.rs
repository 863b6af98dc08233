//! Offline render of a small project: a synth track and a sine track mixed
//! on a bus, with one of them behind a plugin that adds latency. The drone
//! fades in along a volume automation lane.
//!
//! Run with: cargo run --example two_track_mix

use mischpult::nodes::{Gain, LatencyDelay, Sine, SineSynth, SlewLimiter};
use mischpult::{engine, AutomationPoint, AutomationTarget, Curve, EngineConfig, NodeKind};

fn main() -> mischpult::Result<()> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    let config = EngineConfig::default().with_block_size(256).with_tempo(96.0);
    let (mut controller, mut processor) = engine(config)?;

    let (keys, drone, bus) = controller.batch(|c| -> mischpult::Result<_> {
        let keys = c.create_node(NodeKind::InstrumentTrack, 2)?;
        let drone = c.create_node(NodeKind::AudioTrack, 2)?;
        let bus = c.create_node(NodeKind::Bus, 2)?;
        c.connect(keys.audio_out(), bus.audio_in())?;
        c.connect(drone.audio_out(), bus.audio_in())?;

        c.add_plugin(keys, SineSynth::new(), None)?;
        c.add_plugin(drone, Sine::new(110.0).with_amplitude(0.1), None)?;
        c.add_plugin(drone, LatencyDelay::new(2, 480), None)?;
        c.add_plugin(bus, Gain::new(0.8), None)?;
        c.add_plugin(bus, SlewLimiter::from_rate_per_second(2_000.0), None)?;
        c.set_pan(drone, -0.3)?;
        c.set_automation(
            drone,
            AutomationTarget::Volume,
            vec![
                AutomationPoint::new(0.0, -60.0).with_curve(Curve::Exponential(-0.5)),
                AutomationPoint::new(4.0, 0.0),
            ],
        )?;
        Ok((keys, drone, bus))
    })?;

    let clip = controller.add_clip(keys, 0.0, 8.0)?;
    for (i, pitch) in [60u8, 64, 67, 72, 67, 64, 60, 55].into_iter().enumerate() {
        controller.add_note(keys, clip, pitch, 100, i as f64, 0.9)?;
    }

    println!("processing order: {:?}", controller.processing_order()?);
    println!("total latency: {} samples", controller.total_latency_samples());
    println!("drone compensation: {} samples", controller.compensation(drone));
    println!("{}", controller.to_dot());

    controller.play();
    let block_seconds = controller.config().block_duration();
    let blocks = (5.0 / block_seconds) as usize;

    for block in 0..blocks {
        let peak = processor.process().peak();
        if block % 100 == 0 {
            println!(
                "t={:.2}s beat={:.2} peak={:.3}",
                block as f64 * block_seconds,
                processor.graph().current_beat(),
                peak
            );
        }
        controller.collect_garbage();
    }

    let stats = processor.graph().stats();
    println!("blocks: {}, faults: {}, bus: {}", stats.blocks_processed, stats.node_faults, bus);
    Ok(())
}
