//! Play a short arpeggio through the default output device.
//!
//! Run with: cargo run --example live_output --features cpal_sink

use std::thread::sleep;
use std::time::Duration;

use mischpult::nodes::SineSynth;
use mischpult::{engine, CpalDevice, CpalOutput, NodeKind};

fn main() -> mischpult::Result<()> {
    tracing_subscriber::fmt().init();

    let device = CpalDevice::default_output()?;
    println!("Using: {} @ {}Hz, {} ch", device.name(), device.sample_rate(), device.channels());

    let (mut controller, processor) = engine(device.engine_config())?;
    let keys = controller.create_node(NodeKind::InstrumentTrack, 2)?;
    controller.add_plugin(keys, SineSynth::new(), None)?;

    let clip = controller.add_clip(keys, 0.0, 8.0)?;
    for step in 0..16u8 {
        let pitch = [57, 60, 64, 69][(step % 4) as usize];
        controller.add_note(keys, clip, pitch, 90, step as f64 * 0.5, 0.4)?;
    }

    let _output = CpalOutput::start(&device, processor)?;
    controller.play();
    println!("Playing...");

    while controller.monitor().current_beat() < 8.0 {
        sleep(Duration::from_millis(50));
        controller.flush();
    }
    controller.stop();
    sleep(Duration::from_millis(200));
    Ok(())
}
