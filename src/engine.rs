//! Engine construction.

use tracing::info;

use crate::channel::command_channel;
use crate::config::EngineConfig;
use crate::controller::Controller;
use crate::error::Result;
use crate::garbage::garbage_channel;
use crate::monitor::EngineMonitor;
use crate::processor::AudioProcessor;
use crate::render::RenderGraph;
use crate::timeline::TempoMap;

/// Build an engine: the [`Controller`] stays on the control thread, the
/// [`AudioProcessor`] moves to the audio thread. Dropping both tears the
/// engine down.
///
/// ```
/// use mischpult::{engine, EngineConfig, NodeKind};
///
/// let (mut controller, mut processor) = engine(EngineConfig::default()).unwrap();
/// let track = controller.create_node(NodeKind::AudioTrack, 2).unwrap();
/// let bus = controller.create_node(NodeKind::Bus, 2).unwrap();
/// controller.connect(track.audio_out(), bus.audio_in()).unwrap();
///
/// let master = processor.process();
/// assert!(master.is_silent());
/// ```
pub fn engine(config: EngineConfig) -> Result<(Controller, AudioProcessor)> {
    config.validate()?;

    let tempo = TempoMap::new(config.tempo, config.time_signature, config.max_tempo_points)?;
    let monitor = EngineMonitor::default();
    let (sender, receiver) = command_channel(config.command_capacity);
    let (garbage_tx, garbage_rx) = garbage_channel(config.garbage_capacity, monitor.clone());
    let graph = RenderGraph::new(&config, tempo.clone(), garbage_tx);

    info!(
        sample_rate = config.sample_rate,
        block_size = config.block_size,
        channels = config.output_channels,
        "engine created"
    );

    let processor = AudioProcessor::new(receiver, graph, monitor.clone());
    let controller = Controller::new(config, tempo, sender, garbage_rx, monitor);
    Ok((controller, processor))
}
