//! Audio-thread handle of an engine.

use crate::buffer::AudioBuffer;
use crate::channel::CommandReceiver;
use crate::monitor::EngineMonitor;
use crate::render::RenderGraph;

/// Renders the project one block at a time.
///
/// Call [`process`](Self::process) from the host's audio callback. Each call
/// applies the commands queued so far, renders a block with the engine's
/// own transport and moves the transport on.
pub struct AudioProcessor {
    receiver: CommandReceiver,
    graph: RenderGraph,
    monitor: EngineMonitor,
    /// Frames of the current master block already handed out by
    /// `process_interleaved`
    read_pos: usize,
}

impl AudioProcessor {
    pub(crate) fn new(receiver: CommandReceiver, graph: RenderGraph, monitor: EngineMonitor) -> Self {
        let read_pos = graph.block_size();
        Self {
            receiver,
            graph,
            monitor,
            read_pos,
        }
    }

    pub fn graph(&self) -> &RenderGraph {
        &self.graph
    }

    /// Direct access for hosts that build their own [`TransportContext`]s
    /// and call [`RenderGraph::process_block`].
    ///
    /// [`TransportContext`]: crate::TransportContext
    pub fn graph_mut(&mut self) -> &mut RenderGraph {
        &mut self.graph
    }

    /// Apply every command queued so far. Returns how many were applied.
    pub fn apply_commands(&mut self) -> usize {
        let graph = &mut self.graph;
        self.receiver.drain(|command| graph.apply(command))
    }

    /// Render one block. Returns the master output.
    pub fn process(&mut self) -> &AudioBuffer {
        self.render(None)
    }

    /// Render one block, feeding `input` to audio tracks that monitor their
    /// input.
    pub fn process_with_input(&mut self, input: &AudioBuffer) -> &AudioBuffer {
        self.render(Some(input))
    }

    fn render(&mut self, input: Option<&AudioBuffer>) -> &AudioBuffer {
        self.apply_commands();

        let ctx = self.graph.transport_context();
        self.graph.process_block_with_input(&ctx, input);
        self.graph.advance_transport(&ctx);

        let stats = self.graph.stats();
        self.monitor
            .publish_transport(self.graph.current_beat(), self.graph.transport().is_playing());
        self.monitor.publish_counters(
            stats.blocks_processed,
            stats.node_faults,
            stats.stale_commands,
            self.graph.dropped_events(),
        );

        self.read_pos = 0;
        self.graph.master()
    }

    /// Fill an interleaved device buffer of any length, rendering blocks as
    /// needed. Frames left over from one call are used first by the next.
    pub fn process_interleaved(&mut self, out: &mut [f32], channels: usize) {
        if channels == 0 {
            return;
        }
        let frames = out.len() / channels;
        let block = self.graph.block_size();
        let mut written = 0;

        while written < frames {
            if self.read_pos >= block {
                self.render(None);
            }
            let n = self
                .graph
                .master()
                .write_interleaved(self.read_pos, &mut out[written * channels..], channels);
            self.read_pos += n;
            written += n;
        }

        out[frames * channels..].iter_mut().for_each(|s| *s = 0.0);
    }
}
