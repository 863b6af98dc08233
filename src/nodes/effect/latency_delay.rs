//! Fixed delay that reports itself as plugin latency

use crate::buffer::{AudioBuffer, DelayLine};
use crate::error::PluginError;
use crate::midi::NoteEvent;
use crate::plugin::Plugin;
use crate::transport::TransportContext;

/// Delays the signal by a fixed number of samples and reports that delay as
/// its latency, like a lookahead limiter or linear-phase EQ would.
pub struct LatencyDelay {
    line: DelayLine,
}

impl LatencyDelay {
    pub fn new(channels: usize, samples: u32) -> Self {
        Self {
            line: DelayLine::new(channels, samples as usize),
        }
    }
}

impl Plugin for LatencyDelay {
    fn name(&self) -> &str {
        "latency delay"
    }

    fn latency_samples(&self) -> u32 {
        self.line.delay() as u32
    }

    fn reset(&mut self) {
        self.line.reset();
    }

    fn process(
        &mut self,
        _ctx: &TransportContext,
        _events: &[NoteEvent],
        buffer: &mut AudioBuffer,
    ) -> Result<(), PluginError> {
        if buffer.channels() > self.line.channels() {
            return Err(PluginError::UnsupportedLayout);
        }
        self.line.process_in_place(buffer);
        Ok(())
    }
}
