//! Hosted processors.
//!
//! A [`Plugin`] is created and [`prepare`](Plugin::prepare)d on the control
//! thread, then moved into the audio thread inside a command. From then on
//! only the audio thread touches it, until it is removed and handed back
//! for disposal.

mod chain;

pub use chain::PluginChain;

use crate::buffer::AudioBuffer;
use crate::error::PluginError;
use crate::midi::NoteEvent;
use crate::transport::TransportContext;

/// Description of one automatable parameter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParameterInfo {
    pub name: &'static str,
    pub min: f32,
    pub max: f32,
    pub default: f32,
}

impl ParameterInfo {
    pub const fn new(name: &'static str, min: f32, max: f32, default: f32) -> Self {
        Self { name, min, max, default }
    }

    #[inline]
    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }
}

/// The contract between the engine and a hosted audio processor.
///
/// `process` runs on the audio thread: it must not allocate, lock or
/// block. Problems are reported through [`PluginError`]; a panic is caught
/// at the node boundary and treated the same way.
///
/// ```
/// use mischpult::{AudioBuffer, NoteEvent, Plugin, PluginError, TransportContext};
///
/// struct Invert;
///
/// impl Plugin for Invert {
///     fn name(&self) -> &str { "invert" }
///
///     fn process(
///         &mut self,
///         _ctx: &TransportContext,
///         _events: &[NoteEvent],
///         buffer: &mut AudioBuffer,
///     ) -> Result<(), PluginError> {
///         buffer.scale(-1.0);
///         Ok(())
///     }
/// }
/// ```
pub trait Plugin: Send + 'static {
    fn name(&self) -> &str;

    fn parameters(&self) -> &[ParameterInfo] {
        &[]
    }

    /// Set parameter `index` (position in [`parameters`](Self::parameters)).
    /// The host clamps `value` to the declared range first.
    fn set_parameter(&mut self, _index: usize, _value: f32) {}

    /// Samples of delay this plugin adds to the signal.
    fn latency_samples(&self) -> u32 {
        0
    }

    /// Called once on the control thread before the plugin is installed.
    fn prepare(&mut self, _sample_rate: u32, _max_block_size: usize) {}

    /// Drop internal state such as delay tails or sounding voices.
    fn reset(&mut self) {}

    /// Process one block in place. `events` are sorted by offset.
    fn process(
        &mut self,
        ctx: &TransportContext,
        events: &[NoteEvent],
        buffer: &mut AudioBuffer,
    ) -> Result<(), PluginError>;
}
