//! Slew rate limiter effect

use crate::buffer::AudioBuffer;
use crate::error::PluginError;
use crate::midi::NoteEvent;
use crate::plugin::{ParameterInfo, Plugin};
use crate::transport::TransportContext;

const PARAMETERS: [ParameterInfo; 1] = [ParameterInfo::new("rate", 0.0, 1.0, 1.0)];

const MAX_CHANNELS: usize = 8;

/// A slew rate limiter that smooths sudden changes in audio
///
/// Useful for:
/// - Smoothing control signals
/// - Creating portamento/glide effects
/// - Reducing harsh transients
pub struct SlewLimiter {
    /// Maximum change per sample
    rate: f32,
    /// Last output value per channel (up to 8 channels)
    last: [f32; MAX_CHANNELS],
    /// Rate per second, converted when the sample rate is known
    rate_per_second: Option<f32>,
}

impl SlewLimiter {
    /// Create a new slew limiter with the given rate per sample
    ///
    /// A rate of 1.0 means the signal can change by at most 1.0 per sample.
    /// Lower values = more smoothing.
    pub fn new(rate: f32) -> Self {
        Self {
            rate: rate.abs(),
            last: [0.0; MAX_CHANNELS],
            rate_per_second: None,
        }
    }

    /// Create with a rate specified in units per second
    ///
    /// For example, `from_rate_per_second(1000.0)` at 48kHz means
    /// the signal can change by ~0.02 per sample.
    pub fn from_rate_per_second(rate: f32) -> Self {
        Self {
            rate: 0.0,
            last: [0.0; MAX_CHANNELS],
            rate_per_second: Some(rate.abs()),
        }
    }

    #[inline]
    pub fn rate(&self) -> f32 {
        self.rate
    }
}

impl Plugin for SlewLimiter {
    fn name(&self) -> &str {
        "slew limiter"
    }

    fn parameters(&self) -> &[ParameterInfo] {
        &PARAMETERS
    }

    fn set_parameter(&mut self, index: usize, value: f32) {
        if index == 0 {
            self.rate = value.abs();
            self.rate_per_second = None;
        }
    }

    fn prepare(&mut self, sample_rate: u32, _max_block_size: usize) {
        if let Some(rps) = self.rate_per_second {
            self.rate = rps / sample_rate as f32;
        }
    }

    fn reset(&mut self) {
        self.last = [0.0; MAX_CHANNELS];
    }

    fn process(
        &mut self,
        _ctx: &TransportContext,
        _events: &[NoteEvent],
        buffer: &mut AudioBuffer,
    ) -> Result<(), PluginError> {
        if buffer.channels() > MAX_CHANNELS {
            return Err(PluginError::UnsupportedLayout);
        }
        let max_delta = self.rate;

        for (ch, channel) in buffer.iter_channels_mut().enumerate() {
            let mut last = self.last[ch];
            for sample in channel.iter_mut() {
                // Clamp delta to max rate
                last += (*sample - last).clamp(-max_delta, max_delta);
                *sample = last;
            }
            self.last[ch] = last;
        }
        Ok(())
    }
}
