//! Gain/volume control effect

use crate::buffer::AudioBuffer;
use crate::error::PluginError;
use crate::midi::NoteEvent;
use crate::plugin::{ParameterInfo, Plugin};
use crate::transport::TransportContext;

const PARAMETERS: [ParameterInfo; 1] = [ParameterInfo::new("gain", 0.0, 4.0, 1.0)];

/// A gain (volume) control that scales audio in place.
///
/// Gain changes are smoothed per sample to prevent clicks.
pub struct Gain {
    gain: f32,
    /// Smoothing to prevent clicks on rapid gain changes
    smoothed_gain: f32,
    /// Smoothing coefficient (0.0 = instant, 1.0 = no change)
    smooth_coeff: f32,
    smoothing_ms: Option<f32>,
}

impl Gain {
    /// Create a new gain plugin with the specified gain value
    pub fn new(gain: f32) -> Self {
        Self {
            gain,
            smoothed_gain: gain,
            smooth_coeff: 0.995, // ~7ms at 48kHz
            smoothing_ms: None,
        }
    }

    /// Set the smoothing time in milliseconds. Applied when the plugin is
    /// prepared for a sample rate.
    pub fn with_smoothing_ms(mut self, ms: f32) -> Self {
        self.smoothing_ms = Some(ms);
        self
    }

    /// Disable smoothing for instant gain changes
    pub fn without_smoothing(mut self) -> Self {
        self.smooth_coeff = 0.0;
        self.smoothing_ms = None;
        self
    }

    #[inline]
    pub fn gain(&self) -> f32 {
        self.gain
    }
}

impl Plugin for Gain {
    fn name(&self) -> &str {
        "gain"
    }

    fn parameters(&self) -> &[ParameterInfo] {
        &PARAMETERS
    }

    fn set_parameter(&mut self, index: usize, value: f32) {
        if index == 0 {
            self.gain = value;
        }
    }

    fn prepare(&mut self, sample_rate: u32, _max_block_size: usize) {
        if let Some(ms) = self.smoothing_ms {
            // Time constant: after `ms` milliseconds, we've reached ~63% of target
            let samples = (ms / 1000.0) * sample_rate as f32;
            self.smooth_coeff = if samples > 0.0 { (-1.0 / samples).exp() } else { 0.0 };
        }
    }

    fn reset(&mut self) {
        self.smoothed_gain = self.gain;
    }

    fn process(
        &mut self,
        _ctx: &TransportContext,
        _events: &[NoteEvent],
        buffer: &mut AudioBuffer,
    ) -> Result<(), PluginError> {
        let smooth_coeff = self.smooth_coeff;
        let target_gain = self.gain;
        let start_gain = self.smoothed_gain;
        let mut end_gain = start_gain;

        // every channel follows the same ramp
        for channel in buffer.iter_channels_mut() {
            let mut gain = start_gain;
            for sample in channel.iter_mut() {
                gain = target_gain + smooth_coeff * (gain - target_gain);
                *sample *= gain;
            }
            end_gain = gain;
        }

        self.smoothed_gain = end_gain;
        Ok(())
    }
}
