//! Sine wave oscillator

use crate::buffer::AudioBuffer;
use crate::error::PluginError;
use crate::midi::NoteEvent;
use crate::plugin::{ParameterInfo, Plugin};
use crate::transport::TransportContext;

const PARAMETERS: [ParameterInfo; 2] = [
    ParameterInfo::new("frequency", 0.0, 20_000.0, 440.0),
    ParameterInfo::new("amplitude", 0.0, 1.0, 0.25),
];

/// A free-running sine oscillator, mixed into the signal it processes.
///
/// The same tone goes to every channel.
pub struct Sine {
    frequency: f32,
    phase: f32,
    amplitude: f32,
}

impl Sine {
    pub fn new(frequency: f32) -> Self {
        Self {
            frequency,
            phase: 0.0,
            amplitude: 0.25, // -12dB, safe default
        }
    }

    pub fn with_amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude.clamp(0.0, 1.0);
        self
    }

    #[inline]
    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    #[inline]
    pub fn amplitude(&self) -> f32 {
        self.amplitude
    }
}

impl Plugin for Sine {
    fn name(&self) -> &str {
        "sine"
    }

    fn parameters(&self) -> &[ParameterInfo] {
        &PARAMETERS
    }

    fn set_parameter(&mut self, index: usize, value: f32) {
        match index {
            0 => self.frequency = value.max(0.0),
            1 => self.amplitude = value.clamp(0.0, 1.0),
            _ => {}
        }
    }

    fn reset(&mut self) {
        self.phase = 0.0;
    }

    fn process(
        &mut self,
        ctx: &TransportContext,
        _events: &[NoteEvent],
        buffer: &mut AudioBuffer,
    ) -> Result<(), PluginError> {
        if buffer.channels() == 0 {
            return Ok(());
        }

        let phase_inc = self.frequency / ctx.sample_rate as f32;
        let amplitude = self.amplitude;
        let frames = buffer.frames();
        let start_phase = self.phase;

        for channel in buffer.iter_channels_mut() {
            let mut phase = start_phase;
            for sample in channel.iter_mut().take(frames) {
                *sample += (phase * core::f32::consts::TAU).sin() * amplitude;

                phase += phase_inc;
                // Branchless phase wrap (phase is always positive)
                phase -= (phase >= 1.0) as u32 as f32;
            }
            self.phase = phase;
        }

        Ok(())
    }
}
