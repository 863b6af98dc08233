//! Polyphonic sine synthesizer driven by note events

use crate::buffer::AudioBuffer;
use crate::error::PluginError;
use crate::midi::{NoteEvent, NoteEventKind};
use crate::plugin::{ParameterInfo, Plugin};
use crate::transport::TransportContext;

const PARAMETERS: [ParameterInfo; 2] = [
    ParameterInfo::new("volume", 0.0, 1.0, 0.3),
    ParameterInfo::new("release", 0.0, 1.0, 0.005),
];

const VOICES: usize = 16;

#[derive(Clone, Copy, Debug, Default)]
struct Voice {
    pitch: u8,
    phase: f32,
    phase_inc: f32,
    level: f32,
    /// Amplitude lost per sample once released
    decay: f32,
    held: bool,
}

impl Voice {
    #[inline]
    fn is_idle(&self) -> bool {
        !self.held && self.level <= 0.0
    }

    #[inline]
    fn next(&mut self) -> f32 {
        let out = (self.phase * core::f32::consts::TAU).sin() * self.level;
        self.phase += self.phase_inc;
        self.phase -= (self.phase >= 1.0) as u32 as f32;
        if !self.held {
            self.level = (self.level - self.decay).max(0.0);
        }
        out
    }
}

/// Sixteen-voice sine instrument with a linear release.
///
/// Voices start at the exact sample offset of their note-on and fade over
/// the release time after their note-off. When all voices are busy the
/// quietest one is stolen.
pub struct SineSynth {
    voices: [Voice; VOICES],
    volume: f32,
    release_seconds: f32,
    sample_rate: f32,
}

impl Default for SineSynth {
    fn default() -> Self {
        Self::new()
    }
}

impl SineSynth {
    pub fn new() -> Self {
        Self {
            voices: [Voice::default(); VOICES],
            volume: 0.3,
            release_seconds: 0.005,
            sample_rate: 48_000.0,
        }
    }

    pub fn sounding_voices(&self) -> usize {
        self.voices.iter().filter(|v| !v.is_idle()).count()
    }

    fn note_on(&mut self, pitch: u8, velocity: u8) {
        let frequency = 440.0 * 2f32.powf((pitch as f32 - 69.0) / 12.0);
        let level = self.volume * velocity as f32 / 127.0;

        let slot = match self.voices.iter().position(|v| v.is_idle()) {
            Some(i) => i,
            None => self
                .voices
                .iter()
                .enumerate()
                .min_by(|a, b| a.1.level.total_cmp(&b.1.level))
                .map(|(i, _)| i)
                .unwrap_or(0),
        };

        self.voices[slot] = Voice {
            pitch,
            phase: 0.0,
            phase_inc: frequency / self.sample_rate,
            level,
            decay: 0.0,
            held: true,
        };
    }

    fn note_off(&mut self, pitch: u8) {
        let release_samples = (self.release_seconds * self.sample_rate).max(1.0);
        for voice in self.voices.iter_mut().filter(|v| v.held && v.pitch == pitch) {
            voice.held = false;
            voice.decay = voice.level / release_samples;
        }
    }

    fn render(&mut self, buffer: &mut AudioBuffer, from: usize, to: usize) {
        if from >= to {
            return;
        }
        for voice in self.voices.iter_mut().filter(|v| !v.is_idle()) {
            for i in from..to {
                let sample = voice.next();
                for ch in 0..buffer.channels() {
                    buffer.channel_mut(ch)[i] += sample;
                }
            }
        }
    }
}

impl Plugin for SineSynth {
    fn name(&self) -> &str {
        "sine synth"
    }

    fn parameters(&self) -> &[ParameterInfo] {
        &PARAMETERS
    }

    fn set_parameter(&mut self, index: usize, value: f32) {
        match index {
            0 => self.volume = value,
            1 => self.release_seconds = value,
            _ => {}
        }
    }

    fn prepare(&mut self, sample_rate: u32, _max_block_size: usize) {
        self.sample_rate = sample_rate as f32;
    }

    fn reset(&mut self) {
        self.voices = [Voice::default(); VOICES];
    }

    fn process(
        &mut self,
        _ctx: &TransportContext,
        events: &[NoteEvent],
        buffer: &mut AudioBuffer,
    ) -> Result<(), PluginError> {
        let frames = buffer.frames();
        let mut cursor = 0;

        for event in events {
            let at = (event.offset as usize).min(frames);
            self.render(buffer, cursor, at);
            cursor = cursor.max(at);

            match event.kind {
                NoteEventKind::On => self.note_on(event.pitch, event.velocity),
                NoteEventKind::Off => self.note_off(event.pitch),
            }
        }
        self.render(buffer, cursor, frames);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::{TempoMap, TimeSignature};

    fn ctx(block: usize) -> TransportContext {
        let tm = TempoMap::new(120.0, TimeSignature::default(), 1).unwrap();
        TransportContext::for_block(&tm, 0.0, 0, 48_000, block, true)
    }

    #[test]
    fn test_voice_starts_at_event_offset() {
        let mut synth = SineSynth::new();
        synth.prepare(48_000, 64);

        let mut buffer = AudioBuffer::new(1, 64);
        synth
            .process(&ctx(64), &[NoteEvent::on(32, 69, 127)], &mut buffer)
            .unwrap();

        assert!(buffer.channel(0)[..33].iter().all(|&s| s == 0.0));
        assert!(buffer.channel(0)[33..].iter().any(|&s| s != 0.0));
        assert_eq!(synth.sounding_voices(), 1);
    }

    #[test]
    fn test_release_fades_to_silence() {
        let mut synth = SineSynth::new();
        synth.prepare(48_000, 512);
        let events = [NoteEvent::on(0, 60, 100), NoteEvent::off(10, 60)];

        let mut buffer = AudioBuffer::new(2, 512);
        synth.process(&ctx(512), &events, &mut buffer).unwrap();
        // 5 ms release at 48 kHz is 240 samples
        assert_eq!(synth.sounding_voices(), 0);
        assert!(buffer.channel(1)[300..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_voice_stealing() {
        let mut synth = SineSynth::new();
        let events: Vec<_> = (0..20).map(|p| NoteEvent::on(0, 40 + p, 100)).collect();
        let mut buffer = AudioBuffer::new(1, 16);
        synth.process(&ctx(16), &events, &mut buffer).unwrap();
        assert_eq!(synth.sounding_voices(), VOICES);
    }
}
