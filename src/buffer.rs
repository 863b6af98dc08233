//! Planar audio buffers and delay lines

use alloc::vec;
use alloc::vec::Vec;

/// A block of planar audio: `channels` lanes of `frames` samples each.
///
/// Buffers are sized once on the control thread; nothing here allocates
/// after construction.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AudioBuffer {
    data: Vec<f32>,
    channels: usize,
    frames: usize,
}

impl AudioBuffer {
    pub fn new(channels: usize, frames: usize) -> Self {
        Self {
            data: vec![0.0; channels * frames],
            channels,
            frames,
        }
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    #[inline]
    pub fn frames(&self) -> usize {
        self.frames
    }

    #[inline]
    pub fn channel(&self, ch: usize) -> &[f32] {
        &self.data[ch * self.frames..(ch + 1) * self.frames]
    }

    #[inline]
    pub fn channel_mut(&mut self, ch: usize) -> &mut [f32] {
        &mut self.data[ch * self.frames..(ch + 1) * self.frames]
    }

    pub fn iter_channels(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.frames.max(1)).take(self.channels)
    }

    pub fn iter_channels_mut(&mut self) -> impl Iterator<Item = &mut [f32]> {
        let channels = self.channels;
        self.data.chunks_exact_mut(self.frames.max(1)).take(channels)
    }

    pub fn clear(&mut self) {
        self.data.iter_mut().for_each(|s| *s = 0.0);
    }

    pub fn scale(&mut self, gain: f32) {
        self.data.iter_mut().for_each(|s| *s *= gain);
    }

    /// Copy `src` into this buffer. See [`add_from`](Self::add_from) for the
    /// channel mapping.
    pub fn copy_from(&mut self, src: &AudioBuffer) {
        self.clear();
        self.add_from(src, 1.0);
    }

    /// Mix `src * gain` into this buffer.
    ///
    /// A mono source is spread to every channel; otherwise channel `n` maps
    /// to channel `n` and surplus source channels are ignored.
    pub fn add_from(&mut self, src: &AudioBuffer, gain: f32) {
        if src.channels == 0 {
            return;
        }
        let frames = self.frames.min(src.frames);

        for ch in 0..self.channels {
            let src_ch = source_channel(src.channels, ch);
            let Some(src_ch) = src_ch else { break };

            let from = &src.data[src_ch * src.frames..src_ch * src.frames + frames];
            let to = &mut self.data[ch * self.frames..ch * self.frames + frames];
            for (out, &sample) in to.iter_mut().zip(from) {
                *out += sample * gain;
            }
        }
    }

    /// Largest absolute sample value.
    pub fn peak(&self) -> f32 {
        self.data.iter().fold(0.0f32, |peak, s| peak.max(s.abs()))
    }

    pub fn is_silent(&self) -> bool {
        self.data.iter().all(|&s| s == 0.0)
    }

    /// Write frames `offset..offset + out.len() / out_channels` as
    /// interleaved samples. Returns the number of frames written.
    pub fn write_interleaved(&self, offset: usize, out: &mut [f32], out_channels: usize) -> usize {
        if out_channels == 0 || offset >= self.frames {
            return 0;
        }
        let frames = (out.len() / out_channels).min(self.frames - offset);

        for (i, frame) in out.chunks_exact_mut(out_channels).take(frames).enumerate() {
            for (ch, sample) in frame.iter_mut().enumerate() {
                *sample = match source_channel(self.channels, ch) {
                    Some(src) => self.data[src * self.frames + offset + i],
                    None => 0.0,
                };
            }
        }
        frames
    }
}

#[inline]
fn source_channel(src_channels: usize, dst_ch: usize) -> Option<usize> {
    if src_channels == 1 {
        Some(0)
    } else if dst_ch < src_channels {
        Some(dst_ch)
    } else {
        None
    }
}

/// Fixed delay applied to a whole multi-channel signal.
///
/// Used to align signal paths with different processing latency. The ring
/// holds exactly `delay` samples per channel, so a sample written now is
/// read back `delay` samples later.
#[derive(Clone, Debug)]
pub struct DelayLine {
    ring: Vec<f32>,
    channels: usize,
    delay: usize,
    write_pos: usize,
}

impl DelayLine {
    pub fn new(channels: usize, delay: usize) -> Self {
        Self {
            ring: vec![0.0; channels * delay],
            channels,
            delay,
            write_pos: 0,
        }
    }

    #[inline]
    pub fn delay(&self) -> usize {
        self.delay
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Push `frames` samples from `input` through the line and mix the
    /// delayed signal, scaled by `gain`, into `output` using the same channel
    /// mapping as [`AudioBuffer::add_from`].
    pub fn process_into(&mut self, input: &AudioBuffer, output: &mut AudioBuffer, gain: f32) {
        let frames = input.frames().min(output.frames());
        if self.delay == 0 {
            output.add_from(input, gain);
            return;
        }

        let channels = self.channels.min(input.channels());
        let start = self.write_pos;

        for ch in 0..channels {
            let lane = &mut self.ring[ch * self.delay..(ch + 1) * self.delay];
            let samples = input.channel(ch);
            let mut pos = start;

            for i in 0..frames {
                let delayed = lane[pos];
                lane[pos] = samples[i];
                pos += 1;
                if pos == self.delay {
                    pos = 0;
                }

                if channels == 1 {
                    for out_ch in 0..output.channels() {
                        output.channel_mut(out_ch)[i] += delayed * gain;
                    }
                } else if ch < output.channels() {
                    output.channel_mut(ch)[i] += delayed * gain;
                }
            }
        }

        self.write_pos = (start + frames) % self.delay;
    }

    /// Delay `buffer` in place.
    pub fn process_in_place(&mut self, buffer: &mut AudioBuffer) {
        if self.delay == 0 {
            return;
        }
        let frames = buffer.frames();
        let channels = self.channels.min(buffer.channels());
        let start = self.write_pos;

        for ch in 0..channels {
            let lane = &mut self.ring[ch * self.delay..(ch + 1) * self.delay];
            let mut pos = start;
            for sample in buffer.channel_mut(ch).iter_mut() {
                core::mem::swap(&mut lane[pos], sample);
                pos += 1;
                if pos == self.delay {
                    pos = 0;
                }
            }
        }

        self.write_pos = (start + frames) % self.delay;
    }

    pub fn reset(&mut self) {
        self.ring.iter_mut().for_each(|s| *s = 0.0);
        self.write_pos = 0;
    }
}
