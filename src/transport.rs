//! Transport position and the per-block context built from it.

use crate::timeline::Timeline;

/// Everything a node needs to know about the block being rendered.
///
/// Built fresh for every block and never stored. The beat window is
/// half-open: `[block_start_beat, block_end_beat)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransportContext {
    pub block_start_beat: f64,
    pub block_end_beat: f64,
    /// Samples rendered while playing, at the start of this block
    pub sample_position: u64,
    pub sample_rate: u32,
    pub block_size: usize,
    /// Tempo in effect at the block start
    pub tempo: f64,
    pub playing: bool,
}

impl TransportContext {
    /// Context for a block starting at `beat`.
    ///
    /// The end beat is found by converting through absolute time, so the
    /// window is exact across tempo changes inside the block. A stopped
    /// transport has an empty window.
    pub fn for_block(
        timeline: &dyn Timeline,
        beat: f64,
        sample_position: u64,
        sample_rate: u32,
        block_size: usize,
        playing: bool,
    ) -> Self {
        let block_end_beat = if playing {
            let start = timeline.beats_to_seconds(beat);
            timeline.seconds_to_beats(start + block_size as f64 / sample_rate as f64)
        } else {
            beat
        };

        Self {
            block_start_beat: beat,
            block_end_beat,
            sample_position,
            sample_rate,
            block_size,
            tempo: timeline.tempo_at(beat),
            playing,
        }
    }

    #[inline]
    pub fn block_beats(&self) -> f64 {
        self.block_end_beat - self.block_start_beat
    }

    #[inline]
    pub fn contains_beat(&self, beat: f64) -> bool {
        self.block_start_beat <= beat && beat < self.block_end_beat
    }
}

/// Play state owned by the audio thread.
///
/// The position is kept as whole samples elapsed since an anchor beat.
/// Deriving every block's window from that integer count keeps consecutive
/// windows bit-identical at their shared boundary and free of drift.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Transport {
    anchor_beat: f64,
    elapsed: u64,
    sample_position: u64,
    playing: bool,
}

impl Transport {
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Samples rendered while playing since the last stop or seek
    /// (a seek moves it to the sample of the new beat).
    pub fn sample_position(&self) -> u64 {
        self.sample_position
    }

    /// Current beat under `timeline`.
    pub fn beat(&self, timeline: &dyn Timeline, sample_rate: u32) -> f64 {
        self.beat_after(timeline, sample_rate, self.elapsed)
    }

    fn beat_after(&self, timeline: &dyn Timeline, sample_rate: u32, elapsed: u64) -> f64 {
        if elapsed == 0 {
            return self.anchor_beat;
        }
        let anchor = timeline.beats_to_seconds(self.anchor_beat);
        timeline.seconds_to_beats(anchor + elapsed as f64 / sample_rate as f64)
    }

    pub fn play(&mut self) {
        self.playing = true;
    }

    /// Stop and rewind to the top.
    pub fn stop(&mut self) {
        self.playing = false;
        self.anchor_beat = 0.0;
        self.elapsed = 0;
        self.sample_position = 0;
    }

    pub fn seek(&mut self, beat: f64, timeline: &dyn Timeline, sample_rate: u32) {
        self.anchor_beat = beat.max(0.0);
        self.elapsed = 0;
        self.sample_position = timeline.beats_to_samples(self.anchor_beat, sample_rate).round() as u64;
    }

    /// Pin the position to `beat` before the timeline changes, so a tempo
    /// edit does not move the playhead.
    pub fn reanchor(&mut self, beat: f64) {
        self.anchor_beat = beat;
        self.elapsed = 0;
    }

    pub fn context(&self, timeline: &dyn Timeline, sample_rate: u32, block_size: usize) -> TransportContext {
        let start = self.beat_after(timeline, sample_rate, self.elapsed);
        let end = if self.playing {
            self.beat_after(timeline, sample_rate, self.elapsed + block_size as u64)
        } else {
            start
        };

        TransportContext {
            block_start_beat: start,
            block_end_beat: end,
            sample_position: self.sample_position,
            sample_rate,
            block_size,
            tempo: timeline.tempo_at(start),
            playing: self.playing,
        }
    }

    /// Move to the end of a rendered block. The next block starts exactly
    /// where this one ended.
    pub fn advance(&mut self, ctx: &TransportContext) {
        if ctx.playing && self.playing {
            self.elapsed += ctx.block_size as u64;
            self.sample_position += ctx.block_size as u64;
        }
    }
}
