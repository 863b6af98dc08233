//! Musical time: beats, seconds, samples and bars.
//!
//! Beats are quarter notes. Tempo is piecewise constant between tempo points,
//! so conversions integrate segment by segment and stay continuous and
//! monotonic across tempo changes.

use alloc::vec::Vec;

use crate::error::{Error, Result};

/// Conversion contract between musical and absolute time.
pub trait Timeline {
    fn beats_to_seconds(&self, beat: f64) -> f64;

    fn seconds_to_beats(&self, seconds: f64) -> f64;

    /// Tempo in BPM in effect at `beat`.
    fn tempo_at(&self, beat: f64) -> f64;

    fn beats_to_samples(&self, beat: f64, sample_rate: u32) -> f64 {
        self.beats_to_seconds(beat) * sample_rate as f64
    }

    fn samples_to_beats(&self, samples: f64, sample_rate: u32) -> f64 {
        self.seconds_to_beats(samples / sample_rate as f64)
    }
}

pub const MIN_BPM: f64 = 1.0;
pub const MAX_BPM: f64 = 999.0;

const SAME_BEAT: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoPoint {
    pub beat: f64,
    pub bpm: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSignature {
    pub numerator: u8,
    pub denominator: u8,
}

impl TimeSignature {
    pub const fn new(numerator: u8, denominator: u8) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    #[inline]
    pub fn beats_per_bar(&self) -> f64 {
        self.numerator as f64 * 4.0 / self.denominator as f64
    }

    pub fn validate(&self) -> Result<()> {
        let valid_denominator = matches!(self.denominator, 1 | 2 | 4 | 8 | 16 | 32);
        if self.numerator == 0 || !valid_denominator {
            return Err(Error::InvalidTimeSignature {
                numerator: self.numerator,
                denominator: self.denominator,
            });
        }
        Ok(())
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::new(4, 4)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignaturePoint {
    pub beat: f64,
    pub signature: TimeSignature,
}

/// Bar/beat/tick position. Bars and beats count from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bbt {
    pub bar: u32,
    pub beat: u32,
    pub ticks: u32,
}

impl Bbt {
    pub const TICKS_PER_BEAT: u32 = 960;

    pub fn new(bar: u32, beat: u32, ticks: u32) -> Self {
        Self { bar, beat, ticks }
    }
}

/// Piecewise-constant tempo map with time signature changes.
///
/// There is always a tempo point and a signature point at beat 0. Point
/// storage is reserved up front; inserting past the reserved capacity fails
/// instead of growing, so a map owned by the audio thread never allocates.
#[derive(Debug, Clone)]
pub struct TempoMap {
    tempos: Vec<TempoPoint>,
    signatures: Vec<SignaturePoint>,
}

impl TempoMap {
    pub fn new(bpm: f64, signature: TimeSignature, capacity: usize) -> Result<Self> {
        validate_bpm(bpm)?;
        signature.validate()?;

        let capacity = capacity.max(1);
        let mut tempos = Vec::with_capacity(capacity);
        tempos.push(TempoPoint { beat: 0.0, bpm });
        let mut signatures = Vec::with_capacity(capacity);
        signatures.push(SignaturePoint { beat: 0.0, signature });

        Ok(Self { tempos, signatures })
    }

    pub fn tempo_points(&self) -> &[TempoPoint] {
        &self.tempos
    }

    pub fn signature_points(&self) -> &[SignaturePoint] {
        &self.signatures
    }

    /// Set the tempo from `beat` onwards, replacing any point at that beat.
    pub fn set_tempo(&mut self, beat: f64, bpm: f64) -> Result<()> {
        validate_beat(beat)?;
        validate_bpm(bpm)?;

        let point = TempoPoint { beat, bpm };
        insert_sorted(&mut self.tempos, point, |p| p.beat)
    }

    /// Remove the tempo point at `beat`. The point at beat 0 stays.
    pub fn remove_tempo(&mut self, beat: f64) -> bool {
        remove_at(&mut self.tempos, beat, |p| p.beat)
    }

    pub fn set_time_signature(&mut self, beat: f64, signature: TimeSignature) -> Result<()> {
        validate_beat(beat)?;
        signature.validate()?;

        let point = SignaturePoint { beat, signature };
        insert_sorted(&mut self.signatures, point, |p| p.beat)
    }

    pub fn remove_time_signature(&mut self, beat: f64) -> bool {
        remove_at(&mut self.signatures, beat, |p| p.beat)
    }

    pub fn time_signature_at(&self, beat: f64) -> TimeSignature {
        self.signatures
            .iter()
            .rev()
            .find(|p| p.beat <= beat)
            .map(|p| p.signature)
            .unwrap_or_default()
    }

    /// Whether another distinct point fits without growing storage.
    pub fn has_room_for_tempo(&self, beat: f64) -> bool {
        self.tempos.len() < self.tempos.capacity() || position_of(&self.tempos, beat, |p| p.beat).is_some()
    }

    pub fn has_room_for_signature(&self, beat: f64) -> bool {
        self.signatures.len() < self.signatures.capacity()
            || position_of(&self.signatures, beat, |p| p.beat).is_some()
    }

    pub fn beats_to_bbt(&self, beat: f64) -> Bbt {
        let beat = beat.max(0.0);
        let mut bars_before = 0.0;

        for (i, point) in self.signatures.iter().enumerate() {
            let per_bar = point.signature.beats_per_bar();
            let next = self.signatures.get(i + 1).map(|p| p.beat).unwrap_or(f64::INFINITY);

            if beat < next {
                let into = beat - point.beat;
                let bar = (into / per_bar).floor();
                let in_bar = into - bar * per_bar;
                let whole = in_bar.floor();
                let ticks = ((in_bar - whole) * Bbt::TICKS_PER_BEAT as f64).floor() as u32;

                return Bbt {
                    bar: (bars_before + bar) as u32 + 1,
                    beat: whole as u32 + 1,
                    ticks: ticks.min(Bbt::TICKS_PER_BEAT - 1),
                };
            }
            bars_before += ((next - point.beat) / per_bar).ceil();
        }

        Bbt::new(1, 1, 0)
    }

    pub fn bbt_to_beats(&self, bbt: Bbt) -> f64 {
        let target_bar = bbt.bar.max(1) as f64 - 1.0;
        let in_bar = bbt.beat.max(1) as f64 - 1.0 + bbt.ticks as f64 / Bbt::TICKS_PER_BEAT as f64;
        let mut bars_before = 0.0;

        for (i, point) in self.signatures.iter().enumerate() {
            let per_bar = point.signature.beats_per_bar();
            let bars_here = self
                .signatures
                .get(i + 1)
                .map(|next| ((next.beat - point.beat) / per_bar).ceil())
                .unwrap_or(f64::INFINITY);

            if target_bar < bars_before + bars_here {
                return point.beat + (target_bar - bars_before) * per_bar + in_bar;
            }
            bars_before += bars_here;
        }

        0.0
    }
}

impl Timeline for TempoMap {
    fn beats_to_seconds(&self, beat: f64) -> f64 {
        let mut seconds = 0.0;

        for (i, point) in self.tempos.iter().enumerate() {
            let end = self.tempos.get(i + 1).map(|p| p.beat).unwrap_or(f64::INFINITY);
            if beat < end {
                return seconds + (beat - point.beat) * 60.0 / point.bpm;
            }
            seconds += (end - point.beat) * 60.0 / point.bpm;
        }

        seconds
    }

    fn seconds_to_beats(&self, seconds: f64) -> f64 {
        let mut elapsed = 0.0;

        for (i, point) in self.tempos.iter().enumerate() {
            let segment = match self.tempos.get(i + 1) {
                Some(next) => (next.beat - point.beat) * 60.0 / point.bpm,
                None => f64::INFINITY,
            };

            if seconds < elapsed + segment {
                return point.beat + (seconds - elapsed) * point.bpm / 60.0;
            }
            elapsed += segment;
        }

        self.tempos.last().map(|p| p.beat).unwrap_or(0.0)
    }

    fn tempo_at(&self, beat: f64) -> f64 {
        self.tempos
            .iter()
            .rev()
            .find(|p| p.beat <= beat)
            .or_else(|| self.tempos.first())
            .map(|p| p.bpm)
            .unwrap_or(120.0)
    }
}

fn validate_bpm(bpm: f64) -> Result<()> {
    if !bpm.is_finite() || !(MIN_BPM..=MAX_BPM).contains(&bpm) {
        return Err(Error::InvalidTempo(bpm));
    }
    Ok(())
}

fn validate_beat(beat: f64) -> Result<()> {
    if !beat.is_finite() || beat < 0.0 {
        return Err(Error::InvalidBeat(beat));
    }
    Ok(())
}

fn position_of<T>(points: &[T], beat: f64, key: impl Fn(&T) -> f64) -> Option<usize> {
    points.iter().position(|p| (key(p) - beat).abs() < SAME_BEAT)
}

fn insert_sorted<T>(points: &mut Vec<T>, point: T, key: impl Fn(&T) -> f64) -> Result<()> {
    let beat = key(&point);
    if let Some(i) = position_of(points, beat, &key) {
        points[i] = point;
        return Ok(());
    }
    if points.len() == points.capacity() {
        return Err(Error::TempoMapFull(points.capacity()));
    }

    let at = points.iter().position(|p| key(p) > beat).unwrap_or(points.len());
    points.insert(at, point);
    Ok(())
}

fn remove_at<T>(points: &mut Vec<T>, beat: f64, key: impl Fn(&T) -> f64) -> bool {
    match position_of(points, beat, &key) {
        Some(0) | None => false,
        Some(i) => {
            points.remove(i);
            true
        }
    }
}
