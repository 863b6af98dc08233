//! MIDI clips, note events and sample-accurate note scheduling.

use alloc::vec::Vec;

use crate::node::{ClipId, NoteId};
use crate::timeline::Timeline;
use crate::transport::TransportContext;

/// A note inside a clip. Positions are in beats relative to the clip start.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Note {
    pub id: NoteId,
    pub pitch: u8,
    pub velocity: u8,
    pub start: f64,
    pub duration: f64,
}

impl Note {
    pub fn new(id: NoteId, pitch: u8, velocity: u8, start: f64, duration: f64) -> Self {
        Self {
            id,
            pitch,
            velocity,
            start,
            duration,
        }
    }

    #[inline]
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// A region of notes placed on an instrument track.
///
/// Notes starting at or beyond the clip's length are never played, and
/// sounding notes are cut at the clip end.
#[derive(Clone, Debug, PartialEq)]
pub struct MidiClip {
    pub id: ClipId,
    pub start: f64,
    pub duration: f64,
    notes: Vec<Note>,
}

impl MidiClip {
    pub fn new(id: ClipId, start: f64, duration: f64) -> Self {
        Self {
            id,
            start,
            duration,
            notes: Vec::new(),
        }
    }

    pub fn with_notes(mut self, notes: Vec<Note>) -> Self {
        self.notes = notes;
        self
    }

    #[inline]
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn note(&self, id: NoteId) -> Option<&Note> {
        self.notes.iter().find(|n| n.id == id)
    }

    /// Swap in a new note list, returning the old one.
    pub fn replace_notes(&mut self, notes: Vec<Note>) -> Vec<Note> {
        core::mem::replace(&mut self.notes, notes)
    }

    #[inline]
    fn overlaps(&self, start: f64, end: f64) -> bool {
        self.start < end && self.end() > start
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoteEventKind {
    On,
    Off,
}

/// A note-on or note-off at a sample offset inside the current block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NoteEvent {
    pub offset: u32,
    pub kind: NoteEventKind,
    pub pitch: u8,
    pub velocity: u8,
}

impl NoteEvent {
    pub fn on(offset: u32, pitch: u8, velocity: u8) -> Self {
        Self { offset, kind: NoteEventKind::On, pitch, velocity }
    }

    pub fn off(offset: u32, pitch: u8) -> Self {
        Self { offset, kind: NoteEventKind::Off, pitch, velocity: 0 }
    }
}

/// Fixed-capacity list of note events for one block.
///
/// Pushing past capacity drops the event and counts it instead of growing.
#[derive(Clone, Debug, Default)]
pub struct EventBuffer {
    events: Vec<NoteEvent>,
    dropped: u64,
}

impl EventBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
            dropped: 0,
        }
    }

    #[inline]
    pub fn push(&mut self, event: NoteEvent) -> bool {
        if self.events.len() == self.events.capacity() {
            self.dropped += 1;
            return false;
        }
        self.events.push(event);
        true
    }

    pub fn extend_from(&mut self, other: &EventBuffer) {
        for &event in &other.events {
            self.push(event);
        }
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn as_slice(&self) -> &[NoteEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events lost to a full buffer since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Stable sort by offset. Insertion sort: no scratch allocation, and
    /// the lists are short and mostly ordered already.
    pub fn sort_by_offset(&mut self) {
        for i in 1..self.events.len() {
            let mut j = i;
            while j > 0 && self.events[j - 1].offset > self.events[j].offset {
                self.events.swap(j - 1, j);
                j -= 1;
            }
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct ActiveNote {
    clip: ClipId,
    note: NoteId,
    pitch: u8,
    end: f64,
    released: bool,
}

/// Turns clip content into note events for each block.
///
/// A note-on fires in the block whose beat window contains the note's
/// absolute start, and its note-off in the block containing its end.
/// Windows are half-open and consecutive blocks share their boundary, so
/// every event fires exactly once.
#[derive(Clone, Debug, Default)]
pub struct NoteScheduler {
    active: Vec<ActiveNote>,
    dropped: u64,
}

struct BlockClock<'a> {
    timeline: &'a dyn Timeline,
    start_seconds: f64,
    sample_rate: f64,
    last_offset: u32,
}

impl BlockClock<'_> {
    fn offset(&self, beat: f64) -> u32 {
        let seconds = self.timeline.beats_to_seconds(beat) - self.start_seconds;
        let samples = (seconds * self.sample_rate).round();
        if samples <= 0.0 {
            0
        } else {
            (samples as u32).min(self.last_offset)
        }
    }
}

impl NoteScheduler {
    pub fn with_capacity(max_active_notes: usize) -> Self {
        Self {
            active: Vec::with_capacity(max_active_notes),
            dropped: 0,
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Notes skipped because too many were already sounding.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn is_active(&self, clip: ClipId, note: NoteId) -> bool {
        self.active.iter().any(|a| a.clip == clip && a.note == note)
    }

    /// Append this block's note events for `clips` to `events`.
    pub fn schedule<'c>(
        &mut self,
        ctx: &TransportContext,
        timeline: &dyn Timeline,
        clips: impl IntoIterator<Item = &'c MidiClip>,
        events: &mut EventBuffer,
    ) {
        let clock = BlockClock {
            timeline,
            start_seconds: timeline.beats_to_seconds(ctx.block_start_beat),
            sample_rate: ctx.sample_rate as f64,
            last_offset: ctx.block_size.saturating_sub(1) as u32,
        };
        let (start, end) = (ctx.block_start_beat, ctx.block_end_beat);
        let window_open = ctx.playing && end > start;

        // notes that were already sounding: pending releases and natural ends
        self.active.retain(|note| {
            if note.released {
                events.push(NoteEvent::off(0, note.pitch));
                false
            } else if window_open && note.end < end {
                events.push(NoteEvent::off(clock.offset(note.end), note.pitch));
                false
            } else {
                true
            }
        });

        if !window_open {
            return;
        }

        let first_new = self.active.len();
        for clip in clips.into_iter().filter(|c| c.overlaps(start, end)) {
            for note in clip.notes() {
                if note.start >= clip.duration || note.start < 0.0 {
                    continue;
                }
                let at = clip.start + note.start;
                if !(start <= at && at < end) || self.is_active(clip.id, note.id) {
                    continue;
                }
                if self.active.len() == self.active.capacity() {
                    self.dropped += 1;
                    continue;
                }

                events.push(NoteEvent::on(clock.offset(at), note.pitch, note.velocity));
                self.active.push(ActiveNote {
                    clip: clip.id,
                    note: note.id,
                    pitch: note.pitch,
                    end: (at + note.duration).min(clip.end()),
                    released: false,
                });
            }
        }

        // notes short enough to end in the block they started in
        let mut i = first_new;
        while i < self.active.len() {
            let note = self.active[i];
            if note.end < end {
                events.push(NoteEvent::off(clock.offset(note.end), note.pitch));
                self.active.remove(i);
            } else {
                i += 1;
            }
        }
    }

    /// Stop every sounding note at the start of the block.
    pub fn release_all(&mut self, events: &mut EventBuffer) {
        for note in self.active.drain(..) {
            events.push(NoteEvent::off(0, note.pitch));
        }
    }

    /// Queue note-offs for every sounding note of `clip`.
    pub fn release_clip(&mut self, clip: ClipId) {
        self.active
            .iter_mut()
            .filter(|a| a.clip == clip)
            .for_each(|a| a.released = true);
    }

    /// Queue note-offs for sounding notes that `clip` no longer contains.
    pub fn release_missing(&mut self, clip: &MidiClip) {
        for active in self.active.iter_mut().filter(|a| a.clip == clip.id) {
            if clip.note(active.note).is_none() {
                active.released = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::{TempoMap, TimeSignature};
    use crate::transport::Transport;

    // 120 BPM at 48 kHz: one beat = 24000 samples
    fn tempo() -> TempoMap {
        TempoMap::new(120.0, TimeSignature::default(), 4).unwrap()
    }

    fn clip(notes: &[(u64, u8, f64, f64)]) -> MidiClip {
        let notes = notes
            .iter()
            .map(|&(id, pitch, start, dur)| Note::new(NoteId(id), pitch, 100, start, dur))
            .collect();
        MidiClip::new(ClipId(1), 0.0, 16.0).with_notes(notes)
    }

    fn run_blocks(
        clips: &[MidiClip],
        blocks: usize,
        block_size: usize,
    ) -> Vec<(usize, NoteEvent)> {
        let tm = tempo();
        let mut transport = Transport::default();
        transport.play();
        let mut scheduler = NoteScheduler::with_capacity(16);
        let mut all = Vec::new();

        for block in 0..blocks {
            let ctx = transport.context(&tm, 48_000, block_size);
            let mut events = EventBuffer::with_capacity(64);
            scheduler.schedule(&ctx, &tm, clips, &mut events);
            all.extend(events.as_slice().iter().map(|&e| (block, e)));
            transport.advance(&ctx);
        }
        all
    }

    #[test]
    fn test_note_on_at_exact_offset() {
        // beat 0.5 = sample 12000 = block 23 (of 512), offset 224
        let events = run_blocks(&[clip(&[(1, 60, 0.5, 0.25)])], 40, 512);
        assert_eq!(events[0], (23, NoteEvent::on(224, 60, 100)));
        // end at beat 0.75 = sample 18000 = block 35, offset 80
        assert_eq!(events[1], (35, NoteEvent::off(80, 60)));
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_note_on_block_boundary_fires_once() {
        // beat 1.0 = sample 24000; with 480-sample blocks that is block 50, offset 0
        let events = run_blocks(&[clip(&[(1, 64, 1.0, 1.0)])], 120, 480);
        let ons: Vec<_> = events.iter().filter(|(_, e)| e.kind == NoteEventKind::On).collect();
        let offs: Vec<_> = events.iter().filter(|(_, e)| e.kind == NoteEventKind::Off).collect();
        assert_eq!(ons.len(), 1);
        assert_eq!(offs.len(), 1);
        assert_eq!(*ons[0], (50, NoteEvent::on(0, 64, 100)));
        assert_eq!(*offs[0], (100, NoteEvent::off(0, 64)));
    }

    #[test]
    fn test_short_note_starts_and_ends_in_one_block() {
        let events = run_blocks(&[clip(&[(1, 60, 0.0, 0.01)])], 2, 512);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], (0, NoteEvent::on(0, 60, 100)));
        assert_eq!(events[1], (0, NoteEvent::off(240, 60)));
    }

    #[test]
    fn test_retrigger_orders_off_before_on() {
        // same pitch back to back at beat 1.0
        let events = run_blocks(&[clip(&[(1, 60, 0.0, 1.0), (2, 60, 1.0, 1.0)])], 48, 512);
        let at_boundary: Vec<_> = events.iter().filter(|(b, _)| *b == 46).map(|(_, e)| *e).collect();
        assert_eq!(at_boundary, vec![NoteEvent::off(448, 60), NoteEvent::on(448, 60, 100)]);
    }

    #[test]
    fn test_notes_outside_clip_are_culled_and_cut() {
        let clip = MidiClip::new(ClipId(1), 0.0, 1.0).with_notes(vec![
            Note::new(NoteId(1), 60, 100, 0.5, 4.0),
            Note::new(NoteId(2), 62, 100, 1.5, 0.5),
        ]);
        let events = run_blocks(&[clip], 200, 512);
        assert_eq!(events.len(), 2);
        // cut at the clip end, beat 1.0 = sample 24000 = block 46, offset 448
        assert_eq!(events[1], (46, NoteEvent::off(448, 60)));
    }

    #[test]
    fn test_release_missing_and_release_all() {
        let tm = tempo();
        let mut transport = Transport::default();
        transport.play();
        let mut scheduler = NoteScheduler::with_capacity(4);
        let mut c = clip(&[(1, 60, 0.0, 8.0), (2, 67, 0.0, 8.0)]);

        let mut events = EventBuffer::with_capacity(8);
        let ctx = transport.context(&tm, 48_000, 512);
        scheduler.schedule(&ctx, &tm, core::slice::from_ref(&c), &mut events);
        assert_eq!(scheduler.active_count(), 2);
        transport.advance(&ctx);

        let remaining = vec![c.notes()[1]];
        c.replace_notes(remaining);
        scheduler.release_missing(&c);

        events.clear();
        let ctx = transport.context(&tm, 48_000, 512);
        scheduler.schedule(&ctx, &tm, core::slice::from_ref(&c), &mut events);
        assert_eq!(events.as_slice(), &[NoteEvent::off(0, 60)]);
        assert_eq!(scheduler.active_count(), 1);

        events.clear();
        scheduler.release_all(&mut events);
        assert_eq!(events.as_slice(), &[NoteEvent::off(0, 67)]);
        assert_eq!(scheduler.active_count(), 0);
    }

    #[test]
    fn test_active_capacity_is_respected() {
        let notes: Vec<_> = (0..8).map(|i| (i, 60 + i as u8, 0.0, 1.0)).collect();
        let tm = tempo();
        let mut transport = Transport::default();
        transport.play();
        let mut scheduler = NoteScheduler::with_capacity(3);
        let mut events = EventBuffer::with_capacity(16);

        let ctx = transport.context(&tm, 48_000, 512);
        scheduler.schedule(&ctx, &tm, &[clip(&notes)], &mut events);
        assert_eq!(scheduler.active_count(), 3);
        assert_eq!(scheduler.dropped(), 5);
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn test_event_buffer_drops_when_full() {
        let mut events = EventBuffer::with_capacity(2);
        assert!(events.push(NoteEvent::on(5, 1, 1)));
        assert!(events.push(NoteEvent::on(1, 2, 1)));
        assert!(!events.push(NoteEvent::on(0, 3, 1)));
        assert_eq!(events.dropped(), 1);

        events.sort_by_offset();
        assert_eq!(events.as_slice()[0].offset, 1);
    }
}
