//! Read-only view of the audio thread for the control side.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Atomic f64 stored as raw bits.
#[derive(Debug, Default)]
struct AtomicF64 {
    bits: AtomicU64,
}

impl AtomicF64 {
    #[inline]
    fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    #[inline]
    fn set(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Release);
    }
}

#[derive(Debug, Default)]
struct MonitorState {
    beat: AtomicF64,
    playing: AtomicBool,
    blocks: AtomicU64,
    node_faults: AtomicU64,
    stale_commands: AtomicU64,
    dropped_garbage: AtomicU64,
    dropped_events: AtomicU64,
}

/// Counters and transport position published by the audio thread.
///
/// Cloning shares the same state. The audio thread only stores; it never
/// waits on a reader.
#[derive(Debug, Clone, Default)]
pub struct EngineMonitor {
    state: Arc<MonitorState>,
}

impl EngineMonitor {
    pub fn current_beat(&self) -> f64 {
        self.state.beat.get()
    }

    pub fn is_playing(&self) -> bool {
        self.state.playing.load(Ordering::Acquire)
    }

    pub fn blocks_processed(&self) -> u64 {
        self.state.blocks.load(Ordering::Relaxed)
    }

    /// Node-blocks rendered as silence because a plugin failed
    pub fn node_faults(&self) -> u64 {
        self.state.node_faults.load(Ordering::Relaxed)
    }

    /// Commands that named a node, plugin or clip that no longer exists
    pub fn stale_commands(&self) -> u64 {
        self.state.stale_commands.load(Ordering::Relaxed)
    }

    /// Retired objects freed on the audio thread because the disposal ring
    /// was full
    pub fn dropped_garbage(&self) -> u64 {
        self.state.dropped_garbage.load(Ordering::Relaxed)
    }

    /// Note events lost to a full event buffer
    pub fn dropped_events(&self) -> u64 {
        self.state.dropped_events.load(Ordering::Relaxed)
    }

    pub(crate) fn publish_transport(&self, beat: f64, playing: bool) {
        self.state.beat.set(beat);
        self.state.playing.store(playing, Ordering::Release);
    }

    pub(crate) fn publish_counters(&self, blocks: u64, faults: u64, stale: u64, events: u64) {
        self.state.blocks.store(blocks, Ordering::Relaxed);
        self.state.node_faults.store(faults, Ordering::Relaxed);
        self.state.stale_commands.store(stale, Ordering::Relaxed);
        self.state.dropped_events.store(events, Ordering::Relaxed);
    }

    pub(crate) fn count_dropped_garbage(&self) {
        self.state.dropped_garbage.fetch_add(1, Ordering::Relaxed);
    }
}
