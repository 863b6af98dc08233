//! Hand-back of retired audio-thread objects for disposal on the control
//! thread.

use alloc::boxed::Box;
use alloc::vec::Vec;

use rtrb::{Consumer, Producer, RingBuffer};
use tracing::{debug, warn};

use crate::automation::AutomationLane;
use crate::buffer::DelayLine;
use crate::midi::{MidiClip, Note};
use crate::monitor::EngineMonitor;
use crate::plugin::Plugin;
use crate::render::RenderNode;

/// Something the audio thread no longer needs.
pub enum Garbage {
    Node(Box<RenderNode>),
    Plugin(Box<dyn Plugin>),
    Delay(Box<DelayLine>),
    Clip(Box<MidiClip>),
    Notes(Vec<Note>),
    Automation(Box<AutomationLane>),
}

pub fn garbage_channel(capacity: usize, monitor: EngineMonitor) -> (GarbageSender, GarbageCollector) {
    let (producer, consumer) = RingBuffer::new(capacity);
    (
        GarbageSender {
            producer,
            monitor: monitor.clone(),
        },
        GarbageCollector {
            consumer,
            monitor,
            dropped_seen: 0,
        },
    )
}

/// Audio-thread end: never blocks.
pub struct GarbageSender {
    producer: Producer<Garbage>,
    monitor: EngineMonitor,
}

impl GarbageSender {
    /// Hand `item` to the control thread. If the ring is full the item is
    /// freed right here and counted.
    pub fn dispose(&mut self, item: Garbage) {
        if let Err(rtrb::PushError::Full(item)) = self.producer.push(item) {
            drop(item);
            self.monitor.count_dropped_garbage();
        }
    }
}

/// Control-thread end.
pub struct GarbageCollector {
    consumer: Consumer<Garbage>,
    monitor: EngineMonitor,
    dropped_seen: u64,
}

impl GarbageCollector {
    /// Free everything the audio thread has handed back. Returns the number
    /// of objects freed.
    pub fn collect(&mut self) -> usize {
        let consumer = &mut self.consumer;
        let freed = core::iter::from_fn(|| consumer.pop().ok()).count();

        let dropped = self.monitor.dropped_garbage();
        if dropped > self.dropped_seen {
            warn!(
                count = dropped - self.dropped_seen,
                "disposal ring was full; objects were freed on the audio thread"
            );
            self.dropped_seen = dropped;
        }
        if freed > 0 {
            debug!(freed, "collected retired audio objects");
        }
        freed
    }
}
