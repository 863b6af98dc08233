//! Single-producer, single-consumer command channel.
//!
//! The control side never blocks: commands that do not fit into the ring
//! wait in a control-side backlog and are published on the next push or
//! [`flush`](CommandSender::flush). Batches are published as one ring
//! commit, so the audio thread sees a batch completely or not at all.

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use rtrb::{Consumer, Producer, RingBuffer};
use tracing::warn;

use crate::command::Command;

pub fn command_channel(capacity: usize) -> (CommandSender, CommandReceiver) {
    let (producer, consumer) = RingBuffer::new(capacity);
    (
        CommandSender {
            producer,
            capacity,
            backlog: VecDeque::new(),
            backlog_warned: false,
        },
        CommandReceiver { consumer },
    )
}

/// Control-thread end of the channel.
pub struct CommandSender {
    producer: Producer<Command>,
    capacity: usize,
    backlog: VecDeque<Vec<Command>>,
    backlog_warned: bool,
}

impl CommandSender {
    pub fn push(&mut self, command: Command) {
        self.push_batch(vec![command]);
    }

    /// Queue `commands` to be applied together, in order, within one drain.
    pub fn push_batch(&mut self, commands: Vec<Command>) {
        if commands.is_empty() {
            return;
        }
        self.backlog.push_back(commands);
        self.flush();
    }

    /// Publish as much of the backlog as fits. Returns the number of
    /// commands still waiting.
    pub fn flush(&mut self) -> usize {
        let capacity = self.capacity;

        while let Some(batch) = self.backlog.front_mut() {
            if batch.len() > capacity {
                // can never be atomic; publish it in ring-sized pieces
                let rest = batch.split_off(capacity);
                self.backlog.insert(1, rest);
                warn!(capacity, "command batch larger than the ring; splitting");
                continue;
            }

            let slots = self.producer.slots();
            if slots < batch.len() {
                if !self.backlog_warned {
                    warn!(
                        pending = self.pending(),
                        "command ring full; holding commands until the audio thread catches up"
                    );
                    self.backlog_warned = true;
                }
                return self.pending();
            }

            let Some(batch) = self.backlog.pop_front() else { break };
            let len = batch.len();
            match self.producer.write_chunk_uninit(len) {
                Ok(chunk) => {
                    chunk.fill_from_iter(batch);
                }
                Err(_) => {
                    // slots were checked above and only this side writes
                    self.backlog.push_front(batch);
                    return self.pending();
                }
            }
        }

        self.backlog_warned = false;
        0
    }

    /// Commands in the backlog, not yet visible to the audio thread.
    pub fn pending(&self) -> usize {
        self.backlog.iter().map(Vec::len).sum()
    }

    /// Whether the audio thread has taken everything published.
    pub fn is_drained(&self) -> bool {
        self.backlog.is_empty() && self.producer.slots() == self.capacity
    }
}

/// Audio-thread end of the channel.
pub struct CommandReceiver {
    consumer: Consumer<Command>,
}

impl CommandReceiver {
    /// Apply every command queued at the moment of the call, oldest first.
    ///
    /// Commands published while draining wait for the next call. Never
    /// blocks. Returns how many commands were applied.
    pub fn drain(&mut self, mut apply: impl FnMut(Command)) -> usize {
        let available = self.consumer.slots();
        let consumer = &mut self.consumer;
        let mut applied = 0;

        for command in core::iter::from_fn(|| consumer.pop().ok()).take(available) {
            apply(command);
            applied += 1;
        }
        applied
    }

    pub fn is_empty(&self) -> bool {
        self.consumer.is_empty()
    }
}
