//! Ordered, lock-guarded queue of compressed packets awaiting playback.
//!
//! Producers are the network receive callback and local sound playback; the
//! audio output loop is the single consumer.  Packets come out strictly in
//! arrival order.  The only other mutation is a wholesale [`clear`](DecodeQueue::clear).
//!
//! The lock is held for queue manipulation only, never across a codec call.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// What the output loop should do after polling the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputPoll {
    /// Nothing queued.
    Empty,
    /// The device is listening: the queue was dropped (barge-in).  Carries
    /// the number of packets discarded.
    Cleared(usize),
    /// The oldest packet, removed from the queue.
    Packet(Vec<u8>),
}

#[derive(Debug, Default)]
pub struct DecodeQueue {
    packets: Mutex<VecDeque<Vec<u8>>>,
}

impl DecodeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Vec<u8>>> {
        self.packets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, packet: Vec<u8>) {
        self.lock().push_back(packet);
    }

    /// Append every packet in one critical section so no other producer can
    /// interleave with them.
    pub fn push_all(&self, packets: impl IntoIterator<Item = Vec<u8>>) {
        self.lock().extend(packets);
    }

    /// Poll for the output loop.
    ///
    /// When `listening` is set, any queued audio is stale and is dropped
    /// instead of played.
    pub fn poll_output(&self, listening: bool) -> OutputPoll {
        let mut packets = self.lock();
        if packets.is_empty() {
            return OutputPoll::Empty;
        }
        if listening {
            let dropped = packets.len();
            packets.clear();
            return OutputPoll::Cleared(dropped);
        }
        match packets.pop_front() {
            Some(packet) => OutputPoll::Packet(packet),
            None => OutputPoll::Empty,
        }
    }

    /// Drop everything; returns how many packets were discarded.
    pub fn clear(&self) -> usize {
        let mut packets = self.lock();
        let dropped = packets.len();
        packets.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
