//! Event queue with deterministic ordering.

use queuesim_core::{Event, SimError, SimResult};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::time::Duration;

/// Key for ordering events in the queue.
///
/// Events are ordered by:
/// 1. Time (earlier first)
/// 2. Sequence number (FIFO for same time)
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct EventKey {
    /// When this event should be processed.
    pub time: Duration,
    /// Insertion counter, unique within one queue.
    pub sequence: u64,
}

impl Ord for EventKey {
    fn cmp(&self, other: &Self) -> Ordering {
        // Order by time first
        match self.time.cmp(&other.time) {
            Ordering::Equal => {}
            ord => return ord,
        }

        // Then by sequence (FIFO)
        self.sequence.cmp(&other.sequence)
    }
}

impl PartialOrd for EventKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Time-ordered multiset of pending events.
///
/// Insert and extract are both O(log n). Every insert gets the next sequence
/// number, so events sharing a timestamp come out in the order they went in,
/// and a bulk insert is exactly a series of single inserts.
#[derive(Debug)]
pub struct EventQueue<P> {
    events: BTreeMap<EventKey, P>,
    next_sequence: u64,
}

impl<P> EventQueue<P> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            events: BTreeMap::new(),
            next_sequence: 0,
        }
    }

    /// Add one event. Returns the key it was filed under.
    pub fn insert(&mut self, event: Event<P>) -> EventKey {
        let (time, payload) = event.into_parts();
        let key = EventKey {
            time,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;
        self.events.insert(key, payload);
        key
    }

    /// Add events in iteration order.
    pub fn insert_many<I>(&mut self, events: I)
    where
        I: IntoIterator<Item = Event<P>>,
    {
        for event in events {
            self.insert(event);
        }
    }

    /// Remove and return the earliest event (lowest sequence among ties).
    ///
    /// Fails with [`SimError::EmptyQueue`] when there is nothing queued.
    pub fn pop_min(&mut self) -> SimResult<Event<P>> {
        self.pop_min_keyed().map(|(_, event)| event)
    }

    /// Like [`pop_min`](Self::pop_min), also returning the event's key.
    pub fn pop_min_keyed(&mut self) -> SimResult<(EventKey, Event<P>)> {
        let (key, payload) = self.events.pop_first().ok_or(SimError::EmptyQueue)?;
        Ok((key, Event::new(key.time, payload)))
    }

    /// Key of the earliest event, without removing it.
    pub fn peek_key(&self) -> Option<EventKey> {
        self.events.first_key_value().map(|(key, _)| *key)
    }

    /// Time of the earliest event, without removing it.
    pub fn peek_time(&self) -> Option<Duration> {
        self.peek_key().map(|key| key.time)
    }

    /// Returns `true` if no events are pending.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of pending events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Total events ever inserted into this queue.
    pub fn inserted(&self) -> u64 {
        self.next_sequence
    }

    /// Drain all events in dispatch order. Useful for tests and snapshots.
    pub fn drain_ordered(&mut self) -> Vec<Event<P>> {
        let mut events = Vec::with_capacity(self.events.len());
        while let Ok(event) = self.pop_min() {
            events.push(event);
        }
        events
    }
}

impl<P> Default for EventQueue<P> {
    fn default() -> Self {
        Self::new()
    }
}
