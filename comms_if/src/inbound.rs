//! # Inbound message buffering
//!
//! Messages arriving from the broker are pushed by the network thread into a bounded
//! [`InboundQueue`] and drained by the consumer's cycle. When the queue is full the oldest entry is
//! dropped, so the network thread never waits on the consumer and the newest message is always
//! kept.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
};

use chrono::{DateTime, Utc};
use log::warn;
use serde::Serialize;

use crate::{
    codec::{self, Envelope},
    tm::{self, Classification, Summary},
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Default number of entries held by an inbound queue.
pub const DEFAULT_CAPACITY: usize = 200;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A message received from the broker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InboundEntry {
    /// Topic the message arrived on.
    pub topic: String,

    /// The message as text, invalid UTF-8 sequences are replaced.
    pub raw_text: String,

    /// The decoded envelope, or `None` if the message couldn't be decoded.
    pub decoded: Option<Envelope>,

    /// Time the message arrived.
    pub received_at: DateTime<Utc>,
}

/// Fixed capacity buffer which drops its oldest item to make room for a new one.
#[derive(Debug)]
pub struct RingBuffer<T> {
    max: usize,
    buf: VecDeque<T>,
}

/// Shared handle to a bounded queue of inbound entries.
///
/// Cloning the handle gives another handle to the same queue.
#[derive(Debug, Clone)]
pub struct InboundQueue {
    inner: Arc<Mutex<RingBuffer<InboundEntry>>>,
}

/// The result of draining an [`InboundQueue`].
#[derive(Debug, Default)]
pub struct Drained {
    /// The most recent entry of each classification seen in this drain.
    pub latest: HashMap<Classification, InboundEntry>,

    /// Every drained entry, in arrival order.
    pub entries: Vec<InboundEntry>,
}

/// The freshest known state of the inbound stream, accumulated across drains.
#[derive(Debug, Default)]
pub struct LatestState {
    by_class: HashMap<Classification, InboundEntry>,

    last: Option<(InboundEntry, Summary)>,

    num_received: u64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl InboundEntry {
    /// Build an entry from a frame received on the given topic.
    ///
    /// Decode failures are logged and give an entry with no decoded envelope, they are never
    /// returned as errors.
    pub fn from_frame(topic: &str, bytes: &[u8]) -> Self {
        let decoded = match codec::decode(bytes) {
            Ok(e) => Some(e),
            Err(e) => {
                warn!("Could not decode message on {}: {}", topic, e);
                None
            }
        };

        Self {
            topic: topic.to_string(),
            raw_text: String::from_utf8_lossy(bytes).into_owned(),
            decoded,
            received_at: Utc::now(),
        }
    }

    /// Classification of the entry. Entries which couldn't be decoded are `Other`.
    pub fn classification(&self) -> Classification {
        match self.decoded {
            Some(ref e) => tm::classify(e),
            None => Classification::Other,
        }
    }

    /// Short digest of the entry.
    pub fn summary(&self) -> Summary {
        match self.decoded {
            Some(ref e) => Summary::of(e),
            None => Summary::invalid(&self.raw_text),
        }
    }
}

impl<T> RingBuffer<T> {
    /// Create a new buffer. A capacity of zero is raised to one.
    pub fn new(max: usize) -> Self {
        let max = max.max(1);
        Self {
            max,
            buf: VecDeque::with_capacity(max),
        }
    }

    /// Push an item, returning the evicted item if the buffer was full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.buf.len() == self.max {
            self.buf.pop_front()
        } else {
            None
        };
        self.buf.push_back(item);

        evicted
    }

    /// Remove and return every item, oldest first.
    pub fn drain(&mut self) -> Vec<T> {
        self.buf.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max
    }

    /// Iterate over the items, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.buf.iter()
    }
}

impl InboundQueue {
    /// Create a new queue which holds at most `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RingBuffer::new(capacity))),
        }
    }

    /// Push an entry, evicting the oldest one if the queue is full.
    ///
    /// Returns `true` if an entry was evicted.
    pub fn push(&self, entry: InboundEntry) -> bool {
        self.lock().push(entry).is_some()
    }

    /// Decode a frame and push it.
    pub fn push_frame(&self, topic: &str, bytes: &[u8]) -> bool {
        self.push(InboundEntry::from_frame(topic, bytes))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    /// Remove every queued entry and fold them into the latest entry per classification.
    ///
    /// Undecodable entries are drained but never become the latest of a classification.
    ///
    /// The queue is only locked while the entries are taken out, classification happens after
    /// the producer has been released.
    pub fn drain_and_snapshot(&self) -> Drained {
        let entries = self.lock().drain();

        let mut latest = HashMap::new();
        for entry in entries.iter().filter(|e| e.decoded.is_some()) {
            latest.insert(entry.classification(), entry.clone());
        }

        Drained { latest, entries }
    }

    fn lock(&self) -> MutexGuard<'_, RingBuffer<InboundEntry>> {
        // Entries are pushed and taken whole, so a poisoned buffer is still consistent
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for InboundQueue {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl Drained {
    /// Iterate over the drained entries of the given classification, in arrival order.
    pub fn of_class(&self, class: Classification) -> impl Iterator<Item = &InboundEntry> {
        self.entries
            .iter()
            .filter(move |e| e.classification() == class)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl LatestState {
    /// Fold a drain into the state.
    pub fn update(&mut self, drained: &Drained) {
        for (class, entry) in drained.latest.iter() {
            self.by_class.insert(*class, entry.clone());
        }

        if let Some(entry) = drained.entries.last() {
            self.last = Some((entry.clone(), entry.summary()));
        }

        self.num_received += drained.entries.len() as u64;
    }

    /// Latest entry of the given classification.
    pub fn latest(&self, class: Classification) -> Option<&InboundEntry> {
        self.by_class.get(&class)
    }

    /// Latest entry of any classification, including undecodable ones.
    pub fn last(&self) -> Option<&InboundEntry> {
        self.last.as_ref().map(|(e, _)| e)
    }

    /// Summary of the latest entry.
    pub fn last_summary(&self) -> Option<&Summary> {
        self.last.as_ref().map(|(_, s)| s)
    }

    /// Total number of entries folded into this state.
    pub fn num_received(&self) -> u64 {
        self.num_received
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    const SAMPLE: &[u8] =
        br#"{"eventType":"science","payload":{"number":3,"mass":12.5,"gasses":[1,2],"lights":[0]}}"#;

    fn telemetry(a: i32) -> Vec<u8> {
        format!(
            r#"{{"eventType":"science","payload":{{"FbDrillA":{},"FbDrillB":0,"FbElevatorA":0,"FbElevatorB":0}}}}"#,
            a
        )
        .into_bytes()
    }

    #[test]
    fn test_ring_buffer_overwrite() {
        let mut rb = RingBuffer::new(3);
        assert_eq!(rb.push(1), None);
        assert_eq!(rb.push(2), None);
        assert_eq!(rb.push(3), None);
        assert_eq!(rb.push(4), Some(1));

        assert_eq!(rb.len(), 3);
        assert_eq!(rb.drain(), vec![2, 3, 4]);
        assert!(rb.is_empty());
    }

    #[test]
    fn test_queue_overwrite_oldest() {
        let queue = InboundQueue::with_capacity(200);

        for i in 0..201 {
            queue.push_frame("t", &telemetry(i));
        }

        assert_eq!(queue.len(), 200);

        let drained = queue.drain_and_snapshot();
        assert_eq!(drained.entries.len(), 200);

        let first = drained.entries.first().unwrap().decoded.as_ref().unwrap();
        let last = drained.entries.last().unwrap().decoded.as_ref().unwrap();
        assert_eq!(first.payload["FbDrillA"], 1);
        assert_eq!(last.payload["FbDrillA"], 200);

        assert!(queue.is_empty());
    }

    #[test]
    fn test_zero_capacity() {
        let queue = InboundQueue::with_capacity(0);
        queue.push_frame("t", SAMPLE);
        queue.push_frame("t", SAMPLE);
        assert_eq!(queue.capacity(), 1);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_sample_kept_in_history() {
        let queue = InboundQueue::default();
        queue.push_frame("orion/topic/science/outbound", SAMPLE);
        queue.push_frame("orion/topic/science/outbound", &telemetry(1));
        queue.push_frame("orion/topic/science/outbound", &telemetry(2));

        let drained = queue.drain_and_snapshot();

        let samples: Vec<_> = drained.of_class(Classification::Sample).collect();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].raw_text.as_bytes(), SAMPLE);

        // Only the newest telemetry is kept as latest
        let latest = drained.latest[&Classification::Telemetry]
            .decoded
            .as_ref()
            .unwrap();
        assert_eq!(latest.payload["FbDrillA"], 2);
    }

    #[test]
    fn test_malformed_still_queued() {
        let queue = InboundQueue::default();
        queue.push_frame("t", b"{not json");

        assert_eq!(queue.len(), 1);

        let drained = queue.drain_and_snapshot();
        let entry = &drained.entries[0];
        assert_eq!(entry.decoded, None);
        assert_eq!(entry.raw_text, "{not json");
        assert_eq!(entry.classification(), Classification::Other);
        assert_eq!(
            entry.summary(),
            Summary::InvalidJson {
                raw: "{not json".into()
            }
        );
    }

    #[test]
    fn test_latest_state() {
        let queue = InboundQueue::default();
        let mut state = LatestState::default();

        queue.push_frame("t", &telemetry(1));
        queue.push_frame("t", SAMPLE);
        state.update(&queue.drain_and_snapshot());

        queue.push_frame("t", &telemetry(5));
        queue.push_frame("t", b"garbage");
        state.update(&queue.drain_and_snapshot());

        let tm = state.latest(Classification::Telemetry).unwrap();
        assert_eq!(tm.decoded.as_ref().unwrap().payload["FbDrillA"], 5);
        assert!(state.latest(Classification::Sample).is_some());

        // The garbage message is the last one seen, and doesn't hide the last good telemetry
        assert_eq!(state.last().unwrap().decoded, None);
        assert_eq!(state.num_received(), 4);

        // An empty drain changes nothing
        state.update(&queue.drain_and_snapshot());
        assert_eq!(state.num_received(), 4);
        assert_eq!(state.last().unwrap().raw_text, "garbage");
    }

    #[test]
    fn test_malformed_not_latest() {
        let queue = InboundQueue::default();
        let mut state = LatestState::default();

        queue.push_frame("t", br#"{"eventType":"status","payload":{}}"#);
        state.update(&queue.drain_and_snapshot());
        let status = state.latest(Classification::Other).unwrap().raw_text.clone();

        queue.push_frame("t", b"{not json");
        let drained = queue.drain_and_snapshot();
        assert!(drained.latest.is_empty());
        assert_eq!(drained.of_class(Classification::Other).count(), 1);
        state.update(&drained);

        // The last good message of the class survives, the garbage is still the last seen
        assert_eq!(state.latest(Classification::Other).unwrap().raw_text, status);
        assert_eq!(
            state.last_summary(),
            Some(&Summary::InvalidJson {
                raw: "{not json".into()
            })
        );
    }
}
