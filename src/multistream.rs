//! K-way merge of per-file event streams into a single ascending
//! `event_id` sequence.
//!
//! A run is split across several subrun files that each contain a disjoint,
//! already-sorted slice of events; this merges them back together the way a
//! k-way external merge sort would, using a binary heap keyed on the next
//! unread `event_id` of each open file.
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::errors::ReaderError;
use crate::raw::{RawCameraConfig, RawEvent, RawEventSource};

/// One entry in the merge heap: the next event pulled from a given input,
/// plus enough bookkeeping to pull the one after it and to break ties
/// deterministically.
#[derive(Debug)]
struct Head<T: RawEventSource> {
    event: RawEvent,
    input_index: usize,
    source: T,
}

impl<T: RawEventSource> PartialEq for Head<T> {
    fn eq(&self, other: &Self) -> bool {
        self.event.event_id == other.event.event_id && self.input_index == other.input_index
    }
}
impl<T: RawEventSource> Eq for Head<T> {}

impl<T: RawEventSource> PartialOrd for Head<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: RawEventSource> Ord for Head<T> {
    /// Reversed so `BinaryHeap`, which is a max-heap, pops the smallest
    /// `event_id` first; ties go to the input that was opened earliest,
    /// keeping the merge stable across repeated runs.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .event.event_id
            .cmp(&self.event.event_id)
            .then_with(|| other.input_index.cmp(&self.input_index))
    }
}

/// Merges multiple raw event sources into one ascending-`event_id` stream.
///
/// Exactly one [`RawCameraConfig`] must be found across all inputs combined
/// (usually duplicated in every subrun file); if none is found or inputs
/// disagree about it, construction fails.
#[derive(Debug)]
pub struct MultiStream<T: RawEventSource> {
    heap: BinaryHeap<Head<T>>,
    camera_config: RawCameraConfig,
    len: usize,
    closed: bool,
}

impl<T: RawEventSource> MultiStream<T> {
    /// Opens every input, validates that they agree on a single camera
    /// configuration, and primes the merge heap with each input's first
    /// event.
    pub fn new(mut sources: Vec<T>) -> Result<Self, ReaderError> {
        if sources.is_empty() {
            return Err(ReaderError::NoInputs);
        }

        let mut camera_config: Option<RawCameraConfig> = None;
        for source in &mut sources {
            if let Some(config) = source.camera_config() {
                match &camera_config {
                    None => camera_config = Some(config),
                    Some(first) if first.configuration_id != config.configuration_id => {
                        return Err(ReaderError::ConfigMismatch {
                            first: first.configuration_id,
                            other: config.configuration_id,
                        });
                    }
                    Some(_) => {}
                }
            }
        }
        let camera_config = camera_config.ok_or(ReaderError::NoConfig)?;

        let len = sources.iter().map(|s| s.len()).sum();

        let mut heap = BinaryHeap::with_capacity(sources.len());
        for (input_index, mut source) in sources.into_iter().enumerate() {
            if let Some(event) = source.next_event() {
                heap.push(Head { event, input_index, source });
            }
        }

        Ok(MultiStream { heap, camera_config, len, closed: false })
    }

    /// The single camera configuration shared by all inputs.
    pub fn camera_config(&self) -> &RawCameraConfig {
        &self.camera_config
    }

    /// Total number of events across all inputs (including ones already
    /// consumed).
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Pulls the next event in ascending `event_id` order, or `None` once
    /// every input is exhausted.
    pub fn next(&mut self) -> Option<RawEvent> {
        if self.closed {
            return None;
        }
        let Head { event, input_index, mut source } = self.heap.pop()?;
        if let Some(next_event) = source.next_event() {
            self.heap.push(Head { event: next_event, input_index, source });
        }
        Some(event)
    }

    /// Rewinds every input back to its first event and rebuilds the merge
    /// heap, so the stream can be replayed from the start.
    pub fn rewind(&mut self) {
        let mut sources: Vec<(usize, T)> = std::mem::take(&mut self.heap)
            .into_vec()
            .into_iter()
            .map(|head| (head.input_index, head.source))
            .collect();
        sources.sort_by_key(|(input_index, _)| *input_index);

        let mut heap = BinaryHeap::with_capacity(sources.len());
        for (input_index, mut source) in sources {
            source.rewind();
            if let Some(event) = source.next_event() {
                heap.push(Head { event, input_index, source });
            }
        }
        self.heap = heap;
        self.closed = false;
    }

    /// Stops yielding further events without dropping the open file
    /// handles.
    pub fn close(&mut self) {
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Clone, Debug)]
    struct FakeSource {
        config: Option<RawCameraConfig>,
        events: VecDeque<RawEvent>,
        original: Vec<RawEvent>,
    }

    impl FakeSource {
        fn new(config_id: u64, ids: &[u64]) -> Self {
            let events: Vec<_> = ids
                .iter()
                .map(|&id| RawEvent { event_id: id, ..RawEvent::empty() })
                .collect();
            FakeSource {
                config: Some(RawCameraConfig { configuration_id: config_id, ..RawCameraConfig::empty() }),
                events: events.clone().into(),
                original: events,
            }
        }
    }

    impl RawEventSource for FakeSource {
        fn camera_config(&mut self) -> Option<RawCameraConfig> {
            self.config.take()
        }
        fn next_event(&mut self) -> Option<RawEvent> {
            self.events.pop_front()
        }
        fn rewind(&mut self) {
            self.events = self.original.clone().into();
        }
        fn len(&self) -> usize {
            self.original.len()
        }
    }

    #[test]
    fn merges_in_ascending_event_id_order() {
        let a = FakeSource::new(1, &[1, 4, 7]);
        let b = FakeSource::new(1, &[2, 3, 8]);
        let mut merged = MultiStream::new(vec![a, b]).unwrap();

        let mut ids = Vec::new();
        while let Some(event) = merged.next() {
            ids.push(event.event_id);
        }
        assert_eq!(ids, vec![1, 2, 3, 4, 7, 8]);
    }

    #[test]
    fn rejects_config_mismatch() {
        let a = FakeSource::new(1, &[1]);
        let b = FakeSource::new(2, &[2]);
        let err = MultiStream::new(vec![a, b]).unwrap_err();
        assert!(matches!(err, ReaderError::ConfigMismatch { .. }));
    }

    #[test]
    fn rejects_no_config() {
        let mut a = FakeSource::new(1, &[1]);
        a.config = None;
        let err = MultiStream::new(vec![a]).unwrap_err();
        assert!(matches!(err, ReaderError::NoConfig));
    }

    #[test]
    fn len_sums_all_inputs() {
        let a = FakeSource::new(1, &[1, 4]);
        let b = FakeSource::new(1, &[2, 3, 8]);
        let merged = MultiStream::new(vec![a, b]).unwrap();
        assert_eq!(merged.len(), 5);
    }

    #[test]
    fn rewind_replays_from_start() {
        let a = FakeSource::new(1, &[1, 2]);
        let mut merged = MultiStream::new(vec![a]).unwrap();
        assert_eq!(merged.next().unwrap().event_id, 1);
        merged.rewind();
        assert_eq!(merged.next().unwrap().event_id, 1);
        assert_eq!(merged.next().unwrap().event_id, 2);
    }

    #[test]
    fn close_stops_the_stream() {
        let a = FakeSource::new(1, &[1, 2]);
        let mut merged = MultiStream::new(vec![a]).unwrap();
        merged.close();
        assert!(merged.next().is_none());
    }
}
