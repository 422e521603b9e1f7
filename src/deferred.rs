//! Bounded priority queue of buffered encrypted records, ordered by
//! `(epoch, seq)`.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::header::RecordHeader;

/// Hard DoS ceiling: an attacker able to inject plausible future-epoch
/// records must not exhaust memory.
pub const MAX_QUEUE_LEN: usize = 100;

/// `priority = (epoch << 48) | seq`.
pub fn priority(epoch: u16, seq: u64) -> u64 {
    ((epoch as u64) << 48) | (seq & 0x0000_ffff_ffff_ffff)
}

#[derive(Debug, Clone)]
pub struct DeferredRecord {
    pub header: RecordHeader,
    pub raw: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct DeferredRecordQueue {
    // Reverse so BinaryHeap (a max-heap) pops the smallest priority.
    heap: BinaryHeap<Reverse<(u64, usize)>>,
    items: Vec<Option<DeferredRecord>>,
    seen_priorities: std::collections::HashSet<u64>,
}

impl DeferredRecordQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.seen_priorities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert a record at the given priority. Rejects if the queue is
    /// already at `MAX_QUEUE_LEN`. Duplicate priorities are silently
    /// dropped rather than erroring, since a duplicate
    /// insert is exactly the kind of input a malicious or confused
    /// sender can trigger.
    ///
    /// Returns `true` if the record was inserted.
    pub fn insert(&mut self, prio: u64, record: DeferredRecord) -> bool {
        if self.seen_priorities.contains(&prio) {
            return false;
        }
        if self.len() >= MAX_QUEUE_LEN {
            return false;
        }
        let idx = self.items.len();
        self.items.push(Some(record));
        self.heap.push(Reverse((prio, idx)));
        self.seen_priorities.insert(prio);
        true
    }

    /// Remove and return the smallest-priority item, or `None`.
    pub fn pop_min(&mut self) -> Option<DeferredRecord> {
        while let Some(Reverse((prio, idx))) = self.heap.pop() {
            if let Some(record) = self.items[idx].take() {
                self.seen_priorities.remove(&prio);
                return Some(record);
            }
        }
        None
    }

    /// Drain all items, smallest priority first, into `sink`.
    pub fn drain_to(&mut self, mut sink: impl FnMut(DeferredRecord)) {
        while let Some(record) = self.pop_min() {
            sink(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentType;
    use crate::header::ProtocolVersion;
    use proptest::prelude::*;

    fn record(epoch: u16, seq: u64) -> DeferredRecord {
        DeferredRecord {
            header: RecordHeader {
                content_type: ContentType::Handshake,
                version: ProtocolVersion::DTLS1_2,
                epoch,
                sequence_number: seq,
                length: 0,
            },
            raw: vec![epoch as u8, seq as u8],
        }
    }

    #[test]
    fn pops_in_priority_order() {
        let mut q = DeferredRecordQueue::new();
        q.insert(priority(4, 5), record(4, 5));
        q.insert(priority(4, 1), record(4, 1));
        q.insert(priority(3, 9), record(3, 9));

        assert_eq!(q.pop_min().unwrap().header.sequence_number, 9);
        assert_eq!(q.pop_min().unwrap().header.sequence_number, 1);
        assert_eq!(q.pop_min().unwrap().header.sequence_number, 5);
        assert!(q.pop_min().is_none());
    }

    #[test]
    fn duplicate_priority_is_dropped_silently() {
        let mut q = DeferredRecordQueue::new();
        assert!(q.insert(priority(1, 1), record(1, 1)));
        assert!(!q.insert(priority(1, 1), record(1, 1)));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn rejects_past_cap() {
        let mut q = DeferredRecordQueue::new();
        for i in 0..MAX_QUEUE_LEN {
            assert!(q.insert(priority(0, i as u64), record(0, i as u64)));
        }
        assert!(!q.insert(priority(0, MAX_QUEUE_LEN as u64), record(0, MAX_QUEUE_LEN as u64)));
        assert_eq!(q.len(), MAX_QUEUE_LEN);
    }

    #[test]
    fn drain_to_yields_non_decreasing_priority_order() {
        let mut q = DeferredRecordQueue::new();
        let priorities = [priority(1, 3), priority(1, 1), priority(2, 0), priority(0, 100)];
        for p in priorities {
            q.insert(p, record((p >> 48) as u16, p & 0x0000_ffff_ffff_ffff));
        }
        let mut drained = vec![];
        q.drain_to(|r| drained.push(priority(r.header.epoch, r.header.sequence_number)));
        let mut sorted = priorities.to_vec();
        sorted.sort_unstable();
        assert_eq!(drained, sorted);
        assert!(q.is_empty());
    }

    proptest! {
        // P6: no sequence of inserts ever exceeds MAX_QUEUE_LEN.
        #[test]
        fn p6_deferred_queue_bound(
            ops in proptest::collection::vec((0u16..8, 0u64..64), 0..500),
        ) {
            let mut q = DeferredRecordQueue::new();
            for (epoch, seq) in ops {
                q.insert(priority(epoch, seq), record(epoch, seq));
                prop_assert!(q.len() <= MAX_QUEUE_LEN);
            }
        }

        // P7: draining k <= 100 buffered records yields exactly k
        // packets in non-decreasing (epoch, seq) order.
        #[test]
        fn p7_epoch_migration_drain_order(
            items in proptest::collection::hash_set((0u16..4, 0u64..64), 0..100),
        ) {
            let mut q = DeferredRecordQueue::new();
            let k = items.len();
            for (epoch, seq) in &items {
                q.insert(priority(*epoch, *seq), record(*epoch, *seq));
            }
            prop_assert_eq!(q.len(), k);
            let mut drained = vec![];
            q.drain_to(|r| drained.push(priority(r.header.epoch, r.header.sequence_number)));
            prop_assert_eq!(drained.len(), k);
            let mut sorted = drained.clone();
            sorted.sort_unstable();
            prop_assert_eq!(drained, sorted);
        }
    }
}
