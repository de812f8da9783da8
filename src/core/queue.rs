//! Ready queue ordered by next run time, ties broken by task sequence number.
//!
//! Backed by a `BTreeMap` rather than a heap so a cancelled task can be removed by
//! key in O(log n). The queue itself is not synchronized; it lives inside the
//! executor's queue state mutex.

use std::collections::BTreeMap;
use std::time::Duration;

use super::task::TaskId;

/// Position of a task in the ready queue.
///
/// Field order gives the derived ordering: run time first, then sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct QueueKey {
    pub at: Duration,
    pub seq: TaskId,
}

impl QueueKey {
    pub(crate) const fn new(at: Duration, seq: TaskId) -> Self {
        Self { at, seq }
    }
}

/// Pending entries ordered by [`QueueKey`].
pub(crate) struct ReadyQueue<E> {
    entries: BTreeMap<QueueKey, E>,
}

impl<E> ReadyQueue<E> {
    pub(crate) const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Insert an entry. Returns `true` if it became the earliest entry.
    pub(crate) fn insert(&mut self, key: QueueKey, entry: E) -> bool {
        let previous = self.entries.insert(key, entry);
        debug_assert!(previous.is_none(), "task {} queued twice", key.seq);
        self.peek_key() == Some(key)
    }

    /// Remove an entry if present.
    pub(crate) fn remove(&mut self, key: &QueueKey) -> Option<E> {
        self.entries.remove(key)
    }

    /// Key of the earliest entry.
    pub(crate) fn peek_key(&self) -> Option<QueueKey> {
        self.entries.first_key_value().map(|(key, _)| *key)
    }

    /// Pop the earliest entry if it is due at `now`.
    pub(crate) fn pop_due(&mut self, now: Duration) -> Option<E> {
        match self.peek_key() {
            Some(key) if key.at <= now => self.entries.pop_first().map(|(_, entry)| entry),
            _ => None,
        }
    }

    /// Remove and return every entry matching `pred`, in queue order.
    pub(crate) fn remove_where<F>(&mut self, mut pred: F) -> Vec<E>
    where
        F: FnMut(&E) -> bool,
        E: Clone,
    {
        let mut removed = Vec::new();
        self.entries.retain(|_, entry| {
            if pred(entry) {
                removed.push(entry.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    /// Remove and return every entry, in queue order.
    pub(crate) fn drain(&mut self) -> Vec<E> {
        std::mem::take(&mut self.entries).into_values().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_orders_by_time_then_sequence() {
        let mut q = ReadyQueue::new();
        q.insert(QueueKey::new(ms(300), 1), "late");
        q.insert(QueueKey::new(ms(100), 3), "early-b");
        q.insert(QueueKey::new(ms(100), 2), "early-a");
        q.insert(QueueKey::new(ms(200), 0), "middle");

        assert_eq!(q.pop_due(ms(1000)), Some("early-a"));
        assert_eq!(q.pop_due(ms(1000)), Some("early-b"));
        assert_eq!(q.pop_due(ms(1000)), Some("middle"));
        assert_eq!(q.pop_due(ms(1000)), Some("late"));
        assert!(q.is_empty());
    }

    #[test]
    fn test_insert_reports_new_head() {
        let mut q = ReadyQueue::new();
        assert!(q.insert(QueueKey::new(ms(100), 1), 'a'));
        assert!(!q.insert(QueueKey::new(ms(150), 2), 'b'));
        assert!(q.insert(QueueKey::new(ms(50), 3), 'c'));
        assert_eq!(q.peek_key(), Some(QueueKey::new(ms(50), 3)));
    }

    #[test]
    fn test_pop_due_respects_now() {
        let mut q = ReadyQueue::new();
        q.insert(QueueKey::new(ms(100), 1), 1);

        assert_eq!(q.pop_due(ms(99)), None);
        assert_eq!(q.len(), 1);
        assert_eq!(q.pop_due(ms(100)), Some(1));
    }

    #[test]
    fn test_remove_by_key() {
        let mut q = ReadyQueue::new();
        q.insert(QueueKey::new(ms(100), 1), "a");
        q.insert(QueueKey::new(ms(200), 2), "b");

        assert_eq!(q.remove(&QueueKey::new(ms(100), 1)), Some("a"));
        assert_eq!(q.remove(&QueueKey::new(ms(100), 1)), None);
        assert_eq!(q.peek_key(), Some(QueueKey::new(ms(200), 2)));
    }

    #[test]
    fn test_remove_where_and_drain() {
        let mut q = ReadyQueue::new();
        for seq in 0..6u64 {
            q.insert(QueueKey::new(ms(seq * 10), seq), seq);
        }

        let odd = q.remove_where(|v| v % 2 == 1);
        assert_eq!(odd, vec![1, 3, 5]);
        assert_eq!(q.len(), 3);
        assert_eq!(q.drain(), vec![0, 2, 4]);
        assert!(q.is_empty());
    }
}
