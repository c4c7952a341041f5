//! Shared work queue for the crawl engine.
//!
//! [`UniqueQueue`] couples a FIFO of URL strings with a membership map.
//! Presence of a key in the map means a crawler has seen that URL at some
//! point in the queue's lifetime (the URL is not unique anymore); the boolean
//! value records whether the page content should be saved on the next visit.
//! One mutex guards both structures: workers race on `insert`/`remove` and on
//! flag updates for different items, so every operation must hold the lock.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use thiserror::Error;

/// Errors returned by [`UniqueQueue`] operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    /// The queue has no pending items.
    #[error("queue is empty")]
    Empty,

    /// The item was never pushed to the queue.
    #[error("item never pushed to queue")]
    ItemNotFound,
}

#[derive(Default)]
struct QueueInner {
    items: VecDeque<String>,
    seen: HashMap<String, bool>,
}

/// A FIFO queue that enqueues each item at most once per lifetime.
///
/// Keys are expected to be lowercased by the caller; the map is
/// case-sensitive.
#[derive(Default)]
pub struct UniqueQueue {
    inner: Mutex<QueueInner>,
}

impl UniqueQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `item` unless it was ever seen before. Returns true when the
    /// item was enqueued. The save-content flag starts as `false`.
    pub fn insert(&self, item: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.seen.contains_key(item) {
            return false;
        }
        inner.seen.insert(item.to_string(), false);
        inner.items.push_back(item.to_string());
        true
    }

    /// Appends `item` without the seen-before check and resets its flag to
    /// `false`. Used to requeue failed fetches and to bulk-load stored URLs.
    pub fn insert_force(&self, item: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.seen.insert(item.to_string(), false);
        inner.items.push_back(item.to_string());
    }

    /// Pops the head of the queue. Membership is not cleared: a removed item
    /// stays "seen" for the life of the queue.
    pub fn remove(&self) -> Result<String, QueueError> {
        let mut inner = self.inner.lock().unwrap();
        inner.items.pop_front().ok_or(QueueError::Empty)
    }

    /// Returns the save-content flag for `item`.
    pub fn flag(&self, item: &str) -> Result<bool, QueueError> {
        let inner = self.inner.lock().unwrap();
        inner.seen.get(item).copied().ok_or(QueueError::ItemNotFound)
    }

    /// Sets the save-content flag for `item`, inserting the membership entry
    /// when absent.
    pub fn set_flag(&self, item: &str, value: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.seen.insert(item.to_string(), value);
    }

    /// Drops all pending items. Membership survives so that in-flight
    /// discoveries cannot reintroduce work during shutdown.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.items.clear();
    }

    /// Number of pending items.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True iff the queue has never seen `item`.
    pub fn first_encounter(&self, item: &str) -> bool {
        let inner = self.inner.lock().unwrap();
        !inner.seen.contains_key(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_insert_deduplicates() {
        let q = UniqueQueue::new();
        assert!(q.insert("https://h.example/a"));
        assert!(!q.insert("https://h.example/a"));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_remove_fifo_order() {
        let q = UniqueQueue::new();
        q.insert("a");
        q.insert("b");
        q.insert("c");
        assert_eq!(q.remove().unwrap(), "a");
        assert_eq!(q.remove().unwrap(), "b");
        assert_eq!(q.remove().unwrap(), "c");
        assert_eq!(q.remove(), Err(QueueError::Empty));
    }

    #[test]
    fn test_membership_survives_remove() {
        let q = UniqueQueue::new();
        q.insert("a");
        q.remove().unwrap();
        // item was seen already, insert is a no-op
        assert!(!q.insert("a"));
        assert!(q.is_empty());
        assert!(!q.first_encounter("a"));
    }

    #[test]
    fn test_insert_force_requeues_and_resets_flag() {
        let q = UniqueQueue::new();
        q.insert("a");
        q.set_flag("a", true);
        q.remove().unwrap();
        q.insert_force("a");
        assert_eq!(q.len(), 1);
        assert_eq!(q.flag("a"), Ok(false));
    }

    #[test]
    fn test_flag_unknown_item() {
        let q = UniqueQueue::new();
        assert_eq!(q.flag("nope"), Err(QueueError::ItemNotFound));
    }

    #[test]
    fn test_clear_keeps_membership() {
        let q = UniqueQueue::new();
        q.insert("a");
        q.insert("b");
        q.clear();
        assert!(q.is_empty());
        assert!(!q.insert("a"));
        assert!(!q.insert("b"));
    }

    #[test]
    fn test_every_removed_item_was_inserted() {
        let q = UniqueQueue::new();
        let inserted = ["a", "b", "c", "d"];
        for item in inserted {
            q.insert(item);
            q.insert(item);
        }
        let mut removed = Vec::new();
        while let Ok(item) = q.remove() {
            removed.push(item);
        }
        assert_eq!(removed, inserted);
    }

    #[test]
    fn test_concurrent_insert_no_duplicates() {
        let q = Arc::new(UniqueQueue::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let q = Arc::clone(&q);
            handles.push(std::thread::spawn(move || {
                let mut wins = 0usize;
                for i in 0..100 {
                    if q.insert(&format!("url-{i}")) {
                        wins += 1;
                    }
                }
                wins
            }));
        }
        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        // each of the 100 items was enqueued exactly once across all threads
        assert_eq!(total, 100);
        assert_eq!(q.len(), 100);
    }
}
