//! Fixed-capacity priority queue with displacement.
//!
//! Waiting requests are keyed by `(priority, insertion sequence)`. The most
//! urgent request is the highest priority with the smallest sequence; the
//! weakest is the lowest priority with the smallest sequence, so the oldest
//! member of the lowest class is the one displaced.

use std::collections::BTreeMap;

use crate::request::{Priority, Request};

/// Result of offering a request to a full or non-full queue.
#[derive(Debug, Clone, PartialEq)]
pub enum AdmitOutcome {
    Admitted,
    /// The request was admitted by evicting this weaker one.
    Displaced(Request),
    /// The request was not admitted and is handed back.
    Rejected(Request),
}

impl AdmitOutcome {
    /// Whether this outcome discarded a request.
    pub fn discards(&self) -> bool {
        !matches!(self, AdmitOutcome::Admitted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Key {
    priority: Priority,
    sequence: u64,
}

#[derive(Debug, Clone)]
pub struct BoundedPriorityQueue {
    entries: BTreeMap<Key, Request>,
    capacity: usize,
    next_sequence: u64,
}

impl BoundedPriorityQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            capacity,
            next_sequence: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Offers `request` to the queue.
    ///
    /// A full queue only makes room for a strictly more urgent request; an
    /// equal-priority newcomer is rejected so earlier arrivals keep their place.
    pub fn admit(&mut self, request: Request) -> AdmitOutcome {
        if !self.is_full() {
            self.insert(request);
            return AdmitOutcome::Admitted;
        }

        let Some(weakest) = self.entries.first_key_value().map(|(key, _)| *key) else {
            // capacity 0
            return AdmitOutcome::Rejected(request);
        };

        if request.priority > weakest.priority {
            let evicted = self.entries.remove(&weakest);
            self.insert(request);
            match evicted {
                Some(evicted) => AdmitOutcome::Displaced(evicted),
                None => AdmitOutcome::Admitted,
            }
        } else {
            AdmitOutcome::Rejected(request)
        }
    }

    /// Removes the most urgent request, earliest-inserted first among equals.
    pub fn pop_highest(&mut self) -> Option<Request> {
        let key = self.highest_key()?;
        self.entries.remove(&key)
    }

    pub fn peek_highest(&self) -> Option<&Request> {
        self.highest_key().and_then(|key| self.entries.get(&key))
    }

    /// Waiting requests in the order they would be served.
    pub fn iter(&self) -> impl Iterator<Item = &Request> {
        let mut keys: Vec<&Key> = self.entries.keys().collect();
        keys.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.sequence.cmp(&b.sequence)));
        keys.into_iter().filter_map(|key| self.entries.get(key))
    }

    fn highest_key(&self) -> Option<Key> {
        let (top, _) = self.entries.last_key_value()?;
        let first_of_class = Key {
            priority: top.priority,
            sequence: 0,
        };
        self.entries
            .range(first_of_class..)
            .next()
            .map(|(key, _)| *key)
    }

    fn insert(&mut self, request: Request) {
        let key = Key {
            priority: request.priority,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;
        self.entries.insert(key, request);
    }
}
