//! Counters fed by the event loop. Purely observational.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::request::{Priority, Request};

/// Queue length observed right after an arrival was handled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OccupancySample {
    pub time: f64,
    pub queue_len: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityCounts {
    pub processed: u64,
    /// Includes displaced requests.
    pub rejected: u64,
    pub displaced: u64,
}

#[derive(Debug, Clone, Default)]
pub struct StatsAccumulator {
    processed: u64,
    rejected: u64,
    displaced: u64,
    total_busy_time: f64,
    waiting_times: Vec<f64>,
    per_priority: BTreeMap<Priority, PriorityCounts>,
}

impl StatsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_processed(&mut self, request: &Request, now: f64) {
        self.processed += 1;
        self.waiting_times.push(request.waited_until(now));
        self.per_priority.entry(request.priority).or_default().processed += 1;
    }

    pub(crate) fn record_rejected(&mut self, request: &Request) {
        self.rejected += 1;
        self.per_priority.entry(request.priority).or_default().rejected += 1;
    }

    pub(crate) fn record_displaced(&mut self, request: &Request) {
        self.record_rejected(request);
        self.displaced += 1;
        self.per_priority.entry(request.priority).or_default().displaced += 1;
    }

    pub(crate) fn charge_busy_time(&mut self, amount: f64) {
        self.total_busy_time += amount;
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    pub fn displaced(&self) -> u64 {
        self.displaced
    }

    /// Processed plus rejected: the quantity bounded by `max_requests`.
    pub fn settled(&self) -> u64 {
        self.processed + self.rejected
    }

    pub fn total_busy_time(&self) -> f64 {
        self.total_busy_time
    }

    pub fn waiting_times(&self) -> &[f64] {
        &self.waiting_times
    }

    pub fn per_priority(&self) -> &BTreeMap<Priority, PriorityCounts> {
        &self.per_priority
    }

    /// Mean waiting time, 0.0 when nothing has been processed.
    pub fn mean_waiting_time(&self) -> f64 {
        if self.waiting_times.is_empty() {
            0.0
        } else {
            self.waiting_times.iter().sum::<f64>() / self.waiting_times.len() as f64
        }
    }

    /// Busy time over elapsed time, 0.0 at time zero.
    pub fn efficiency(&self, now: f64) -> f64 {
        if now > 0.0 {
            self.total_busy_time / now
        } else {
            0.0
        }
    }
}
