use std::fmt;

use serde::{Deserialize, Serialize};

/// Urgency of a request. Higher values are more urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(pub u8);

impl Priority {
    pub fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// A unit of work moving through the system.
///
/// Requests are immutable once created and are owned by exactly one holder at
/// a time: the queue, the server slot, or the statistics that consumed them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub priority: Priority,
    pub arrival_time: f64,
}

impl Request {
    pub fn new(id: u64, priority: Priority, arrival_time: f64) -> Self {
        Self {
            id,
            priority,
            arrival_time,
        }
    }

    pub fn get_name(&self) -> String {
        format!("{} #{}", self.priority, self.id)
    }

    /// Virtual time elapsed since arrival, as seen at `now`.
    pub fn waited_until(&self, now: f64) -> f64 {
        now - self.arrival_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priorities_order_by_urgency() {
        assert!(Priority(4) > Priority(1));
        assert_eq!(Priority(3).to_string(), "P3");
    }

    #[test]
    fn waited_time_is_measured_from_arrival() {
        let request = Request::new(7, Priority(2), 1.5);
        assert_eq!(request.waited_until(4.0), 2.5);
        assert_eq!(request.get_name(), "P2 #7");
    }
}
