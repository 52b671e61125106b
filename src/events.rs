//! Events published by the event loop for observers such as the terminal UI.

use tokio::sync::mpsc;

use crate::request::Request;
use crate::stats::OccupancySample;

#[derive(Debug, Clone, PartialEq)]
pub enum SystemEvent {
    RequestArrived(Request),
    ServiceStarted {
        request: Request,
        completion_time: f64,
    },
    RequestQueued {
        request: Request,
        queue_len: usize,
    },
    RequestDisplaced {
        evicted: Request,
        by: Request,
    },
    RequestRejected(Request),
    RequestProcessed {
        request: Request,
        time: f64,
        waiting_time: f64,
    },
    OccupancySampled(OccupancySample),
}

/// Receiver of [`SystemEvent`]s. Sinks observe; they cannot steer the run.
pub trait EventSink {
    fn publish(&mut self, event: SystemEvent);
}

impl EventSink for Vec<SystemEvent> {
    fn publish(&mut self, event: SystemEvent) {
        self.push(event);
    }
}

/// Forwards events over a bounded channel, blocking while it is full.
///
/// Must be driven from a blocking context such as `spawn_blocking`. Once the
/// receiver is gone, events are dropped.
impl EventSink for mpsc::Sender<SystemEvent> {
    fn publish(&mut self, event: SystemEvent) {
        if self.is_closed() {
            return;
        }
        let _ = self.blocking_send(event);
    }
}
