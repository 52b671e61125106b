//! Discrete-event simulation of a single server fed by a bounded priority
//! queue with displacement of lower-priority waiting work.

pub mod arrival;
pub mod batch;
pub mod clock;
pub mod config;
pub mod display;
pub mod error;
pub mod events;
pub mod queue;
pub mod report;
pub mod request;
pub mod server;
pub mod simulation;
pub mod stats;

pub use arrival::{ArrivalSource, HyperExponentialSource, ScriptedSource};
pub use batch::{BatchSummary, run_batch};
pub use config::{ArrivalConfig, BusyTimePolicy, SimConfig};
pub use error::{Result, SimError};
pub use events::{EventSink, SystemEvent};
pub use queue::{AdmitOutcome, BoundedPriorityQueue};
pub use report::SimulationReport;
pub use request::{Priority, Request};
pub use simulation::{Simulation, TerminationReason};
