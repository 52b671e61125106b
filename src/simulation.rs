//! The event loop: virtual clock, single server and admission control.
//!
//! Each [`Simulation::step`] handles exactly one arrival:
//!
//! 1. draw a gap and a priority from the arrival source and advance the clock;
//! 2. hand the new request to an idle server, or offer it to the queue;
//! 3. record the queue length;
//! 4. drain every service completion that is due at the new time.
//!
//! The loop stops as soon as the simulated-time budget or the request budget
//! (processed + rejected) is used up.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, trace, warn};

use crate::arrival::{ArrivalSource, HyperExponentialSource};
use crate::clock::SimulationClock;
use crate::config::{BusyTimePolicy, SimConfig};
use crate::error::{Result, SimError};
use crate::events::{EventSink, SystemEvent};
use crate::queue::{AdmitOutcome, BoundedPriorityQueue};
use crate::report::SimulationReport;
use crate::request::{Priority, Request};
use crate::server::ServerState;
use crate::stats::{OccupancySample, StatsAccumulator};

/// Which budget ended the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    TimeBudget,
    RequestBudget,
}

pub struct Simulation<S> {
    config: SimConfig,
    source: S,
    clock: SimulationClock,
    queue: BoundedPriorityQueue,
    server: ServerState,
    stats: StatsAccumulator,
    occupancy: Vec<OccupancySample>,
    generated: u64,
    sink: Option<Box<dyn EventSink + Send>>,
}

impl Simulation<HyperExponentialSource> {
    /// Builds a run driven by the configured hyperexponential arrivals.
    pub fn from_config(config: SimConfig) -> Result<Self> {
        config.validate()?;
        let source = HyperExponentialSource::from_config(
            &config.arrivals,
            config.priorities.clone(),
            config.seed,
        )?;
        Self::new(config, source)
    }
}

impl<S: ArrivalSource> Simulation<S> {
    pub fn new(config: SimConfig, source: S) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            queue: BoundedPriorityQueue::new(config.queue_capacity),
            config,
            source,
            clock: SimulationClock::new(),
            server: ServerState::new(),
            stats: StatsAccumulator::new(),
            occupancy: Vec::new(),
            generated: 0,
            sink: None,
        })
    }

    pub fn with_sink(mut self, sink: impl EventSink + Send + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn queue(&self) -> &BoundedPriorityQueue {
        &self.queue
    }

    pub fn server(&self) -> &ServerState {
        &self.server
    }

    pub fn stats(&self) -> &StatsAccumulator {
        &self.stats
    }

    pub fn occupancy(&self) -> &[OccupancySample] {
        &self.occupancy
    }

    /// Number of requests created so far.
    pub fn generated(&self) -> u64 {
        self.generated
    }

    /// Requests still inside the system: the one in service plus those waiting.
    pub fn in_system(&self) -> u64 {
        u64::from(self.server.is_busy()) + self.queue.len() as u64
    }

    /// The budget that has been exhausted, if any.
    pub fn termination(&self) -> Option<TerminationReason> {
        if self.request_budget_spent() {
            Some(TerminationReason::RequestBudget)
        } else if self.clock.now() >= self.config.max_sim_time {
            Some(TerminationReason::TimeBudget)
        } else {
            None
        }
    }

    pub fn is_finished(&self) -> bool {
        self.termination().is_some()
    }

    /// Handles one arrival. Returns `Ok(false)` once a budget is exhausted.
    ///
    /// On error nothing has been mutated: the source's draw is discarded and
    /// the clock stays where it was.
    pub fn step(&mut self) -> Result<bool> {
        if self.is_finished() {
            return Ok(false);
        }

        let gap = self.source.next_gap().ok_or(SimError::ScriptExhausted)?;
        let priority = self.source.next_priority().ok_or(SimError::ScriptExhausted)?;
        if !self.config.priorities.contains(&priority) {
            return Err(SimError::PriorityOutOfRange {
                priority,
                min: *self.config.priorities.start(),
                max: *self.config.priorities.end(),
            });
        }
        let now = self.clock.advance(gap)?;

        let request = Request::new(self.generated, Priority(priority), now);
        self.generated += 1;
        self.emit(SystemEvent::RequestArrived(request));

        if self.server.is_busy() {
            self.enqueue(request);
        } else {
            self.begin_service(request, false);
        }

        let sample = OccupancySample {
            time: now,
            queue_len: self.queue.len(),
        };
        trace!(time = sample.time, queue_len = sample.queue_len, "occupancy");
        self.occupancy.push(sample);
        self.emit(SystemEvent::OccupancySampled(sample));

        self.drain_completions();
        Ok(true)
    }

    /// Steps until a budget is exhausted and returns the final report.
    pub fn run(&mut self) -> Result<SimulationReport> {
        let span = info_span!("simulation", seed = ?self.config.seed);
        let _guard = span.enter();

        info!(
            capacity = self.config.queue_capacity,
            processing_time = self.config.processing_time,
            max_sim_time = self.config.max_sim_time,
            max_requests = self.config.max_requests,
            "Starting simulation"
        );

        loop {
            match self.step() {
                Ok(true) => {}
                Ok(false) => break,
                Err(err) => {
                    warn!(time = self.clock.now(), error = %err, "Simulation aborted");
                    return Err(err);
                }
            }
        }

        let report = self.report();
        info!(
            processed = report.processed,
            rejected = report.rejected,
            final_time = report.final_time,
            termination = ?report.termination,
            "Simulation finished"
        );
        Ok(report)
    }

    /// Snapshot of the run so far.
    pub fn report(&self) -> SimulationReport {
        SimulationReport::from_simulation(self)
    }

    fn enqueue(&mut self, request: Request) {
        match self.queue.admit(request) {
            AdmitOutcome::Admitted => {
                debug!(id = request.id, priority = %request.priority, "queued");
                self.emit(SystemEvent::RequestQueued {
                    request,
                    queue_len: self.queue.len(),
                });
            }
            AdmitOutcome::Displaced(evicted) => {
                debug!(
                    id = request.id,
                    evicted = evicted.id,
                    priority = %request.priority,
                    evicted_priority = %evicted.priority,
                    "displaced"
                );
                self.stats.record_displaced(&evicted);
                self.emit(SystemEvent::RequestDisplaced {
                    evicted,
                    by: request,
                });
            }
            AdmitOutcome::Rejected(rejected) => {
                debug!(id = rejected.id, priority = %rejected.priority, "rejected");
                self.stats.record_rejected(&rejected);
                self.emit(SystemEvent::RequestRejected(rejected));
            }
        }
    }

    fn begin_service(&mut self, request: Request, from_queue: bool) {
        let now = self.clock.now();
        self.server.start(request, now, self.config.processing_time);

        let charge = match self.config.busy_time_policy {
            BusyTimePolicy::PerServiceEntry => true,
            BusyTimePolicy::Legacy => !from_queue,
        };
        if charge {
            self.stats.charge_busy_time(self.config.processing_time);
        }

        self.emit(SystemEvent::ServiceStarted {
            request,
            completion_time: self.server.completion_time,
        });
    }

    fn drain_completions(&mut self) {
        let now = self.clock.now();

        while self.server.is_due(now) && !self.request_budget_spent() {
            let Some(done) = self.server.finish() else {
                break;
            };
            self.stats.record_processed(&done, now);
            let waiting_time = done.waited_until(now);
            debug!(id = done.id, waiting_time, "processed");
            self.emit(SystemEvent::RequestProcessed {
                request: done,
                time: now,
                waiting_time,
            });

            match self.queue.pop_highest() {
                Some(next) => self.begin_service(next, true),
                None => {
                    if self.config.busy_time_policy == BusyTimePolicy::Legacy {
                        self.stats.charge_busy_time(self.config.processing_time);
                    }
                }
            }
        }
    }

    fn request_budget_spent(&self) -> bool {
        self.stats.settled() >= self.config.max_requests
    }

    fn emit(&mut self, event: SystemEvent) {
        if let Some(sink) = self.sink.as_mut() {
            sink.publish(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use crate::arrival::ScriptedSource;
    use proptest::prelude::*;

    fn config(capacity: usize, processing_time: f64) -> SimConfig {
        SimConfig::default()
            .with_queue_capacity(capacity)
            .with_processing_time(processing_time)
            .with_max_sim_time(f64::INFINITY)
            .with_max_requests(1_000)
            .with_priorities(1..=5)
    }

    fn assert_conserved<S: ArrivalSource>(sim: &Simulation<S>) {
        let stats = sim.stats();
        assert_eq!(
            stats.processed() + stats.rejected() + sim.in_system(),
            sim.generated()
        );
    }

    #[test]
    fn idle_server_takes_arrival_directly() {
        let source = ScriptedSource::at_times([(1.0, 2)]);
        let mut sim = Simulation::new(config(3, 10.0), source).unwrap();

        assert!(sim.step().unwrap());
        assert_eq!(sim.server().in_service.map(|r| r.id), Some(0));
        assert_eq!(sim.server().completion_time, 11.0);
        assert!(sim.queue().is_empty());
        assert_eq!(sim.stats().total_busy_time(), 10.0);
        assert_eq!(
            sim.occupancy(),
            &[OccupancySample {
                time: 1.0,
                queue_len: 0
            }]
        );
    }

    #[test]
    fn completion_pulls_most_urgent_waiting_request() {
        let source = ScriptedSource::at_times([(1.0, 1), (2.0, 2), (3.0, 4), (4.0, 2), (12.0, 1)]);
        let mut sim = Simulation::new(config(5, 10.0), source).unwrap();
        for _ in 0..5 {
            sim.step().unwrap();
        }

        // t=12: request 0 done, request 2 (P4) starts
        assert_eq!(sim.stats().processed(), 1);
        assert_eq!(sim.stats().waiting_times(), &[11.0]);
        assert_eq!(sim.server().in_service.map(|r| r.id), Some(2));
        assert_eq!(sim.server().completion_time, 22.0);
        let waiting: Vec<u64> = sim.queue().iter().map(|r| r.id).collect();
        assert_eq!(waiting, vec![1, 3, 4]);
        assert_conserved(&sim);
    }

    #[test]
    fn late_arrival_drains_one_completion_per_step() {
        // Both requests could have finished long before the third arrives;
        // the drain at t=100 completes the first and restarts the second.
        let source = ScriptedSource::at_times([(1.0, 1), (1.5, 1), (100.0, 1)]);
        let mut sim = Simulation::new(config(5, 1.0), source).unwrap();
        for _ in 0..3 {
            sim.step().unwrap();
        }

        assert_eq!(sim.stats().processed(), 1);
        assert_eq!(sim.stats().waiting_times(), &[99.0]);
        assert_eq!(sim.server().in_service.map(|r| r.id), Some(1));
        assert_eq!(sim.server().completion_time, 101.0);
        assert_eq!(sim.queue().len(), 1);
        assert_conserved(&sim);
    }

    #[test]
    fn legacy_policy_charges_on_idle_transition_only() {
        let script = [(1.0, 1), (2.0, 1), (5.0, 1), (20.0, 1)];
        let legacy = config(5, 2.0).with_busy_time_policy(BusyTimePolicy::Legacy);
        let mut sim = Simulation::new(legacy, ScriptedSource::at_times(script)).unwrap();
        for _ in 0..script.len() {
            sim.step().unwrap();
        }
        // t=1 direct (+2); t=2 queued; t=5 queued, finish 0, dequeue 1;
        // t=20 queued, finish 1, dequeue 2. Dequeues are never charged.
        assert_eq!(sim.stats().total_busy_time(), 2.0);
        assert_eq!(sim.stats().processed(), 2);

        let mut strict = Simulation::new(config(5, 2.0), ScriptedSource::at_times(script)).unwrap();
        for _ in 0..script.len() {
            strict.step().unwrap();
        }
        assert_eq!(strict.stats().total_busy_time(), 6.0);
    }

    #[test]
    fn legacy_policy_charges_when_server_goes_idle() {
        let script = [(1.0, 1), (5.0, 1)];
        let legacy = config(5, 2.0).with_busy_time_policy(BusyTimePolicy::Legacy);
        let mut sim = Simulation::new(legacy, ScriptedSource::at_times(script)).unwrap();
        sim.step().unwrap();
        sim.step().unwrap();

        // t=1 direct (+2); t=5 queued behind finished job, drain finishes 0
        // and dequeues 1. Queue is then empty but the server is busy.
        assert_eq!(sim.stats().total_busy_time(), 2.0);

        let mut idle = Simulation::new(
            config(0, 2.0).with_busy_time_policy(BusyTimePolicy::Legacy),
            ScriptedSource::at_times(script),
        )
        .unwrap();
        idle.step().unwrap();
        idle.step().unwrap();
        // capacity 0: t=5 arrival rejected, drain finishes 0 and goes idle (+2)
        assert_eq!(idle.stats().rejected(), 1);
        assert_eq!(idle.stats().total_busy_time(), 4.0);
        assert!(!idle.server().is_busy());
    }

    #[test]
    fn out_of_range_priority_leaves_state_untouched() {
        let source = ScriptedSource::new([(1.0, 9)]);
        let mut sim = Simulation::new(config(2, 1.0), source).unwrap();

        let err = sim.step().unwrap_err();
        assert!(matches!(
            err,
            SimError::PriorityOutOfRange {
                priority: 9,
                min: 1,
                max: 5
            }
        ));
        assert_eq!(sim.now(), 0.0);
        assert_eq!(sim.generated(), 0);
    }

    #[test]
    fn non_positive_gap_is_a_contract_violation() {
        let source = ScriptedSource::new([(1.0, 1), (0.0, 1)]);
        let mut sim = Simulation::new(config(2, 1.0), source).unwrap();
        sim.step().unwrap();

        assert!(matches!(sim.step(), Err(SimError::InvalidGap { gap }) if gap == 0.0));
        assert_eq!(sim.now(), 1.0);
        assert_eq!(sim.generated(), 1);
    }

    #[test]
    fn invalid_config_never_runs() {
        let source = ScriptedSource::new([(1.0, 1)]);
        let bad = config(2, -1.0);
        assert!(matches!(
            Simulation::new(bad, source),
            Err(SimError::InvalidConfig { .. })
        ));
    }

    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<SystemEvent>>>);

    impl EventSink for SharedSink {
        fn publish(&mut self, event: SystemEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    #[test]
    fn events_mirror_state_changes() {
        let sink = SharedSink::default();
        let source = ScriptedSource::at_times([(1.0, 1), (2.0, 3), (3.0, 3), (11.0, 2)]);
        let mut sim = Simulation::new(config(1, 10.0), source)
            .unwrap()
            .with_sink(sink.clone());
        for _ in 0..4 {
            sim.step().unwrap();
        }

        let events = sink.0.lock().unwrap();
        let kinds: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                SystemEvent::RequestArrived(_) => Some("arrived"),
                SystemEvent::ServiceStarted { .. } => Some("started"),
                SystemEvent::RequestQueued { .. } => Some("queued"),
                SystemEvent::RequestDisplaced { .. } => Some("displaced"),
                SystemEvent::RequestRejected(_) => Some("rejected"),
                SystemEvent::RequestProcessed { .. } => Some("processed"),
                SystemEvent::OccupancySampled(_) => None,
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                "arrived", "started", // 0 into service
                "arrived", "queued", // 1 waits
                "arrived", "rejected", // 2 ties with 1
                "arrived", "rejected", // 3 is weaker than 1
                "processed", "started", // 0 done, 1 starts
            ]
        );
        let samples = events
            .iter()
            .filter(|e| matches!(e, SystemEvent::OccupancySampled(_)))
            .count();
        assert_eq!(samples, 4);
    }

    proptest! {
        #[test]
        fn conservation_holds_at_every_step(
            capacity in 0usize..4,
            processing_time in 0.1f64..5.0,
            arrivals in prop::collection::vec((0.01f64..3.0, 1u8..=5), 1..80),
        ) {
            let steps = arrivals.len();
            let mut sim = Simulation::new(config(capacity, processing_time), ScriptedSource::new(arrivals)).unwrap();
            let mut rejected = 0;
            for _ in 0..steps {
                sim.step().unwrap();
                let stats = sim.stats();
                prop_assert!(stats.rejected() >= rejected);
                rejected = stats.rejected();
                prop_assert!(sim.queue().len() <= capacity);
                prop_assert_eq!(
                    stats.processed() + stats.rejected() + sim.in_system(),
                    sim.generated()
                );
            }
            let times: Vec<f64> = sim.occupancy().iter().map(|s| s.time).collect();
            prop_assert!(times.windows(2).all(|w| w[0] <= w[1]));
        }
    }
}
