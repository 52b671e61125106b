//! Final results of a run: console summary and JSON export.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::arrival::ArrivalSource;
use crate::config::SimConfig;
use crate::error::Result;
use crate::request::Priority;
use crate::simulation::{Simulation, TerminationReason};
use crate::stats::{OccupancySample, PriorityCounts};

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub generated_at: DateTime<Utc>,
    pub config: SimConfig,
    pub termination: Option<TerminationReason>,
    pub generated: u64,
    pub processed: u64,
    pub rejected: u64,
    pub displaced: u64,
    /// Requests still in service or waiting when the run stopped.
    pub in_system: u64,
    pub mean_waiting_time: f64,
    pub total_busy_time: f64,
    pub efficiency: f64,
    /// Processed requests per virtual second.
    pub throughput: f64,
    pub final_time: f64,
    pub per_priority: BTreeMap<Priority, PriorityCounts>,
    pub waiting_times: Vec<f64>,
    pub occupancy: Vec<OccupancySample>,
}

impl SimulationReport {
    pub(crate) fn from_simulation<S: ArrivalSource>(sim: &Simulation<S>) -> Self {
        let stats = sim.stats();
        let final_time = sim.now();
        let throughput = if final_time > 0.0 {
            stats.processed() as f64 / final_time
        } else {
            0.0
        };

        Self {
            generated_at: Utc::now(),
            config: sim.config().clone(),
            termination: sim.termination(),
            generated: sim.generated(),
            processed: stats.processed(),
            rejected: stats.rejected(),
            displaced: stats.displaced(),
            in_system: sim.in_system(),
            mean_waiting_time: stats.mean_waiting_time(),
            total_busy_time: stats.total_busy_time(),
            efficiency: stats.efficiency(final_time),
            throughput,
            final_time,
            per_priority: stats.per_priority().clone(),
            waiting_times: stats.waiting_times().to_vec(),
            occupancy: sim.occupancy().to_vec(),
        }
    }

    /// Writes the whole report, time series included, as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Simulation results:")?;
        writeln!(f, "  Processed requests:   {}", self.processed)?;
        writeln!(
            f,
            "  Rejected requests:    {} ({} displaced)",
            self.rejected, self.displaced
        )?;
        writeln!(f, "  Mean waiting time:    {:.4} s", self.mean_waiting_time)?;
        writeln!(f, "  Total busy time:      {:.4} s", self.total_busy_time)?;
        writeln!(f, "  Efficiency:           {:.2}%", self.efficiency * 100.0)?;
        writeln!(f, "  Throughput:           {:.2} req/s", self.throughput)?;
        writeln!(f, "  Simulated time:       {:.4} s", self.final_time)?;

        if !self.per_priority.is_empty() {
            writeln!(f, "  Per priority:")?;
            for (priority, counts) in self.per_priority.iter().rev() {
                writeln!(
                    f,
                    "    {priority}: processed {}, rejected {}, displaced {}",
                    counts.processed, counts.rejected, counts.displaced
                )?;
            }
        }

        match self.termination {
            Some(TerminationReason::TimeBudget) => write!(f, "  Stopped on: time budget"),
            Some(TerminationReason::RequestBudget) => write!(f, "  Stopped on: request budget"),
            None => write!(f, "  Stopped on: still running"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrival::ScriptedSource;

    fn finished_run() -> SimulationReport {
        let config = SimConfig::default()
            .with_queue_capacity(1)
            .with_processing_time(2.0)
            .with_max_requests(3);
        let source = ScriptedSource::at_times([(1.0, 1), (2.0, 4), (3.0, 2), (4.0, 3), (5.0, 1)]);
        Simulation::new(config, source).unwrap().run().unwrap()
    }

    #[test]
    fn summary_lists_counters() {
        let report = finished_run();
        // t=1 serve 0; t=2 queue 1 (P4); t=3 reject 2, finish 0, serve 1;
        // t=4 queue 3; t=5 reject 4, budget reached before 1 is drained.
        assert_eq!(report.processed, 1);
        assert_eq!(report.rejected, 2);
        assert_eq!(report.termination, Some(TerminationReason::RequestBudget));

        let text = report.to_string();
        assert!(text.contains("Processed requests:   1"));
        assert!(text.contains("Rejected requests:    2 (0 displaced)"));
        assert!(text.contains("Stopped on: request budget"));
    }

    #[test]
    fn json_export_contains_time_series() {
        let report = finished_run();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        report.write_json(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_reader(File::open(&path).unwrap()).unwrap();
        assert_eq!(value["processed"], 1);
        assert_eq!(value["termination"], "request_budget");
        assert_eq!(value["occupancy"].as_array().unwrap().len(), 5);
        assert_eq!(value["occupancy"][1]["queue_len"], 1);
        assert_eq!(value["config"]["busy_time_policy"], "per-service-entry");
    }
}
