//! Independent replications of the same configuration.
//!
//! Every replication owns its own [`Simulation`]; nothing is shared while a
//! run is in progress. Only finished reports are folded into the common
//! [`BatchSummary`].

use std::fmt;
use std::sync::{Arc, RwLock};

use futures::future::join_all;
use serde::Serialize;
use tracing::{info, info_span};

use crate::config::SimConfig;
use crate::error::Result;
use crate::report::SimulationReport;
use crate::simulation::Simulation;

/// Running mean and variance of one metric across replications.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MetricSummary {
    pub count: u64,
    pub mean: f64,
    m2: f64,
}

impl MetricSummary {
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    /// Sample standard deviation; 0.0 with fewer than two samples.
    pub fn std_dev(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            (self.m2 / (self.count - 1) as f64).sqrt()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub replications: u64,
    pub processed: u64,
    pub rejected: u64,
    pub mean_waiting_time: MetricSummary,
    pub efficiency: MetricSummary,
    pub throughput: MetricSummary,
}

impl BatchSummary {
    pub fn record(&mut self, report: &SimulationReport) {
        self.replications += 1;
        self.processed += report.processed;
        self.rejected += report.rejected;
        self.mean_waiting_time.push(report.mean_waiting_time);
        self.efficiency.push(report.efficiency);
        self.throughput.push(report.throughput);
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Batch results over {} replications:", self.replications)?;
        writeln!(f, "  Processed requests:   {}", self.processed)?;
        writeln!(f, "  Rejected requests:    {}", self.rejected)?;
        writeln!(
            f,
            "  Mean waiting time:    {:.4} s (sd {:.4})",
            self.mean_waiting_time.mean,
            self.mean_waiting_time.std_dev()
        )?;
        writeln!(
            f,
            "  Efficiency:           {:.2}% (sd {:.2})",
            self.efficiency.mean * 100.0,
            self.efficiency.std_dev() * 100.0
        )?;
        write!(
            f,
            "  Throughput:           {:.2} req/s (sd {:.2})",
            self.throughput.mean,
            self.throughput.std_dev()
        )
    }
}

/// Runs `replications` simulations with seeds `base, base + 1, ...` on the
/// blocking pool and aggregates their reports.
///
/// The base seed is taken from `config.seed`, or drawn at random.
pub async fn run_batch(config: SimConfig, replications: u32) -> Result<BatchSummary> {
    config.validate()?;
    let base_seed = config.seed.unwrap_or_else(rand::random);
    let summary = Arc::new(RwLock::new(BatchSummary::default()));

    info!(replications, base_seed, "Starting batch");

    let handles: Vec<_> = (0..replications)
        .map(|run| {
            let config = config.clone().with_seed(base_seed.wrapping_add(u64::from(run)));
            let summary = Arc::clone(&summary);

            tokio::task::spawn_blocking(move || -> Result<()> {
                let span = info_span!("replication", run);
                let _guard = span.enter();

                let report = Simulation::from_config(config)?.run()?;
                if let Ok(mut summary) = summary.write() {
                    summary.record(&report);
                }
                Ok(())
            })
        })
        .collect();

    for outcome in join_all(handles).await {
        outcome??;
    }

    let summary = summary
        .read()
        .map(|summary| summary.clone())
        .unwrap_or_else(|poisoned| poisoned.into_inner().clone());
    info!(
        processed = summary.processed,
        rejected = summary.rejected,
        "Batch finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config(seed: u64) -> SimConfig {
        SimConfig::default()
            .with_max_sim_time(5.0)
            .with_max_requests(200)
            .with_seed(seed)
    }

    #[test]
    fn metric_summary_matches_closed_form() {
        let mut metric = MetricSummary::default();
        for value in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            metric.push(value);
        }
        assert_eq!(metric.count, 8);
        assert!((metric.mean - 5.0).abs() < 1e-12);
        // sample variance 32 / 7
        assert!((metric.std_dev() - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
        assert_eq!(MetricSummary::default().std_dev(), 0.0);
    }

    #[tokio::test]
    async fn aggregates_every_replication() {
        let summary = run_batch(small_config(11), 4).await.unwrap();

        assert_eq!(summary.replications, 4);
        assert_eq!(summary.efficiency.count, 4);
        assert!(summary.processed > 0);
    }

    #[tokio::test]
    async fn seeded_batches_are_reproducible() {
        let a = run_batch(small_config(3), 3).await.unwrap();
        let b = run_batch(small_config(3), 3).await.unwrap();

        assert_eq!(a.processed, b.processed);
        assert_eq!(a.rejected, b.rejected);
        assert!((a.mean_waiting_time.mean - b.mean_waiting_time.mean).abs() < 1e-9);
    }

    #[tokio::test]
    async fn single_replication_matches_direct_run() {
        let config = small_config(99);
        let direct = Simulation::from_config(config.clone()).unwrap().run().unwrap();
        let batch = run_batch(config, 1).await.unwrap();

        assert_eq!(batch.processed, direct.processed);
        assert_eq!(batch.rejected, direct.rejected);
        assert_eq!(batch.efficiency.mean, direct.efficiency);
    }

    #[tokio::test]
    async fn invalid_config_fails_before_spawning() {
        let config = small_config(1).with_queue_capacity(2).with_processing_time(0.0);
        assert!(run_batch(config, 2).await.is_err());
    }
}
