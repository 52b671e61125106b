//! Simulation configuration.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

/// Parameters of the two-phase hyperexponential inter-arrival distribution.
///
/// With probability `fast_probability` a gap is drawn from `Exp(rate_fast)`,
/// otherwise from `Exp(rate_slow)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArrivalConfig {
    pub rate_fast: f64,
    pub rate_slow: f64,
    pub fast_probability: f64,
}

impl Default for ArrivalConfig {
    fn default() -> Self {
        Self {
            rate_fast: 60.0,
            rate_slow: 120.0,
            fast_probability: 0.7,
        }
    }
}

impl ArrivalConfig {
    pub fn validate(&self) -> Result<()> {
        positive_finite("arrivals.rate_fast", self.rate_fast)?;
        positive_finite("arrivals.rate_slow", self.rate_slow)?;
        if !(0.0..=1.0).contains(&self.fast_probability) {
            return Err(SimError::config(
                "arrivals.fast_probability",
                format!("must lie in [0, 1], got {}", self.fast_probability),
            ));
        }
        Ok(())
    }
}

/// When the server's busy time is charged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum BusyTimePolicy {
    /// One processing time per request entering service, at entry.
    #[default]
    PerServiceEntry,
    /// Charged when an idle server accepts an arrival and again whenever a
    /// drain leaves the server idle; dequeued requests are not charged.
    Legacy,
}

/// Full configuration of one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    pub arrivals: ArrivalConfig,
    /// Fixed service time per request, in virtual seconds.
    pub processing_time: f64,
    /// Maximum number of waiting requests. Zero disables the queue.
    pub queue_capacity: usize,
    /// Simulated-time budget. `f64::INFINITY` leaves it unbounded.
    pub max_sim_time: f64,
    /// Budget on processed + rejected requests.
    pub max_requests: u64,
    pub priorities: RangeInclusive<u8>,
    pub busy_time_policy: BusyTimePolicy,
    pub seed: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            arrivals: ArrivalConfig::default(),
            processing_time: 0.136,
            queue_capacity: 5,
            max_sim_time: 50.0,
            max_requests: 500,
            priorities: 1..=4,
            busy_time_policy: BusyTimePolicy::default(),
            seed: None,
        }
    }
}

impl SimConfig {
    pub fn with_arrivals(mut self, arrivals: ArrivalConfig) -> Self {
        self.arrivals = arrivals;
        self
    }

    pub fn with_processing_time(mut self, processing_time: f64) -> Self {
        self.processing_time = processing_time;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_max_sim_time(mut self, max_sim_time: f64) -> Self {
        self.max_sim_time = max_sim_time;
        self
    }

    pub fn with_max_requests(mut self, max_requests: u64) -> Self {
        self.max_requests = max_requests;
        self
    }

    pub fn with_priorities(mut self, priorities: RangeInclusive<u8>) -> Self {
        self.priorities = priorities;
        self
    }

    pub fn with_busy_time_policy(mut self, policy: BusyTimePolicy) -> Self {
        self.busy_time_policy = policy;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Checks every field, failing on the first one out of range.
    pub fn validate(&self) -> Result<()> {
        self.arrivals.validate()?;
        positive_finite("processing_time", self.processing_time)?;

        if self.max_sim_time.is_nan() || self.max_sim_time <= 0.0 {
            return Err(SimError::config(
                "max_sim_time",
                format!("must be positive, got {}", self.max_sim_time),
            ));
        }
        if self.max_requests == 0 {
            return Err(SimError::config("max_requests", "must be positive"));
        }
        if self.priorities.is_empty() {
            return Err(SimError::config(
                "priorities",
                format!(
                    "range {}..={} is empty",
                    self.priorities.start(),
                    self.priorities.end()
                ),
            ));
        }
        if *self.priorities.start() == 0 {
            return Err(SimError::config("priorities", "lowest priority must be at least 1"));
        }
        Ok(())
    }
}

fn positive_finite(field: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SimError::config(
            field,
            format!("must be positive and finite, got {value}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        SimConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_non_positive_processing_time() {
        let err = SimConfig::default()
            .with_processing_time(0.0)
            .validate()
            .unwrap_err();
        assert!(matches!(
            err,
            SimError::InvalidConfig {
                field: "processing_time",
                ..
            }
        ));
    }

    #[test]
    fn rejects_bad_arrival_parameters() {
        let bad_rate = SimConfig::default().with_arrivals(ArrivalConfig {
            rate_fast: -1.0,
            ..ArrivalConfig::default()
        });
        assert!(bad_rate.validate().is_err());

        let bad_mix = SimConfig::default().with_arrivals(ArrivalConfig {
            fast_probability: 1.5,
            ..ArrivalConfig::default()
        });
        assert!(bad_mix.validate().is_err());
    }

    #[test]
    fn rejects_empty_budgets_and_priority_ranges() {
        assert!(SimConfig::default().with_max_requests(0).validate().is_err());
        assert!(SimConfig::default().with_max_sim_time(0.0).validate().is_err());
        assert!(SimConfig::default().with_max_sim_time(f64::NAN).validate().is_err());
        #[allow(clippy::reversed_empty_ranges)]
        let reversed = SimConfig::default().with_priorities(4..=1);
        assert!(reversed.validate().is_err());
        assert!(SimConfig::default().with_priorities(0..=3).validate().is_err());
    }

    #[test]
    fn zero_capacity_and_unbounded_time_are_allowed() {
        SimConfig::default()
            .with_queue_capacity(0)
            .with_max_sim_time(f64::INFINITY)
            .validate()
            .unwrap();
    }
}
