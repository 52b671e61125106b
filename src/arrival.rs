//! Arrival processes feeding the event loop.
//!
//! An [`ArrivalSource`] yields, for every arrival, the gap since the previous
//! arrival and the priority of the new request. The event loop owns the clock
//! and stamps arrival times itself, so sources never see simulated time.

use std::collections::VecDeque;
use std::ops::RangeInclusive;

use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, Exp};

use crate::config::ArrivalConfig;
use crate::error::{Result, SimError};

/// Producer of arrival events.
///
/// `None` means the source is exhausted. Stochastic sources never return it.
pub trait ArrivalSource {
    /// Gap to the next arrival, in virtual seconds. Must be strictly positive.
    fn next_gap(&mut self) -> Option<f64>;

    /// Priority of the arrival whose gap was just drawn.
    fn next_priority(&mut self) -> Option<u8>;
}

impl<S: ArrivalSource + ?Sized> ArrivalSource for Box<S> {
    fn next_gap(&mut self) -> Option<f64> {
        (**self).next_gap()
    }

    fn next_priority(&mut self) -> Option<u8> {
        (**self).next_priority()
    }
}

/// Hyperexponential inter-arrival gaps with uniformly distributed priorities.
pub struct HyperExponentialSource<R: Rng = StdRng> {
    fast: Exp<f64>,
    slow: Exp<f64>,
    fast_probability: f64,
    priorities: RangeInclusive<u8>,
    rng: R,
}

impl HyperExponentialSource<StdRng> {
    /// Seeded when `seed` is given, otherwise seeded from the OS.
    pub fn from_config(
        config: &ArrivalConfig,
        priorities: RangeInclusive<u8>,
        seed: Option<u64>,
    ) -> Result<Self> {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self::with_rng(config, priorities, rng)
    }
}

impl<R: Rng> HyperExponentialSource<R> {
    pub fn with_rng(
        config: &ArrivalConfig,
        priorities: RangeInclusive<u8>,
        rng: R,
    ) -> Result<Self> {
        config.validate()?;
        if priorities.is_empty() {
            return Err(SimError::config("priorities", "range is empty"));
        }

        let fast = Exp::new(config.rate_fast)
            .map_err(|e| SimError::config("arrivals.rate_fast", e.to_string()))?;
        let slow = Exp::new(config.rate_slow)
            .map_err(|e| SimError::config("arrivals.rate_slow", e.to_string()))?;

        Ok(Self {
            fast,
            slow,
            fast_probability: config.fast_probability,
            priorities,
            rng,
        })
    }
}

impl<R: Rng> ArrivalSource for HyperExponentialSource<R> {
    fn next_gap(&mut self) -> Option<f64> {
        let phase = if self.rng.random_bool(self.fast_probability) {
            &self.fast
        } else {
            &self.slow
        };
        Some(phase.sample(&mut self.rng))
    }

    fn next_priority(&mut self) -> Option<u8> {
        Some(self.rng.random_range(self.priorities.clone()))
    }
}

/// A fixed, finite list of `(gap, priority)` arrivals.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    arrivals: VecDeque<(f64, u8)>,
    pending_priority: Option<u8>,
}

impl ScriptedSource {
    pub fn new(arrivals: impl IntoIterator<Item = (f64, u8)>) -> Self {
        Self {
            arrivals: arrivals.into_iter().collect(),
            pending_priority: None,
        }
    }

    /// Builds a script from absolute arrival times, which must be increasing.
    pub fn at_times(arrivals: impl IntoIterator<Item = (f64, u8)>) -> Self {
        let mut previous = 0.0;
        Self::new(arrivals.into_iter().map(|(time, priority)| {
            let gap = time - previous;
            previous = time;
            (gap, priority)
        }))
    }

    pub fn remaining(&self) -> usize {
        self.arrivals.len()
    }
}

impl ArrivalSource for ScriptedSource {
    fn next_gap(&mut self) -> Option<f64> {
        let (gap, priority) = self.arrivals.pop_front()?;
        self.pending_priority = Some(priority);
        Some(gap)
    }

    fn next_priority(&mut self) -> Option<u8> {
        self.pending_priority.take()
    }
}
