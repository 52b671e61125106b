//! Virtual clock for the event loop.
//!
//! Time only moves when an arrival gap is applied. Service completions are
//! resolved against the already-advanced value and never move it.

use crate::error::{Result, SimError};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SimulationClock {
    now: f64,
}

impl SimulationClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> f64 {
        self.now
    }

    /// Moves the clock forward by `gap` and returns the new time.
    ///
    /// Gaps that are zero, negative or not finite are refused and leave the
    /// clock untouched.
    pub fn advance(&mut self, gap: f64) -> Result<f64> {
        if !(gap.is_finite() && gap > 0.0) {
            return Err(SimError::InvalidGap { gap });
        }
        self.now += gap;
        Ok(self.now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advances_by_gap() {
        let mut clock = SimulationClock::new();
        assert_eq!(clock.advance(0.5).unwrap(), 0.5);
        assert_eq!(clock.advance(1.25).unwrap(), 1.75);
        assert_eq!(clock.now(), 1.75);
    }

    #[test]
    fn refuses_gaps_that_break_monotonicity() {
        let mut clock = SimulationClock::new();
        clock.advance(2.0).unwrap();

        for gap in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(clock.advance(gap), Err(SimError::InvalidGap { .. })));
        }
        assert_eq!(clock.now(), 2.0);
    }
}
