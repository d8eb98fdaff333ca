//! Timing arithmetic shared by the sampling ports and the rate controller.
//!
//! Pure functions of simulation time and measured wall time; the clock
//! itself lives behind [`crate::ports::Clock`].

use std::time::Duration;

use crate::domain::config::RateConfig;

/// Relative tolerance when comparing simulation time to a boundary.
///
/// Integrators accumulate `t += dt`, so `200 * 0.025` may land a hair
/// below `5.0`.
const BOUNDARY_TOLERANCE: f64 = 1e-9;

/// Periodic schedule in simulation time: boundaries at `origin + k * period`.
///
/// Boundaries are recomputed from the origin rather than accumulated, so
/// they do not drift over long runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cadence {
    period: f64,
    origin: f64,
    ticks: u64,
}

impl Cadence {
    #[must_use]
    pub fn new(period: f64, origin: f64) -> Self {
        Self {
            period,
            origin,
            ticks: 0,
        }
    }

    #[must_use]
    pub fn period(&self) -> f64 {
        self.period
    }

    /// Next boundary strictly after the last one consumed.
    #[must_use]
    pub fn next_boundary(&self) -> f64 {
        self.origin + (self.ticks + 1) as f64 * self.period
    }

    #[must_use]
    pub fn is_due(&self, t: f64) -> bool {
        t >= self.next_boundary() - self.period * BOUNDARY_TOLERANCE
    }

    /// Consume every boundary up to and including `t`.
    ///
    /// A step that skips several boundaries consumes them all at once, so a
    /// slow integrator never produces a burst of catch-up ticks.
    pub fn consume(&mut self, t: f64) {
        let elapsed = ((t - self.origin) / self.period + BOUNDARY_TOLERANCE).floor();
        let reached = if elapsed.is_finite() && elapsed > 0.0 {
            elapsed as u64
        } else {
            0
        };
        self.ticks = reached.max(self.ticks + 1);
    }
}

/// Wall-clock time one step of `dt` simulated units should occupy.
///
/// Saturates at [`Duration::MAX`] when the product does not fit.
#[must_use]
pub fn step_budget(config: &RateConfig, dt: f64) -> Duration {
    let secs = dt * config.rate * config.time_unit;
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// Remaining sleep after `elapsed` wall time was already spent, clamped at zero.
#[must_use]
pub fn sleep_target(config: &RateConfig, dt: f64, elapsed: Duration) -> Duration {
    step_budget(config, dt).saturating_sub(elapsed)
}
