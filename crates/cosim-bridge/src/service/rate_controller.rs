//! Rate Controller
//!
//! Holds simulated time to at most `rate` times slower than real time.
//! After each accepted step of `dt` simulated units it sleeps for whatever
//! is left of the step's wall-clock budget. An overrun is never made up by
//! running later steps faster.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};

use crate::adapters::clock::SystemClock;
use crate::domain::{sleep_target, step_budget, RateConfig};
use crate::ports::Clock;
use crate::stop::StopSignal;

/// Whether the integration loop should continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pace {
    Continue,
    Stopped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RateReport {
    pub rate: f64,
    pub time_unit: f64,
    pub steps: u64,
    /// Steps whose own work already exceeded the budget.
    pub overruns: u64,
    pub slept_ms: f64,
}

pub struct RateController {
    config: RateConfig,
    clock: Arc<dyn Clock>,
    stop: StopSignal,
    last: Option<Instant>,
    steps: u64,
    overruns: u64,
    slept: Duration,
}

impl RateController {
    /// Pace against the system clock.
    #[must_use]
    pub fn new(config: RateConfig, stop: StopSignal) -> Self {
        Self::with_clock(config, Arc::new(SystemClock), stop)
    }

    #[must_use]
    pub fn with_clock(config: RateConfig, clock: Arc<dyn Clock>, stop: StopSignal) -> Self {
        Self {
            config,
            clock,
            stop,
            last: None,
            steps: 0,
            overruns: 0,
            slept: Duration::ZERO,
        }
    }

    /// Restart wall-clock measurement from now.
    pub fn reset(&mut self) {
        self.last = Some(self.clock.now());
        info!(rate = self.config.rate, time_unit = self.config.time_unit, "Real-time pacing started");
    }

    /// Sleep out the rest of this step's budget.
    pub fn pace(&mut self, dt: f64) -> Pace {
        if self.stop.is_stopped() {
            return Pace::Stopped;
        }
        self.steps += 1;

        let now = self.clock.now();
        let elapsed = self
            .last
            .map(|last| now.saturating_duration_since(last))
            .unwrap_or_default();
        let budget = step_budget(&self.config, dt);
        let target = sleep_target(&self.config, dt, elapsed);

        if !budget.is_zero() && elapsed > budget {
            self.overruns += 1;
            debug!(
                elapsed_us = elapsed.as_micros() as u64,
                budget_us = budget.as_micros() as u64,
                "Step overran its real-time budget"
            );
        }

        if !target.is_zero() {
            if !self.clock.sleep(target, &self.stop) {
                self.last = Some(self.clock.now());
                return Pace::Stopped;
            }
            self.slept = self.slept.saturating_add(target);
        }
        self.last = Some(self.clock.now());
        Pace::Continue
    }

    #[must_use]
    pub fn config(&self) -> &RateConfig {
        &self.config
    }

    #[must_use]
    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    #[must_use]
    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    #[must_use]
    pub fn report(&self) -> RateReport {
        RateReport {
            rate: self.config.rate,
            time_unit: self.config.time_unit,
            steps: self.steps,
            overruns: self.overruns,
            slept_ms: self.slept.as_secs_f64() * 1e3,
        }
    }
}
