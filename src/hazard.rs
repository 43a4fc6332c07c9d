//! Time-dependent hazards and the conversion between an exponential "budget" and real time.
//!
//! An event driven by a hazard h(t) fires once the integrated hazard since it was scheduled
//! reaches a unit-exponential draw `u`. `time_interval` solves that integral for the real time
//! interval; `cumulative_hazard` measures how much of the budget elapsed over an interval, which
//! is what the scheduler carries forward when an event's hazard changes.
use crate::error::SimError;

/// Coefficients below this magnitude are treated as a time-independent hazard
const NEGLIGIBLE_SLOPE: f64 = 1e-12;

pub trait HazardFunction {
    /// The hazard at absolute time `t`
    fn evaluate(&self, t: f64) -> f64;

    /// The integral of the hazard over `[t0, t0 + dt]`
    fn cumulative_hazard(&self, t0: f64, dt: f64) -> f64;

    /// The `dt` at which `cumulative_hazard(t0, dt) == u`, or `None` if the hazard never
    /// accumulates that much
    fn time_interval(&self, t0: f64, u: f64) -> Option<f64>;
}

/// h(t) = exp(A + B·t)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExponentialHazard {
    a: f64,
    b: f64,
}

impl ExponentialHazard {
    /// # Errors
    ///
    /// Returns `SimError::HazardError` if either coefficient is NaN or infinite.
    pub fn new(a: f64, b: f64) -> Result<Self, SimError> {
        if !a.is_finite() || !b.is_finite() {
            return Err(SimError::HazardError(format!(
                "Hazard coefficients must be finite, got A={a}, B={b}"
            )));
        }
        Ok(Self { a, b })
    }

    #[must_use]
    pub fn a(&self) -> f64 {
        self.a
    }

    #[must_use]
    pub fn b(&self) -> f64 {
        self.b
    }
}

impl HazardFunction for ExponentialHazard {
    fn evaluate(&self, t: f64) -> f64 {
        (self.a + self.b * t).exp()
    }

    fn cumulative_hazard(&self, t0: f64, dt: f64) -> f64 {
        let h0 = self.evaluate(t0);
        if self.b.abs() < NEGLIGIBLE_SLOPE {
            h0 * dt
        } else {
            h0 * (self.b * dt).exp_m1() / self.b
        }
    }

    fn time_interval(&self, t0: f64, u: f64) -> Option<f64> {
        let h0 = self.evaluate(t0);
        if self.b.abs() < NEGLIGIBLE_SLOPE {
            let dt = u / h0;
            return dt.is_finite().then_some(dt);
        }
        let x = self.b * u / h0;
        // With a decreasing hazard the total remaining integral is h0/|B|
        if x <= -1.0 {
            return None;
        }
        let dt = x.ln_1p() / self.b;
        dt.is_finite().then_some(dt)
    }
}

/// A hazard whose event is forced to happen no later than `t_max`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeLimitedHazardFunction {
    hazard: ExponentialHazard,
    t_max: f64,
}

impl TimeLimitedHazardFunction {
    /// # Errors
    ///
    /// Returns `SimError::HazardError` if `t_max` is NaN.
    pub fn new(hazard: ExponentialHazard, t_max: f64) -> Result<Self, SimError> {
        if t_max.is_nan() {
            return Err(SimError::HazardError(
                "The hazard ceiling must be a number".to_string(),
            ));
        }
        Ok(Self { hazard, t_max })
    }

    /// Shorthand for `exp(a + b·t)` capped at `t_max`
    ///
    /// # Errors
    ///
    /// Returns `SimError::HazardError` for non-finite coefficients.
    pub fn exponential(a: f64, b: f64, t_max: f64) -> Result<Self, SimError> {
        Self::new(ExponentialHazard::new(a, b)?, t_max)
    }

    #[must_use]
    pub fn t_max(&self) -> f64 {
        self.t_max
    }

    #[must_use]
    pub fn inner(&self) -> &ExponentialHazard {
        &self.hazard
    }

    /// Like [`HazardFunction::time_interval`], but always finite and never past the ceiling
    #[must_use]
    pub fn capped_time_interval(&self, t0: f64, u: f64) -> f64 {
        if t0 >= self.t_max {
            return 0.0;
        }
        let room = self.t_max - t0;
        match self.hazard.time_interval(t0, u) {
            Some(dt) if dt <= room => dt,
            _ => room,
        }
    }
}

impl HazardFunction for TimeLimitedHazardFunction {
    fn evaluate(&self, t: f64) -> f64 {
        if t > self.t_max {
            0.0
        } else {
            self.hazard.evaluate(t)
        }
    }

    fn cumulative_hazard(&self, t0: f64, dt: f64) -> f64 {
        if t0 >= self.t_max {
            return 0.0;
        }
        self.hazard.cumulative_hazard(t0, dt.min(self.t_max - t0))
    }

    fn time_interval(&self, t0: f64, u: f64) -> Option<f64> {
        Some(self.capped_time_interval(t0, u))
    }
}
