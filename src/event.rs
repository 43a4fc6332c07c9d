//! The interface every simulation event implements.
use crate::context::Context;
use crate::error::SimError;
use crate::hazard::TimeLimitedHazardFunction;
use crate::population::PersonId;

/// One hour, in years
pub const HOUR: f64 = 1.0 / (365.0 * 24.0);

/// When an event should fire, as computed from the current state
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Timing {
    /// Fire when the integrated hazard reaches an exponential draw. Recomputed whenever one of
    /// the event's persons is affected.
    Hazard(TimeLimitedHazardFunction),
    /// Fire this long after scheduling
    Delay(f64),
    /// Fire at this absolute time, or now if it lies in the past
    At(f64),
}

/// The lazy validity check run just before firing and whenever a participant changes
pub trait Invalidatable {
    /// True if the event can no longer have any effect and should be dropped
    fn is_useless(&self, context: &Context) -> bool;
}

pub trait Event: Invalidatable + 'static {
    /// The log category, e.g. `"chlamydia transmission"`
    fn name(&self) -> String;

    /// The people the event is bound to, in order (origin first)
    fn persons(&self) -> Vec<PersonId>;

    /// # Errors
    ///
    /// Returns `SimError::HazardError` if the hazard cannot be constructed from the current
    /// state.
    fn timing(&self, context: &Context, t0: f64) -> Result<Timing, SimError>;

    /// # Errors
    ///
    /// Any error aborts the run.
    fn fire(&self, context: &mut Context, t: f64) -> Result<(), SimError>;

    /// People other than `persons()` whose hazards change when this event fires
    fn mark_other_affected(&self, _context: &Context) -> Vec<PersonId> {
        Vec::new()
    }
}
