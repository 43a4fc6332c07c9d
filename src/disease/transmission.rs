use std::marker::PhantomData;

use crate::context::Context;
use crate::define_rng;
use crate::error::SimError;
use crate::event::{Event, Invalidatable, Timing};
use crate::event_log::ContextEventLogExt;
use crate::hazard::TimeLimitedHazardFunction;
use crate::parameters::StiTransmissionParams;
use crate::population::{ContextPopulationExt, PersonId, Sex, SexualRole};
use crate::random::ContextRandomExt;
use crate::scheduler::{ContextSchedulerExt, EventId};

use super::{
    earliest_birth, in_final_aids, DiagnosisEvent, Disease, DiseaseStage, InfectionSite,
    InfectionType,
};

define_rng!(TransmissionRng);

/// Infection of `target` by their partner `origin`
pub struct TransmissionEvent<D: Disease> {
    origin: PersonId,
    target: PersonId,
    disease: PhantomData<D>,
}

impl<D: Disease> TransmissionEvent<D> {
    #[must_use]
    pub fn new(origin: PersonId, target: PersonId) -> Self {
        Self {
            origin,
            target,
            disease: PhantomData,
        }
    }
}

impl<D: Disease> Invalidatable for TransmissionEvent<D> {
    fn is_useless(&self, context: &Context) -> bool {
        !D::record(context.person(self.origin)).is_infectious()
            || !D::record(context.person(self.target)).is_susceptible()
            || !context.has_relationship(self.origin, self.target)
            || in_final_aids(context, self.origin)
            || in_final_aids(context, self.target)
    }
}

impl<D: Disease> Event for TransmissionEvent<D> {
    fn name(&self) -> String {
        format!("{} transmission", D::NAME)
    }

    fn persons(&self) -> Vec<PersonId> {
        vec![self.origin, self.target]
    }

    fn timing(&self, context: &Context, _t0: f64) -> Result<Timing, SimError> {
        Ok(Timing::Hazard(D::transmission_hazard(
            context,
            self.origin,
            self.target,
        )?))
    }

    fn fire(&self, context: &mut Context, t: f64) -> Result<(), SimError> {
        infect::<D>(
            context,
            self.target,
            Some(self.origin),
            InfectionType::Partner,
            t,
        )
    }
}

/// Where an infection of `target` enters the body
///
/// Women are always infected vaginally and men with a female partner urethrally. Between men the
/// target's own role decides first, then the origin's, and a versatile pair is a coin toss. A
/// seed infection of a man who has sex with men is also a coin toss.
#[must_use]
pub fn infection_site(context: &Context, target: PersonId, origin: Option<PersonId>) -> InfectionSite {
    let target = context.person(target);
    if target.is_woman() {
        return InfectionSite::Vaginal;
    }
    let coin_toss = || {
        if context.sample_bool(TransmissionRng, 0.5) {
            InfectionSite::Rectal
        } else {
            InfectionSite::Urethral
        }
    };
    let Some(origin) = origin else {
        return if target.msm {
            coin_toss()
        } else {
            InfectionSite::Urethral
        };
    };
    let origin = context.person(origin);
    if origin.sex == Sex::Female {
        return InfectionSite::Urethral;
    }
    match (target.sexual_role, origin.sexual_role) {
        (SexualRole::Receptive, _) | (SexualRole::Variable, SexualRole::Insertive) => {
            InfectionSite::Rectal
        }
        (SexualRole::Insertive, _) | (SexualRole::Variable, SexualRole::Receptive) => {
            InfectionSite::Urethral
        }
        (SexualRole::Variable, SexualRole::Variable) => coin_toss(),
    }
}

/// The transmission hazard of the bacterial STIs: `A = a - b·t_inf`, `B = b`, limited to the
/// earlier birth date of the pair plus `t_max`
///
/// # Errors
///
/// Returns `SimError::HazardError` if the coefficients are not finite.
pub fn sti_transmission_hazard<D: Disease>(
    context: &Context,
    origin: PersonId,
    target: PersonId,
    params: &StiTransmissionParams,
) -> Result<TimeLimitedHazardFunction, SimError> {
    let t_inf = D::record(context.person(origin))
        .infection_time
        .unwrap_or_else(|| context.get_current_time());
    TimeLimitedHazardFunction::exponential(
        params.a - params.b * t_inf,
        params.b,
        earliest_birth(context, origin, target) + params.t_max,
    )
}

/// True if the couple agreed to use condoms when they formed their relationship
#[must_use]
pub fn uses_condom(context: &Context, a: PersonId, b: PersonId) -> bool {
    context
        .person(a)
        .relationship_with(b)
        .is_some_and(|r| r.condom_use)
}

/// Infect `target` with `D`, schedule their onward transmissions and their diagnosis
///
/// # Errors
///
/// Returns `SimError::InvariantViolation` if the target cannot acquire the infection, or any
/// error raised while scheduling the follow-up events.
pub fn infect<D: Disease>(
    context: &mut Context,
    target: PersonId,
    origin: Option<PersonId>,
    infection_type: InfectionType,
    t: f64,
) -> Result<(), SimError> {
    if !context.is_alive(target) || !D::record(context.person(target)).is_susceptible() {
        return Err(SimError::InvariantViolation(format!(
            "{target:?} cannot be infected with {} in their current state",
            D::NAME
        )));
    }
    let site = infection_site(context, target, origin);
    D::record_mut(context.person_mut(target)).set_infected(
        D::initial_stage(),
        t,
        origin,
        infection_type,
        site,
    );
    let mut persons = vec![target];
    persons.extend(origin);
    context.log_event(&format!("{} infection", D::NAME), &persons)?;

    D::on_infection(context, target, t)?;
    if D::initial_stage().is_infectious() {
        schedule_transmissions_from::<D>(context, target)?;
    }
    context.schedule_event(DiagnosisEvent::<D>::new(target))?;
    context.mark_affected(target)
}

/// Schedule a transmission from `origin` to `target` unless it would be useless or one is
/// already pending
///
/// # Errors
///
/// Returns an error if the transmission hazard cannot be computed.
pub fn schedule_transmission<D: Disease>(
    context: &mut Context,
    origin: PersonId,
    target: PersonId,
) -> Result<Option<EventId>, SimError> {
    let event = TransmissionEvent::<D>::new(origin, target);
    if event.is_useless(context) || context.has_pending_event(&event.name(), &event.persons()) {
        return Ok(None);
    }
    context.schedule_event(event).map(Some)
}

/// Schedule transmissions from a newly infectious person to each susceptible partner
///
/// # Errors
///
/// Returns an error if a transmission hazard cannot be computed.
pub fn schedule_transmissions_from<D: Disease>(
    context: &mut Context,
    origin: PersonId,
) -> Result<(), SimError> {
    for partner in context.partners(origin) {
        schedule_transmission::<D>(context, origin, partner)?;
    }
    Ok(())
}

/// Schedule transmissions to a newly susceptible person from each infectious partner
///
/// # Errors
///
/// Returns an error if a transmission hazard cannot be computed.
pub fn schedule_transmissions_to<D: Disease>(
    context: &mut Context,
    target: PersonId,
) -> Result<(), SimError> {
    for partner in context.partners(target) {
        schedule_transmission::<D>(context, partner, target)?;
    }
    Ok(())
}
