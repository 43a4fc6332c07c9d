use std::marker::PhantomData;

use log::trace;

use crate::context::Context;
use crate::define_rng;
use crate::error::SimError;
use crate::event::{Event, Invalidatable, Timing, HOUR};
use crate::event_log::ContextEventLogExt;
use crate::hazard::TimeLimitedHazardFunction;
use crate::parameters::StiDiagnosisParams;
use crate::population::{ContextPopulationExt, PersonId};
use crate::prep::refresh_prep_eligibility;
use crate::random::ContextRandomExt;

use super::{indicator, schedule_transmissions_to, Disease};

define_rng!(TreatmentRng);

/// Diagnoses further back than this no longer count as recent
const RECENT_DIAGNOSIS_WINDOW: f64 = 1.0;

pub struct DiagnosisEvent<D: Disease> {
    person: PersonId,
    immediately: bool,
    disease: PhantomData<D>,
}

impl<D: Disease> DiagnosisEvent<D> {
    /// A diagnosis driven by the disease's diagnosis hazard
    #[must_use]
    pub fn new(person: PersonId) -> Self {
        Self {
            person,
            immediately: false,
            disease: PhantomData,
        }
    }

    /// A diagnosis one hour from now, as after a positive screening test
    #[must_use]
    pub fn immediate(person: PersonId) -> Self {
        Self {
            person,
            immediately: true,
            disease: PhantomData,
        }
    }
}

impl<D: Disease> Invalidatable for DiagnosisEvent<D> {
    fn is_useless(&self, context: &Context) -> bool {
        let record = D::record(context.person(self.person));
        !record.is_infected() || record.diagnosed
    }
}

impl<D: Disease> Event for DiagnosisEvent<D> {
    fn name(&self) -> String {
        format!("{} diagnosis", D::NAME)
    }

    fn persons(&self) -> Vec<PersonId> {
        vec![self.person]
    }

    fn timing(&self, context: &Context, _t0: f64) -> Result<Timing, SimError> {
        if self.immediately {
            return Ok(Timing::Delay(HOUR));
        }
        Ok(Timing::Hazard(D::diagnosis_hazard(context, self.person)?))
    }

    fn fire(&self, context: &mut Context, t: f64) -> Result<(), SimError> {
        D::record_mut(context.person_mut(self.person)).mark_diagnosed(t);
        if D::COUNTS_AS_STI {
            record_sti_diagnosis(context, self.person, t);
            refresh_prep_eligibility(context, self.person, t, true)?;
        }
        D::after_diagnosis(context, self.person, t)
    }

    /// Infected partners have a diagnosis hazard that depends on how many of their partners are
    /// diagnosed
    fn mark_other_affected(&self, context: &Context) -> Vec<PersonId> {
        context
            .person(self.person)
            .partners()
            .filter(|partner| D::record(context.person(*partner)).is_infected())
            .collect()
    }
}

/// How many of the person's current partners have been diagnosed with `D`
#[must_use]
pub fn diagnosed_partners<D: Disease>(context: &Context, person: PersonId) -> usize {
    context
        .person(person)
        .partners()
        .filter(|partner| D::record(context.person(*partner)).diagnosed)
        .count()
}

/// Count a diagnosis towards the person's recent STI diagnoses. The count restarts when the
/// previous diagnosis was more than a year ago.
pub fn record_sti_diagnosis(context: &mut Context, person: PersonId, t: f64) {
    let person = context.person_mut(person);
    person.sti_diagnosis_count = match person.last_sti_diagnosis {
        Some(last) if last >= t - RECENT_DIAGNOSIS_WINDOW => person.sti_diagnosis_count + 1,
        _ => 1,
    };
    person.last_sti_diagnosis = Some(t);
}

/// The diagnosis hazard shared by the bacterial STIs and HSV2:
/// `A = baseline + diagpartnersfactor·D + healthseekingpropensityfactor·H + symptomaticfactor·S
/// - beta·t_inf`, `B = beta`, limited to `dob + t_max`
///
/// # Errors
///
/// Returns `SimError::HazardError` if the coefficients are not finite.
pub fn sti_diagnosis_hazard<D: Disease>(
    context: &Context,
    person: PersonId,
    params: &StiDiagnosisParams,
) -> Result<TimeLimitedHazardFunction, SimError> {
    let p = context.person(person);
    let record = D::record(p);
    let t_inf = record
        .infection_time
        .unwrap_or_else(|| context.get_current_time());
    #[allow(clippy::cast_precision_loss)]
    let diagnosed = diagnosed_partners::<D>(context, person) as f64;
    let a = params.baseline
        + params.diag_partners_factor * diagnosed
        + params.health_seeking_propensity_factor * p.health_seeking_propensity
        + params.symptomatic_factor * indicator(record.symptomatic)
        - params.beta * t_inf;
    TimeLimitedHazardFunction::exponential(a, params.beta, p.date_of_birth + params.t_max)
}

/// Offer treatment after a diagnosis. A person on PrEP or a willing person (a uniform draw below
/// their acceptance threshold) is cured into `cured_stage`, and transmissions from their
/// infectious partners are scheduled again. Returns whether treatment was accepted.
///
/// # Errors
///
/// Returns an error if the treatment record cannot be logged or a transmission scheduled.
pub fn treat_if_willing<D: Disease>(
    context: &mut Context,
    person: PersonId,
    t: f64,
    cured_stage: D::Stage,
) -> Result<bool, SimError> {
    let p = context.person(person);
    let threshold = p.treat_accept_threshold;
    if !p.prep.is_on_prep() && context.sample_uniform(TreatmentRng) >= threshold {
        trace!("{person:?} declined {} treatment", D::NAME);
        return Ok(false);
    }
    D::record_mut(context.person_mut(person)).clear_infection(cured_stage, t);
    context.log_event(&format!("{} treatment", D::NAME), &[person])?;
    schedule_transmissions_to::<D>(context, person)?;
    Ok(true)
}

/// A uniform draw against the person's treatment acceptance threshold, for diseases that are
/// treated without being cured
#[must_use]
pub(crate) fn accepts_treatment(context: &Context, person: PersonId) -> bool {
    context.sample_uniform(TreatmentRng) < context.person(person).treat_accept_threshold
}
