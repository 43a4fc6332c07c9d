//! The five diseases and the machinery they share.
//!
//! Transmission, diagnosis, seeding and import work the same way for every disease and are
//! written once, generic over [`Disease`]. Each disease module supplies its stage enum, its
//! hazards, and the progression events that only it has.
pub mod chlamydia;
mod diagnosis;
pub mod gonorrhea;
pub mod hiv;
pub mod hsv2;
mod record;
mod seeding;
pub mod syphilis;
mod transmission;

pub use diagnosis::{
    diagnosed_partners, record_sti_diagnosis, sti_diagnosis_hazard, treat_if_willing,
    DiagnosisEvent,
};
pub use record::{DiseaseRecord, DiseaseStage, InfectionSite, InfectionType};
pub use seeding::{schedule_outbreak, ImportEvent, SeedEvent};
pub use transmission::{
    infect, infection_site, schedule_transmission, schedule_transmissions_from,
    schedule_transmissions_to, sti_transmission_hazard, uses_condom, TransmissionEvent,
};

pub use chlamydia::Chlamydia;
pub use gonorrhea::Gonorrhea;
pub use hiv::Hiv;
pub use hsv2::Hsv2;
pub use syphilis::Syphilis;

use crate::context::Context;
use crate::error::SimError;
use crate::hazard::TimeLimitedHazardFunction;
use crate::parameters::{OutbreakParams, SimConfig};
use crate::population::{ContextPopulationExt, Person, PersonId};
use crate::scheduler::ContextSchedulerExt;

pub trait Disease: Copy + 'static {
    type Stage: DiseaseStage;

    /// Used as the prefix of every log category, e.g. `"syphilis"`
    const NAME: &'static str;

    /// Whether a diagnosis counts towards the person's recent STI diagnoses
    const COUNTS_AS_STI: bool = true;

    fn record(person: &Person) -> &DiseaseRecord<Self::Stage>;

    fn record_mut(person: &mut Person) -> &mut DiseaseRecord<Self::Stage>;

    fn outbreak(params: &SimConfig) -> &OutbreakParams;

    /// The stage a new infection starts in
    fn initial_stage() -> Self::Stage;

    /// # Errors
    ///
    /// Returns `SimError::HazardError` if the coefficients are not finite.
    fn transmission_hazard(
        context: &Context,
        origin: PersonId,
        target: PersonId,
    ) -> Result<TimeLimitedHazardFunction, SimError>;

    /// # Errors
    ///
    /// Returns `SimError::HazardError` if the coefficients are not finite.
    fn diagnosis_hazard(
        context: &Context,
        person: PersonId,
    ) -> Result<TimeLimitedHazardFunction, SimError>;

    /// Schedule whatever a new infection sets in motion besides transmission and diagnosis
    ///
    /// # Errors
    ///
    /// Returns an error if a follow-up event cannot be scheduled.
    fn on_infection(context: &mut Context, person: PersonId, t: f64) -> Result<(), SimError>;

    /// Runs after the person has been marked diagnosed
    ///
    /// # Errors
    ///
    /// Returns an error if a follow-up event cannot be scheduled or logged.
    fn after_diagnosis(context: &mut Context, person: PersonId, t: f64) -> Result<(), SimError>;

    /// Runs once after a seeding event has infected `seeded`
    ///
    /// # Errors
    ///
    /// Returns an error if a follow-up event cannot be scheduled.
    fn after_seeding(
        _context: &mut Context,
        _seeded: &[PersonId],
        _t: f64,
    ) -> Result<(), SimError> {
        Ok(())
    }
}

/// True if the person is in the last stage of AIDS, in which they no longer have sex
#[must_use]
pub fn in_final_aids(context: &Context, person: PersonId) -> bool {
    context.person(person).hiv.stage == hiv::HivStage::AidsFinal
}

fn schedule_pair<D: Disease>(
    context: &mut Context,
    a: PersonId,
    b: PersonId,
) -> Result<(), SimError> {
    schedule_transmission::<D>(context, a, b)?;
    schedule_transmission::<D>(context, b, a)?;
    Ok(())
}

/// For every disease where exactly one of the new partners is infectious and the other
/// susceptible, schedule transmission in that direction
///
/// # Errors
///
/// Returns an error if a transmission hazard cannot be computed.
pub fn schedule_partnership_transmissions(
    context: &mut Context,
    a: PersonId,
    b: PersonId,
) -> Result<(), SimError> {
    schedule_pair::<Hiv>(context, a, b)?;
    schedule_pair::<Chlamydia>(context, a, b)?;
    schedule_pair::<Gonorrhea>(context, a, b)?;
    schedule_pair::<Syphilis>(context, a, b)?;
    schedule_pair::<Hsv2>(context, a, b)
}

pub(crate) fn screen_for<D: Disease>(context: &mut Context, person: PersonId) -> Result<(), SimError> {
    let record = D::record(context.person(person));
    if record.is_infected() && !record.diagnosed {
        context.schedule_event(DiagnosisEvent::<D>::immediate(person))?;
    }
    Ok(())
}

/// Schedule an immediate diagnosis for every infection the person carries undiagnosed
///
/// # Errors
///
/// Returns an error if a diagnosis cannot be scheduled.
pub fn screen_all(context: &mut Context, person: PersonId) -> Result<(), SimError> {
    screen_for::<Hiv>(context, person)?;
    screen_for::<Chlamydia>(context, person)?;
    screen_for::<Gonorrhea>(context, person)?;
    screen_for::<Syphilis>(context, person)?;
    screen_for::<Hsv2>(context, person)
}

/// True once the person has been diagnosed with all five diseases
#[must_use]
pub fn diagnosed_with_all(person: &Person) -> bool {
    person.hiv.diagnosed
        && person.chlamydia.diagnosed
        && person.gonorrhea.diagnosed
        && person.syphilis.diagnosed
        && person.hsv2.diagnosed
}

/// Schedule the seeding event of every disease
///
/// # Errors
///
/// Returns an error if a seeding time is invalid.
pub fn schedule_all_outbreaks(context: &mut Context) -> Result<(), SimError> {
    schedule_outbreak::<Hiv>(context)?;
    schedule_outbreak::<Chlamydia>(context)?;
    schedule_outbreak::<Gonorrhea>(context)?;
    schedule_outbreak::<Syphilis>(context)?;
    schedule_outbreak::<Hsv2>(context)
}

/// The lowest birth date of the two, which anchors the ceiling of pair hazards
#[must_use]
pub fn earliest_birth(context: &Context, a: PersonId, b: PersonId) -> f64 {
    context
        .person(a)
        .date_of_birth
        .min(context.person(b).date_of_birth)
}

fn indicator(flag: bool) -> f64 {
    if flag {
        1.0
    } else {
        0.0
    }
}
