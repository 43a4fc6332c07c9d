//! Syphilis: a chain of stages without natural clearance. Primary and secondary syphilis are
//! infectious and symptomatic; latent syphilis either relapses into the secondary stage or
//! becomes tertiary.
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::define_rng;
use crate::error::SimError;
use crate::event::{Event, Invalidatable, Timing};
use crate::hazard::TimeLimitedHazardFunction;
use crate::parameters::{ContextParametersExt, OutbreakParams, SimConfig};
use crate::population::{ContextPopulationExt, Person, PersonId};
use crate::random::ContextRandomExt;
use crate::scheduler::ContextSchedulerExt;

use super::{
    schedule_transmissions_from, sti_diagnosis_hazard, sti_transmission_hazard, treat_if_willing,
    Disease, DiseaseRecord, DiseaseStage,
};

define_rng!(SyphilisRng);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum SyphilisStage {
    #[default]
    Susceptible,
    Exposed,
    Primary,
    Secondary,
    Latent,
    Tertiary,
}

impl DiseaseStage for SyphilisStage {
    fn is_infected(self) -> bool {
        self != SyphilisStage::Susceptible
    }

    fn is_infectious(self) -> bool {
        matches!(self, SyphilisStage::Primary | SyphilisStage::Secondary)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Syphilis;

impl Disease for Syphilis {
    type Stage = SyphilisStage;
    const NAME: &'static str = "syphilis";

    fn record(person: &Person) -> &DiseaseRecord<SyphilisStage> {
        &person.syphilis
    }

    fn record_mut(person: &mut Person) -> &mut DiseaseRecord<SyphilisStage> {
        &mut person.syphilis
    }

    fn outbreak(params: &SimConfig) -> &OutbreakParams {
        &params.syphilis.outbreak
    }

    fn initial_stage() -> SyphilisStage {
        SyphilisStage::Exposed
    }

    fn transmission_hazard(
        context: &Context,
        origin: PersonId,
        target: PersonId,
    ) -> Result<TimeLimitedHazardFunction, SimError> {
        sti_transmission_hazard::<Self>(
            context,
            origin,
            target,
            &context.params().syphilis.transmission,
        )
    }

    fn diagnosis_hazard(
        context: &Context,
        person: PersonId,
    ) -> Result<TimeLimitedHazardFunction, SimError> {
        sti_diagnosis_hazard::<Self>(context, person, &context.params().syphilis.diagnosis)
    }

    fn on_infection(context: &mut Context, person: PersonId, t: f64) -> Result<(), SimError> {
        context.schedule_event(SyphilisProgressionEvent {
            person,
            infection_time: t,
            from: SyphilisStage::Exposed,
        })?;
        let tertiary = &context.params().syphilis.progression.tertiary;
        let delay = context.sample(SyphilisRng, |rng| tertiary.sample_non_negative(rng))?;
        context.schedule_event(TertiarySyphilisEvent {
            person,
            infection_time: t,
            time: t + delay,
        })?;
        Ok(())
    }

    fn after_diagnosis(context: &mut Context, person: PersonId, t: f64) -> Result<(), SimError> {
        treat_if_willing::<Self>(context, person, t, SyphilisStage::Susceptible)?;
        Ok(())
    }
}

fn current_stage(context: &Context, person: PersonId, infection_time: f64) -> Option<SyphilisStage> {
    let record = &context.person(person).syphilis;
    (record.infection_time == Some(infection_time)).then_some(record.stage)
}

/// Leaving stage `from` after its drawn duration
pub struct SyphilisProgressionEvent {
    person: PersonId,
    infection_time: f64,
    from: SyphilisStage,
}

impl Invalidatable for SyphilisProgressionEvent {
    fn is_useless(&self, context: &Context) -> bool {
        current_stage(context, self.person, self.infection_time) != Some(self.from)
    }
}

impl Event for SyphilisProgressionEvent {
    fn name(&self) -> String {
        "syphilis progression".to_string()
    }

    fn persons(&self) -> Vec<PersonId> {
        vec![self.person]
    }

    fn timing(&self, context: &Context, _t0: f64) -> Result<Timing, SimError> {
        let progression = &context.params().syphilis.progression;
        let duration = match self.from {
            SyphilisStage::Exposed => &progression.exposed,
            SyphilisStage::Primary => &progression.primary,
            SyphilisStage::Secondary => &progression.secondary,
            SyphilisStage::Latent => &progression.latent,
            SyphilisStage::Susceptible | SyphilisStage::Tertiary => {
                return Err(SimError::InvariantViolation(format!(
                    "syphilis cannot progress out of the {} stage",
                    self.from
                )))
            }
        };
        Ok(Timing::Delay(
            context.sample(SyphilisRng, |rng| duration.sample_non_negative(rng))?,
        ))
    }

    fn fire(&self, context: &mut Context, _t: f64) -> Result<(), SimError> {
        let next = match self.from {
            SyphilisStage::Exposed => SyphilisStage::Primary,
            SyphilisStage::Primary => SyphilisStage::Secondary,
            SyphilisStage::Secondary => SyphilisStage::Latent,
            SyphilisStage::Latent => {
                let relapse = context.params().person.syphilis_fraction_relapse;
                if context.sample_bool(SyphilisRng, relapse) {
                    SyphilisStage::Secondary
                } else {
                    SyphilisStage::Tertiary
                }
            }
            SyphilisStage::Susceptible | SyphilisStage::Tertiary => {
                return Err(SimError::InvariantViolation(format!(
                    "syphilis cannot progress out of the {} stage",
                    self.from
                )))
            }
        };
        let record = &mut context.person_mut(self.person).syphilis;
        record.stage = next;
        record.symptomatic = next.is_infectious();

        if next.is_infectious() {
            schedule_transmissions_from::<Syphilis>(context, self.person)?;
        }
        if next != SyphilisStage::Tertiary {
            context.schedule_event(SyphilisProgressionEvent {
                person: self.person,
                infection_time: self.infection_time,
                from: next,
            })?;
        }
        Ok(())
    }
}

/// Tertiary syphilis at a drawn time after infection, whatever stage the person has reached
pub struct TertiarySyphilisEvent {
    person: PersonId,
    infection_time: f64,
    time: f64,
}

impl Invalidatable for TertiarySyphilisEvent {
    fn is_useless(&self, context: &Context) -> bool {
        matches!(
            current_stage(context, self.person, self.infection_time),
            None | Some(SyphilisStage::Tertiary)
        )
    }
}

impl Event for TertiarySyphilisEvent {
    fn name(&self) -> String {
        "tertiary syphilis".to_string()
    }

    fn persons(&self) -> Vec<PersonId> {
        vec![self.person]
    }

    fn timing(&self, _context: &Context, _t0: f64) -> Result<Timing, SimError> {
        Ok(Timing::At(self.time))
    }

    fn fire(&self, context: &mut Context, _t: f64) -> Result<(), SimError> {
        let record = &mut context.person_mut(self.person).syphilis;
        record.stage = SyphilisStage::Tertiary;
        record.symptomatic = false;
        Ok(())
    }
}
