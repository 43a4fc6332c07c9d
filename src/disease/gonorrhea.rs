//! Gonorrhea: incubation, then a symptomatic or asymptomatic infection lasting a drawn duration.
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
    schedule_transmissions_from, schedule_transmissions_to, sti_diagnosis_hazard,
    sti_transmission_hazard, treat_if_willing, Disease, DiseaseRecord, DiseaseStage,
    InfectionSite,
};

define_rng!(GonorrheaRng);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum GonorrheaStage {
    #[default]
    Susceptible,
    Exposed,
    Symptomatic,
    Asymptomatic,
}

impl DiseaseStage for GonorrheaStage {
    fn is_infected(self) -> bool {
        self != GonorrheaStage::Susceptible
    }

    fn is_infectious(self) -> bool {
        matches!(
            self,
            GonorrheaStage::Symptomatic | GonorrheaStage::Asymptomatic
        )
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Gonorrhea;

impl Disease for Gonorrhea {
    type Stage = GonorrheaStage;
    const NAME: &'static str = "gonorrhea";

    fn record(person: &Person) -> &DiseaseRecord<GonorrheaStage> {
        &person.gonorrhea
    }

    fn record_mut(person: &mut Person) -> &mut DiseaseRecord<GonorrheaStage> {
        &mut person.gonorrhea
    }

    fn outbreak(params: &SimConfig) -> &OutbreakParams {
        &params.gonorrhea.outbreak
    }

    fn initial_stage() -> GonorrheaStage {
        GonorrheaStage::Exposed
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
            &context.params().gonorrhea.transmission,
        )
    }

    fn diagnosis_hazard(
        context: &Context,
        person: PersonId,
    ) -> Result<TimeLimitedHazardFunction, SimError> {
        sti_diagnosis_hazard::<Self>(context, person, &context.params().gonorrhea.diagnosis)
    }

    fn on_infection(context: &mut Context, person: PersonId, t: f64) -> Result<(), SimError> {
        context.schedule_event(GonorrheaProgressionEvent {
            person,
            infection_time: t,
        })?;
        Ok(())
    }

    fn after_diagnosis(context: &mut Context, person: PersonId, t: f64) -> Result<(), SimError> {
        treat_if_willing::<Self>(context, person, t, GonorrheaStage::Susceptible)?;
        Ok(())
    }
}

fn is_current_infection(context: &Context, person: PersonId, infection_time: f64) -> bool {
    context.person(person).gonorrhea.infection_time == Some(infection_time)
}

pub struct GonorrheaProgressionEvent {
    person: PersonId,
    infection_time: f64,
}

impl Invalidatable for GonorrheaProgressionEvent {
    fn is_useless(&self, context: &Context) -> bool {
        !is_current_infection(context, self.person, self.infection_time)
            || context.person(self.person).gonorrhea.stage != GonorrheaStage::Exposed
    }
}

impl Event for GonorrheaProgressionEvent {
    fn name(&self) -> String {
        "gonorrhea progression".to_string()
    }

    fn persons(&self) -> Vec<PersonId> {
        vec![self.person]
    }

    fn timing(&self, context: &Context, _t0: f64) -> Result<Timing, SimError> {
        let incubation = &context.params().gonorrhea.progression.incubation;
        Ok(Timing::Delay(
            context.sample(GonorrheaRng, |rng| incubation.sample_non_negative(rng))?,
        ))
    }

    fn fire(&self, context: &mut Context, _t: f64) -> Result<(), SimError> {
        let progression = &context.params().gonorrhea.progression;
        let fraction = match context.person(self.person).gonorrhea.infection_site {
            Some(InfectionSite::Vaginal) => progression.symptomatic_vaginal,
            Some(InfectionSite::Rectal) => progression.symptomatic_rectal,
            Some(InfectionSite::Urethral) | None => progression.symptomatic_urethral,
        };
        let symptomatic = context.sample_bool(GonorrheaRng, fraction);
        let duration = if symptomatic {
            &progression.symptomatic_duration
        } else {
            &progression.asymptomatic_duration
        };
        let duration = context.sample(GonorrheaRng, |rng| duration.sample_non_negative(rng))?;

        let record = &mut context.person_mut(self.person).gonorrhea;
        record.symptomatic = symptomatic;
        record.stage = if symptomatic {
            GonorrheaStage::Symptomatic
        } else {
            GonorrheaStage::Asymptomatic
        };

        schedule_transmissions_from::<Gonorrhea>(context, self.person)?;
        context.schedule_event(GonorrheaRecoveryEvent {
            person: self.person,
            infection_time: self.infection_time,
            recovery_time: self.infection_time + duration,
        })?;
        Ok(())
    }
}

/// Clearance once the infection has lasted its drawn duration, counted from infection
pub struct GonorrheaRecoveryEvent {
    person: PersonId,
    infection_time: f64,
    recovery_time: f64,
}

impl Invalidatable for GonorrheaRecoveryEvent {
    fn is_useless(&self, context: &Context) -> bool {
        !is_current_infection(context, self.person, self.infection_time)
            || !context.person(self.person).gonorrhea.is_infectious()
    }
}

impl Event for GonorrheaRecoveryEvent {
    fn name(&self) -> String {
        "gonorrhea recovery".to_string()
    }

    fn persons(&self) -> Vec<PersonId> {
        vec![self.person]
    }

    fn timing(&self, _context: &Context, _t0: f64) -> Result<Timing, SimError> {
        Ok(Timing::At(self.recovery_time))
    }

    fn fire(&self, context: &mut Context, t: f64) -> Result<(), SimError> {
        context
            .person_mut(self.person)
            .gonorrhea
            .clear_infection(GonorrheaStage::Susceptible, t);
        schedule_transmissions_to::<Gonorrhea>(context, self.person)
    }
}
