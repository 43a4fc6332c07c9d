//! Chlamydia: incubation, then a symptomatic or asymptomatic infection that clears naturally
//! under a hazard or through treatment. Asymptomatic clearance may leave temporary immunity.
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

define_rng!(ChlamydiaRng);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum ChlamydiaStage {
    #[default]
    Susceptible,
    Exposed,
    Symptomatic,
    Asymptomatic,
    Immune,
}

impl DiseaseStage for ChlamydiaStage {
    fn is_infected(self) -> bool {
        matches!(
            self,
            ChlamydiaStage::Exposed | ChlamydiaStage::Symptomatic | ChlamydiaStage::Asymptomatic
        )
    }

    fn is_infectious(self) -> bool {
        matches!(
            self,
            ChlamydiaStage::Symptomatic | ChlamydiaStage::Asymptomatic
        )
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Chlamydia;

impl Disease for Chlamydia {
    type Stage = ChlamydiaStage;
    const NAME: &'static str = "chlamydia";

    fn record(person: &Person) -> &DiseaseRecord<ChlamydiaStage> {
        &person.chlamydia
    }

    fn record_mut(person: &mut Person) -> &mut DiseaseRecord<ChlamydiaStage> {
        &mut person.chlamydia
    }

    fn outbreak(params: &SimConfig) -> &OutbreakParams {
        &params.chlamydia.outbreak
    }

    fn initial_stage() -> ChlamydiaStage {
        ChlamydiaStage::Exposed
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
            &context.params().chlamydia.transmission,
        )
    }

    fn diagnosis_hazard(
        context: &Context,
        person: PersonId,
    ) -> Result<TimeLimitedHazardFunction, SimError> {
        sti_diagnosis_hazard::<Self>(context, person, &context.params().chlamydia.diagnosis)
    }

    fn on_infection(context: &mut Context, person: PersonId, t: f64) -> Result<(), SimError> {
        context.schedule_event(ChlamydiaProgressionEvent {
            person,
            infection_time: t,
        })?;
        Ok(())
    }

    fn after_diagnosis(context: &mut Context, person: PersonId, t: f64) -> Result<(), SimError> {
        treat_if_willing::<Self>(context, person, t, ChlamydiaStage::Susceptible)?;
        Ok(())
    }
}

fn current_infection(
    context: &Context,
    person: PersonId,
    infection_time: f64,
) -> Option<ChlamydiaStage> {
    let record = &context.person(person).chlamydia;
    (record.infection_time == Some(infection_time)).then_some(record.stage)
}

/// The end of incubation, at which the infection turns symptomatic or not depending on its site
pub struct ChlamydiaProgressionEvent {
    person: PersonId,
    infection_time: f64,
}

impl Invalidatable for ChlamydiaProgressionEvent {
    fn is_useless(&self, context: &Context) -> bool {
        current_infection(context, self.person, self.infection_time)
            != Some(ChlamydiaStage::Exposed)
    }
}

impl Event for ChlamydiaProgressionEvent {
    fn name(&self) -> String {
        "chlamydia progression".to_string()
    }

    fn persons(&self) -> Vec<PersonId> {
        vec![self.person]
    }

    fn timing(&self, context: &Context, _t0: f64) -> Result<Timing, SimError> {
        let incubation = &context.params().chlamydia.progression.incubation;
        Ok(Timing::Delay(
            context.sample(ChlamydiaRng, |rng| incubation.sample_non_negative(rng))?,
        ))
    }

    fn fire(&self, context: &mut Context, _t: f64) -> Result<(), SimError> {
        let progression = &context.params().chlamydia.progression;
        let fraction = match context.person(self.person).chlamydia.infection_site {
            Some(InfectionSite::Vaginal) => progression.symptomatic_vaginal,
            Some(InfectionSite::Rectal) => progression.symptomatic_rectal,
            Some(InfectionSite::Urethral) | None => progression.symptomatic_urethral,
        };
        let symptomatic = context.sample_bool(ChlamydiaRng, fraction);
        let record = &mut context.person_mut(self.person).chlamydia;
        record.symptomatic = symptomatic;
        record.stage = if symptomatic {
            ChlamydiaStage::Symptomatic
        } else {
            ChlamydiaStage::Asymptomatic
        };

        schedule_transmissions_from::<Chlamydia>(context, self.person)?;
        context.schedule_event(ChlamydiaRecoveryEvent {
            person: self.person,
            infection_time: self.infection_time,
        })?;
        Ok(())
    }
}

/// Natural clearance under `A = baseline - beta·t_inf`, `B = beta`
pub struct ChlamydiaRecoveryEvent {
    person: PersonId,
    infection_time: f64,
}

impl Invalidatable for ChlamydiaRecoveryEvent {
    fn is_useless(&self, context: &Context) -> bool {
        !matches!(
            current_infection(context, self.person, self.infection_time),
            Some(ChlamydiaStage::Symptomatic | ChlamydiaStage::Asymptomatic)
        )
    }
}

impl Event for ChlamydiaRecoveryEvent {
    fn name(&self) -> String {
        "chlamydia recovery".to_string()
    }

    fn persons(&self) -> Vec<PersonId> {
        vec![self.person]
    }

    fn timing(&self, context: &Context, _t0: f64) -> Result<Timing, SimError> {
        let recovery = &context.params().chlamydia.recovery;
        let dob = context.person(self.person).date_of_birth;
        Ok(Timing::Hazard(TimeLimitedHazardFunction::exponential(
            recovery.baseline - recovery.beta * self.infection_time,
            recovery.beta,
            dob + recovery.t_max,
        )?))
    }

    fn fire(&self, context: &mut Context, t: f64) -> Result<(), SimError> {
        let was_asymptomatic =
            context.person(self.person).chlamydia.stage == ChlamydiaStage::Asymptomatic;
        let immunity = if was_asymptomatic {
            let dist = &context.params().chlamydia.progression.immunity;
            context.sample(ChlamydiaRng, |rng| dist.sample_non_negative(rng))?
        } else {
            0.0
        };

        let record = &mut context.person_mut(self.person).chlamydia;
        if immunity > 0.0 {
            record.clear_infection(ChlamydiaStage::Immune, t);
            context.schedule_event(ChlamydiaImmunityLossEvent {
                person: self.person,
                duration: immunity,
            })?;
        } else {
            record.clear_infection(ChlamydiaStage::Susceptible, t);
            schedule_transmissions_to::<Chlamydia>(context, self.person)?;
        }
        Ok(())
    }
}

/// The end of the immunity that can follow an asymptomatic infection
pub struct ChlamydiaImmunityLossEvent {
    person: PersonId,
    duration: f64,
}

impl Invalidatable for ChlamydiaImmunityLossEvent {
    fn is_useless(&self, context: &Context) -> bool {
        context.person(self.person).chlamydia.stage != ChlamydiaStage::Immune
    }
}

impl Event for ChlamydiaImmunityLossEvent {
    fn name(&self) -> String {
        "chlamydia immunity loss".to_string()
    }

    fn persons(&self) -> Vec<PersonId> {
        vec![self.person]
    }

    fn timing(&self, _context: &Context, _t0: f64) -> Result<Timing, SimError> {
        Ok(Timing::Delay(self.duration))
    }

    fn fire(&self, context: &mut Context, _t: f64) -> Result<(), SimError> {
        context.person_mut(self.person).chlamydia.stage = ChlamydiaStage::Susceptible;
        schedule_transmissions_to::<Chlamydia>(context, self.person)
    }
}
