//! HSV2: a lifelong infection. After the primary stage the person alternates between
//! asymptomatic and recurrent shedding, and remains infectious throughout.
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::define_rng;
use crate::error::SimError;
use crate::event::{Event, Invalidatable, Timing};
use crate::event_log::ContextEventLogExt;
use crate::hazard::TimeLimitedHazardFunction;
use crate::parameters::{ContextParametersExt, OutbreakParams, SimConfig};
use crate::population::{ContextPopulationExt, Person, PersonId};
use crate::random::ContextRandomExt;
use crate::scheduler::ContextSchedulerExt;

use super::diagnosis::accepts_treatment;
use super::hiv::HivStage;
use super::{
    earliest_birth, indicator, sti_diagnosis_hazard, uses_condom, Disease, DiseaseRecord,
    DiseaseStage, InfectionSite,
};

define_rng!(Hsv2Rng);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum Hsv2Stage {
    #[default]
    Susceptible,
    Primary,
    Asymptomatic,
    Recurrent,
}

impl DiseaseStage for Hsv2Stage {
    fn is_infected(self) -> bool {
        self != Hsv2Stage::Susceptible
    }

    fn is_infectious(self) -> bool {
        self.is_infected()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Hsv2;

impl Disease for Hsv2 {
    type Stage = Hsv2Stage;
    const NAME: &'static str = "hsv2";

    fn record(person: &Person) -> &DiseaseRecord<Hsv2Stage> {
        &person.hsv2
    }

    fn record_mut(person: &mut Person) -> &mut DiseaseRecord<Hsv2Stage> {
        &mut person.hsv2
    }

    fn outbreak(params: &SimConfig) -> &OutbreakParams {
        &params.hsv2.outbreak
    }

    fn initial_stage() -> Hsv2Stage {
        Hsv2Stage::Primary
    }

    /// `A = a_origin - b·t_inf + d1·H_origin + d2·H_target + g1·P_origin + g2·P_target + f·R
    /// + w·W + h·condom + e1·b0_target + e2·b2_target`, `B = b`
    ///
    /// `H` marks an HIV infection, `P` counts relationships, `W` marks a female target and `R` a
    /// male pair whose origin was infected urethrally.
    fn transmission_hazard(
        context: &Context,
        origin: PersonId,
        target: PersonId,
    ) -> Result<TimeLimitedHazardFunction, SimError> {
        let params = &context.params().hsv2.transmission;
        let o = context.person(origin);
        let p = context.person(target);
        let t_inf = o
            .hsv2
            .infection_time
            .unwrap_or_else(|| context.get_current_time());
        let urethral_between_men =
            o.is_man() && p.is_man() && o.hsv2.infection_site == Some(InfectionSite::Urethral);
        #[allow(clippy::cast_precision_loss)]
        let a = o.hsv2_a - params.b * t_inf
            + params.d1 * indicator(o.hiv.is_infected())
            + params.d2 * indicator(p.hiv.is_infected())
            + params.g1 * o.num_relationships() as f64
            + params.g2 * p.num_relationships() as f64
            + params.f * indicator(urethral_between_men)
            + params.w * indicator(p.is_woman())
            + params.h * indicator(uses_condom(context, origin, target))
            + params.e1 * p.hiv_b0
            + params.e2 * p.hsv2_b2;
        TimeLimitedHazardFunction::exponential(
            a,
            params.b,
            earliest_birth(context, origin, target) + params.t_max,
        )
    }

    fn diagnosis_hazard(
        context: &Context,
        person: PersonId,
    ) -> Result<TimeLimitedHazardFunction, SimError> {
        sti_diagnosis_hazard::<Self>(context, person, &context.params().hsv2.diagnosis)
    }

    fn on_infection(context: &mut Context, person: PersonId, t: f64) -> Result<(), SimError> {
        let fraction = context.params().person.hsv2_fraction_symptomatic;
        let symptomatic = context.sample_bool(Hsv2Rng, fraction);
        context.person_mut(person).hsv2.symptomatic = symptomatic;
        context.schedule_event(Hsv2ProgressionEvent {
            person,
            infection_time: t,
        })?;
        Ok(())
    }

    /// Treatment does not cure HSV2. It only shortens recurrent shedding.
    fn after_diagnosis(context: &mut Context, person: PersonId, _t: f64) -> Result<(), SimError> {
        if accepts_treatment(context, person) {
            context.person_mut(person).hsv2.treated = true;
            context.log_event("hsv2 treatment", &[person])?;
        }
        Ok(())
    }
}

fn current_stage(context: &Context, person: PersonId, infection_time: f64) -> Option<Hsv2Stage> {
    let record = &context.person(person).hsv2;
    (record.infection_time == Some(infection_time)).then_some(record.stage)
}

/// The end of the primary stage
pub struct Hsv2ProgressionEvent {
    person: PersonId,
    infection_time: f64,
}

impl Invalidatable for Hsv2ProgressionEvent {
    fn is_useless(&self, context: &Context) -> bool {
        current_stage(context, self.person, self.infection_time) != Some(Hsv2Stage::Primary)
    }
}

impl Event for Hsv2ProgressionEvent {
    fn name(&self) -> String {
        "hsv2 progression".to_string()
    }

    fn persons(&self) -> Vec<PersonId> {
        vec![self.person]
    }

    fn timing(&self, context: &Context, _t0: f64) -> Result<Timing, SimError> {
        let primary = &context.params().hsv2.progression.primary;
        Ok(Timing::Delay(
            context.sample(Hsv2Rng, |rng| primary.sample_non_negative(rng))?,
        ))
    }

    fn fire(&self, context: &mut Context, _t: f64) -> Result<(), SimError> {
        context.person_mut(self.person).hsv2.stage = Hsv2Stage::Asymptomatic;
        context.schedule_event(Hsv2RecurrenceEvent {
            person: self.person,
            infection_time: self.infection_time,
            from: Hsv2Stage::Asymptomatic,
        })?;
        Ok(())
    }
}

/// A switch between asymptomatic and recurrent shedding
pub struct Hsv2RecurrenceEvent {
    person: PersonId,
    infection_time: f64,
    from: Hsv2Stage,
}

impl Hsv2RecurrenceEvent {
    /// The share of time spent shedding, raised by HIV and lowered by treatment, spread over the
    /// configured number of cycles per year
    fn duration(&self, context: &Context) -> f64 {
        let shedding = &context.params().hsv2.shedding;
        let person = context.person(self.person);
        let factor = match person.hiv.stage {
            HivStage::Susceptible => 1.0,
            HivStage::Acute | HivStage::Chronic => shedding.hiv_factor,
            HivStage::Aids | HivStage::AidsFinal => shedding.aids_factor,
        };
        let reduction = if person.hsv2.treated && person.hsv2.symptomatic && person.hsv2.diagnosed {
            shedding.treat_factor
        } else {
            1.0
        };
        let shedding_share = factor * shedding.freq * reduction;
        if self.from == Hsv2Stage::Recurrent {
            shedding_share / shedding.cycles
        } else {
            (1.0 - shedding_share) / shedding.cycles
        }
    }
}

impl Invalidatable for Hsv2RecurrenceEvent {
    fn is_useless(&self, context: &Context) -> bool {
        current_stage(context, self.person, self.infection_time) != Some(self.from)
    }
}

impl Event for Hsv2RecurrenceEvent {
    fn name(&self) -> String {
        "hsv2 recurrence".to_string()
    }

    fn persons(&self) -> Vec<PersonId> {
        vec![self.person]
    }

    fn timing(&self, context: &Context, _t0: f64) -> Result<Timing, SimError> {
        Ok(Timing::Delay(self.duration(context)))
    }

    fn fire(&self, context: &mut Context, _t: f64) -> Result<(), SimError> {
        let next = if self.from == Hsv2Stage::Recurrent {
            Hsv2Stage::Asymptomatic
        } else {
            Hsv2Stage::Recurrent
        };
        context.person_mut(self.person).hsv2.stage = next;
        context.schedule_event(Hsv2RecurrenceEvent {
            person: self.person,
            infection_time: self.infection_time,
            from: next,
        })?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod test {
    use super::*;
    use crate::config::ConfigDistribution;
    use crate::disease::{infect, InfectionType};
    use crate::hazard::HazardFunction;
    use crate::population::{Sex, SexualRole};
    use approx::assert_relative_eq;

    fn setup(config: SimConfig) -> Context {
        let mut context = Context::new();
        context.init_random(13);
        context.load_parameters(config).unwrap();
        context
    }

    fn quiet() -> SimConfig {
        let mut config = SimConfig::default();
        config.hsv2.diagnosis.baseline = -50.0;
        config.hsv2.progression.primary = ConfigDistribution::Fixed { value: 0.1 };
        config.hsv2.shedding.freq = 0.2;
        config.hsv2.shedding.cycles = 2.0;
        config
    }

    #[test]
    fn alternates_shedding_after_primary() {
        let mut context = setup(quiet());
        let person = context.add_person(Person::new(Sex::Female, -30.0));
        infect::<Hsv2>(&mut context, person, None, InfectionType::Seed, 0.0).unwrap();
        assert!(context.person(person).hsv2.is_infectious());

        // Primary until 0.1, asymptomatic for 0.4, recurrent for 0.1
        for (t, stage) in [
            (0.05, Hsv2Stage::Primary),
            (0.3, Hsv2Stage::Asymptomatic),
            (0.55, Hsv2Stage::Recurrent),
            (0.8, Hsv2Stage::Asymptomatic),
        ] {
            context.add_plan(t, move |context| {
                assert_eq!(context.person(person).hsv2.stage, stage);
            });
        }
        context.set_end_time(0.9);
        context.execute().unwrap();
        assert!(context.person(person).hsv2.is_infected());
    }

    #[test]
    fn hiv_and_treatment_scale_shedding() {
        let mut config = quiet();
        config.hsv2.shedding.hiv_factor = 2.0;
        config.hsv2.shedding.treat_factor = 0.5;
        let mut context = setup(config);
        let person = context.add_person(Person::new(Sex::Male, -30.0));
        context.person_mut(person).hsv2.stage = Hsv2Stage::Recurrent;
        context.person_mut(person).hsv2.infection_time = Some(0.0);
        let event = Hsv2RecurrenceEvent {
            person,
            infection_time: 0.0,
            from: Hsv2Stage::Recurrent,
        };
        assert_relative_eq!(event.duration(&context), 0.1);

        context.person_mut(person).hiv.stage = HivStage::Chronic;
        assert_relative_eq!(event.duration(&context), 0.2);

        let record = &mut context.person_mut(person).hsv2;
        record.treated = true;
        record.symptomatic = true;
        record.diagnosed = true;
        assert_relative_eq!(event.duration(&context), 0.1);

        let asymptomatic = Hsv2RecurrenceEvent {
            person,
            infection_time: 0.0,
            from: Hsv2Stage::Asymptomatic,
        };
        assert_relative_eq!(asymptomatic.duration(&context), 0.4);
    }

    #[test]
    fn transmission_hazard_terms() {
        let mut config = SimConfig::default();
        config.hsv2.transmission.b = 0.1;
        config.hsv2.transmission.d2 = 1.0;
        config.hsv2.transmission.g1 = 0.5;
        config.hsv2.transmission.f = 2.0;
        config.hsv2.transmission.h = -1.0;
        config.hsv2.transmission.e2 = 3.0;
        let mut context = setup(config);

        let mut origin = Person::new(Sex::Male, -30.0);
        origin.msm = true;
        origin.sexual_role = SexualRole::Insertive;
        origin.hsv2_a = -2.0;
        let origin = context.add_person(origin);
        let mut target = Person::new(Sex::Male, -20.0);
        target.msm = true;
        target.hsv2_b2 = 0.25;
        let target = context.add_person(target);
        context.add_relationship(origin, target, 0.0, true).unwrap();

        let record = &mut context.person_mut(origin).hsv2;
        record.stage = Hsv2Stage::Asymptomatic;
        record.infection_time = Some(1.0);
        record.infection_site = Some(InfectionSite::Urethral);
        context.person_mut(target).hiv.stage = HivStage::Chronic;

        let hazard = Hsv2::transmission_hazard(&context, origin, target).unwrap();
        // -2 - 0.1 + 1 (HIV target) + 0.5 (one relationship) + 2 (urethral) - 1 (condom) + 0.75
        assert_relative_eq!(hazard.inner().a(), 1.15, epsilon = 1e-12);
        assert_relative_eq!(hazard.inner().b(), 0.1);
        assert_relative_eq!(hazard.t_max(), 170.0);
        assert_relative_eq!(hazard.evaluate(0.0), 1.15_f64.exp(), epsilon = 1e-9);
    }

    #[test]
    fn treatment_marks_without_curing() {
        let mut context = setup(quiet());
        let mut person = Person::new(Sex::Female, -30.0);
        person.treat_accept_threshold = 1.0;
        let person = context.add_person(person);
        infect::<Hsv2>(&mut context, person, None, InfectionType::Seed, 0.0).unwrap();
        Hsv2::after_diagnosis(&mut context, person, 0.0).unwrap();
        let record = &context.person(person).hsv2;
        assert!(record.treated);
        assert!(record.is_infected());
    }
}
