//! Routine STI testing for people who accept it at debut.
use crate::context::Context;
use crate::define_rng;
use crate::disease::{diagnosed_with_all, screen_all};
use crate::error::SimError;
use crate::event::{Event, Invalidatable, Timing};
use crate::parameters::ContextParametersExt;
use crate::population::{ContextPopulationExt, PersonId};
use crate::random::ContextRandomExt;
use crate::scheduler::ContextSchedulerExt;

define_rng!(ScreeningRng);

pub struct RoutineTestingEvent {
    person: PersonId,
}

impl Invalidatable for RoutineTestingEvent {
    fn is_useless(&self, context: &Context) -> bool {
        let person = context.person(self.person);
        !person.is_sexually_active() || diagnosed_with_all(person)
    }
}

impl Event for RoutineTestingEvent {
    fn name(&self) -> String {
        "routine testing".to_string()
    }

    fn persons(&self) -> Vec<PersonId> {
        vec![self.person]
    }

    fn timing(&self, context: &Context, _t0: f64) -> Result<Timing, SimError> {
        let interval = &context.params().routine_testing.interval;
        let dt = context.sample(ScreeningRng, |rng| interval.sample_non_negative(rng))?;
        Ok(Timing::Delay(dt))
    }

    /// Queue an immediate diagnosis for every undiagnosed infection, then test again after
    /// another interval
    fn fire(&self, context: &mut Context, _t: f64) -> Result<(), SimError> {
        screen_all(context, self.person)?;
        context.schedule_event(RoutineTestingEvent {
            person: self.person,
        })?;
        Ok(())
    }
}

/// Enrol `person` in routine testing if it is enabled and they accept
///
/// # Errors
///
/// Returns an error if the testing interval cannot be sampled.
pub fn schedule_routine_testing(context: &mut Context, person: PersonId) -> Result<(), SimError> {
    let params = &context.params().routine_testing;
    if !params.enabled {
        return Ok(());
    }
    let acceptance = params.acceptance;
    if context.sample_bool(ScreeningRng, acceptance) {
        context.schedule_event(RoutineTestingEvent { person })?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::disease::chlamydia::ChlamydiaStage;
    use crate::event_log::ContextEventLogExt;
    use crate::parameters::SimConfig;
    use crate::population::{Person, Sex};

    fn setup(enabled: bool, acceptance: f64) -> (Context, PersonId) {
        let mut config = SimConfig::default();
        config.routine_testing.enabled = enabled;
        config.routine_testing.acceptance = acceptance;
        config.chlamydia.diagnosis.baseline = -50.0;
        let mut context = Context::new();
        context.init_random(5);
        context.load_parameters(config).unwrap();
        let person = context.add_person(Person::new(Sex::Female, -20.0));
        context.person_mut(person).debut_time = Some(0.0);
        context.person_mut(person).treat_accept_threshold = 0.0;
        (context, person)
    }

    #[test]
    fn disabled_or_refused_testing_is_not_scheduled() {
        let (mut context, person) = setup(false, 1.0);
        schedule_routine_testing(&mut context, person).unwrap();
        assert_eq!(context.pending_event_count("routine testing"), 0);

        let (mut context, person) = setup(true, 0.0);
        schedule_routine_testing(&mut context, person).unwrap();
        assert_eq!(context.pending_event_count("routine testing"), 0);
    }

    #[test]
    fn testing_repeats_and_diagnoses_infections() {
        let (mut context, person) = setup(true, 1.0);
        schedule_routine_testing(&mut context, person).unwrap();
        context.add_plan(0.3, move |context| {
            let record = &mut context.person_mut(person).chlamydia;
            record.stage = ChlamydiaStage::Asymptomatic;
            record.infection_time = Some(0.3);
        });
        context.set_end_time(1.1);
        context.execute().unwrap();

        // Tests at 0.25, 0.5, 0.75 and 1.0 with the default quarterly interval
        assert_eq!(context.event_count("routine testing"), 4);
        assert!(context.person(person).chlamydia.diagnosed);
        assert_eq!(context.event_count("chlamydia diagnosis"), 1);
    }
}
