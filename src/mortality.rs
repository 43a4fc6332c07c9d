//! Background mortality and the bookkeeping shared by every cause of death.
use log::{debug, info};
use rand_distr::Exp1;

use crate::context::Context;
use crate::define_rng;
use crate::error::SimError;
use crate::event::{Event, Invalidatable, Timing};
use crate::event_log::ContextEventLogExt;
use crate::parameters::ContextParametersExt;
use crate::population::{ContextPopulationExt, PersonId, Sex};
use crate::random::ContextRandomExt;
use crate::relationships::end_relationship;
use crate::scheduler::ContextSchedulerExt;

define_rng!(MortalityRng);

/// Draw an age at death from a Weibull distribution conditioned on being older than `min_age`,
/// using the inverse of the conditional survival function
fn conditional_weibull(scale: f64, shape: f64, min_age: f64, exp_draw: f64) -> f64 {
    let min_age = min_age.max(0.0);
    scale * ((min_age / scale).powf(shape) + exp_draw).powf(1.0 / shape)
}

/// Death from causes unrelated to the simulated diseases
pub struct NormalMortalityEvent {
    person: PersonId,
    time: f64,
}

impl NormalMortalityEvent {
    /// Draw the age at death for `person`, who is known to be alive now
    ///
    /// # Errors
    ///
    /// Returns `SimError::ConfigError` if the Weibull parameters are not positive.
    pub fn new(context: &Context, person: PersonId) -> Result<Self, SimError> {
        let params = &context.params().mortality;
        let p = context.person(person);
        let scale = match p.sex {
            Sex::Male => params.scale,
            Sex::Female => params.scale + params.gender_diff,
        };
        if scale <= 0.0 || params.shape <= 0.0 {
            return Err(SimError::ConfigError(format!(
                "mortality.normal.weibull needs a positive scale and shape, got {scale} and {}",
                params.shape
            )));
        }
        let age = p.age(context.get_current_time());
        let exp_draw: f64 = context.sample_distr(MortalityRng, Exp1);
        Ok(Self {
            person,
            time: p.date_of_birth + conditional_weibull(scale, params.shape, age, exp_draw),
        })
    }
}

impl Invalidatable for NormalMortalityEvent {
    fn is_useless(&self, _context: &Context) -> bool {
        false
    }
}

impl Event for NormalMortalityEvent {
    fn name(&self) -> String {
        "normal mortality".to_string()
    }

    fn persons(&self) -> Vec<PersonId> {
        vec![self.person]
    }

    fn timing(&self, _context: &Context, _t0: f64) -> Result<Timing, SimError> {
        Ok(Timing::At(self.time))
    }

    fn fire(&self, context: &mut Context, t: f64) -> Result<(), SimError> {
        die(context, self.person, t)
    }
}

/// Schedule a background mortality event for every living person
///
/// # Errors
///
/// Returns an error if the mortality parameters are invalid.
pub fn schedule_mortality(context: &mut Context) -> Result<(), SimError> {
    for person in context.living_person_ids() {
        let event = NormalMortalityEvent::new(context, person)?;
        context.schedule_event(event)?;
    }
    Ok(())
}

/// Mark `person` dead at `t`, dissolving their relationships
///
/// Pending events that reference the person become useless. Former partners are marked affected
/// since their partner counts changed. The run is shut down once nobody is left alive.
///
/// # Errors
///
/// Returns an error if a dissolution cannot be recorded or a partner's events cannot be
/// rescheduled.
pub fn die(context: &mut Context, person: PersonId, t: f64) -> Result<(), SimError> {
    debug!("{person:?} died at t={t}");
    context.set_dead(person, t);
    let partners = context.partners(person);
    for partner in &partners {
        context.log_event("dissolution", &[person, *partner])?;
        end_relationship(context, person, *partner, t)?;
    }
    for partner in partners {
        context.mark_affected(partner)?;
    }
    if context.living_count() == 0 {
        info!("nobody left alive at t={t}, stopping");
        context.shutdown();
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod test {
    use super::*;
    use crate::parameters::SimConfig;
    use crate::population::Person;
    use approx::assert_relative_eq;
    use assert_approx_eq::assert_approx_eq;

    fn setup(config: SimConfig) -> Context {
        let mut context = Context::new();
        context.init_random(17);
        context.load_parameters(config).unwrap();
        context
    }

    #[test]
    fn conditional_draw_is_never_younger_than_current_age() {
        for exp_draw in [0.0, 1e-6, 0.5, 3.0] {
            assert!(conditional_weibull(70.0, 4.0, 50.0, exp_draw) >= 50.0 - 1e-9);
        }
        // Unconditioned draws invert the Weibull survival function
        assert_relative_eq!(conditional_weibull(70.0, 4.0, 0.0, 1.0), 70.0);
        assert_approx_eq!(conditional_weibull(10.0, 1.0, 0.0, 2.0), 20.0, 1e-12);
        // Exponential lifetimes are memoryless
        assert_approx_eq!(conditional_weibull(10.0, 1.0, 30.0, 2.0), 50.0, 1e-12);
    }

    #[test]
    fn death_dissolves_relationships_and_stops_an_empty_run() {
        let mut context = setup(SimConfig::default());
        let man = context.add_person(Person::new(Sex::Male, -30.0));
        let woman = context.add_person(Person::new(Sex::Female, -30.0));
        context.add_relationship(man, woman, 0.0, false).unwrap();

        context.add_plan(1.0, move |context| die(context, man, 1.0).unwrap());
        context.add_plan(2.0, move |context| {
            assert!(!context.has_relationship(woman, man));
            die(context, woman, 2.0).unwrap();
        });
        context.add_plan(3.0, |_| panic!("the run should have stopped"));
        context.execute().unwrap();

        assert_eq!(context.person(man).death_time, Some(1.0));
        assert_eq!(context.person(woman).death_time, Some(2.0));
        assert_eq!(context.event_count("dissolution"), 1);
        assert_eq!(context.living_count(), 0);
        context.check_relationship_symmetry().unwrap();
    }

    #[test]
    fn everyone_dies_eventually() {
        let mut config = SimConfig::default();
        config.mortality.scale = 2.0;
        config.mortality.shape = 1.0;
        config.mortality.gender_diff = 1.0;
        let mut context = setup(config);
        for sex in [Sex::Male, Sex::Female, Sex::Female] {
            context.add_person(Person::new(sex, -1.0));
        }
        schedule_mortality(&mut context).unwrap();
        assert_eq!(context.pending_event_count("normal mortality"), 3);
        context.execute().unwrap();

        assert_eq!(context.event_count("normal mortality"), 3);
        for id in context.person_ids() {
            assert!(context.person(id).death_time.unwrap() >= 0.0);
        }
    }

    #[test]
    fn invalid_weibull_is_rejected() {
        let mut config = SimConfig::default();
        config.mortality.scale = 0.0;
        config.mortality.gender_diff = 0.0;
        let mut context = setup(config);
        let person = context.add_person(Person::new(Sex::Male, -1.0));
        assert!(matches!(
            NormalMortalityEvent::new(&context, person),
            Err(SimError::ConfigError(_))
        ));
    }
}
