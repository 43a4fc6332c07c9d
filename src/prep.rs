//! Pre-exposure prophylaxis against HIV.
//!
//! A person becomes eligible for PrEP through their relationships or their recent STI history.
//! Eligible people are offered PrEP, and once on it they are screened at regular intervals
//! until they drop out or are diagnosed with HIV. Independently of eligibility, sexually active
//! people may start PrEP on their own.
use log::trace;

use crate::context::Context;
use crate::define_rng;
use crate::disease::{screen_for, Chlamydia, Gonorrhea, Hiv, Syphilis};
use crate::error::SimError;
use crate::event::{Event, Invalidatable, Timing, HOUR};
use crate::event_log::ContextEventLogExt;
use crate::hazard::TimeLimitedHazardFunction;
use crate::parameters::ContextParametersExt;
use crate::population::{ContextPopulationExt, PersonId};
use crate::random::ContextRandomExt;
use crate::scheduler::ContextSchedulerExt;

define_rng!(PrepRng);

/// STI diagnoses further back than this do not make a person eligible
const RECENT_STI_WINDOW: f64 = 1.0;

/// Whether `person` currently meets the eligibility criteria, regardless of what was recorded
/// before
#[must_use]
pub fn meets_prep_criteria(context: &Context, person: PersonId, t: f64) -> bool {
    let params = &context.params().prep.eligibility;
    let p = context.person(person);
    if !params.enabled || !p.is_sexually_active() || p.hiv.diagnosed {
        return false;
    }
    if params.num_partners > 0 && p.num_relationships() >= params.num_partners {
        return true;
    }
    if params.diagnosed_partner
        && p
            .partners()
            .any(|partner| context.person(partner).hiv.diagnosed)
    {
        return true;
    }
    params.recent_sti
        && p
            .last_sti_diagnosis
            .is_some_and(|last| last >= t - RECENT_STI_WINDOW)
}

/// Take `person` off PrEP, logging it if they were on it
///
/// # Errors
///
/// Returns an error if the stop cannot be logged.
pub fn stop_prep(context: &mut Context, person: PersonId) -> Result<(), SimError> {
    if context.person_mut(person).prep.started.take().is_some() {
        context.log_event("prep stopped", &[person])?;
    }
    Ok(())
}

/// Re-evaluate eligibility and record the change. Returns true if the person has just become
/// eligible. Losing eligibility also ends PrEP.
///
/// # Errors
///
/// Returns an error if stopping PrEP cannot be logged.
pub fn update_prep_eligibility(
    context: &mut Context,
    person: PersonId,
    t: f64,
) -> Result<bool, SimError> {
    let eligible = meets_prep_criteria(context, person, t);
    let was_eligible = context.person(person).prep.is_eligible();
    match (was_eligible, eligible) {
        (false, true) => {
            trace!("{person:?} became eligible for PrEP at t={t}");
            context.person_mut(person).prep.eligible_since = Some(t);
            Ok(true)
        }
        (true, false) => {
            trace!("{person:?} is no longer eligible for PrEP at t={t}");
            context.person_mut(person).prep.eligible_since = None;
            stop_prep(context, person)?;
            Ok(false)
        }
        _ => Ok(false),
    }
}

/// Update eligibility and offer PrEP to a person who has just become eligible. An `immediate`
/// offer follows within the hour, as after a diagnosis.
///
/// # Errors
///
/// Returns an error if the offer cannot be scheduled.
pub fn refresh_prep_eligibility(
    context: &mut Context,
    person: PersonId,
    t: f64,
    immediate: bool,
) -> Result<(), SimError> {
    if !context.is_alive(person) {
        return Ok(());
    }
    if update_prep_eligibility(context, person, t)?
        && !context.person(person).prep.is_on_prep()
        && !context.has_pending_event("prep offered", &[person])
    {
        context.schedule_event(PrepOfferedEvent {
            person,
            immediately: immediate,
        })?;
    }
    Ok(())
}

/// Put `person` on PrEP, with a first screening within the hour and a dropout at some later
/// time
///
/// # Errors
///
/// Returns an error if the screening or dropout cannot be scheduled.
pub fn start_prep(context: &mut Context, person: PersonId, t: f64) -> Result<(), SimError> {
    context.person_mut(person).prep.started = Some(t);
    context.schedule_event(PrepScreeningEvent {
        person,
        started: t,
        immediately: true,
    })?;
    context.schedule_event(PrepDropoutEvent { person, started: t })?;
    Ok(())
}

/// Schedule the spontaneous start of PrEP at debut, if enabled
///
/// # Errors
///
/// Returns an error if the start hazard cannot be computed.
pub fn schedule_prep_start(context: &mut Context, person: PersonId) -> Result<(), SimError> {
    let prep = &context.params().prep;
    if prep.eligibility.enabled && prep.start.enabled {
        context.schedule_event(PrepStartEvent { person })?;
    }
    Ok(())
}

/// PrEP offered to an eligible person, who accepts it with their PrEP acceptance threshold
pub struct PrepOfferedEvent {
    person: PersonId,
    immediately: bool,
}

impl Invalidatable for PrepOfferedEvent {
    fn is_useless(&self, context: &Context) -> bool {
        let p = context.person(self.person);
        !p.is_alive() || p.hiv.diagnosed || !p.prep.is_eligible() || p.prep.is_on_prep()
    }
}

impl Event for PrepOfferedEvent {
    fn name(&self) -> String {
        "prep offered".to_string()
    }

    fn persons(&self) -> Vec<PersonId> {
        vec![self.person]
    }

    /// `A = baseline + numpartnersfactor·P + healthseekingpropensityfactor·H - beta·t_eligible`,
    /// `B = beta`, limited to `dob + t_max`
    fn timing(&self, context: &Context, _t0: f64) -> Result<Timing, SimError> {
        if self.immediately {
            return Ok(Timing::Delay(HOUR));
        }
        let params = &context.params().prep.offered;
        let p = context.person(self.person);
        let t_eligible = p
            .prep
            .eligible_since
            .unwrap_or_else(|| context.get_current_time());
        #[allow(clippy::cast_precision_loss)]
        let a = params.baseline
            + params.num_partners_factor * p.num_relationships() as f64
            + params.health_seeking_propensity_factor * p.health_seeking_propensity
            - params.beta * t_eligible;
        Ok(Timing::Hazard(TimeLimitedHazardFunction::exponential(
            a,
            params.beta,
            p.date_of_birth + params.t_max,
        )?))
    }

    fn fire(&self, context: &mut Context, t: f64) -> Result<(), SimError> {
        let threshold = context.person(self.person).prep_accept_threshold;
        if context.sample_uniform(PrepRng) < threshold {
            start_prep(context, self.person, t)?;
            context.log_event("prep start", &[self.person])?;
        } else {
            context.schedule_event(PrepOfferedEvent {
                person: self.person,
                immediately: false,
            })?;
        }
        Ok(())
    }
}

/// Starting PrEP without having been offered it
pub struct PrepStartEvent {
    person: PersonId,
}

impl Invalidatable for PrepStartEvent {
    fn is_useless(&self, context: &Context) -> bool {
        let p = context.person(self.person);
        !p.is_sexually_active() || p.hiv.diagnosed || p.prep.is_on_prep()
    }
}

impl Event for PrepStartEvent {
    fn name(&self) -> String {
        "prep start".to_string()
    }

    fn persons(&self) -> Vec<PersonId> {
        vec![self.person]
    }

    /// `A = baseline - beta·t_debut`, `B = beta`, limited to `dob + t_max`
    fn timing(&self, context: &Context, _t0: f64) -> Result<Timing, SimError> {
        let params = &context.params().prep.start;
        let p = context.person(self.person);
        let t_debut = p.debut_time.unwrap_or_else(|| context.get_current_time());
        Ok(Timing::Hazard(TimeLimitedHazardFunction::exponential(
            params.baseline - params.beta * t_debut,
            params.beta,
            p.date_of_birth + params.t_max,
        )?))
    }

    fn fire(&self, context: &mut Context, t: f64) -> Result<(), SimError> {
        start_prep(context, self.person, t)
    }
}

/// A screening visit while on the PrEP course that started at `started`
pub struct PrepScreeningEvent {
    person: PersonId,
    started: f64,
    immediately: bool,
}

impl Invalidatable for PrepScreeningEvent {
    fn is_useless(&self, context: &Context) -> bool {
        let p = context.person(self.person);
        !p.is_alive() || p.hiv.diagnosed || p.prep.started != Some(self.started)
    }
}

impl Event for PrepScreeningEvent {
    fn name(&self) -> String {
        "prep screening".to_string()
    }

    fn persons(&self) -> Vec<PersonId> {
        vec![self.person]
    }

    fn timing(&self, context: &Context, _t0: f64) -> Result<Timing, SimError> {
        if self.immediately {
            return Ok(Timing::Delay(HOUR));
        }
        let interval = &context.params().prep.screening.interval;
        let dt = context.sample(PrepRng, |rng| interval.sample_non_negative(rng))?;
        Ok(Timing::Delay(dt))
    }

    /// Queue an immediate diagnosis for HIV and the bacterial STIs, then screen again unless
    /// the person turned out to carry HIV
    fn fire(&self, context: &mut Context, _t: f64) -> Result<(), SimError> {
        screen_for::<Hiv>(context, self.person)?;
        screen_for::<Chlamydia>(context, self.person)?;
        screen_for::<Gonorrhea>(context, self.person)?;
        screen_for::<Syphilis>(context, self.person)?;
        if !context.person(self.person).hiv.is_infected() {
            context.schedule_event(PrepScreeningEvent {
                person: self.person,
                started: self.started,
                immediately: false,
            })?;
        }
        Ok(())
    }
}

/// The end of the PrEP course that started at `started`
pub struct PrepDropoutEvent {
    person: PersonId,
    started: f64,
}

impl Invalidatable for PrepDropoutEvent {
    fn is_useless(&self, context: &Context) -> bool {
        let p = context.person(self.person);
        !p.is_alive() || p.prep.started != Some(self.started)
    }
}

impl Event for PrepDropoutEvent {
    fn name(&self) -> String {
        "prep dropout".to_string()
    }

    fn persons(&self) -> Vec<PersonId> {
        vec![self.person]
    }

    fn timing(&self, context: &Context, _t0: f64) -> Result<Timing, SimError> {
        let interval = &context.params().prep.dropout.interval;
        let dt = context.sample(PrepRng, |rng| interval.sample_non_negative(rng))?;
        Ok(Timing::Delay(dt))
    }

    fn fire(&self, context: &mut Context, _t: f64) -> Result<(), SimError> {
        context.person_mut(self.person).prep.started = None;
        if context.person(self.person).prep.is_eligible() {
            context.schedule_event(PrepOfferedEvent {
                person: self.person,
                immediately: false,
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod test {
    use super::*;
    use crate::config::ConfigDistribution;
    use crate::disease::chlamydia::ChlamydiaStage;
    use crate::disease::hiv::HivStage;
    use crate::hazard::HazardFunction;
    use crate::parameters::SimConfig;
    use crate::population::{Person, Sex};
    use approx::assert_relative_eq;

    fn config() -> SimConfig {
        let mut config = SimConfig::default();
        config.prep.eligibility.enabled = true;
        config.prep.eligibility.num_partners = 2;
        config.hiv.diagnosis.baseline = -50.0;
        config.chlamydia.diagnosis.baseline = -50.0;
        config
    }

    fn setup(config: SimConfig) -> Context {
        let mut context = Context::new();
        context.init_random(17);
        context.load_parameters(config).unwrap();
        context
    }

    fn active(context: &mut Context, sex: Sex) -> PersonId {
        let person = context.add_person(Person::new(sex, -30.0));
        context.person_mut(person).debut_time = Some(0.0);
        person
    }

    #[test]
    fn eligibility_criteria() {
        let mut context = setup(config());
        let man = active(&mut context, Sex::Male);
        let first = active(&mut context, Sex::Female);
        let second = active(&mut context, Sex::Female);
        assert!(!meets_prep_criteria(&context, man, 0.0));

        context.add_relationship(man, first, 0.0, false).unwrap();
        assert!(!meets_prep_criteria(&context, man, 0.0));
        context.add_relationship(man, second, 0.0, false).unwrap();
        assert!(meets_prep_criteria(&context, man, 0.0));

        // A diagnosed partner is enough on its own
        context.person_mut(man).hiv.diagnosed = true;
        assert!(meets_prep_criteria(&context, first, 0.0));
        assert!(!meets_prep_criteria(&context, man, 0.0));

        context.person_mut(second).last_sti_diagnosis = Some(1.0);
        assert!(meets_prep_criteria(&context, second, 1.5));
        context.person_mut(man).hiv.diagnosed = false;
        context.remove_relationship(man, second);
        assert!(!meets_prep_criteria(&context, second, 2.5));
    }

    #[test]
    fn disabled_prep_makes_no_one_eligible() {
        let mut config = config();
        config.prep.eligibility.enabled = false;
        let mut context = setup(config);
        let person = active(&mut context, Sex::Female);
        context.person_mut(person).last_sti_diagnosis = Some(0.0);
        assert!(!meets_prep_criteria(&context, person, 0.0));
    }

    #[test]
    fn becoming_eligible_schedules_one_offer() {
        let mut context = setup(config());
        let person = active(&mut context, Sex::Female);
        context.person_mut(person).last_sti_diagnosis = Some(0.0);
        refresh_prep_eligibility(&mut context, person, 0.5, false).unwrap();
        assert_eq!(context.person(person).prep.eligible_since, Some(0.5));
        assert!(context.has_pending_event("prep offered", &[person]));

        refresh_prep_eligibility(&mut context, person, 0.6, false).unwrap();
        assert_eq!(context.pending_event_count("prep offered"), 1);
        assert_eq!(context.person(person).prep.eligible_since, Some(0.5));
    }

    #[test]
    fn losing_eligibility_stops_prep() {
        let mut context = setup(config());
        let person = active(&mut context, Sex::Female);
        context.person_mut(person).last_sti_diagnosis = Some(0.0);
        assert!(update_prep_eligibility(&mut context, person, 0.0).unwrap());
        start_prep(&mut context, person, 0.0).unwrap();

        assert!(!update_prep_eligibility(&mut context, person, 2.0).unwrap());
        assert!(!context.person(person).prep.is_on_prep());
        assert!(!context.person(person).prep.is_eligible());
        assert_eq!(context.event_count("prep stopped"), 1);
    }

    #[test]
    fn offer_hazard_coefficients() {
        let mut config = config();
        config.prep.offered.baseline = -1.0;
        config.prep.offered.num_partners_factor = 0.5;
        config.prep.offered.health_seeking_propensity_factor = 2.0;
        config.prep.offered.beta = 0.1;
        let mut context = setup(config);
        let person = active(&mut context, Sex::Male);
        let partner = active(&mut context, Sex::Female);
        context.add_relationship(person, partner, 0.0, false).unwrap();
        context.person_mut(person).health_seeking_propensity = 0.25;
        context.person_mut(person).prep.eligible_since = Some(3.0);

        let event = PrepOfferedEvent {
            person,
            immediately: false,
        };
        let Timing::Hazard(hazard) = event.timing(&context, 0.0).unwrap() else {
            panic!("A regular offer should be hazard driven");
        };
        assert_relative_eq!(hazard.inner().a(), -1.0 + 0.5 + 0.5 - 0.3, epsilon = 1e-12);
        assert_relative_eq!(hazard.inner().b(), 0.1);
        assert_eq!(hazard.t_max(), 170.0);
    }

    #[test]
    fn accepted_offer_starts_screening_and_dropout() {
        let mut context = setup(config());
        let person = active(&mut context, Sex::Female);
        context.person_mut(person).prep_accept_threshold = 1.0;
        context.person_mut(person).prep.eligible_since = Some(0.0);
        context
            .schedule_event(PrepOfferedEvent {
                person,
                immediately: true,
            })
            .unwrap();
        context.set_end_time(0.1);
        context.execute().unwrap();

        assert_eq!(context.person(person).prep.started, Some(HOUR));
        assert_eq!(context.event_count("prep start"), 1);
        assert_eq!(context.event_count("prep screening"), 1);
        assert!(context.has_pending_event("prep screening", &[person]));
        assert!(context.has_pending_event("prep dropout", &[person]));
    }

    #[test]
    fn declined_offer_is_repeated() {
        let mut context = setup(config());
        let person = active(&mut context, Sex::Female);
        context.person_mut(person).prep_accept_threshold = 0.0;
        context.person_mut(person).prep.eligible_since = Some(0.0);
        context
            .schedule_event(PrepOfferedEvent {
                person,
                immediately: true,
            })
            .unwrap();
        context.set_end_time(2.0 * HOUR);
        context.execute().unwrap();

        assert!(!context.person(person).prep.is_on_prep());
        assert_eq!(context.event_count("prep offered"), 1);
        assert!(context.has_pending_event("prep offered", &[person]));
    }

    #[test]
    fn screening_diagnoses_and_repeats_while_negative() {
        let mut config = config();
        config.prep.dropout.interval = ConfigDistribution::Fixed { value: 50.0 };
        let mut context = setup(config);
        let person = active(&mut context, Sex::Female);
        context.person_mut(person).treat_accept_threshold = 0.0;
        context.person_mut(person).chlamydia.stage = ChlamydiaStage::Asymptomatic;
        context.person_mut(person).chlamydia.infection_time = Some(0.0);
        start_prep(&mut context, person, 0.0).unwrap();
        context.set_end_time(0.6);
        context.execute().unwrap();

        // Within the hour, then quarterly at the default interval
        assert_eq!(context.event_count("prep screening"), 3);
        assert!(context.person(person).chlamydia.diagnosed);
        assert_eq!(context.event_count("chlamydia diagnosis"), 1);
        assert!(context.has_pending_event("prep screening", &[person]));
    }

    #[test]
    fn screening_stops_once_hiv_is_found() {
        let mut context = setup(config());
        let person = active(&mut context, Sex::Female);
        context.person_mut(person).hiv.stage = HivStage::Chronic;
        start_prep(&mut context, person, 0.0).unwrap();
        context.set_end_time(1.0);
        context.execute().unwrap();

        assert_eq!(context.event_count("prep screening"), 1);
        assert!(context.person(person).hiv.diagnosed);
        assert!(!context.person(person).prep.is_on_prep());
        assert_eq!(context.event_count("prep stopped"), 1);
        assert_eq!(context.pending_event_count("prep screening"), 0);
        assert_eq!(context.pending_event_count("prep dropout"), 0);
    }

    #[test]
    fn dropout_reoffers_to_eligible_people() {
        let mut config = config();
        config.prep.dropout.interval = ConfigDistribution::Fixed { value: 0.1 };
        config.prep.screening.interval = ConfigDistribution::Fixed { value: 1.0 };
        config.prep.offered.baseline = -50.0;
        let mut context = setup(config);
        let eligible = active(&mut context, Sex::Female);
        let other = active(&mut context, Sex::Male);
        context.person_mut(eligible).prep.eligible_since = Some(0.0);
        start_prep(&mut context, eligible, 0.0).unwrap();
        start_prep(&mut context, other, 0.0).unwrap();
        context.set_end_time(0.2);
        context.execute().unwrap();

        assert_eq!(context.event_count("prep dropout"), 2);
        assert!(!context.person(eligible).prep.is_on_prep());
        assert!(!context.person(other).prep.is_on_prep());
        assert!(context.has_pending_event("prep offered", &[eligible]));
        assert!(!context.has_pending_event("prep offered", &[other]));
        // The screenings of the ended course are dropped
        assert_eq!(context.pending_event_count("prep screening"), 0);
    }

    #[test]
    fn spontaneous_start() {
        let mut config = config();
        config.prep.start.enabled = true;
        config.prep.start.baseline = 2.0;
        config.prep.dropout.interval = ConfigDistribution::Fixed { value: 50.0 };
        let mut context = setup(config);
        let person = active(&mut context, Sex::Male);
        schedule_prep_start(&mut context, person).unwrap();
        let event = PrepStartEvent { person };
        let Timing::Hazard(hazard) = event.timing(&context, 0.0).unwrap() else {
            panic!("Starting PrEP should be hazard driven");
        };
        assert_relative_eq!(hazard.evaluate(1.0), 2f64.exp(), max_relative = 1e-12);

        context.set_end_time(10.0);
        context.add_plan(9.0, move |context| {
            assert!(context.person(person).prep.is_on_prep());
        });
        context.execute().unwrap();
        assert_eq!(context.event_count("prep start"), 1);
    }
}
