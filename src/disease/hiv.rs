//! HIV: staged progression towards death by AIDS, driven by a set-point viral load drawn at
//! infection.
//!
//! The viral load fixes the AIDS mortality time `t_inf + C·V_sp^k`. The AIDS stages are timed
//! backwards from it, and the stage multiplies the viral load used by the transmission hazard.
use log::debug;
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::define_rng;
use crate::error::SimError;
use crate::event::{Event, Invalidatable, Timing, HOUR};
use crate::hazard::TimeLimitedHazardFunction;
use crate::mortality::die;
use crate::parameters::{ContextParametersExt, OutbreakParams, SimConfig};
use crate::population::{ContextPopulationExt, Person, PersonId, Sex, SexualRole};
use crate::prep::{refresh_prep_eligibility, stop_prep, update_prep_eligibility};
use crate::random::ContextRandomExt;
use crate::scheduler::ContextSchedulerExt;

use super::seeding::pick_from_pool;
use super::{
    diagnosed_partners, earliest_birth, indicator, uses_condom, DiagnosisEvent, Disease,
    DiseaseRecord, DiseaseStage,
};

define_rng!(HivRng);

/// How far past "now" an AIDS stage whose computed time has already gone by is placed
const STAGE_CLAMP: f64 = 1e-8;

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
)]
pub enum HivStage {
    #[default]
    Susceptible,
    Acute,
    Chronic,
    Aids,
    AidsFinal,
}

impl DiseaseStage for HivStage {
    fn is_infected(self) -> bool {
        self != HivStage::Susceptible
    }

    fn is_infectious(self) -> bool {
        self.is_infected()
    }
}

/// Drawn once per infection
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HivProfile {
    pub set_point_viral_load: f64,
    pub aids_death_time: f64,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Hiv;

/// The set-point viral load scaled by the stage multiplier
#[must_use]
pub fn current_viral_load(context: &Context, person: PersonId) -> Option<f64> {
    let p = context.person(person);
    let profile = p.hiv_profile?;
    let stages = &context.params().hiv.stages;
    let factor = match p.hiv.stage {
        HivStage::Susceptible => return None,
        HivStage::Acute => stages.acute_factor,
        HivStage::Chronic => 1.0,
        HivStage::Aids => stages.aids_factor,
        HivStage::AidsFinal => stages.final_aids_factor,
    };
    Some(profile.set_point_viral_load * factor)
}

fn ulcerative_sti(person: &Person) -> bool {
    person.syphilis.is_infected() || person.hsv2.is_infected()
}

fn non_ulcerative_sti(person: &Person) -> bool {
    person.chlamydia.is_infected() || person.gonorrhea.is_infected()
}

impl Disease for Hiv {
    type Stage = HivStage;
    const NAME: &'static str = "hiv";
    const COUNTS_AS_STI: bool = false;

    fn record(person: &Person) -> &DiseaseRecord<HivStage> {
        &person.hiv
    }

    fn record_mut(person: &mut Person) -> &mut DiseaseRecord<HivStage> {
        &mut person.hiv
    }

    fn outbreak(params: &SimConfig) -> &OutbreakParams {
        &params.hiv.outbreak
    }

    fn initial_stage() -> HivStage {
        HivStage::Acute
    }

    /// `A = a + b·V^(-c) + d1·P_origin + d2·P_target + e1..e4·co-infection + h·condom
    /// + r·R + b0_target`, `B = 0`
    ///
    /// `R` marks a male target in the receptive role with a male origin.
    fn transmission_hazard(
        context: &Context,
        origin: PersonId,
        target: PersonId,
    ) -> Result<TimeLimitedHazardFunction, SimError> {
        let params = &context.params().hiv.transmission;
        let viral_load = current_viral_load(context, origin).ok_or_else(|| {
            SimError::InvariantViolation(format!("{origin:?} has no HIV viral load"))
        })?;
        let o = context.person(origin);
        let p = context.person(target);
        let receptive =
            o.sex == Sex::Male && p.sex == Sex::Male && p.sexual_role == SexualRole::Receptive;
        #[allow(clippy::cast_precision_loss)]
        let a = params.a
            + params.b * viral_load.powf(-params.c)
            + params.d1 * o.num_relationships() as f64
            + params.d2 * p.num_relationships() as f64
            + params.e1 * indicator(ulcerative_sti(o))
            + params.e2 * indicator(ulcerative_sti(p))
            + params.e3 * indicator(non_ulcerative_sti(o))
            + params.e4 * indicator(non_ulcerative_sti(p))
            + params.h * indicator(uses_condom(context, origin, target))
            + params.r * indicator(receptive)
            + params.i * indicator(p.prep.is_on_prep())
            + p.hiv_b0;
        TimeLimitedHazardFunction::exponential(
            a,
            0.0,
            earliest_birth(context, origin, target) + params.t_max,
        )
    }

    /// `A = baseline - agefactor·dob + genderfactor·W + diagpartnersfactor·D
    /// + numpartnersfactor·P + isdiagnosedfactor·prior + healthseekingpropensityfactor·H
    /// + HSV2factor·HSV2 - beta·t_inf`, `B = agefactor + beta`
    fn diagnosis_hazard(
        context: &Context,
        person: PersonId,
    ) -> Result<TimeLimitedHazardFunction, SimError> {
        let params = &context.params().hiv.diagnosis;
        let p = context.person(person);
        let t_inf = p
            .hiv
            .infection_time
            .unwrap_or_else(|| context.get_current_time());
        #[allow(clippy::cast_precision_loss)]
        let a = params.baseline - params.age_factor * p.date_of_birth
            + params.gender_factor * indicator(p.is_woman())
            + params.diag_partners_factor * diagnosed_partners::<Hiv>(context, person) as f64
            + params.num_partners_factor * p.num_relationships() as f64
            + params.is_diagnosed_factor * indicator(p.hiv.diagnosis_count > 0)
            + params.health_seeking_propensity_factor * p.health_seeking_propensity
            + params.hsv2_factor * indicator(p.hsv2.is_infected())
            - params.beta * t_inf;
        TimeLimitedHazardFunction::exponential(
            a,
            params.age_factor + params.beta,
            p.date_of_birth + params.t_max,
        )
    }

    fn on_infection(context: &mut Context, person: PersonId, t: f64) -> Result<(), SimError> {
        let dist = &context.params().person.vsp_log10;
        let vsp = 10f64.powf(context.sample(HivRng, |rng| dist.sample(rng))?);
        let mortality = &context.params().hiv.aids_mortality;
        let survival = mortality.c * vsp.powf(mortality.k);
        debug!("{person:?} infected with HIV, set point {vsp:.0}, survival {survival:.2}");
        context.person_mut(person).hiv_profile = Some(HivProfile {
            set_point_viral_load: vsp,
            aids_death_time: t + survival,
        });
        context.schedule_event(HivStageEvent::new(person, t, HivStage::Chronic))?;
        context.schedule_event(AidsMortalityEvent { person })?;
        Ok(())
    }

    /// End PrEP, and re-evaluate the PrEP eligibility of partners not known to be infected
    fn after_diagnosis(context: &mut Context, person: PersonId, t: f64) -> Result<(), SimError> {
        stop_prep(context, person)?;
        update_prep_eligibility(context, person, t)?;
        for partner in context.partners(person) {
            if !context.person(partner).hiv.is_infected() {
                refresh_prep_eligibility(context, partner, t, true)?;
            }
        }
        Ok(())
    }

    /// Move rounded fractions of the seeded people straight into later stages, each group
    /// distinct, then diagnose a separately drawn fraction
    fn after_seeding(context: &mut Context, seeded: &[PersonId], t: f64) -> Result<(), SimError> {
        let fractions = context.params().hiv.seed_stages.clone();
        #[allow(
            clippy::cast_precision_loss,
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss
        )]
        let count = |fraction: f64| (fraction * seeded.len() as f64).round() as usize;

        let mut pool = seeded.to_vec();
        for (stage, fraction) in [
            (HivStage::Chronic, fractions.fraction_chronic),
            (HivStage::Aids, fractions.fraction_aids),
            (HivStage::AidsFinal, fractions.fraction_final_aids),
        ] {
            for person in pick_from_pool(context, &mut pool, count(fraction)) {
                context.schedule_event(HivStageEvent::immediate(person, t, stage))?;
            }
        }

        let mut pool = seeded.to_vec();
        for person in pick_from_pool(context, &mut pool, count(fractions.fraction_diagnosed)) {
            context.schedule_event(DiagnosisEvent::<Hiv>::immediate(person))?;
        }
        Ok(())
    }
}

/// Entry into `to`, which schedules the stage after it
pub struct HivStageEvent {
    person: PersonId,
    infection_time: f64,
    to: HivStage,
    immediately: bool,
}

impl HivStageEvent {
    #[must_use]
    pub fn new(person: PersonId, infection_time: f64, to: HivStage) -> Self {
        Self {
            person,
            infection_time,
            to,
            immediately: false,
        }
    }

    /// A stage change one hour from now, used when seeding people in later stages
    #[must_use]
    pub fn immediate(person: PersonId, infection_time: f64, to: HivStage) -> Self {
        Self {
            immediately: true,
            ..Self::new(person, infection_time, to)
        }
    }
}

impl Invalidatable for HivStageEvent {
    fn is_useless(&self, context: &Context) -> bool {
        let record = &context.person(self.person).hiv;
        record.infection_time != Some(self.infection_time) || record.stage >= self.to
    }
}

impl Event for HivStageEvent {
    fn name(&self) -> String {
        match self.to {
            HivStage::Chronic => "hiv chronic stage",
            HivStage::Aids => "hiv aids stage",
            _ => "hiv final aids stage",
        }
        .to_string()
    }

    fn persons(&self) -> Vec<PersonId> {
        vec![self.person]
    }

    fn timing(&self, context: &Context, t0: f64) -> Result<Timing, SimError> {
        if self.immediately {
            return Ok(Timing::Delay(HOUR));
        }
        let stages = &context.params().hiv.stages;
        let death = context
            .person(self.person)
            .hiv_profile
            .map(|profile| profile.aids_death_time)
            .ok_or_else(|| {
                SimError::InvariantViolation(format!("{:?} has no HIV profile", self.person))
            })?;
        let t = match self.to {
            HivStage::Chronic => return Ok(Timing::At(self.infection_time + stages.acute_duration)),
            HivStage::Aids => death - stages.aids_start,
            HivStage::AidsFinal => death - stages.aids_final,
            HivStage::Susceptible | HivStage::Acute => {
                return Err(SimError::InvariantViolation(format!(
                    "no HIV stage event leads to {}",
                    self.to
                )))
            }
        };
        Ok(Timing::At(if t <= t0 { t0 + STAGE_CLAMP } else { t }))
    }

    fn fire(&self, context: &mut Context, _t: f64) -> Result<(), SimError> {
        context.person_mut(self.person).hiv.stage = self.to;
        let next = match self.to {
            HivStage::Chronic => HivStage::Aids,
            HivStage::Aids => HivStage::AidsFinal,
            _ => return Ok(()),
        };
        context.schedule_event(HivStageEvent::new(
            self.person,
            self.infection_time,
            next,
        ))?;
        Ok(())
    }
}

/// Death at the AIDS mortality time fixed at infection
pub struct AidsMortalityEvent {
    person: PersonId,
}

impl Invalidatable for AidsMortalityEvent {
    fn is_useless(&self, context: &Context) -> bool {
        context.person(self.person).hiv_profile.is_none()
    }
}

impl Event for AidsMortalityEvent {
    fn name(&self) -> String {
        "aids mortality".to_string()
    }

    fn persons(&self) -> Vec<PersonId> {
        vec![self.person]
    }

    fn timing(&self, context: &Context, _t0: f64) -> Result<Timing, SimError> {
        let profile = context.person(self.person).hiv_profile.ok_or_else(|| {
            SimError::InvariantViolation(format!("{:?} has no HIV profile", self.person))
        })?;
        Ok(Timing::At(profile.aids_death_time))
    }

    fn fire(&self, context: &mut Context, t: f64) -> Result<(), SimError> {
        die(context, self.person, t)
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod test {
    use super::*;
    use crate::config::ConfigDistribution;
    use crate::disease::{infect, schedule_outbreak, InfectionType};
    use crate::event_log::ContextEventLogExt;
    use crate::parameters::SeedType;
    use approx::assert_relative_eq;

    fn config() -> SimConfig {
        let mut config = SimConfig::default();
        config.hiv.outbreak.seed.time = -1.0;
        config.hiv.diagnosis.baseline = -50.0;
        config.person.vsp_log10 = ConfigDistribution::Fixed { value: 4.0 };
        config
    }

    fn setup(config: SimConfig) -> Context {
        let mut context = Context::new();
        context.init_random(4);
        context.load_parameters(config).unwrap();
        context
    }

    #[test]
    fn profile_sets_mortality_time() {
        let mut config = config();
        config.hiv.aids_mortality.c = 100.0;
        config.hiv.aids_mortality.k = -0.5;
        let mut context = setup(config);
        let person = context.add_person(Person::new(Sex::Male, -30.0));
        infect::<Hiv>(&mut context, person, None, InfectionType::Seed, 0.0).unwrap();
        let profile = context.person(person).hiv_profile.unwrap();
        assert_relative_eq!(profile.set_point_viral_load, 1e4);
        assert_relative_eq!(profile.aids_death_time, 1.0);
        assert_eq!(context.pending_event_count("aids mortality"), 1);
        assert_eq!(context.pending_event_count("hiv chronic stage"), 1);
    }

    #[test]
    fn stages_then_death_with_clamped_aids_stage() {
        let mut config = config();
        config.hiv.aids_mortality.c = 1.0;
        config.hiv.aids_mortality.k = 0.0;
        let mut context = setup(config);
        let person = context.add_person(Person::new(Sex::Female, -30.0));
        let other = context.add_person(Person::new(Sex::Male, -30.0));
        infect::<Hiv>(&mut context, person, None, InfectionType::Seed, 0.0).unwrap();

        // Death at 1.0: the AIDS stage would start at -0.25 and is clamped to just after the
        // chronic stage begins at 0.25
        context.add_plan(0.2, move |context| {
            assert_eq!(context.person(person).hiv.stage, HivStage::Acute);
        });
        context.add_plan(0.26, move |context| {
            assert_eq!(context.person(person).hiv.stage, HivStage::Aids);
        });
        context.add_plan(0.75, move |context| {
            assert_eq!(context.person(person).hiv.stage, HivStage::AidsFinal);
        });
        context.execute().unwrap();

        assert_eq!(context.person(person).death_time, Some(1.0));
        assert!(context.is_alive(other));
        assert_eq!(context.event_count("hiv chronic stage"), 1);
        assert_eq!(context.event_count("hiv aids stage"), 1);
        assert_eq!(context.event_count("hiv final aids stage"), 1);
        assert_eq!(context.event_count("aids mortality"), 1);
    }

    #[test]
    fn transmission_hazard_follows_viral_load() {
        let mut config = config();
        config.hiv.transmission.a = -1.0;
        config.hiv.transmission.b = -2.0;
        config.hiv.transmission.c = 0.25;
        config.hiv.transmission.d1 = 0.5;
        config.hiv.transmission.h = -1.0;
        let mut context = setup(config);
        let origin = context.add_person(Person::new(Sex::Male, -30.0));
        let target = context.add_person(Person::new(Sex::Female, -40.0));
        context.add_relationship(origin, target, 0.0, true).unwrap();
        context.person_mut(origin).hiv.stage = HivStage::Chronic;
        context.person_mut(origin).hiv_profile = Some(HivProfile {
            set_point_viral_load: 1e4,
            aids_death_time: 10.0,
        });

        let hazard = Hiv::transmission_hazard(&context, origin, target).unwrap();
        // -1 - 2·0.1 + 0.5 - 1
        assert_relative_eq!(hazard.inner().a(), -1.7, epsilon = 1e-12);
        assert_eq!(hazard.inner().b(), 0.0);
        assert_eq!(hazard.t_max(), 160.0);

        context.person_mut(origin).hiv.stage = HivStage::Acute;
        let acute = Hiv::transmission_hazard(&context, origin, target).unwrap();
        assert_relative_eq!(
            acute.inner().a(),
            -1.5 - 2.0 * 1e5_f64.powf(-0.25),
            epsilon = 1e-12
        );
    }

    #[test]
    fn prep_lowers_the_hazard_of_the_target() {
        let mut config = config();
        config.hiv.transmission.i = -3.0;
        let mut context = setup(config);
        let origin = context.add_person(Person::new(Sex::Male, -30.0));
        let target = context.add_person(Person::new(Sex::Female, -30.0));
        context.add_relationship(origin, target, 0.0, false).unwrap();
        context.person_mut(origin).hiv.stage = HivStage::Chronic;
        context.person_mut(origin).hiv_profile = Some(HivProfile {
            set_point_viral_load: 1e4,
            aids_death_time: 10.0,
        });

        let without = Hiv::transmission_hazard(&context, origin, target).unwrap();
        context.person_mut(target).prep.started = Some(0.0);
        let with = Hiv::transmission_hazard(&context, origin, target).unwrap();
        assert_relative_eq!(with.inner().a(), without.inner().a() - 3.0, epsilon = 1e-12);
    }

    #[test]
    fn diagnosis_ends_prep_and_makes_partners_eligible() {
        let mut config = config();
        config.prep.eligibility.enabled = true;
        config.prep.offered.baseline = -50.0;
        let mut context = setup(config);
        let person = context.add_person(Person::new(Sex::Male, -30.0));
        let partner = context.add_person(Person::new(Sex::Female, -30.0));
        for id in [person, partner] {
            context.person_mut(id).debut_time = Some(0.0);
        }
        context.add_relationship(person, partner, 0.0, false).unwrap();
        context.person_mut(person).hiv.stage = HivStage::Chronic;
        context.person_mut(person).prep.started = Some(0.0);
        context.person_mut(partner).prep_accept_threshold = 0.0;

        context
            .schedule_event(DiagnosisEvent::<Hiv>::immediate(person))
            .unwrap();
        context.set_end_time(0.01);
        context.execute().unwrap();

        assert!(context.person(person).hiv.diagnosed);
        assert!(!context.person(person).prep.is_on_prep());
        assert_eq!(context.event_count("prep stopped"), 1);
        assert!(context.person(partner).prep.is_eligible());
        assert_eq!(context.event_count("prep offered"), 1);
        assert!(context.has_pending_event("prep offered", &[partner]));
    }

    #[test]
    fn diagnosis_hazard_terms() {
        let mut config = config();
        config.hiv.diagnosis.baseline = -2.0;
        config.hiv.diagnosis.age_factor = 0.1;
        config.hiv.diagnosis.gender_factor = 0.5;
        config.hiv.diagnosis.hsv2_factor = 1.0;
        let mut context = setup(config);
        let person = context.add_person(Person::new(Sex::Female, -20.0));
        context.person_mut(person).hiv.stage = HivStage::Chronic;
        context.person_mut(person).hiv.infection_time = Some(0.0);
        context.person_mut(person).hsv2.stage = crate::disease::hsv2::Hsv2Stage::Asymptomatic;
        let hazard = Hiv::diagnosis_hazard(&context, person).unwrap();
        // -2 + 0.1·20 + 0.5 + 1
        assert_relative_eq!(hazard.inner().a(), 1.5, epsilon = 1e-12);
        assert_relative_eq!(hazard.inner().b(), 0.1);
        assert_relative_eq!(hazard.t_max(), 180.0);
    }

    #[test]
    fn seeding_moves_distinct_people_into_later_stages() {
        let mut config = config();
        config.hiv.outbreak.seed.time = 0.0;
        config.hiv.outbreak.seed.seed_type = SeedType::Amount;
        config.hiv.outbreak.seed.amount = 10;
        config.hiv.seed_stages.fraction_chronic = 0.2;
        config.hiv.seed_stages.fraction_aids = 0.3;
        config.hiv.seed_stages.fraction_diagnosed = 0.5;
        config.hiv.diagnosis.baseline = -50.0;
        let mut context = setup(config);
        for _ in 0..10 {
            context.add_person(Person::new(Sex::Male, -30.0));
        }
        schedule_outbreak::<Hiv>(&mut context).unwrap();
        context.set_end_time(0.01);
        context.execute().unwrap();

        let stage_count = |stage: HivStage| {
            context
                .person_ids()
                .into_iter()
                .filter(|id| context.person(*id).hiv.stage == stage)
                .count()
        };
        assert_eq!(stage_count(HivStage::Acute), 5);
        assert_eq!(stage_count(HivStage::Chronic), 2);
        assert_eq!(stage_count(HivStage::Aids), 3);
        let diagnosed = context
            .person_ids()
            .into_iter()
            .filter(|id| context.person(*id).hiv.diagnosed)
            .count();
        assert_eq!(diagnosed, 5);
        assert_eq!(context.person(context.person_ids()[0]).sti_diagnosis_count, 0);
    }
}
