use std::path::Path;

use log::info;
use serde::Deserialize;

use crate::context::Context;
use crate::define_rng;
use crate::error::SimError;
use crate::global_properties::load_parameters_from_json;
use crate::parameters::ContextParametersExt;
use crate::population::{ContextPopulationExt, Person, PersonId, Sex, SexualRole};
use crate::random::ContextRandomExt;

define_rng!(PopulationRng);

/// One entry of a population file
#[derive(Deserialize)]
pub struct PopulationRecord {
    pub sex: Sex,
    pub age: f64,
}

fn load_population_file(path: &Path) -> Result<Vec<PopulationRecord>, SimError> {
    load_parameters_from_json(path)
}

fn sexual_role_from_draw(value: f64) -> SexualRole {
    // Rounded to the nearest code: 0 versatile, 1 receptive, 2 insertive
    match value.round() {
        x if x >= 2.0 => SexualRole::Insertive,
        x if x >= 1.0 => SexualRole::Receptive,
        _ => SexualRole::Variable,
    }
}

/// Create a person born at `date_of_birth`, drawing their behavioural characteristics from the
/// loaded parameters
///
/// # Errors
///
/// Returns `SimError::ConfigError` if a behaviour distribution cannot be sampled.
pub fn create_person(
    context: &mut Context,
    sex: Sex,
    date_of_birth: f64,
) -> Result<PersonId, SimError> {
    let params = &context.params().person;
    let msm_fraction = context.params().population.msm_fraction;
    let draw = |dist: &crate::config::ConfigDistribution| {
        context.sample(PopulationRng, |rng| dist.sample(rng))
    };

    let mut person = Person::new(sex, date_of_birth);
    person.health_seeking_propensity = draw(&params.health_seeking_propensity)?;
    person.treat_accept_threshold = draw(&params.treat_accept_threshold)?;
    person.condom_use_probability = draw(&params.condom_use)?.clamp(0.0, 1.0);
    person.prep_accept_threshold = draw(&params.prep_accept_threshold)?;
    person.hiv_b0 = draw(&params.hiv_b0)?;
    person.hsv2_a = draw(&params.hsv2_a)?;
    person.hsv2_b2 = draw(&params.hsv2_b2)?;
    if sex == Sex::Male {
        person.msm = context.sample_bool(PopulationRng, msm_fraction);
        if person.msm {
            person.sexual_role = sexual_role_from_draw(draw(&params.sexual_role)?);
        }
    }
    Ok(context.add_person(person))
}

/// True if two people can form a relationship at all: a man and a woman, or two men who both
/// have sex with men
#[must_use]
pub fn compatible(a: &Person, b: &Person) -> bool {
    match (a.sex, b.sex) {
        (Sex::Male, Sex::Female) | (Sex::Female, Sex::Male) => !(a.msm || b.msm),
        (Sex::Male, Sex::Male) => a.msm && b.msm,
        (Sex::Female, Sex::Female) => false,
    }
}

pub trait ContextPopulationLoaderExt {
    /// Create the initial population, either from the file named by `population.file` or from
    /// the configured numbers of men and women with ages drawn from `population.age.dist`
    ///
    /// # Errors
    ///
    /// Returns an error if the population file cannot be read or a distribution cannot be
    /// sampled.
    fn init_population(&mut self) -> Result<(), SimError>;

    /// Draw a new set of persons of interest for `person`. With an eyecap fraction of 1 the set
    /// is left open, meaning everyone compatible.
    fn choose_persons_of_interest(&mut self, person: PersonId);

    /// True if formation between the two people is tracked
    fn is_of_interest(&self, a: PersonId, b: PersonId) -> bool;

    /// Compatible people that `person` tracks formation with, in id order
    fn formation_candidates(&self, person: PersonId) -> Vec<PersonId>;
}

impl ContextPopulationLoaderExt for Context {
    fn init_population(&mut self) -> Result<(), SimError> {
        let population = self.params().population.clone();
        if population.file.is_empty() {
            for sex in [Sex::Male, Sex::Female] {
                let count = match sex {
                    Sex::Male => population.num_men,
                    Sex::Female => population.num_women,
                };
                for _ in 0..count {
                    let age = self.sample(PopulationRng, |rng| {
                        population.age.sample_non_negative(rng)
                    })?;
                    create_person(self, sex, -age)?;
                }
            }
        } else {
            for record in load_population_file(Path::new(&population.file))? {
                create_person(self, record.sex, -record.age)?;
            }
        }

        if population.eyecap_fraction < 1.0 {
            for id in self.person_ids() {
                self.choose_persons_of_interest(id);
            }
        }
        info!(
            "created {} people ({} men)",
            self.population_size(),
            self.person_ids()
                .into_iter()
                .filter(|id| self.person(*id).is_man())
                .count()
        );
        Ok(())
    }

    fn choose_persons_of_interest(&mut self, person: PersonId) {
        let fraction = self.params().population.eyecap_fraction;
        if fraction >= 1.0 {
            self.person_mut(person).persons_of_interest = None;
            return;
        }
        let mut pool: Vec<PersonId> = self
            .living_person_ids()
            .into_iter()
            .filter(|other| compatible(self.person(person), self.person(*other)))
            .collect();
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let wanted = (fraction * pool.len() as f64).round() as usize;
        let mut chosen = Vec::with_capacity(wanted);
        for _ in 0..wanted {
            let index = self.sample_range(PopulationRng, 0..pool.len());
            chosen.push(pool.swap_remove(index));
        }
        chosen.sort();
        self.person_mut(person).persons_of_interest = Some(chosen);
    }

    fn is_of_interest(&self, a: PersonId, b: PersonId) -> bool {
        let interested = |x: PersonId, y: PersonId| {
            self.person(x)
                .persons_of_interest
                .as_ref()
                .is_none_or(|set| set.binary_search(&y).is_ok())
        };
        interested(a, b) || interested(b, a)
    }

    fn formation_candidates(&self, person: PersonId) -> Vec<PersonId> {
        let me = self.person(person);
        self.living_person_ids()
            .into_iter()
            .filter(|other| *other != person)
            .filter(|other| compatible(me, self.person(*other)))
            .filter(|other| self.is_of_interest(person, *other))
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod test {
    use super::*;
    use crate::config::ConfigDistribution;
    use crate::parameters::SimConfig;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn context_with(config: SimConfig) -> Context {
        let mut context = Context::new();
        context.init_random(42);
        context.load_parameters(config).unwrap();
        context
    }

    #[test]
    fn creates_configured_counts() {
        let mut config = SimConfig::default();
        config.population.num_men = 7;
        config.population.num_women = 5;
        config.population.age = ConfigDistribution::Fixed { value: 20.0 };
        let mut context = context_with(config);
        context.init_population().unwrap();
        assert_eq!(context.population_size(), 12);
        let men = context
            .person_ids()
            .into_iter()
            .filter(|id| context.person(*id).is_man())
            .count();
        assert_eq!(men, 7);
        assert_eq!(context.person(PersonId(0)).date_of_birth, -20.0);
    }

    #[test]
    fn behaviour_is_drawn_from_config() {
        let mut config = SimConfig::default();
        config.person.condom_use = ConfigDistribution::Fixed { value: 1.5 };
        config.person.health_seeking_propensity = ConfigDistribution::Fixed { value: 0.3 };
        config.population.msm_fraction = 1.0;
        config.person.sexual_role = ConfigDistribution::Fixed { value: 1.0 };
        config.person.prep_accept_threshold = ConfigDistribution::Fixed { value: 0.8 };
        let mut context = context_with(config);
        let id = create_person(&mut context, Sex::Male, -18.0).unwrap();
        let person = context.person(id);
        assert_eq!(person.condom_use_probability, 1.0);
        assert_eq!(person.health_seeking_propensity, 0.3);
        assert_eq!(person.prep_accept_threshold, 0.8);
        assert!(!person.prep.is_on_prep());
        assert!(person.msm);
        assert_eq!(person.sexual_role, SexualRole::Receptive);
    }

    #[test]
    fn hazard_covariates_keep_their_sign() {
        let mut config = SimConfig::default();
        config.person.hsv2_a = ConfigDistribution::Normal {
            mu: -8.0,
            sigma: 0.5,
        };
        config.person.hsv2_b2 = ConfigDistribution::Fixed { value: -1.5 };
        config.person.hiv_b0 = ConfigDistribution::Uniform { min: -3.0, max: -2.0 };
        let mut context = context_with(config);
        for _ in 0..20 {
            let id = create_person(&mut context, Sex::Female, -25.0).unwrap();
            let person = context.person(id);
            assert!(person.hsv2_a < -5.0);
            assert_eq!(person.hsv2_b2, -1.5);
            assert!((-3.0..=-2.0).contains(&person.hiv_b0));
        }
    }

    #[test]
    fn loads_population_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{ "sex": "Male", "age": 30.0 }}, {{ "sex": "Female", "age": 22.5 }}]"#
        )
        .unwrap();
        let mut config = SimConfig::default();
        config.population.file = file.path().to_str().unwrap().to_string();
        let mut context = context_with(config);
        context.init_population().unwrap();
        assert_eq!(context.population_size(), 2);
        assert_eq!(context.person(PersonId(1)).sex, Sex::Female);
        assert_eq!(context.person(PersonId(1)).date_of_birth, -22.5);
    }

    #[test]
    fn compatibility_rules() {
        let man = Person::new(Sex::Male, 0.0);
        let woman = Person::new(Sex::Female, 0.0);
        let mut msm = Person::new(Sex::Male, 0.0);
        msm.msm = true;
        assert!(compatible(&man, &woman));
        assert!(!compatible(&man, &man));
        assert!(compatible(&msm, &msm));
        assert!(!compatible(&msm, &woman));
        assert!(!compatible(&woman, &woman));
    }

    #[test]
    fn eyecap_limits_candidates() {
        let mut config = SimConfig::default();
        config.population.num_men = 1;
        config.population.num_women = 10;
        config.population.eyecap_fraction = 0.3;
        let mut context = context_with(config);
        context.init_population().unwrap();
        let man = PersonId(0);
        let interests = context
            .person(man)
            .persons_of_interest
            .clone()
            .unwrap();
        assert_eq!(interests.len(), 3);
        // Women also picked the man with some probability, so the union is at least his own picks
        assert!(context.formation_candidates(man).len() >= 3);
        for woman in interests {
            assert!(context.is_of_interest(man, woman));
        }
    }

    #[test]
    fn full_eyecap_tracks_everyone() {
        let mut config = SimConfig::default();
        config.population.num_men = 2;
        config.population.num_women = 3;
        let mut context = context_with(config);
        context.init_population().unwrap();
        assert!(context.person(PersonId(0)).persons_of_interest.is_none());
        assert_eq!(context.formation_candidates(PersonId(0)).len(), 3);
    }
}
