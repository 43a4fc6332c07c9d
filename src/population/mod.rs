//! People and the relationships between them.
//!
//! People live in an arena indexed by [`PersonId`] and are never removed: a dead person keeps
//! their id and record, which is what the final person report is built from. Relationships are
//! stored as adjacency lists on both partners and the pair is always kept symmetric.
mod loader;

use std::fmt::{Debug, Display, Formatter};

use log::trace;
use serde::{Deserialize, Serialize};

pub use loader::{compatible, create_person, ContextPopulationLoaderExt, PopulationRecord};

use crate::context::Context;
use crate::define_data_plugin;
use crate::disease::chlamydia::ChlamydiaStage;
use crate::disease::gonorrhea::GonorrheaStage;
use crate::disease::hiv::{HivProfile, HivStage};
use crate::disease::hsv2::Hsv2Stage;
use crate::disease::syphilis::SyphilisStage;
use crate::disease::DiseaseRecord;
use crate::error::SimError;

/// A person's index in the population
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PersonId(usize);

impl PersonId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl Display for PersonId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Debug for PersonId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Person {}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum Sex {
    Male,
    Female,
}

/// Preferred role in sex between men
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum SexualRole {
    #[default]
    Variable,
    Receptive,
    Insertive,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Location {
    pub x: f64,
    pub y: f64,
    /// When the location was last set
    pub time: f64,
}

/// Pre-exposure prophylaxis state
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PrepStatus {
    /// When the person last became eligible; `None` while not eligible
    pub eligible_since: Option<f64>,
    pub started: Option<f64>,
}

impl PrepStatus {
    #[must_use]
    pub fn is_on_prep(&self) -> bool {
        self.started.is_some()
    }

    #[must_use]
    pub fn is_eligible(&self) -> bool {
        self.eligible_since.is_some()
    }
}

/// One side of a relationship
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Relationship {
    pub partner: PersonId,
    pub formation_time: f64,
    pub condom_use: bool,
}

#[derive(Clone, Debug)]
pub struct Person {
    pub id: PersonId,
    pub sex: Sex,
    pub date_of_birth: f64,
    pub death_time: Option<f64>,
    pub location: Location,
    pub debut_time: Option<f64>,
    pub msm: bool,
    pub sexual_role: SexualRole,
    pub health_seeking_propensity: f64,
    pub treat_accept_threshold: f64,
    pub condom_use_probability: f64,
    pub prep_accept_threshold: f64,
    pub prep: PrepStatus,
    pub hiv_b0: f64,
    pub hsv2_a: f64,
    pub hsv2_b2: f64,
    pub sti_diagnosis_count: u32,
    pub last_sti_diagnosis: Option<f64>,
    /// The people formation events are tracked with; `None` means everyone compatible
    pub persons_of_interest: Option<Vec<PersonId>>,
    pub relationships: Vec<Relationship>,
    pub hiv_profile: Option<HivProfile>,
    pub hiv: DiseaseRecord<HivStage>,
    pub chlamydia: DiseaseRecord<ChlamydiaStage>,
    pub gonorrhea: DiseaseRecord<GonorrheaStage>,
    pub syphilis: DiseaseRecord<SyphilisStage>,
    pub hsv2: DiseaseRecord<Hsv2Stage>,
}

impl Person {
    /// A person with neutral behaviour and no infections. The id is assigned by `add_person`.
    #[must_use]
    pub fn new(sex: Sex, date_of_birth: f64) -> Self {
        Person {
            id: PersonId(usize::MAX),
            sex,
            date_of_birth,
            death_time: None,
            location: Location::default(),
            debut_time: None,
            msm: false,
            sexual_role: SexualRole::Variable,
            health_seeking_propensity: 0.0,
            treat_accept_threshold: 0.5,
            condom_use_probability: 0.0,
            prep_accept_threshold: 0.5,
            prep: PrepStatus::default(),
            hiv_b0: 0.0,
            hsv2_a: 0.0,
            hsv2_b2: 0.0,
            sti_diagnosis_count: 0,
            last_sti_diagnosis: None,
            persons_of_interest: None,
            relationships: Vec::new(),
            hiv_profile: None,
            hiv: DiseaseRecord::default(),
            chlamydia: DiseaseRecord::default(),
            gonorrhea: DiseaseRecord::default(),
            syphilis: DiseaseRecord::default(),
            hsv2: DiseaseRecord::default(),
        }
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.death_time.is_none()
    }

    #[must_use]
    pub fn is_sexually_active(&self) -> bool {
        self.is_alive() && self.debut_time.is_some()
    }

    #[must_use]
    pub fn is_man(&self) -> bool {
        self.sex == Sex::Male
    }

    #[must_use]
    pub fn is_woman(&self) -> bool {
        self.sex == Sex::Female
    }

    #[must_use]
    pub fn age(&self, t: f64) -> f64 {
        t - self.date_of_birth
    }

    #[must_use]
    pub fn num_relationships(&self) -> usize {
        self.relationships.len()
    }

    #[must_use]
    pub fn relationship_with(&self, partner: PersonId) -> Option<&Relationship> {
        self.relationships.iter().find(|r| r.partner == partner)
    }

    #[must_use]
    pub fn has_relationship_with(&self, partner: PersonId) -> bool {
        self.relationship_with(partner).is_some()
    }

    pub fn partners(&self) -> impl Iterator<Item = PersonId> + '_ {
        self.relationships.iter().map(|r| r.partner)
    }
}

struct PopulationData {
    people: Vec<Person>,
}

define_data_plugin!(
    PopulationPlugin,
    PopulationData,
    PopulationData { people: Vec::new() }
);

pub trait ContextPopulationExt {
    /// Add a person to the arena and return their id
    fn add_person(&mut self, person: Person) -> PersonId;

    /// # Panics
    ///
    /// Panics if the id does not belong to this population.
    fn person(&self, id: PersonId) -> &Person;

    /// # Panics
    ///
    /// Panics if the id does not belong to this population.
    fn person_mut(&mut self, id: PersonId) -> &mut Person;

    /// Number of people ever added, living or dead
    fn population_size(&self) -> usize;

    /// All ids, in id order
    fn person_ids(&self) -> Vec<PersonId>;

    /// Ids of living people, in id order
    fn living_person_ids(&self) -> Vec<PersonId>;

    fn living_count(&self) -> usize;

    fn is_alive(&self, id: PersonId) -> bool;

    /// Record a death. Relationships are left to the caller.
    fn set_dead(&mut self, id: PersonId, t: f64);

    fn has_relationship(&self, a: PersonId, b: PersonId) -> bool;

    /// Add a relationship to both partners
    ///
    /// # Errors
    ///
    /// Returns `SimError::InvariantViolation` for a self-relationship or one that already exists.
    fn add_relationship(
        &mut self,
        a: PersonId,
        b: PersonId,
        t: f64,
        condom_use: bool,
    ) -> Result<(), SimError>;

    /// Remove a relationship from both partners, returning it if it existed
    fn remove_relationship(&mut self, a: PersonId, b: PersonId) -> Option<Relationship>;

    /// Partners in adjacency order
    fn partners(&self, id: PersonId) -> Vec<PersonId>;

    /// Move a person, updating the time their location was last set
    fn set_location(&mut self, id: PersonId, x: f64, y: f64, t: f64);

    /// # Errors
    ///
    /// Returns `SimError::InvariantViolation` naming the first one-sided relationship found.
    fn check_relationship_symmetry(&self) -> Result<(), SimError>;
}

fn people(context: &Context) -> &[Person] {
    context
        .get_data_container(PopulationPlugin)
        .map_or(&[][..], |data| data.people.as_slice())
}

impl ContextPopulationExt for Context {
    fn add_person(&mut self, mut person: Person) -> PersonId {
        let data = self.get_data_container_mut(PopulationPlugin);
        let id = PersonId(data.people.len());
        person.id = id;
        trace!("adding {id:?} ({}, born {})", person.sex, person.date_of_birth);
        data.people.push(person);
        id
    }

    fn person(&self, id: PersonId) -> &Person {
        people(self).get(id.0).expect("Person does not exist")
    }

    fn person_mut(&mut self, id: PersonId) -> &mut Person {
        self.get_data_container_mut(PopulationPlugin)
            .people
            .get_mut(id.0)
            .expect("Person does not exist")
    }

    fn population_size(&self) -> usize {
        people(self).len()
    }

    fn person_ids(&self) -> Vec<PersonId> {
        (0..self.population_size()).map(PersonId).collect()
    }

    fn living_person_ids(&self) -> Vec<PersonId> {
        people(self)
            .iter()
            .filter(|p| p.is_alive())
            .map(|p| p.id)
            .collect()
    }

    fn living_count(&self) -> usize {
        people(self).iter().filter(|p| p.is_alive()).count()
    }

    fn is_alive(&self, id: PersonId) -> bool {
        self.person(id).is_alive()
    }

    fn set_dead(&mut self, id: PersonId, t: f64) {
        self.person_mut(id).death_time = Some(t);
    }

    fn has_relationship(&self, a: PersonId, b: PersonId) -> bool {
        self.person(a).has_relationship_with(b)
    }

    fn add_relationship(
        &mut self,
        a: PersonId,
        b: PersonId,
        t: f64,
        condom_use: bool,
    ) -> Result<(), SimError> {
        if a == b {
            return Err(SimError::InvariantViolation(format!(
                "{a:?} cannot be in a relationship with themselves"
            )));
        }
        if self.has_relationship(a, b) || self.has_relationship(b, a) {
            return Err(SimError::InvariantViolation(format!(
                "{a:?} and {b:?} are already in a relationship"
            )));
        }
        self.person_mut(a).relationships.push(Relationship {
            partner: b,
            formation_time: t,
            condom_use,
        });
        self.person_mut(b).relationships.push(Relationship {
            partner: a,
            formation_time: t,
            condom_use,
        });
        Ok(())
    }

    fn remove_relationship(&mut self, a: PersonId, b: PersonId) -> Option<Relationship> {
        let removed = {
            let relationships = &mut self.person_mut(a).relationships;
            let index = relationships.iter().position(|r| r.partner == b)?;
            relationships.remove(index)
        };
        let relationships = &mut self.person_mut(b).relationships;
        if let Some(index) = relationships.iter().position(|r| r.partner == a) {
            relationships.remove(index);
        }
        Some(removed)
    }

    fn partners(&self, id: PersonId) -> Vec<PersonId> {
        self.person(id).partners().collect()
    }

    fn set_location(&mut self, id: PersonId, x: f64, y: f64, t: f64) {
        self.person_mut(id).location = Location { x, y, time: t };
    }

    fn check_relationship_symmetry(&self) -> Result<(), SimError> {
        for person in people(self) {
            for relationship in &person.relationships {
                let mirrored = self
                    .person(relationship.partner)
                    .relationship_with(person.id)
                    .is_some_and(|r| r.formation_time == relationship.formation_time);
                if !mirrored {
                    return Err(SimError::InvariantViolation(format!(
                        "{:?} lists {:?} as a partner but not the other way round",
                        person.id, relationship.partner
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod test {
    use super::*;

    fn two_people(context: &mut Context) -> (PersonId, PersonId) {
        let a = context.add_person(Person::new(Sex::Male, -30.0));
        let b = context.add_person(Person::new(Sex::Female, -25.0));
        (a, b)
    }

    #[test]
    fn add_and_read_people() {
        let mut context = Context::new();
        assert_eq!(context.population_size(), 0);
        assert!(context.living_person_ids().is_empty());
        let (a, b) = two_people(&mut context);
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(context.person(b).sex, Sex::Female);
        assert_eq!(context.person(a).age(5.0), 35.0);
        assert_eq!(context.person_ids(), vec![a, b]);
    }

    #[test]
    #[should_panic(expected = "Person does not exist")]
    fn unknown_person() {
        let context = Context::new();
        let _ = context.person(PersonId(3));
    }

    #[test]
    fn relationships_are_symmetric() {
        let mut context = Context::new();
        let (a, b) = two_people(&mut context);
        context.add_relationship(a, b, 1.0, true).unwrap();
        assert!(context.has_relationship(a, b));
        assert!(context.has_relationship(b, a));
        assert_eq!(context.partners(b), vec![a]);
        assert!(context.person(a).relationship_with(b).unwrap().condom_use);
        context.check_relationship_symmetry().unwrap();

        let removed = context.remove_relationship(b, a).unwrap();
        assert_eq!(removed.formation_time, 1.0);
        assert!(!context.has_relationship(a, b));
        assert!(context.partners(a).is_empty());
        assert!(context.remove_relationship(a, b).is_none());
        context.check_relationship_symmetry().unwrap();
    }

    #[test]
    fn duplicate_relationship_is_an_error() {
        let mut context = Context::new();
        let (a, b) = two_people(&mut context);
        context.add_relationship(a, b, 1.0, false).unwrap();
        assert!(matches!(
            context.add_relationship(b, a, 2.0, false),
            Err(SimError::InvariantViolation(_))
        ));
        assert!(context.add_relationship(a, a, 2.0, false).is_err());
    }

    #[test]
    fn symmetry_check_detects_one_sided_entries() {
        let mut context = Context::new();
        let (a, b) = two_people(&mut context);
        context.person_mut(a).relationships.push(Relationship {
            partner: b,
            formation_time: 0.0,
            condom_use: false,
        });
        assert!(context.check_relationship_symmetry().is_err());
    }

    #[test]
    fn death_keeps_the_record() {
        let mut context = Context::new();
        let (a, b) = two_people(&mut context);
        context.set_dead(a, 3.0);
        assert!(!context.is_alive(a));
        assert_eq!(context.living_person_ids(), vec![b]);
        assert_eq!(context.living_count(), 1);
        assert_eq!(context.population_size(), 2);
        assert_eq!(context.person(a).death_time, Some(3.0));
    }

    #[test]
    fn location_records_time() {
        let mut context = Context::new();
        let (a, _) = two_people(&mut context);
        context.set_location(a, 1.0, 2.0, 4.5);
        assert_eq!(
            context.person(a).location,
            Location {
                x: 1.0,
                y: 2.0,
                time: 4.5
            }
        );
    }
}
