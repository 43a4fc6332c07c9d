use std::fmt::{Debug, Display};

use serde::{Deserialize, Serialize};

use crate::population::PersonId;

/// The stage enum of one disease
pub trait DiseaseStage:
    Copy + Clone + Debug + Display + Default + PartialEq + Eq + Serialize + 'static
{
    /// The person carries the infection
    fn is_infected(self) -> bool;

    /// The person can pass the infection on
    fn is_infectious(self) -> bool;

    /// The person can acquire the infection
    fn is_susceptible(self) -> bool {
        self == Self::default()
    }
}

/// How an infection was acquired
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum InfectionType {
    #[default]
    None,
    Seed,
    Partner,
    Mother,
}

/// Where an infection entered the body, which depends on the sex of both partners and their roles
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum InfectionSite {
    Vaginal,
    Rectal,
    Urethral,
}

/// Per-person state of a single disease
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DiseaseRecord<S: DiseaseStage> {
    pub stage: S,
    pub infection_time: Option<f64>,
    pub infection_origin: Option<PersonId>,
    pub infection_type: InfectionType,
    pub infection_site: Option<InfectionSite>,
    pub symptomatic: bool,
    pub diagnosed: bool,
    pub diagnosis_time: Option<f64>,
    pub diagnosis_count: u32,
    pub treated: bool,
    pub recovery_time: Option<f64>,
}

impl<S: DiseaseStage> DiseaseRecord<S> {
    #[must_use]
    pub fn is_infected(&self) -> bool {
        self.stage.is_infected()
    }

    #[must_use]
    pub fn is_infectious(&self) -> bool {
        self.stage.is_infectious()
    }

    #[must_use]
    pub fn is_susceptible(&self) -> bool {
        self.stage.is_susceptible()
    }

    pub fn set_infected(
        &mut self,
        stage: S,
        t: f64,
        origin: Option<PersonId>,
        infection_type: InfectionType,
        site: InfectionSite,
    ) {
        self.stage = stage;
        self.infection_time = Some(t);
        self.infection_origin = origin;
        self.infection_type = infection_type;
        self.infection_site = Some(site);
        self.symptomatic = false;
        self.diagnosed = false;
        self.diagnosis_time = None;
        self.treated = false;
        self.recovery_time = None;
    }

    /// End the current infection, moving to an uninfected `stage`
    pub fn clear_infection(&mut self, stage: S, t: f64) {
        debug_assert!(!stage.is_infected());
        self.stage = stage;
        self.infection_time = None;
        self.infection_origin = None;
        self.infection_type = InfectionType::None;
        self.infection_site = None;
        self.symptomatic = false;
        self.diagnosed = false;
        self.treated = false;
        self.recovery_time = Some(t);
    }

    pub fn mark_diagnosed(&mut self, t: f64) {
        self.diagnosed = true;
        self.diagnosis_time = Some(t);
        self.diagnosis_count += 1;
    }

    /// Years since infection at `t`, or 0 when not infected
    #[must_use]
    pub fn time_since_infection(&self, t: f64) -> f64 {
        self.infection_time.map_or(0.0, |t_inf| t - t_inf)
    }
}
