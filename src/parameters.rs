//! The complete, immutable parameter set of a run.
//!
//! Every component's keys are declared here with their defaults. `SimConfig` is assembled once
//! from a [`ConfigSettings`], stored on the `Context` as the [`Parameters`] global property, and
//! read by reference from then on.
use serde::{Deserialize, Serialize};

use crate::config::{ConfigDistribution, ConfigSection, ConfigSettings, ConfigWriter};
use crate::context::Context;
use crate::define_config_section;
use crate::define_global_property;
use crate::error::SimError;
use crate::global_properties::ContextGlobalPropertiesExt;

/// How a seeding event picks the number of people to infect
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeedType {
    Fraction,
    Amount,
}

/// Which sex a seeding event draws from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeedGender {
    Any,
    Male,
    Female,
}

define_config_section! {
    pub struct PopulationParams {
        num_men: usize = ("nummen", 100),
        num_women: usize = ("numwomen", 100),
        /// Fraction of men who have sex with men
        msm_fraction: f64 = ("msm", 0.0),
        /// Fraction of the compatible population each person is interested in
        eyecap_fraction: f64 = ("eyecap.fraction", 1.0),
        sim_time: f64 = ("simtime", 15.0),
        age: ConfigDistribution = ("age.dist", ConfigDistribution::Uniform { min: 15.0, max: 65.0 }),
        /// A JSON list of `{ "sex": ..., "age": ... }` records used instead of the counts above
        file: String = ("file", String::new()),
    }
}

define_config_section! {
    /// Behavioural draws made once when a person is created
    pub struct PersonParams {
        health_seeking_propensity: ConfigDistribution =
            ("healthseekingpropensity.dist", ConfigDistribution::Fixed { value: 0.0 }),
        treat_accept_threshold: ConfigDistribution =
            ("sti.treat.accept.threshold.dist", ConfigDistribution::Fixed { value: 0.5 }),
        condom_use: ConfigDistribution = ("condomuse.dist", ConfigDistribution::Fixed { value: 0.0 }),
        /// 0 is versatile, 1 receptive and 2 insertive
        sexual_role: ConfigDistribution = ("sexualrole.dist", ConfigDistribution::Fixed { value: 0.0 }),
        hiv_b0: ConfigDistribution = ("hiv.b0.dist", ConfigDistribution::Fixed { value: 0.0 }),
        hsv2_a: ConfigDistribution = ("hsv2.a.dist", ConfigDistribution::Fixed { value: 0.0 }),
        hsv2_b2: ConfigDistribution = ("hsv2.b2.dist", ConfigDistribution::Fixed { value: 0.0 }),
        hsv2_fraction_symptomatic: f64 = ("hsv2.fraction.symptomatic.primary", 0.0),
        syphilis_fraction_relapse: f64 = ("syphilis.fractionrelapse", 0.25),
        vsp_log10: ConfigDistribution =
            ("vsp.log10.dist", ConfigDistribution::Normal { mu: 4.0, sigma: 0.8 }),
        prep_accept_threshold: ConfigDistribution =
            ("prep.accept.threshold.dist", ConfigDistribution::Fixed { value: 0.5 }),
    }
}

define_config_section! {
    /// Multipliers on a person's condom-use probability when a relationship forms
    pub struct CondomUseParams {
        /// Both partners share the same HIV diagnosis status
        concordance_factor: f64 = ("concordancefactor", 1.0),
        /// The person is HIV negative and on PrEP
        prep_factor: f64 = ("prepfactor", 1.0),
    }
}

define_config_section! {
    /// `A = baseline + numrel_man * P_man + numrel_woman * P_woman + gap_factor * |gap - preferred|`
    pub struct FormationParams {
        baseline: f64 = ("baseline", 0.1),
        numrel_man: f64 = ("numrel_man", -0.5),
        numrel_woman: f64 = ("numrel_woman", -0.5),
        gap_factor: f64 = ("gap_factor", -0.2),
        preferred_age_gap: f64 = ("preferredagegap", 0.0),
        t_max: f64 = ("t_max", 200.0),
    }
}

define_config_section! {
    /// `A = alpha_0 + alpha_1 * P_man + alpha_2 * P_woman - beta * t_formation`, `B = beta`
    pub struct DissolutionParams {
        alpha_0: f64 = ("alpha_0", 0.1),
        alpha_1: f64 = ("alpha_1", -0.1),
        alpha_2: f64 = ("alpha_2", -0.1),
        beta: f64 = ("beta", 0.0),
        t_max: f64 = ("t_max", 200.0),
    }
}

define_config_section! {
    pub struct DebutParams {
        debut_age: f64 = ("debutage", 15.0),
    }
}

define_config_section! {
    /// Weibull-distributed age at background death
    pub struct MortalityParams {
        shape: f64 = ("shape", 4.0),
        scale: f64 = ("scale", 70.0),
        gender_diff: f64 = ("genderdiff", 5.0),
    }
}

define_config_section! {
    /// Survival after HIV infection is `c * vsp^k`
    pub struct AidsMortalityParams {
        c: f64 = ("C", 1325.0),
        k: f64 = ("k", -0.49),
    }
}

define_config_section! {
    pub struct RoutineTestingParams {
        enabled: bool = ("enabled", false),
        acceptance: f64 = ("acceptance", 1.0),
        interval: ConfigDistribution = ("interval.dist", ConfigDistribution::Fixed { value: 0.25 }),
    }
}

define_config_section! {
    pub struct SeedParams {
        /// A negative time disables seeding
        time: f64 = ("time", -1.0),
        seed_type: SeedType = ("type", SeedType::Fraction),
        fraction: f64 = ("fraction", 0.2),
        amount: usize = ("amount", 1),
        age_min: f64 = ("age.min", 0.0),
        age_max: f64 = ("age.max", 1000.0),
        gender: SeedGender = ("gender", SeedGender::Any),
        stop_short: bool = ("stop.short", true),
    }
}

define_config_section! {
    pub struct ImportParams {
        amount: usize = ("amount", 0),
        /// A non-positive interval disables importing
        interval: f64 = ("interval", 0.0),
    }
}

define_config_section! {
    /// `A = a - b * t_infected`, `B = b`
    pub struct StiTransmissionParams {
        a: f64 = ("hazard.a", 0.0),
        b: f64 = ("hazard.b", 0.0),
        t_max: f64 = ("hazard.t_max", 200.0),
    }
}

define_config_section! {
    pub struct StiDiagnosisParams {
        baseline: f64 = ("baseline", 0.0),
        diag_partners_factor: f64 = ("diagpartnersfactor", 0.0),
        health_seeking_propensity_factor: f64 = ("healthseekingpropensityfactor", 0.0),
        symptomatic_factor: f64 = ("symptomaticfactor", 0.0),
        beta: f64 = ("beta", 0.0),
        t_max: f64 = ("t_max", 200.0),
    }
}

define_config_section! {
    /// Natural clearance `A = baseline - beta * t_infected`, `B = beta`
    pub struct RecoveryParams {
        baseline: f64 = ("baseline", 0.0),
        beta: f64 = ("beta", 0.0),
        t_max: f64 = ("t_max", 200.0),
    }
}

define_config_section! {
    pub struct ChlamydiaProgressionParams {
        incubation: ConfigDistribution = ("incubation.dist", ConfigDistribution::Fixed { value: 0.02 }),
        symptomatic_vaginal: f64 = ("fraction.symptomatic.vaginal", 0.3),
        symptomatic_rectal: f64 = ("fraction.symptomatic.rectal", 0.1),
        symptomatic_urethral: f64 = ("fraction.symptomatic.urethral", 0.5),
        immunity: ConfigDistribution = ("immunity.dist", ConfigDistribution::Fixed { value: 0.0 }),
    }
}

define_config_section! {
    pub struct GonorrheaProgressionParams {
        incubation: ConfigDistribution = ("incubation.dist", ConfigDistribution::Fixed { value: 0.01 }),
        symptomatic_vaginal: f64 = ("fraction.symptomatic.vaginal", 0.5),
        symptomatic_rectal: f64 = ("fraction.symptomatic.rectal", 0.1),
        symptomatic_urethral: f64 = ("fraction.symptomatic.urethral", 0.9),
        symptomatic_duration: ConfigDistribution =
            ("symptomaticinfectionduration.dist", ConfigDistribution::Fixed { value: 1.0 }),
        asymptomatic_duration: ConfigDistribution =
            ("asymptomaticinfectionduration.dist", ConfigDistribution::Fixed { value: 0.5 }),
    }
}

define_config_section! {
    pub struct SyphilisProgressionParams {
        exposed: ConfigDistribution = ("exposedstageduration.dist", ConfigDistribution::Fixed { value: 0.16 }),
        primary: ConfigDistribution = ("primarystageduration.dist", ConfigDistribution::Fixed { value: 0.1 }),
        secondary: ConfigDistribution = ("secondarystageduration.dist", ConfigDistribution::Fixed { value: 1.0 }),
        latent: ConfigDistribution = ("latentstageduration.dist", ConfigDistribution::Fixed { value: 3.0 }),
        tertiary: ConfigDistribution = ("tertiarystage.dist", ConfigDistribution::Fixed { value: 20.0 }),
    }
}

define_config_section! {
    pub struct Hsv2ProgressionParams {
        primary: ConfigDistribution = ("primarystageduration.dist", ConfigDistribution::Fixed { value: 0.05 }),
    }
}

define_config_section! {
    /// Alternation between asymptomatic and recurrent shedding periods
    pub struct Hsv2SheddingParams {
        freq: f64 = ("freq", 0.14),
        cycles: f64 = ("cycles", 4.0),
        hiv_factor: f64 = ("hivfactor", 1.0),
        aids_factor: f64 = ("aidsfactor", 1.0),
        treat_factor: f64 = ("treatfactor", 1.0),
    }
}

define_config_section! {
    pub struct Hsv2TransmissionParams {
        b: f64 = ("b", 0.0),
        d1: f64 = ("d1", 0.0),
        d2: f64 = ("d2", 0.0),
        e1: f64 = ("e1", 0.0),
        e2: f64 = ("e2", 0.0),
        f: f64 = ("f", 0.0),
        g1: f64 = ("g1", 0.0),
        g2: f64 = ("g2", 0.0),
        h: f64 = ("h", 0.0),
        w: f64 = ("w", 0.0),
        t_max: f64 = ("t_max", 200.0),
    }
}

define_config_section! {
    /// Who qualifies to be offered PrEP. Any one criterion is enough.
    pub struct PrepEligibilityParams {
        enabled: bool = ("enabled", false),
        /// At least this many current partners; 0 disables the criterion
        num_partners: usize = ("eligibility.numpartners", 2),
        diagnosed_partner: bool = ("eligibility.diagnosedpartner", true),
        /// An STI diagnosis within the past year
        recent_sti: bool = ("eligibility.recentsti", true),
    }
}

define_config_section! {
    /// `A = baseline + numpartnersfactor * P + healthseekingpropensityfactor * H - beta * t_eligible`
    pub struct PrepOfferedParams {
        baseline: f64 = ("baseline", 0.0),
        num_partners_factor: f64 = ("numpartnersfactor", 0.0),
        health_seeking_propensity_factor: f64 = ("healthseekingpropensityfactor", 0.0),
        beta: f64 = ("beta", 0.0),
        t_max: f64 = ("t_max", 200.0),
    }
}

define_config_section! {
    /// Self-initiated PrEP, `A = baseline - beta * t_debut`, `B = beta`
    pub struct PrepStartParams {
        enabled: bool = ("enabled", false),
        baseline: f64 = ("baseline", 0.0),
        beta: f64 = ("beta", 0.0),
        t_max: f64 = ("t_max", 200.0),
    }
}

define_config_section! {
    pub struct PrepScheduleParams {
        interval: ConfigDistribution = ("interval.dist", ConfigDistribution::Fixed { value: 0.25 }),
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PrepParams {
    pub eligibility: PrepEligibilityParams,
    pub offered: PrepOfferedParams,
    pub start: PrepStartParams,
    pub screening: PrepScheduleParams,
    pub dropout: PrepScheduleParams,
}

fn prep_dropout_defaults() -> PrepScheduleParams {
    PrepScheduleParams {
        interval: ConfigDistribution::Uniform { min: 0.25, max: 10.0 },
    }
}

define_config_section! {
    /// `A = a + b * V^(-c) + d1 * P_i + d2 * P_j + e1..e4 * coinfection + h * condom + r * receptive`
    pub struct HivTransmissionParams {
        a: f64 = ("param.a", -1.3997),
        b: f64 = ("param.b", -12.0220),
        c: f64 = ("param.c", 0.1649),
        d1: f64 = ("param.d1", 0.0),
        d2: f64 = ("param.d2", 0.0),
        e1: f64 = ("param.e1", 0.0),
        e2: f64 = ("param.e2", 0.0),
        e3: f64 = ("param.e3", 0.0),
        e4: f64 = ("param.e4", 0.0),
        h: f64 = ("param.h", 0.0),
        /// Applies when the susceptible partner is on PrEP
        i: f64 = ("param.i", 0.0),
        r: f64 = ("param.r", 0.0),
        t_max: f64 = ("param.t_max", 200.0),
    }
}

define_config_section! {
    pub struct HivDiagnosisParams {
        baseline: f64 = ("baseline", 0.0),
        age_factor: f64 = ("agefactor", 0.0),
        gender_factor: f64 = ("genderfactor", 0.0),
        diag_partners_factor: f64 = ("diagpartnersfactor", 0.0),
        num_partners_factor: f64 = ("numpartnersfactor", 0.0),
        is_diagnosed_factor: f64 = ("isdiagnosedfactor", 0.0),
        health_seeking_propensity_factor: f64 = ("healthseekingpropensityfactor", 0.0),
        beta: f64 = ("beta", 0.0),
        hsv2_factor: f64 = ("HSV2factor", 0.0),
        t_max: f64 = ("t_max", 200.0),
    }
}

define_config_section! {
    /// Stage timing and viral load multipliers. Keys are absolute.
    pub struct HivStageParams {
        acute_duration: f64 = ("chronicstage.acutestagetime", 0.25),
        aids_start: f64 = ("aidsstage.start", 1.25),
        aids_final: f64 = ("aidsstage.final", 0.5),
        acute_factor: f64 = ("hivviralload.acutefactor", 10.0),
        aids_factor: f64 = ("hivviralload.aidsfactor", 7.0),
        final_aids_factor: f64 = ("hivviralload.finalaidsfactor", 12.0),
    }
}

define_config_section! {
    /// Fractions of the seeded people moved straight into later stages
    pub struct HivSeedStageParams {
        fraction_chronic: f64 = ("fractionchronic", 0.0),
        fraction_aids: f64 = ("fractionaids", 0.0),
        fraction_final_aids: f64 = ("fractionfinalaids", 0.0),
        fraction_diagnosed: f64 = ("fractiondiagnosed", 0.0),
    }
}

impl Hsv2SheddingParams {
    /// The shedding share of a cycle must stay within [0, 1] for every HIV stage and treatment
    /// status, and there must be at least some cycles per year
    fn validate(&self) -> Result<(), SimError> {
        let invalid = |msg: String| Err(SimError::ConfigError(format!("hsv2shedding: {msg}")));
        if !(self.cycles > 0.0 && self.cycles.is_finite()) {
            return invalid(format!("cycles must be positive, got {}", self.cycles));
        }
        for (name, value) in [
            ("freq", self.freq),
            ("hivfactor", self.hiv_factor),
            ("aidsfactor", self.aids_factor),
            ("treatfactor", self.treat_factor),
        ] {
            if !(value >= 0.0 && value.is_finite()) {
                return invalid(format!("{name} must be non-negative, got {value}"));
            }
        }
        let worst = self.freq
            * self.hiv_factor.max(self.aids_factor).max(1.0)
            * self.treat_factor.max(1.0);
        if worst > 1.0 {
            return invalid(format!(
                "freq times the largest factor must not exceed 1, got {worst}"
            ));
        }
        Ok(())
    }
}

/// Parameters shared by the generic seeding, import and diagnosis events
#[derive(Clone, Debug, PartialEq)]
pub struct OutbreakParams {
    pub seed: SeedParams,
    pub import: ImportParams,
}

impl OutbreakParams {
    fn process(
        settings: &mut ConfigSettings,
        disease: &str,
        seed_defaults: SeedParams,
    ) -> Result<Self, SimError> {
        Ok(Self {
            seed: SeedParams::process_config_with(settings, &format!("{disease}seed"), seed_defaults)?,
            import: ImportParams::process_config(settings, &format!("{disease}import"))?,
        })
    }

    fn obtain(&self, writer: &mut ConfigWriter, disease: &str) -> Result<(), SimError> {
        self.seed.obtain_config(writer, &format!("{disease}seed"))?;
        self.import.obtain_config(writer, &format!("{disease}import"))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HivParams {
    pub transmission: HivTransmissionParams,
    pub diagnosis: HivDiagnosisParams,
    pub stages: HivStageParams,
    pub seed_stages: HivSeedStageParams,
    pub aids_mortality: AidsMortalityParams,
    pub outbreak: OutbreakParams,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChlamydiaParams {
    pub transmission: StiTransmissionParams,
    pub diagnosis: StiDiagnosisParams,
    pub recovery: RecoveryParams,
    pub progression: ChlamydiaProgressionParams,
    pub outbreak: OutbreakParams,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GonorrheaParams {
    pub transmission: StiTransmissionParams,
    pub diagnosis: StiDiagnosisParams,
    pub progression: GonorrheaProgressionParams,
    pub outbreak: OutbreakParams,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SyphilisParams {
    pub transmission: StiTransmissionParams,
    pub diagnosis: StiDiagnosisParams,
    pub progression: SyphilisProgressionParams,
    pub outbreak: OutbreakParams,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Hsv2Params {
    pub transmission: Hsv2TransmissionParams,
    pub diagnosis: StiDiagnosisParams,
    pub progression: Hsv2ProgressionParams,
    pub shedding: Hsv2SheddingParams,
    pub outbreak: OutbreakParams,
}

/// Every parameter of a run
#[derive(Clone, Debug, PartialEq)]
pub struct SimConfig {
    pub population: PopulationParams,
    pub person: PersonParams,
    pub formation: FormationParams,
    pub formation_msm: FormationParams,
    pub dissolution: DissolutionParams,
    pub debut: DebutParams,
    pub mortality: MortalityParams,
    pub routine_testing: RoutineTestingParams,
    pub condom_use: CondomUseParams,
    pub prep: PrepParams,
    pub hiv: HivParams,
    pub chlamydia: ChlamydiaParams,
    pub gonorrhea: GonorrheaParams,
    pub syphilis: SyphilisParams,
    pub hsv2: Hsv2Params,
}

fn hiv_seed_defaults() -> SeedParams {
    SeedParams {
        time: 0.0,
        ..SeedParams::default()
    }
}

impl Default for OutbreakParams {
    fn default() -> Self {
        Self {
            seed: SeedParams::default(),
            import: ImportParams::default(),
        }
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            population: PopulationParams::default(),
            person: PersonParams::default(),
            formation: FormationParams::default(),
            formation_msm: FormationParams::default(),
            dissolution: DissolutionParams::default(),
            debut: DebutParams::default(),
            mortality: MortalityParams::default(),
            routine_testing: RoutineTestingParams::default(),
            condom_use: CondomUseParams::default(),
            prep: PrepParams {
                eligibility: PrepEligibilityParams::default(),
                offered: PrepOfferedParams::default(),
                start: PrepStartParams::default(),
                screening: PrepScheduleParams::default(),
                dropout: prep_dropout_defaults(),
            },
            hiv: HivParams {
                transmission: HivTransmissionParams::default(),
                diagnosis: HivDiagnosisParams::default(),
                stages: HivStageParams::default(),
                seed_stages: HivSeedStageParams::default(),
                aids_mortality: AidsMortalityParams::default(),
                outbreak: OutbreakParams {
                    seed: hiv_seed_defaults(),
                    import: ImportParams::default(),
                },
            },
            chlamydia: ChlamydiaParams {
                transmission: StiTransmissionParams::default(),
                diagnosis: StiDiagnosisParams::default(),
                recovery: RecoveryParams::default(),
                progression: ChlamydiaProgressionParams::default(),
                outbreak: OutbreakParams::default(),
            },
            gonorrhea: GonorrheaParams {
                transmission: StiTransmissionParams::default(),
                diagnosis: StiDiagnosisParams::default(),
                progression: GonorrheaProgressionParams::default(),
                outbreak: OutbreakParams::default(),
            },
            syphilis: SyphilisParams {
                transmission: StiTransmissionParams::default(),
                diagnosis: StiDiagnosisParams::default(),
                progression: SyphilisProgressionParams::default(),
                outbreak: OutbreakParams::default(),
            },
            hsv2: Hsv2Params {
                transmission: Hsv2TransmissionParams::default(),
                diagnosis: StiDiagnosisParams::default(),
                progression: Hsv2ProgressionParams::default(),
                shedding: Hsv2SheddingParams::default(),
                outbreak: OutbreakParams::default(),
            },
        }
    }
}

impl SimConfig {
    fn process(settings: &mut ConfigSettings) -> Result<Self, SimError> {
        Ok(SimConfig {
            population: PopulationParams::process_config(settings, "population")?,
            person: PersonParams::process_config(settings, "person")?,
            formation: FormationParams::process_config(settings, "formation.hazard.agegap")?,
            formation_msm: FormationParams::process_config(settings, "formationmsm.hazard.agegap")?,
            dissolution: DissolutionParams::process_config(settings, "dissolution")?,
            debut: DebutParams::process_config(settings, "debut")?,
            mortality: MortalityParams::process_config(settings, "mortality.normal.weibull")?,
            routine_testing: RoutineTestingParams::process_config(settings, "routinetesting")?,
            condom_use: CondomUseParams::process_config(settings, "person.condomuse")?,
            prep: PrepParams {
                eligibility: PrepEligibilityParams::process_config(settings, "prep")?,
                offered: PrepOfferedParams::process_config(settings, "prepoffered")?,
                start: PrepStartParams::process_config(settings, "prepstart")?,
                screening: PrepScheduleParams::process_config(settings, "prepscreening")?,
                dropout: PrepScheduleParams::process_config_with(
                    settings,
                    "prepdropout",
                    prep_dropout_defaults(),
                )?,
            },
            hiv: HivParams {
                transmission: HivTransmissionParams::process_config(settings, "hivtransmission")?,
                diagnosis: HivDiagnosisParams::process_config(settings, "diagnosis")?,
                stages: HivStageParams::process_config(settings, "")?,
                seed_stages: HivSeedStageParams::process_config(settings, "hivseed")?,
                aids_mortality: AidsMortalityParams::process_config(
                    settings,
                    "mortality.aids.survtime",
                )?,
                outbreak: OutbreakParams::process(settings, "hiv", hiv_seed_defaults())?,
            },
            chlamydia: ChlamydiaParams {
                transmission: StiTransmissionParams::process_config(
                    settings,
                    "chlamydiatransmission",
                )?,
                diagnosis: StiDiagnosisParams::process_config(settings, "chlamydia.diagnosis")?,
                recovery: RecoveryParams::process_config(settings, "chlamydiarecovery")?,
                progression: ChlamydiaProgressionParams::process_config(
                    settings,
                    "chlamydiaprogression",
                )?,
                outbreak: OutbreakParams::process(settings, "chlamydia", SeedParams::default())?,
            },
            gonorrhea: GonorrheaParams {
                transmission: StiTransmissionParams::process_config(
                    settings,
                    "gonorrheatransmission",
                )?,
                diagnosis: StiDiagnosisParams::process_config(settings, "gonorrhea.diagnosis")?,
                progression: GonorrheaProgressionParams::process_config(
                    settings,
                    "gonorrheaprogression",
                )?,
                outbreak: OutbreakParams::process(settings, "gonorrhea", SeedParams::default())?,
            },
            syphilis: SyphilisParams {
                transmission: StiTransmissionParams::process_config(
                    settings,
                    "syphilistransmission",
                )?,
                diagnosis: StiDiagnosisParams::process_config(settings, "syphilis.diagnosis")?,
                progression: SyphilisProgressionParams::process_config(
                    settings,
                    "syphilisprogression",
                )?,
                outbreak: OutbreakParams::process(settings, "syphilis", SeedParams::default())?,
            },
            hsv2: Hsv2Params {
                transmission: Hsv2TransmissionParams::process_config(
                    settings,
                    "hsv2transmission.hazard",
                )?,
                diagnosis: StiDiagnosisParams::process_config(settings, "hsv2.diagnosis")?,
                progression: Hsv2ProgressionParams::process_config(settings, "hsv2progression")?,
                shedding: Hsv2SheddingParams::process_config(settings, "hsv2shedding")?,
                outbreak: OutbreakParams::process(settings, "hsv2", SeedParams::default())?,
            },
        })
    }

    /// Assemble the configuration, rejecting unknown keys and invalid distributions
    ///
    /// # Errors
    ///
    /// Returns `SimError::ConfigError` for malformed values, unknown keys or distributions whose
    /// parameters are out of range.
    pub fn from_settings(settings: &mut ConfigSettings) -> Result<Self, SimError> {
        let config = Self::process(settings)?;
        settings.ensure_all_used()?;
        config.validate()?;
        Ok(config)
    }

    fn distributions(&self) -> [&ConfigDistribution; 24] {
        [
            &self.population.age,
            &self.person.health_seeking_propensity,
            &self.person.treat_accept_threshold,
            &self.person.condom_use,
            &self.person.sexual_role,
            &self.person.hiv_b0,
            &self.person.hsv2_a,
            &self.person.hsv2_b2,
            &self.person.vsp_log10,
            &self.person.prep_accept_threshold,
            &self.routine_testing.interval,
            &self.prep.screening.interval,
            &self.prep.dropout.interval,
            &self.chlamydia.progression.incubation,
            &self.chlamydia.progression.immunity,
            &self.gonorrhea.progression.incubation,
            &self.gonorrhea.progression.symptomatic_duration,
            &self.gonorrhea.progression.asymptomatic_duration,
            &self.syphilis.progression.exposed,
            &self.syphilis.progression.primary,
            &self.syphilis.progression.secondary,
            &self.syphilis.progression.latent,
            &self.syphilis.progression.tertiary,
            &self.hsv2.progression.primary,
        ]
    }

    fn validate(&self) -> Result<(), SimError> {
        for dist in self.distributions() {
            dist.validate()?;
        }
        if !(0.0..=1.0).contains(&self.population.eyecap_fraction) {
            return Err(SimError::ConfigError(format!(
                "population.eyecap.fraction must lie in [0, 1], got {}",
                self.population.eyecap_fraction
            )));
        }
        if self.population.sim_time <= 0.0 {
            return Err(SimError::ConfigError(
                "population.simtime must be positive".to_string(),
            ));
        }
        self.hsv2.shedding.validate()
    }

    /// Write every effective key
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be represented in JSON.
    pub fn obtain_config(&self, writer: &mut ConfigWriter) -> Result<(), SimError> {
        self.population.obtain_config(writer, "population")?;
        self.person.obtain_config(writer, "person")?;
        self.formation.obtain_config(writer, "formation.hazard.agegap")?;
        self.formation_msm
            .obtain_config(writer, "formationmsm.hazard.agegap")?;
        self.dissolution.obtain_config(writer, "dissolution")?;
        self.debut.obtain_config(writer, "debut")?;
        self.mortality
            .obtain_config(writer, "mortality.normal.weibull")?;
        self.routine_testing.obtain_config(writer, "routinetesting")?;
        self.condom_use.obtain_config(writer, "person.condomuse")?;
        self.prep.eligibility.obtain_config(writer, "prep")?;
        self.prep.offered.obtain_config(writer, "prepoffered")?;
        self.prep.start.obtain_config(writer, "prepstart")?;
        self.prep.screening.obtain_config(writer, "prepscreening")?;
        self.prep.dropout.obtain_config(writer, "prepdropout")?;

        self.hiv.transmission.obtain_config(writer, "hivtransmission")?;
        self.hiv.diagnosis.obtain_config(writer, "diagnosis")?;
        self.hiv.stages.obtain_config(writer, "")?;
        self.hiv.seed_stages.obtain_config(writer, "hivseed")?;
        self.hiv
            .aids_mortality
            .obtain_config(writer, "mortality.aids.survtime")?;
        self.hiv.outbreak.obtain(writer, "hiv")?;

        self.chlamydia
            .transmission
            .obtain_config(writer, "chlamydiatransmission")?;
        self.chlamydia
            .diagnosis
            .obtain_config(writer, "chlamydia.diagnosis")?;
        self.chlamydia
            .recovery
            .obtain_config(writer, "chlamydiarecovery")?;
        self.chlamydia
            .progression
            .obtain_config(writer, "chlamydiaprogression")?;
        self.chlamydia.outbreak.obtain(writer, "chlamydia")?;

        self.gonorrhea
            .transmission
            .obtain_config(writer, "gonorrheatransmission")?;
        self.gonorrhea
            .diagnosis
            .obtain_config(writer, "gonorrhea.diagnosis")?;
        self.gonorrhea
            .progression
            .obtain_config(writer, "gonorrheaprogression")?;
        self.gonorrhea.outbreak.obtain(writer, "gonorrhea")?;

        self.syphilis
            .transmission
            .obtain_config(writer, "syphilistransmission")?;
        self.syphilis
            .diagnosis
            .obtain_config(writer, "syphilis.diagnosis")?;
        self.syphilis
            .progression
            .obtain_config(writer, "syphilisprogression")?;
        self.syphilis.outbreak.obtain(writer, "syphilis")?;

        self.hsv2
            .transmission
            .obtain_config(writer, "hsv2transmission.hazard")?;
        self.hsv2.diagnosis.obtain_config(writer, "hsv2.diagnosis")?;
        self.hsv2.progression.obtain_config(writer, "hsv2progression")?;
        self.hsv2.shedding.obtain_config(writer, "hsv2shedding")?;
        self.hsv2.outbreak.obtain(writer, "hsv2")
    }
}

define_global_property!(Parameters, SimConfig);

pub trait ContextParametersExt {
    /// Store the run's configuration. Can be done once.
    ///
    /// # Errors
    ///
    /// Returns an error if parameters were already loaded.
    fn load_parameters(&mut self, config: SimConfig) -> Result<(), SimError>;

    /// The run's configuration
    ///
    /// # Panics
    ///
    /// Panics if called before `load_parameters`.
    fn params(&self) -> &SimConfig;
}

impl ContextParametersExt for Context {
    fn load_parameters(&mut self, config: SimConfig) -> Result<(), SimError> {
        self.set_global_property_value(Parameters, config)
    }

    fn params(&self) -> &SimConfig {
        self.get_global_property_value(Parameters)
            .expect("Parameters must be loaded before the simulation starts")
    }
}
