//! Assembling a run: the initial population and its first events, the output files, and the
//! end-of-run reports.
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::config::{ConfigSettings, ConfigWriter};
use crate::context::Context;
use crate::create_report_trait;
use crate::disease::chlamydia::ChlamydiaStage;
use crate::disease::gonorrhea::GonorrheaStage;
use crate::disease::hiv::HivStage;
use crate::disease::hsv2::Hsv2Stage;
use crate::disease::syphilis::SyphilisStage;
use crate::disease::{schedule_all_outbreaks, InfectionType};
use crate::error::SimError;
use crate::event_log::{ContextEventLogExt, EventLogRecord};
use crate::mortality::schedule_mortality;
use crate::parameters::{ContextParametersExt, SimConfig};
use crate::population::{
    ContextPopulationExt, ContextPopulationLoaderExt, Person, PersonId, Sex, SexualRole,
};
use crate::relationships::{report_open_relationships, schedule_debuts, RelationshipRecord};
use crate::report::ContextReportExt;

pub const EVENTS_FILE: &str = "events.csv";
pub const PERSONS_FILE: &str = "persons.csv";
pub const RELATIONS_FILE: &str = "relations.csv";
pub const CONFIG_FILE: &str = "config.json";

/// One row of `persons.csv`, describing a person's state at the end of the run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersonRecord {
    pub id: PersonId,
    pub sex: Sex,
    pub date_of_birth: f64,
    pub death_time: Option<f64>,
    pub aids_death: bool,
    pub debut_time: Option<f64>,
    pub msm: bool,
    pub sexual_role: SexualRole,
    pub x: f64,
    pub y: f64,
    pub health_seeking_propensity: f64,
    pub sti_diagnosis_count: u32,
    pub hiv_stage: HivStage,
    pub hiv_infection_time: Option<f64>,
    pub hiv_origin: Option<PersonId>,
    pub hiv_infection_type: InfectionType,
    pub hiv_diagnosed: bool,
    pub set_point_viral_load: Option<f64>,
    pub chlamydia_stage: ChlamydiaStage,
    pub chlamydia_infection_time: Option<f64>,
    pub gonorrhea_stage: GonorrheaStage,
    pub gonorrhea_infection_time: Option<f64>,
    pub syphilis_stage: SyphilisStage,
    pub syphilis_infection_time: Option<f64>,
    pub hsv2_stage: Hsv2Stage,
    pub hsv2_infection_time: Option<f64>,
    pub hsv2_origin: Option<PersonId>,
}

create_report_trait!(PersonRecord);

impl From<&Person> for PersonRecord {
    fn from(p: &Person) -> Self {
        let aids_death = match (p.death_time, p.hiv_profile) {
            (Some(death), Some(profile)) => death == profile.aids_death_time,
            _ => false,
        };
        PersonRecord {
            id: p.id,
            sex: p.sex,
            date_of_birth: p.date_of_birth,
            death_time: p.death_time,
            aids_death,
            debut_time: p.debut_time,
            msm: p.msm,
            sexual_role: p.sexual_role,
            x: p.location.x,
            y: p.location.y,
            health_seeking_propensity: p.health_seeking_propensity,
            sti_diagnosis_count: p.sti_diagnosis_count,
            hiv_stage: p.hiv.stage,
            hiv_infection_time: p.hiv.infection_time,
            hiv_origin: p.hiv.infection_origin,
            hiv_infection_type: p.hiv.infection_type,
            hiv_diagnosed: p.hiv.diagnosed,
            set_point_viral_load: p.hiv_profile.map(|profile| profile.set_point_viral_load),
            chlamydia_stage: p.chlamydia.stage,
            chlamydia_infection_time: p.chlamydia.infection_time,
            gonorrhea_stage: p.gonorrhea.stage,
            gonorrhea_infection_time: p.gonorrhea.infection_time,
            syphilis_stage: p.syphilis.stage,
            syphilis_infection_time: p.syphilis.infection_time,
            hsv2_stage: p.hsv2.stage,
            hsv2_infection_time: p.hsv2.infection_time,
            hsv2_origin: p.hsv2.infection_origin,
        }
    }
}

/// Read a flat JSON configuration file, or use the defaults for an empty path
///
/// # Errors
///
/// Returns `SimError::ConfigError` for unknown keys or invalid values, or an error if the file
/// cannot be read.
pub fn load_config(path: &str) -> Result<SimConfig, SimError> {
    let mut settings = if path.is_empty() {
        ConfigSettings::new()
    } else {
        ConfigSettings::from_file(Path::new(path))?
    };
    SimConfig::from_settings(&mut settings)
}

/// Register the three CSV reports in `output_dir` and write the effective configuration next to
/// them
///
/// # Errors
///
/// Returns an error if a file cannot be created.
pub fn add_output_files(context: &mut Context, output_dir: &Path) -> Result<(), SimError> {
    let path = |file: &str| output_dir.join(file).to_string_lossy().into_owned();
    context.add_report::<EventLogRecord>(&path(EVENTS_FILE))?;
    context.add_report::<PersonRecord>(&path(PERSONS_FILE))?;
    context.add_report::<RelationshipRecord>(&path(RELATIONS_FILE))?;

    let mut writer = ConfigWriter::new();
    context.params().obtain_config(&mut writer)?;
    writer.write_to_file(&output_dir.join(CONFIG_FILE))
}

/// Create the population and schedule the events every run starts with
///
/// # Errors
///
/// Returns an error if the population cannot be created or an initial event cannot be
/// scheduled.
pub fn setup_simulation(context: &mut Context) -> Result<(), SimError> {
    context.init_population()?;
    schedule_mortality(context)?;
    schedule_debuts(context)?;
    schedule_all_outbreaks(context)?;
    context.set_end_time(context.params().population.sim_time);
    Ok(())
}

/// Write the end-of-run rows: relationships still running, then every person
///
/// # Errors
///
/// Returns an error if a report cannot be written.
pub fn finish_simulation(context: &Context) -> Result<(), SimError> {
    report_open_relationships(context)?;
    if context.has_report::<PersonRecord>() {
        for id in context.person_ids() {
            context.send_report(PersonRecord::from(context.person(id)))?;
        }
    }
    info!(
        "finished at t={}: {} of {} people alive",
        context.get_current_time(),
        context.living_count(),
        context.population_size()
    );
    for (event, count) in context.event_counts() {
        info!("{event}: {count}");
    }
    Ok(())
}

/// Run a set-up simulation to its end time and write the end-of-run reports
///
/// # Errors
///
/// Returns the error that aborted the run, a broken relationship invariant, or a report error.
pub fn execute_simulation(context: &mut Context) -> Result<(), SimError> {
    context.execute()?;
    context.check_relationship_symmetry()?;
    finish_simulation(context)
}

/// Set up, execute and finish a run whose parameters are already loaded
///
/// # Errors
///
/// Returns the first error raised while setting up, by a firing event, or while reporting.
pub fn run_simulation(context: &mut Context) -> Result<(), SimError> {
    setup_simulation(context)?;
    execute_simulation(context)
}
