//! The structured record of everything that happened during a run.
//!
//! Each fired event (and a few notable state transitions) is written as an [`EventLogRecord`].
//! Records are counted per category in memory, and streamed to `events.csv` when that report
//! has been registered.
use std::collections::BTreeMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::create_report_trait;
use crate::define_data_plugin;
use crate::error::SimError;
use crate::population::PersonId;
use crate::report::ContextReportExt;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventLogRecord {
    pub time: f64,
    pub event: String,
    pub person1: Option<PersonId>,
    pub person2: Option<PersonId>,
}

create_report_trait!(EventLogRecord);

define_data_plugin!(EventTallyPlugin, BTreeMap<String, usize>, BTreeMap::new());

pub trait ContextEventLogExt {
    /// Record `event` at the current time for up to two people
    ///
    /// # Errors
    ///
    /// Returns an error if the events report cannot be written.
    fn log_event(&mut self, event: &str, persons: &[PersonId]) -> Result<(), SimError>;

    /// How many records of the category have been logged
    fn event_count(&self, event: &str) -> usize;

    /// Record counts for every category, sorted by name
    fn event_counts(&self) -> BTreeMap<String, usize>;
}

impl ContextEventLogExt for Context {
    fn log_event(&mut self, event: &str, persons: &[PersonId]) -> Result<(), SimError> {
        let time = self.get_current_time();
        debug!("t={time:.6} {event} {persons:?}");
        *self
            .get_data_container_mut(EventTallyPlugin)
            .entry(event.to_string())
            .or_insert(0) += 1;
        if self.has_report::<EventLogRecord>() {
            self.send_report(EventLogRecord {
                time,
                event: event.to_string(),
                person1: persons.first().copied(),
                person2: persons.get(1).copied(),
            })?;
        }
        Ok(())
    }

    fn event_count(&self, event: &str) -> usize {
        self.get_data_container(EventTallyPlugin)
            .and_then(|tally| tally.get(event).copied())
            .unwrap_or(0)
    }

    fn event_counts(&self) -> BTreeMap<String, usize> {
        self.get_data_container(EventTallyPlugin)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::population::{ContextPopulationExt, Person, Sex};
    use tempfile::tempdir;

    #[test]
    fn tallies_without_a_report() {
        let mut context = Context::new();
        context.log_event("debut", &[]).unwrap();
        context.log_event("debut", &[]).unwrap();
        context.log_event("mortality", &[]).unwrap();
        assert_eq!(context.event_count("debut"), 2);
        assert_eq!(context.event_count("formation"), 0);
        let counts = context.event_counts();
        assert_eq!(counts.keys().collect::<Vec<_>>(), vec!["debut", "mortality"]);
    }

    #[test]
    fn writes_rows_when_report_registered() {
        let mut context = Context::new();
        let a = context.add_person(Person::new(Sex::Male, 0.0));
        let b = context.add_person(Person::new(Sex::Female, 0.0));
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.csv");
        context
            .add_report::<EventLogRecord>(path.to_str().unwrap())
            .unwrap();
        context.log_event("formation", &[a, b]).unwrap();
        context.log_event("debut", &[b]).unwrap();

        let mut reader = csv::Reader::from_path(path).unwrap();
        let rows: Vec<EventLogRecord> = reader.deserialize().map(Result::unwrap).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].event, "formation");
        assert_eq!(rows[0].person1, Some(a));
        assert_eq!(rows[0].person2, Some(b));
        assert_eq!(rows[1].person2, None);
    }
}
