//! CSV reports. Each report type is a serializable row struct; a writer is registered per type
//! with `add_report` and rows are appended with `send_report`.
use std::any::TypeId;
use std::cell::RefCell;
use std::ffi::OsStr;
use std::fs::{create_dir_all, File};
use std::path::Path;

use csv::Writer;
use log::trace;

use crate::context::Context;
use crate::error::SimError;
use crate::hashing::{HashMap, HashMapExt};

pub trait Report: 'static {
    // Returns report type
    fn type_id(&self) -> TypeId;
    // Serializes the data with the correct writer
    fn serialize(&self, writer: &mut Writer<File>) -> Result<(), SimError>;
}

/// Use this macro to implement `Report` for a serializable row type
#[macro_export]
macro_rules! create_report_trait {
    ($name:ident) => {
        impl $crate::report::Report for $name {
            fn type_id(&self) -> std::any::TypeId {
                std::any::TypeId::of::<$name>()
            }

            fn serialize(
                &self,
                writer: &mut csv::Writer<std::fs::File>,
            ) -> Result<(), $crate::error::SimError> {
                writer.serialize(self)?;
                Ok(())
            }
        }
    };
}
pub use create_report_trait;

struct ReportData {
    file_writers: RefCell<HashMap<TypeId, Writer<File>>>,
}

// Registers a data container that stores
// * file_writers: Maps report type to file writer
crate::context::define_data_plugin!(
    ReportPlugin,
    ReportData,
    ReportData {
        file_writers: RefCell::new(HashMap::new()),
    }
);

// Checks that the path is valid. Creates the file and all parent directories if
// they do not exist. Returns the file if successful. Called by `add_report`
fn generate_validate_filepath(path_name: &str) -> Result<File, SimError> {
    let path = Path::new(path_name);
    match path.extension().and_then(OsStr::to_str) {
        Some("csv") => {
            if let Some(parent) = path.parent() {
                create_dir_all(parent)?;
            }
            let file = File::create(path)?;
            Ok(file)
        }
        _ => Err(SimError::ReportError(
            "Report output files must be CSVs at this time".to_string(),
        )),
    }
}

pub trait ContextReportExt {
    /// Call `add_report` with each report type.
    /// Takes the complete path to which the output the report as argument.
    ///
    /// # Errors
    ///
    /// Returns a `SimError` if the path is not a CSV or the file cannot be created
    fn add_report<T: Report + 'static>(&mut self, filepath: &str) -> Result<(), SimError>;

    /// True if a writer has been registered for the report type
    fn has_report<T: Report + 'static>(&self) -> bool;

    /// Write a new row with columns following items in the report struct
    /// to the report file associated with the report type struct.
    ///
    /// # Errors
    ///
    /// Returns a `SimError` if serialization or the write fails
    ///
    /// # Panics
    ///
    /// Panics if no writer was registered for the report type
    fn send_report<T: Report>(&self, report: T) -> Result<(), SimError>;
}

impl ContextReportExt for Context {
    fn add_report<T: Report + 'static>(&mut self, filepath: &str) -> Result<(), SimError> {
        trace!("adding report {filepath}");
        let file = generate_validate_filepath(filepath)?;

        let data_container = self.get_data_container_mut(ReportPlugin);
        let writer = Writer::from_writer(file);
        let mut file_writer = data_container.file_writers.borrow_mut();
        file_writer.insert(TypeId::of::<T>(), writer);
        Ok(())
    }

    fn has_report<T: Report + 'static>(&self) -> bool {
        self.get_data_container(ReportPlugin)
            .is_some_and(|data| data.file_writers.borrow().contains_key(&TypeId::of::<T>()))
    }

    fn send_report<T: Report>(&self, report: T) -> Result<(), SimError> {
        // No data container will exist if no reports have been added
        let data_container = self
            .get_data_container(ReportPlugin)
            .expect("No writer found for the report type");
        let mut writer_cell = data_container.file_writers.try_borrow_mut().unwrap();
        let writer = writer_cell
            .get_mut(&report.type_id())
            .expect("No writer found for the report type");
        report.serialize(writer)?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_derive::{Deserialize, Serialize};
    use tempfile::tempdir;

    #[derive(Serialize, Deserialize)]
    struct SampleReport {
        id: u32,
        value: String,
    }

    create_report_trait!(SampleReport);

    #[test]
    fn add_and_send_report() {
        let mut context = Context::new();
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path();
        assert!(!context.has_report::<SampleReport>());
        context
            .add_report::<SampleReport>(path.join("sample_report.csv").to_str().unwrap())
            .unwrap();
        assert!(context.has_report::<SampleReport>());
        let report = SampleReport {
            id: 1,
            value: "Test Value".to_string(),
        };

        context.send_report(report).unwrap();

        let file_path = path.join("sample_report.csv");
        assert!(file_path.exists(), "CSV file should exist");

        let mut reader = csv::Reader::from_path(file_path).unwrap();
        let records: Vec<SampleReport> = reader.deserialize().map(Result::unwrap).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, 1);
        assert_eq!(records[0].value, "Test Value");
    }

    #[test]
    fn directory_creation_writing_works() {
        let mut context = Context::new();
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path();
        context
            .add_report::<SampleReport>(
                path.join("test-temp")
                    .join("sample_report.csv")
                    .to_str()
                    .unwrap(),
            )
            .unwrap();
        context
            .send_report(SampleReport {
                id: 1,
                value: "Test Value".to_string(),
            })
            .unwrap();

        let file_path = path.join("test-temp").join("sample_report.csv");
        assert!(file_path.exists(), "CSV file should exist");
    }

    #[test]
    #[should_panic(expected = "Report output files must be CSVs at this time")]
    fn only_csvs_allowed() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path();
        let res = generate_validate_filepath(path.join("sample_report.tsv").to_str().unwrap());
        match res {
            Ok(_) => {
                panic!("Other file types beyond CSV are not allowed (yet)")
            }
            Err(error) => match error {
                SimError::ReportError(error_message) => panic!("{}", error_message),
                _ => panic!("Unexpected error"),
            },
        }
    }

    #[test]
    #[should_panic(expected = "No writer found for the report type")]
    fn send_report_without_adding_report() {
        let context = Context::new();
        let report = SampleReport {
            id: 1,
            value: "Test Value".to_string(),
        };

        let _ = context.send_report(report);
    }

    #[test]
    fn multiple_rows_with_special_characters() {
        let mut context = Context::new();
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path();
        context
            .add_report::<SampleReport>(path.join("rows.csv").to_str().unwrap())
            .unwrap();
        context
            .send_report(SampleReport {
                id: 1,
                value: "Value,1".to_string(),
            })
            .unwrap();
        context
            .send_report(SampleReport {
                id: 2,
                value: "Value\n2".to_string(),
            })
            .unwrap();

        let mut reader = csv::Reader::from_path(path.join("rows.csv")).unwrap();
        let mut records = reader.deserialize::<SampleReport>();

        let item1: SampleReport = records.next().unwrap().unwrap();
        assert_eq!(item1.id, 1);
        assert_eq!(item1.value, "Value,1");

        let item2: SampleReport = records.next().unwrap().unwrap();
        assert_eq!(item2.id, 2);
        assert_eq!(item2.value, "Value\n2");
    }
}
