//! Flat, dotted-key configuration.
//!
//! A configuration file is a JSON object whose keys are dotted names such as
//! `"chlamydiatransmission.hazard.a"`. Every component declares the keys it reads, with a type
//! and a default, through [`define_config_section!`]. Reading consumes keys from
//! [`ConfigSettings`]; whatever is left over afterwards is an unknown key and is rejected. The
//! effective values can be written back with [`ConfigWriter`] so a run can be reproduced exactly.
mod distribution;

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use log::trace;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

pub use distribution::ConfigDistribution;

use crate::error::SimError;
use crate::global_properties::load_parameters_from_json;

/// A group of configuration keys that share a prefix
pub trait ConfigSection: Sized {
    /// Read (and consume) the section's keys from `settings`, falling back to defaults for
    /// missing keys.
    ///
    /// # Errors
    ///
    /// Returns `SimError::ConfigError` if a present value has the wrong type.
    fn process_config(settings: &mut ConfigSettings, prefix: &str) -> Result<Self, SimError>
    where
        Self: Default,
    {
        Self::process_config_with(settings, prefix, Self::default())
    }

    /// Like `process_config`, with caller-supplied defaults for missing keys
    ///
    /// # Errors
    ///
    /// Returns `SimError::ConfigError` if a present value has the wrong type.
    fn process_config_with(
        settings: &mut ConfigSettings,
        prefix: &str,
        defaults: Self,
    ) -> Result<Self, SimError>;

    /// Write every key of the section with its effective value
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be represented in JSON.
    fn obtain_config(&self, writer: &mut ConfigWriter, prefix: &str) -> Result<(), SimError>;
}

/// `join_key("hivseed", "time")` is `"hivseed.time"`
#[must_use]
pub fn join_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// The raw key-value store read from a configuration file
#[derive(Debug, Default, Clone)]
pub struct ConfigSettings {
    values: BTreeMap<String, Value>,
    used: BTreeSet<String>,
}

impl ConfigSettings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON object of dotted keys
    ///
    /// # Errors
    ///
    /// Returns `SimError::JsonError` for invalid JSON and `SimError::ConfigError` if the top
    /// level is not an object.
    pub fn from_json_str(json: &str) -> Result<Self, SimError> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Load a JSON object of dotted keys from a file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a JSON object.
    pub fn from_file(path: &Path) -> Result<Self, SimError> {
        trace!("loading configuration from {}", path.display());
        let value: Value = load_parameters_from_json(path)?;
        Self::from_value(value)
    }

    fn from_value(value: Value) -> Result<Self, SimError> {
        match value {
            Value::Object(map) => Ok(Self::from_map(map)),
            _ => Err(SimError::ConfigError(
                "The configuration must be a JSON object of dotted keys".to_string(),
            )),
        }
    }

    fn from_map(map: Map<String, Value>) -> Self {
        Self {
            values: map.into_iter().collect(),
            used: BTreeSet::new(),
        }
    }

    /// Set or replace a raw value
    pub fn set(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    /// Read `key`, or return `default` when the key is absent. The key is marked as used.
    ///
    /// # Errors
    ///
    /// Returns `SimError::ConfigError` naming the key if the value does not deserialize as `T`.
    pub fn take_value<T: DeserializeOwned>(&mut self, key: &str, default: T) -> Result<T, SimError> {
        self.used.insert(key.to_string());
        match self.values.get(key) {
            None => Ok(default),
            Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
                SimError::ConfigError(format!(
                    "Invalid value {value} for configuration key '{key}': {e}"
                ))
            }),
        }
    }

    /// Keys present in the file that no component read
    #[must_use]
    pub fn unused_keys(&self) -> Vec<&str> {
        self.values
            .keys()
            .filter(|key| !self.used.contains(*key))
            .map(String::as_str)
            .collect()
    }

    /// # Errors
    ///
    /// Returns `SimError::ConfigError` listing every key that no component read.
    pub fn ensure_all_used(&self) -> Result<(), SimError> {
        let unused = self.unused_keys();
        if unused.is_empty() {
            Ok(())
        } else {
            Err(SimError::ConfigError(format!(
                "Unrecognized configuration keys: {}",
                unused.join(", ")
            )))
        }
    }
}

impl From<ConfigWriter> for ConfigSettings {
    fn from(writer: ConfigWriter) -> Self {
        Self {
            values: writer.values,
            used: BTreeSet::new(),
        }
    }
}

fn contains_null(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.iter().any(contains_null),
        Value::Object(map) => map.values().any(contains_null),
        _ => false,
    }
}

/// Collects effective configuration values for writing back out
#[derive(Debug, Default, Clone)]
pub struct ConfigWriter {
    values: BTreeMap<String, Value>,
}

impl ConfigWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// Returns `SimError::JsonError` if the value fails to serialize, and
    /// `SimError::ConfigError` if it contains a number JSON cannot hold, such as NaN, which
    /// would otherwise be written as `null`.
    pub fn add_key<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), SimError> {
        let value = serde_json::to_value(value)?;
        if contains_null(&value) {
            return Err(SimError::ConfigError(format!(
                "Configuration key '{key}' has a value that cannot be written as JSON"
            )));
        }
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The collected keys as a pretty-printed JSON object, sorted by key
    ///
    /// # Errors
    ///
    /// Returns `SimError::JsonError` if serialization fails.
    pub fn to_json_string(&self) -> Result<String, SimError> {
        Ok(serde_json::to_string_pretty(&self.values)?)
    }

    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_to_file(&self, path: &Path) -> Result<(), SimError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_json_string()?)?;
        Ok(())
    }
}

/// Declares a configuration section: a plain struct whose fields are each bound to a dotted key
/// (relative to a prefix chosen at read time) and a default.
///
/// ```
/// use stisim::define_config_section;
///
/// define_config_section! {
///     /// Baseline and slope of a hazard
///     pub struct HazardParams {
///         baseline: f64 = ("baseline", 0.0),
///         beta: f64 = ("beta", 0.0),
///     }
/// }
/// ```
#[macro_export]
macro_rules! define_config_section {
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field:ident : $ty:ty = ($key:literal, $default:expr)
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq)]
        pub struct $name {
            $(
                $(#[$field_meta])*
                pub $field: $ty,
            )*
        }

        impl Default for $name {
            fn default() -> Self {
                Self {
                    $( $field: $default, )*
                }
            }
        }

        impl $crate::config::ConfigSection for $name {
            fn process_config_with(
                settings: &mut $crate::config::ConfigSettings,
                prefix: &str,
                defaults: Self,
            ) -> Result<Self, $crate::error::SimError> {
                Ok(Self {
                    $(
                        $field: settings.take_value(
                            &$crate::config::join_key(prefix, $key),
                            defaults.$field,
                        )?,
                    )*
                })
            }

            fn obtain_config(
                &self,
                writer: &mut $crate::config::ConfigWriter,
                prefix: &str,
            ) -> Result<(), $crate::error::SimError> {
                $( writer.add_key(&$crate::config::join_key(prefix, $key), &self.$field)?; )*
                Ok(())
            }
        }
    };
}
pub use define_config_section;

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use serde_json::json;

    define_config_section! {
        pub struct TestSection {
            rate: f64 = ("hazard.rate", 1.5),
            enabled: bool = ("enabled", false),
            count: usize = ("count", 3),
            duration: ConfigDistribution = ("duration.dist", ConfigDistribution::Fixed { value: 2.0 }),
        }
    }

    #[test]
    fn defaults_when_keys_absent() {
        let mut settings = ConfigSettings::new();
        let section = TestSection::process_config(&mut settings, "test").unwrap();
        assert_eq!(section, TestSection::default());
        assert!(settings.ensure_all_used().is_ok());
    }

    #[test]
    fn reads_prefixed_keys() {
        let mut settings = ConfigSettings::from_json_str(
            r#"{ "test.hazard.rate": -2.0, "test.enabled": true,
                 "test.duration.dist": { "type": "uniform", "min": 1.0, "max": 3.0 } }"#,
        )
        .unwrap();
        let section = TestSection::process_config(&mut settings, "test").unwrap();
        assert_eq!(section.rate, -2.0);
        assert!(section.enabled);
        assert_eq!(section.count, 3);
        assert_eq!(
            section.duration,
            ConfigDistribution::Uniform { min: 1.0, max: 3.0 }
        );
    }

    #[test]
    fn caller_defaults_fill_missing_keys() {
        let mut settings = ConfigSettings::from_json_str(r#"{ "t.count": 7 }"#).unwrap();
        let defaults = TestSection {
            rate: -1.0,
            ..TestSection::default()
        };
        let section = TestSection::process_config_with(&mut settings, "t", defaults).unwrap();
        assert_eq!(section.rate, -1.0);
        assert_eq!(section.count, 7);
    }

    #[test]
    fn malformed_value_names_the_key() {
        let mut settings = ConfigSettings::from_json_str(r#"{ "test.count": "many" }"#).unwrap();
        match TestSection::process_config(&mut settings, "test") {
            Err(SimError::ConfigError(msg)) => assert!(msg.contains("'test.count'")),
            _ => panic!("Expected a configuration error"),
        }
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut settings =
            ConfigSettings::from_json_str(r#"{ "test.rate": 1.0, "other": 2 }"#).unwrap();
        TestSection::process_config(&mut settings, "test").unwrap();
        match settings.ensure_all_used() {
            Err(SimError::ConfigError(msg)) => {
                assert_eq!(msg, "Unrecognized configuration keys: other, test.rate");
            }
            _ => panic!("Expected unknown keys to be reported"),
        }
    }

    #[test]
    fn top_level_must_be_object() {
        assert!(matches!(
            ConfigSettings::from_json_str("[1, 2]"),
            Err(SimError::ConfigError(_))
        ));
    }

    #[test]
    fn writer_round_trip() {
        let section = TestSection {
            rate: 0.25,
            enabled: true,
            count: 9,
            duration: ConfigDistribution::Exponential { lambda: 4.0 },
        };
        let mut writer = ConfigWriter::new();
        section.obtain_config(&mut writer, "x").unwrap();
        assert_eq!(writer.len(), 4);
        assert_eq!(writer.get("x.hazard.rate"), Some(&json!(0.25)));

        let mut settings = ConfigSettings::from(writer);
        let read_back = TestSection::process_config(&mut settings, "x").unwrap();
        assert_eq!(read_back, section);
        assert!(settings.ensure_all_used().is_ok());
    }

    #[test]
    fn unrepresentable_values_are_errors() {
        let mut writer = ConfigWriter::new();
        assert!(matches!(
            writer.add_key("rate", &f64::NAN),
            Err(SimError::ConfigError(msg)) if msg.contains("'rate'")
        ));
        let nested = ConfigDistribution::Normal {
            mu: f64::INFINITY,
            sigma: 1.0,
        };
        assert!(writer.add_key("dist", &nested).is_err());
        assert!(writer.is_empty());

        let section = TestSection {
            rate: f64::NAN,
            ..TestSection::default()
        };
        assert!(section.obtain_config(&mut writer, "x").is_err());
    }
}
