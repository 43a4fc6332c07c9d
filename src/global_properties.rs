//! Global properties are immutable values set once per run and readable from anywhere through the
//! `Context`. The simulation parameters are stored this way, so every event reads the same
//! configuration by reference instead of through process-wide statics.
use std::any::{Any, TypeId};
use std::fs;
use std::path::Path;

use log::trace;
use serde::de::DeserializeOwned;

use crate::context::Context;
use crate::define_data_plugin;
use crate::error::SimError;
use crate::hashing::{HashMap, HashMapExt};

/// Defines a global property with the following parameters:
/// * `$global_property`: Name for the identifier type of the global property
/// * `$value`: The type of the property's value
#[macro_export]
macro_rules! define_global_property {
    ($global_property:ident, $value:ty) => {
        #[derive(Copy, Clone)]
        pub struct $global_property;

        impl $crate::global_properties::GlobalProperty for $global_property {
            type Value = $value;

            fn name() -> &'static str {
                stringify!($global_property)
            }
        }
    };
}
pub use define_global_property;

pub trait GlobalProperty: Any {
    type Value: Any;

    fn name() -> &'static str;
}

struct GlobalPropertiesDataContainer {
    global_property_container: HashMap<TypeId, Box<dyn Any>>,
}

define_data_plugin!(
    GlobalPropertiesPlugin,
    GlobalPropertiesDataContainer,
    GlobalPropertiesDataContainer {
        global_property_container: HashMap::new(),
    }
);

/// Reads a JSON file into any deserializable type
///
/// # Errors
///
/// Returns `SimError::IoError` if the file cannot be read and `SimError::JsonError` if it does
/// not parse as `T`.
pub fn load_parameters_from_json<T: DeserializeOwned>(file_path: &Path) -> Result<T, SimError> {
    trace!("reading parameters from {}", file_path.display());
    let config_file = fs::read_to_string(file_path)?;
    let parameters: T = serde_json::from_str(&config_file)?;
    Ok(parameters)
}

pub trait ContextGlobalPropertiesExt {
    /// Set the value of a global property. A property can be set only once.
    ///
    /// # Errors
    ///
    /// Returns `SimError::SimError` if the property already has a value.
    fn set_global_property_value<T: GlobalProperty>(
        &mut self,
        property: T,
        value: T::Value,
    ) -> Result<(), SimError>;

    /// Returns a reference to the value of a global property, if it has been set
    fn get_global_property_value<T: GlobalProperty>(&self, property: T) -> Option<&T::Value>;
}

impl ContextGlobalPropertiesExt for Context {
    fn set_global_property_value<T: GlobalProperty>(
        &mut self,
        _property: T,
        value: T::Value,
    ) -> Result<(), SimError> {
        let data_container = self.get_data_container_mut(GlobalPropertiesPlugin);
        let type_id = TypeId::of::<T>();
        if data_container
            .global_property_container
            .contains_key(&type_id)
        {
            return Err(SimError::SimError(format!(
                "Global property {} is already set",
                T::name()
            )));
        }
        data_container
            .global_property_container
            .insert(type_id, Box::new(value));
        Ok(())
    }

    fn get_global_property_value<T: GlobalProperty>(&self, _property: T) -> Option<&T::Value> {
        self.get_data_container(GlobalPropertiesPlugin)?
            .global_property_container
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T::Value>())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    pub struct ParamType {
        pub days: usize,
        pub diseases: usize,
    }

    define_global_property!(DiseaseParams, ParamType);

    #[test]
    fn set_get_global_property() {
        let params = ParamType {
            days: 10,
            diseases: 2,
        };
        let mut context = Context::new();
        assert!(context.get_global_property_value(DiseaseParams).is_none());
        context
            .set_global_property_value(DiseaseParams, params.clone())
            .unwrap();
        let global_params = context.get_global_property_value(DiseaseParams).unwrap();
        assert_eq!(*global_params, params);
    }

    #[test]
    fn set_twice_is_an_error() {
        let mut context = Context::new();
        let params = ParamType {
            days: 1,
            diseases: 1,
        };
        context
            .set_global_property_value(DiseaseParams, params.clone())
            .unwrap();
        match context.set_global_property_value(DiseaseParams, params) {
            Err(SimError::SimError(msg)) => {
                assert_eq!(msg, "Global property DiseaseParams is already set");
            }
            _ => panic!("Expected an error when setting a property twice"),
        }
    }

    #[test]
    fn load_parameters_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{\"days\": 12, \"diseases\": 5}}").unwrap();
        let params: ParamType = load_parameters_from_json(file.path()).unwrap();
        assert_eq!(params.days, 12);
        assert_eq!(params.diseases, 5);
    }

    #[test]
    fn load_parameters_missing_file() {
        let result: Result<ParamType, SimError> =
            load_parameters_from_json(Path::new("./does-not-exist.json"));
        assert!(matches!(result, Err(SimError::IoError(_))));
    }
}
