//! Configuration of the pipeline.
//!
//! The configuration is a TOML document, loaded by [`Loader`] and turned into
//! running plugins by [`ConfigBuilder`].

use serde::{Serialize, de::DeserializeOwned};

pub mod builder;
pub mod error;
pub mod loader;

pub use builder::{Config, ConfigBuilder};
pub use loader::Loader;

/// Settings of one plugin instance.
///
/// Plugins receive a `ConfigTable` in their `configure` hook and *take* the keys they
/// understand out of it. Whatever is left when the hook returns is reported as an
/// unrecognized option.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigTable(toml::Table);

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("invalid value for key '{key}': {source}")]
    InvalidValue { key: String, source: toml::de::Error },
    #[error("invalid settings: {0}")]
    Invalid(#[from] toml::de::Error),
    #[error("settings cannot be represented as a table: {0}")]
    NotATable(#[from] toml::ser::Error),
}

impl ConfigTable {
    pub fn new(table: toml::Table) -> Self {
        Self(table)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Removes a raw value from the table.
    pub fn remove(&mut self, key: &str) -> Option<toml::Value> {
        self.0.remove(key)
    }

    /// Removes a value from the table and deserializes it.
    ///
    /// The key is consumed even if the value has the wrong type.
    pub fn take<T: DeserializeOwned>(&mut self, key: &str) -> Result<Option<T>, SettingsError> {
        match self.0.remove(key) {
            None => Ok(None),
            Some(value) => value
                .try_into()
                .map(Some)
                .map_err(|source| SettingsError::InvalidValue {
                    key: key.to_owned(),
                    source,
                }),
        }
    }

    /// Deserializes a settings structure from the table, and consumes the keys it recognizes.
    ///
    /// Missing keys get their default value if `T` allows it (`#[serde(default)]`).
    /// The recognized keys are the ones that appear when `T` is serialized back,
    /// hence `T` must not skip fields that can be set.
    pub fn decode<T: DeserializeOwned + Serialize>(&mut self) -> Result<T, SettingsError> {
        let settings: T = toml::Value::Table(self.0.clone()).try_into()?;
        let known = match toml::Value::try_from(&settings)? {
            toml::Value::Table(t) => t,
            _ => toml::Table::new(),
        };
        self.0.retain(|k, _| !known.contains_key(k));
        Ok(settings)
    }

    pub fn into_inner(self) -> toml::Table {
        self.0
    }
}

impl From<toml::Table> for ConfigTable {
    fn from(table: toml::Table) -> Self {
        Self(table)
    }
}
