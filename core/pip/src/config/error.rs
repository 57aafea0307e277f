use std::{io, path::PathBuf, time::Duration};

use thiserror::Error;

use crate::{parsers::ParserError, plugin::PluginKind};

use super::SettingsError;

#[derive(Error, Debug)]
#[error("could not load config from '{}'", config_file.display())]
pub struct LoadError {
    pub config_file: PathBuf,
    #[source]
    pub(super) kind: LoadErrorCause,
}

#[derive(Error, Debug)]
pub(super) enum LoadErrorCause {
    #[error("read failed")]
    Read(#[source] io::Error),
    #[error("the config file is not valid UTF-8")]
    InvalidUtf8(#[source] std::string::FromUtf8Error),
    #[error("invalid TOML config")]
    InvalidToml(#[from] toml::de::Error),
}

#[derive(Error, Debug)]
#[error("unexpected type for {path}: expected {expected}, got {actual}")]
pub struct BadTypeError {
    pub path: String,
    pub expected: &'static str,
    pub actual: &'static str,
}

impl BadTypeError {
    pub fn new(path: String, expected: &'static str, actual: &toml::Value) -> Self {
        Self {
            path,
            expected,
            actual: actual.type_str(),
        }
    }
}

/// Error that prevents the configuration from being turned into a runnable pipeline.
///
/// Every `ConfigError` is fatal: the agent does not start.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    BadType(#[from] BadTypeError),
    #[error("undefined {kind}: {name}")]
    UndefinedPlugin { kind: PluginKind, name: String },
    #[error("default {kind} '{name}' is not registered")]
    MissingDefault { kind: PluginKind, name: &'static str },
    #[error("unrecognized options in {plugin}: {}", keys.join(", "))]
    UnrecognizedOption { plugin: String, keys: Vec<String> },
    #[error("invalid parser settings for {plugin}")]
    Parser {
        plugin: String,
        #[source]
        source: ParserError,
    },
    #[error("invalid settings for {plugin}")]
    InvalidSettings {
        plugin: String,
        #[source]
        source: SettingsError,
    },
    #[error("invalid agent settings")]
    AgentSettings(#[source] toml::de::Error),
    #[error("the interval of {0} must be greater than zero")]
    ZeroInterval(String),
    #[error("the interval of {owner} is too large: {interval:?}")]
    IntervalTooLarge { owner: String, interval: Duration },
    #[error("could not configure plugin {plugin}")]
    Plugin {
        plugin: String,
        #[source]
        source: anyhow::Error,
    },
}

impl ConfigError {
    /// Returns `true` if the error is caused by an unsupported data format.
    pub fn is_unsupported_format(&self) -> bool {
        matches!(
            self,
            ConfigError::Parser {
                source: ParserError::UnsupportedFormat(_),
                ..
            }
        )
    }
}
