//! Parsers turn raw data read by an input into metrics.
//!
//! Inputs that read data in a configurable format declare a parser capability
//! (see [`ParserInput`](crate::plugin::ParserInput)). The config builder then extracts
//! a [`ParserConfig`] from the plugin's table and builds the parser with [`new_parser`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::metric::{Metric, MetricError, Tags};

pub mod value;

/// Builds a fresh parser on each call.
pub type ParserFactory = Arc<dyn Fn() -> Result<Box<dyn Parser>, ParserError> + Send + Sync>;

/// Format used when `data_format` is not set.
pub const DEFAULT_DATA_FORMAT: &str = "value";

/// Parses raw data into metrics.
pub trait Parser: Send {
    /// Parses a buffer that may contain several metrics.
    fn parse(&mut self, buf: &[u8]) -> Result<Vec<Metric>, ParserError>;

    /// Parses a single line into one metric.
    fn parse_line(&mut self, line: &str) -> Result<Metric, ParserError>;

    /// Sets the tags added to every parsed metric.
    fn set_default_tags(&mut self, tags: Tags);
}

#[derive(Debug, thiserror::Error)]
pub enum ParserError {
    #[error("unsupported data format: {0}")]
    UnsupportedFormat(String),
    #[error("unsupported data type: {0}")]
    UnsupportedDataType(String),
    #[error("invalid {data_type} value '{value}'")]
    InvalidValue { data_type: &'static str, value: String },
    #[error("input is not valid UTF-8")]
    InvalidUtf8(#[from] std::str::Utf8Error),
    #[error("invalid metric")]
    Metric(#[from] MetricError),
}

/// Settings of a parser, extracted from the table of a plugin that has a parser capability.
///
/// Only the `value` format is built in, but the keys of the other common formats are
/// recognized so that they are consumed together (and reported by `new_parser` as an
/// unsupported format instead of unrecognized options).
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Format of the data, `value` if empty.
    pub data_format: String,

    /// Name of the produced metrics: the name of the plugin.
    #[serde(skip)]
    pub metric_name: String,

    /// Tags added to the produced metrics: the global tags.
    #[serde(skip)]
    pub default_tags: Tags,

    pub separator: String,
    pub templates: Vec<String>,
    pub tag_keys: Vec<String>,

    /// Type of the value, for the `value` format.
    pub data_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_name_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_string_fields: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_time_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_time_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_strict: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub csv_column_names: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csv_column_types: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csv_tag_columns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csv_delimiter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csv_comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csv_measurement_column: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csv_timestamp_column: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csv_timestamp_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csv_timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csv_header_row_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csv_skip_rows: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csv_skip_columns: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csv_trim_space: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub form_urlencoded_tag_keys: Option<Vec<String>>,
}

impl ParserConfig {
    /// Returns the data format, with the default applied.
    pub fn format(&self) -> &str {
        if self.data_format.is_empty() {
            DEFAULT_DATA_FORMAT
        } else {
            &self.data_format
        }
    }
}

/// Builds the parser described by `config`.
pub fn new_parser(config: &ParserConfig) -> Result<Box<dyn Parser>, ParserError> {
    match config.format() {
        "value" => {
            let parser = value::ValueParser::new(&config.metric_name, &config.data_type, config.default_tags.clone())?;
            Ok(Box::new(parser))
        }
        other => Err(ParserError::UnsupportedFormat(other.to_owned())),
    }
}

/// Returns a factory that calls [`new_parser`] with a copy of `config`.
///
/// The format is only checked when the factory is called.
pub fn parser_factory(config: ParserConfig) -> ParserFactory {
    Arc::new(move || new_parser(&config))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{ParserConfig, ParserError, new_parser, parser_factory};
    use crate::config::ConfigTable;

    #[test]
    fn extraction_consumes_parser_keys() -> anyhow::Result<()> {
        let mut table = ConfigTable::new(toml::toml! {
            data_format = "value"
            data_type = "float"
            csv_delimiter = ";"
            files = ["/tmp/a"]
        });
        let config: ParserConfig = table.decode()?;
        assert_eq!(config.format(), "value");
        assert_eq!(config.data_type, "float");
        assert_eq!(config.csv_delimiter.as_deref(), Some(";"));
        assert_eq!(table.keys().collect::<Vec<_>>(), vec!["files"]);
        Ok(())
    }

    #[test]
    fn default_format() {
        let config = ParserConfig {
            metric_name: String::from("exec"),
            ..Default::default()
        };
        assert_eq!(config.format(), "value");
        assert!(new_parser(&config).is_ok());
    }

    #[test]
    fn unsupported_format() {
        let config = ParserConfig {
            data_format: String::from("influx"),
            metric_name: String::from("file"),
            ..Default::default()
        };
        assert!(matches!(new_parser(&config), Err(ParserError::UnsupportedFormat(f)) if f == "influx"));

        // the factory is lazy: the error happens on first use
        let factory = parser_factory(config);
        assert!(matches!(factory(), Err(ParserError::UnsupportedFormat(_))));
    }
}
