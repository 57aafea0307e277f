//! The `value` format: the whole input is one value of a configured type.

use std::time::SystemTime;

use crate::metric::{FieldValue, Fields, Metric, Tags, ValueType};

use super::{Parser, ParserError};

/// Name of the field that holds the parsed value.
pub const VALUE_FIELD: &str = "value";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Integer,
    Float,
    String,
    Boolean,
}

/// Parses a single value, for instance the output of a command that prints a number.
pub struct ValueParser {
    metric_name: String,
    data_type: DataType,
    default_tags: Tags,
}

impl DataType {
    /// Parses the `data_type` setting. An empty string means integer.
    pub fn parse(s: &str) -> Result<Self, ParserError> {
        match s {
            "" | "int" | "integer" => Ok(DataType::Integer),
            "float" | "long" => Ok(DataType::Float),
            "str" | "string" => Ok(DataType::String),
            "bool" | "boolean" => Ok(DataType::Boolean),
            other => Err(ParserError::UnsupportedDataType(other.to_owned())),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            DataType::Integer => "integer",
            DataType::Float => "float",
            DataType::String => "string",
            DataType::Boolean => "boolean",
        }
    }
}

impl ValueParser {
    pub fn new(metric_name: &str, data_type: &str, default_tags: Tags) -> Result<Self, ParserError> {
        Ok(Self {
            metric_name: metric_name.to_owned(),
            data_type: DataType::parse(data_type)?,
            default_tags,
        })
    }

    fn parse_value(&self, input: &str) -> Result<FieldValue, ParserError> {
        let input = input.trim_matches(|c: char| c == '\0' || c.is_whitespace());

        // numbers and booleans: keep the last value only
        let last = input.split_whitespace().last().unwrap_or_default();
        let invalid = || ParserError::InvalidValue {
            data_type: self.data_type.as_str(),
            value: last.to_owned(),
        };
        match self.data_type {
            DataType::String => Ok(FieldValue::String(input.to_owned())),
            DataType::Integer => last.parse().map(FieldValue::Integer).map_err(|_| invalid()),
            DataType::Float => last.parse().map(FieldValue::Float).map_err(|_| invalid()),
            DataType::Boolean => parse_bool(last).map(FieldValue::Boolean).ok_or_else(invalid),
        }
    }
}

impl Parser for ValueParser {
    fn parse(&mut self, buf: &[u8]) -> Result<Vec<Metric>, ParserError> {
        let input = std::str::from_utf8(buf)?;
        let value = self.parse_value(input)?;
        let fields = Fields::from_iter([(String::from(VALUE_FIELD), value)]);
        let metric = Metric::new(
            &self.metric_name,
            self.default_tags.clone(),
            fields,
            SystemTime::now(),
            ValueType::Untyped,
        )?;
        Ok(vec![metric])
    }

    fn parse_line(&mut self, line: &str) -> Result<Metric, ParserError> {
        let mut metrics = self.parse(line.as_bytes())?;
        Ok(metrics.remove(0))
    }

    fn set_default_tags(&mut self, tags: Tags) {
        self.default_tags = tags;
    }
}

/// Accepts the same spellings as the usual `1/t/T/TRUE/true/True` convention.
fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}
