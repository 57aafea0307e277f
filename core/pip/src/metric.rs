//! Metrics: the unit of data that flows through the pipeline.
//!
//! A [`Metric`] is made of a name, a set of tags, a set of typed fields,
//! a timestamp and a [`ValueType`] that describes the semantic of its fields.
//!
//! Plugins rarely build metrics by hand: the [`Accumulator`](crate::accumulator::Accumulator)
//! does it for them and applies the timestamp precision of the pipeline stage.

use std::{
    collections::BTreeMap,
    fmt::{self, Write},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use indexmap::IndexMap;

/// Tags of a metric, sorted by key.
pub type Tags = BTreeMap<String, String>;

/// Fields of a metric, in insertion order.
pub type Fields = IndexMap<String, FieldValue>;

/// A measured value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
}

/// The semantic of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ValueType {
    #[default]
    Untyped,
    Gauge,
    Counter,
    Summary,
    Histogram,
}

/// One timestamped measurement.
///
/// A metric always has at least one field: [`Metric::new`] refuses to build an empty one.
/// Removing every field afterwards makes it [empty](Metric::is_empty), and the pipeline
/// drops empty metrics instead of forwarding them.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    name: String,
    tags: Tags,
    fields: Fields,
    timestamp: SystemTime,
    value_type: ValueType,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MetricError {
    #[error("metric '{0}' has no fields")]
    NoFields(String),
    #[error("metric name must not be empty")]
    EmptyName,
}

impl Metric {
    pub fn new(
        name: impl Into<String>,
        tags: Tags,
        fields: Fields,
        timestamp: SystemTime,
        value_type: ValueType,
    ) -> Result<Self, MetricError> {
        let name = name.into();
        if name.is_empty() {
            return Err(MetricError::EmptyName);
        }
        if fields.is_empty() {
            return Err(MetricError::NoFields(name));
        }
        Ok(Self {
            name,
            tags,
            fields,
            timestamp,
            value_type,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Sets a tag, replacing any previous value.
    pub fn add_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.tags.insert(key.into(), value.into());
    }

    pub fn remove_tag(&mut self, key: &str) -> Option<String> {
        self.tags.remove(key)
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// Sets a field, replacing any previous value.
    pub fn add_field(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn remove_field(&mut self, key: &str) -> Option<FieldValue> {
        self.fields.shift_remove(key)
    }

    pub fn time(&self) -> SystemTime {
        self.timestamp
    }

    pub fn set_time(&mut self, timestamp: SystemTime) {
        self.timestamp = timestamp;
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// Returns `true` if the metric has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Rounds `t` to the nearest multiple of `precision` since the Unix epoch.
///
/// Halfway values are rounded up. A precision of zero or one nanosecond returns `t` unchanged,
/// and so do instants that are before the epoch.
pub fn round_time(t: SystemTime, precision: Duration) -> SystemTime {
    let step = precision.as_nanos();
    if step <= 1 {
        return t;
    }
    let Ok(since_epoch) = t.duration_since(UNIX_EPOCH) else {
        return t;
    };
    let nanos = since_epoch.as_nanos();
    let rem = nanos % step;
    let rounded = if rem * 2 >= step { nanos - rem + step } else { nanos - rem };
    UNIX_EPOCH + duration_from_nanos(rounded)
}

fn duration_from_nanos(nanos: u128) -> Duration {
    const NANOS_PER_SEC: u128 = 1_000_000_000;
    Duration::new((nanos / NANOS_PER_SEC) as u64, (nanos % NANOS_PER_SEC) as u32)
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueType::Untyped => "untyped",
            ValueType::Gauge => "gauge",
            ValueType::Counter => "counter",
            ValueType::Summary => "summary",
            ValueType::Histogram => "histogram",
        };
        f.write_str(s)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Integer(v) => write!(f, "{v}i"),
            FieldValue::Float(v) => write!(f, "{v}"),
            FieldValue::String(v) => write!(f, "\"{}\"", v.replace('\\', "\\\\").replace('"', "\\\"")),
            FieldValue::Boolean(v) => write!(f, "{v}"),
        }
    }
}

/// Line-protocol-like representation: `name,tag=v field=value unix_nanos`.
impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Escaped(&self.name, NAME_SPECIAL))?;
        for (k, v) in &self.tags {
            write!(f, ",{}={}", Escaped(k, KEY_SPECIAL), Escaped(v, KEY_SPECIAL))?;
        }
        for (i, (k, v)) in self.fields.iter().enumerate() {
            let sep = if i == 0 { ' ' } else { ',' };
            write!(f, "{sep}{}={v}", Escaped(k, KEY_SPECIAL))?;
        }
        let nanos = self
            .timestamp
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        write!(f, " {nanos}")
    }
}

const NAME_SPECIAL: &[char] = &[',', ' '];
const KEY_SPECIAL: &[char] = &[',', '=', ' '];

/// Writes a string with a backslash before each special character.
struct Escaped<'a>(&'a str, &'static [char]);

impl fmt::Display for Escaped<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in self.0.chars() {
            if self.1.contains(&c) {
                f.write_char('\\')?;
            }
            f.write_char(c)?;
        }
        Ok(())
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Integer(value.into())
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        FieldValue::Integer(value.into())
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<f32> for FieldValue {
    fn from(value: f32) -> Self {
        FieldValue::Float(value.into())
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_owned())
    }
}
