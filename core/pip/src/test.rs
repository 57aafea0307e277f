//! Utilities for testing plugins.
//!
//! Enable the `test` feature of `pip` in the `dev-dependencies` of your plugin to use them.

use std::time::{Duration, SystemTime};

use crate::{
    accumulator::{Accumulator, DEFAULT_PRECISION, build_metric},
    metric::{Fields, Metric, Tags, ValueType},
};

/// An accumulator that keeps everything it receives.
#[derive(Debug)]
pub struct TestAccumulator {
    pub metrics: Vec<Metric>,
    /// Errors, formatted with `{:#}`.
    pub errors: Vec<String>,
    precision: Duration,
}

impl TestAccumulator {
    pub fn new() -> Self {
        Self {
            metrics: Vec::new(),
            errors: Vec::new(),
            precision: DEFAULT_PRECISION,
        }
    }

    /// Returns the metric with the given name, if any.
    pub fn find(&self, name: &str) -> Option<&Metric> {
        self.metrics.iter().find(|m| m.name() == name)
    }
}

impl Default for TestAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Accumulator for TestAccumulator {
    fn add_with_type(
        &mut self,
        value_type: ValueType,
        measurement: &str,
        fields: Fields,
        tags: Tags,
        timestamp: Option<SystemTime>,
    ) {
        match build_metric(value_type, measurement, fields, tags, timestamp, self.precision) {
            Ok(m) => self.metrics.push(m),
            Err(e) => self.errors.push(e.to_string()),
        }
    }

    fn add_metric(&mut self, metric: Metric) {
        if !metric.is_empty() {
            self.metrics.push(metric);
        }
    }

    fn add_error(&mut self, err: anyhow::Error) {
        self.errors.push(format!("{err:#}"));
    }

    fn set_precision(&mut self, precision: Duration) {
        self.precision = precision;
    }
}
