//! The accumulator is how plugins send metrics and errors to the pipeline.
//!
//! Plugins only see the [`Accumulator`] trait. In the pipeline, each stage (an input
//! or a processor) owns a [`MetricAccumulator`] that queues the metrics produced during a
//! call to the plugin, and then [flushes](MetricAccumulator::flush) them to the next stage.
//! Flushing waits for free space in the bounded channel, so a slow stage suspends the
//! stages that feed it.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use tokio::sync::mpsc;

use crate::metric::{Fields, Metric, MetricError, Tags, ValueType, round_time};

/// Default precision of the timestamps: no rounding.
pub const DEFAULT_PRECISION: Duration = Duration::from_nanos(1);

/// Collects the metrics and errors produced by a plugin.
pub trait Accumulator {
    /// Builds a metric of the given type and sends it downstream.
    ///
    /// If `timestamp` is `None`, the current time is used. In both cases the timestamp
    /// is rounded to the precision of the accumulator. If the metric is invalid
    /// (no fields, empty name), it is dropped and the problem is logged.
    fn add_with_type(
        &mut self,
        value_type: ValueType,
        measurement: &str,
        fields: Fields,
        tags: Tags,
        timestamp: Option<SystemTime>,
    );

    /// Sends an existing metric downstream.
    fn add_metric(&mut self, metric: Metric);

    /// Reports an error of the plugin. This never stops the pipeline.
    fn add_error(&mut self, err: anyhow::Error);

    /// Changes the precision of the timestamps assigned by the next calls.
    fn set_precision(&mut self, precision: Duration);

    fn add_fields(&mut self, measurement: &str, fields: Fields, tags: Tags, timestamp: Option<SystemTime>) {
        self.add_with_type(ValueType::Untyped, measurement, fields, tags, timestamp);
    }

    fn add_gauge(&mut self, measurement: &str, fields: Fields, tags: Tags, timestamp: Option<SystemTime>) {
        self.add_with_type(ValueType::Gauge, measurement, fields, tags, timestamp);
    }

    fn add_counter(&mut self, measurement: &str, fields: Fields, tags: Tags, timestamp: Option<SystemTime>) {
        self.add_with_type(ValueType::Counter, measurement, fields, tags, timestamp);
    }

    fn add_summary(&mut self, measurement: &str, fields: Fields, tags: Tags, timestamp: Option<SystemTime>) {
        self.add_with_type(ValueType::Summary, measurement, fields, tags, timestamp);
    }

    fn add_histogram(&mut self, measurement: &str, fields: Fields, tags: Tags, timestamp: Option<SystemTime>) {
        self.add_with_type(ValueType::Histogram, measurement, fields, tags, timestamp);
    }

    /// Reports the error contained in `res`, if any. `Ok` is a no-op.
    fn add_result(&mut self, res: anyhow::Result<()>) {
        if let Err(e) = res {
            self.add_error(e);
        }
    }
}

/// Final transformation applied by a pipeline stage to the metrics of its plugin.
pub trait MetricMaker: Send + Sync {
    /// Identity of the plugin in the logs, e.g. `inputs.cpu`.
    fn log_name(&self) -> &str;

    /// Modifies the metric, or drops it by returning `None`.
    fn make_metric(&self, metric: Metric) -> Option<Metric>;
}

/// Builds a metric and rounds its timestamp.
pub fn build_metric(
    value_type: ValueType,
    measurement: &str,
    fields: Fields,
    tags: Tags,
    timestamp: Option<SystemTime>,
    precision: Duration,
) -> Result<Metric, MetricError> {
    let t = round_time(timestamp.unwrap_or_else(SystemTime::now), precision);
    Metric::new(measurement, tags, fields, t, value_type)
}

/// The accumulator of a pipeline stage.
pub struct MetricAccumulator {
    maker: Arc<dyn MetricMaker>,
    precision: Duration,
    pending: Vec<Metric>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("the downstream channel is closed, {dropped} metrics have been dropped")]
pub struct ChannelClosed {
    pub dropped: usize,
}

impl MetricAccumulator {
    pub fn new(maker: Arc<dyn MetricMaker>) -> Self {
        Self {
            maker,
            precision: DEFAULT_PRECISION,
            pending: Vec::new(),
        }
    }

    pub fn with_precision(mut self, precision: Duration) -> Self {
        self.precision = precision;
        self
    }

    pub fn precision(&self) -> Duration {
        self.precision
    }

    pub fn log_name(&self) -> &str {
        self.maker.log_name()
    }

    /// Number of metrics waiting to be flushed.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Removes and returns the metrics waiting to be flushed.
    pub fn take_pending(&mut self) -> Vec<Metric> {
        std::mem::take(&mut self.pending)
    }

    /// Sends the pending metrics to `tx`, in order.
    ///
    /// Waits as long as the channel is full.
    pub async fn flush(&mut self, tx: &mpsc::Sender<Metric>) -> Result<(), ChannelClosed> {
        let pending = self.take_pending();
        let total = pending.len();
        for (i, m) in pending.into_iter().enumerate() {
            if tx.send(m).await.is_err() {
                return Err(ChannelClosed { dropped: total - i });
            }
        }
        Ok(())
    }

    fn push(&mut self, metric: Metric) {
        if metric.is_empty() {
            log::debug!("[{}] dropping empty metric '{}'", self.maker.log_name(), metric.name());
            return;
        }
        if let Some(m) = self.maker.make_metric(metric) {
            if m.is_empty() {
                log::debug!("[{}] dropping empty metric '{}'", self.maker.log_name(), m.name());
            } else {
                log::trace!("[{}] {m}", self.maker.log_name());
                self.pending.push(m);
            }
        }
    }
}

impl Accumulator for MetricAccumulator {
    fn add_with_type(
        &mut self,
        value_type: ValueType,
        measurement: &str,
        fields: Fields,
        tags: Tags,
        timestamp: Option<SystemTime>,
    ) {
        match build_metric(value_type, measurement, fields, tags, timestamp, self.precision) {
            Ok(m) => self.push(m),
            Err(e) => log::error!("Error in plugin {}: {e}", self.maker.log_name()),
        }
    }

    fn add_metric(&mut self, metric: Metric) {
        self.push(metric);
    }

    fn add_error(&mut self, err: anyhow::Error) {
        log::error!("Error in plugin {}: {err:#}", self.maker.log_name());
    }

    fn set_precision(&mut self, precision: Duration) {
        self.precision = precision;
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::Arc,
        time::{Duration, SystemTime, UNIX_EPOCH},
    };

    use pretty_assertions::assert_eq;
    use tokio::sync::mpsc;

    use super::{Accumulator, ChannelClosed, MetricAccumulator, MetricMaker};
    use crate::metric::{Fields, Metric, Tags, ValueType};

    struct Maker;
    impl MetricMaker for Maker {
        fn log_name(&self) -> &str {
            "inputs.test"
        }

        fn make_metric(&self, mut metric: Metric) -> Option<Metric> {
            if metric.name() == "vetoed" {
                return None;
            }
            metric.add_tag("stage", "test");
            Some(metric)
        }
    }

    fn acc() -> MetricAccumulator {
        MetricAccumulator::new(Arc::new(Maker))
    }

    fn fields() -> Fields {
        Fields::from_iter([(String::from("value"), 1.5f64.into())])
    }

    #[test]
    fn value_types_and_time() {
        let t = UNIX_EPOCH + Duration::from_secs(100);
        let mut acc = acc();
        acc.add_fields("a", fields(), Tags::new(), Some(t));
        acc.add_gauge("b", fields(), Tags::new(), Some(t));
        acc.add_counter("c", fields(), Tags::new(), Some(t));
        acc.add_summary("d", fields(), Tags::new(), Some(t));
        acc.add_histogram("e", fields(), Tags::new(), Some(t));

        let metrics = acc.take_pending();
        let types: Vec<_> = metrics.iter().map(|m| m.value_type()).collect();
        assert_eq!(
            types,
            vec![
                ValueType::Untyped,
                ValueType::Gauge,
                ValueType::Counter,
                ValueType::Summary,
                ValueType::Histogram
            ]
        );
        assert!(metrics.iter().all(|m| m.time() == t));
        assert!(metrics.iter().all(|m| m.tag("stage") == Some("test")));
    }

    #[test]
    fn precision() {
        let mut acc = acc();
        acc.set_precision(Duration::from_secs(1));
        let t = UNIX_EPOCH + Duration::from_millis(1_700);
        acc.add_gauge("a", fields(), Tags::new(), Some(t));
        acc.add_gauge("now", fields(), Tags::new(), None);

        let metrics = acc.take_pending();
        assert_eq!(metrics[0].time(), UNIX_EPOCH + Duration::from_secs(2));
        let now = metrics[1].time().duration_since(UNIX_EPOCH).unwrap();
        assert_eq!(now.subsec_nanos(), 0);
    }

    #[test]
    fn empty_and_vetoed_metrics_are_dropped() {
        let mut acc = acc();
        acc.add_fields("empty", Fields::new(), Tags::new(), None);
        acc.add_fields("vetoed", fields(), Tags::new(), None);

        let mut emptied = Metric::new("emptied", Tags::new(), fields(), SystemTime::now(), ValueType::Gauge).unwrap();
        emptied.remove_field("value");
        acc.add_metric(emptied);

        assert_eq!(acc.pending_len(), 0);
    }

    #[test]
    fn errors_do_not_produce_metrics() {
        let mut acc = acc();
        acc.add_result(Ok(()));
        acc.add_result(Err(anyhow::anyhow!("partial failure")));
        acc.add_error(anyhow::anyhow!("another one"));
        assert_eq!(acc.pending_len(), 0);
    }

    #[tokio::test]
    async fn flush_in_order() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut acc = acc();
        for name in ["x", "y", "z"] {
            acc.add_gauge(name, fields(), Tags::new(), None);
        }
        acc.flush(&tx).await.unwrap();
        drop(tx);

        let mut names = Vec::new();
        while let Some(m) = rx.recv().await {
            names.push(m.name().to_owned());
        }
        assert_eq!(names, vec!["x", "y", "z"]);
    }

    #[tokio::test]
    async fn flush_to_closed_channel() {
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        let mut acc = acc();
        acc.add_gauge("x", fields(), Tags::new(), None);
        acc.add_gauge("y", fields(), Tags::new(), None);
        assert_eq!(acc.flush(&tx).await, Err(ChannelClosed { dropped: 2 }));
        assert_eq!(acc.pending_len(), 0);
    }
}
