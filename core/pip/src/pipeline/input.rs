use std::{sync::Arc, time::Duration};

use tokio::{
    sync::mpsc,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    accumulator::{Accumulator, MetricAccumulator, MetricMaker},
    metric::{Metric, Tags},
    plugin::Input,
};

use super::PluginConfig;

/// An input plugin, ready to be run.
pub struct RunningInput {
    input: Box<dyn Input>,
    config: PluginConfig,
    interval: Option<Duration>,
    default_tags: Tags,
}

/// Adds the tags of the plugin and the global tags to the metrics of an input.
///
/// Existing tags are never replaced: the tags set by the plugin win over the tags of the
/// plugin config, which win over the global tags.
struct InputMetricMaker {
    log_name: String,
    tags: Tags,
    default_tags: Tags,
}

impl RunningInput {
    pub fn new(input: Box<dyn Input>, config: PluginConfig) -> Self {
        Self {
            input,
            config,
            interval: None,
            default_tags: Tags::new(),
        }
    }

    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn log_name(&self) -> String {
        self.config.log_name()
    }

    /// The gathering interval of this input, if it overrides the interval of the agent.
    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = Some(interval);
    }

    pub fn set_default_tags(&mut self, tags: Tags) {
        self.default_tags = tags;
    }

    pub fn init(&mut self) -> anyhow::Result<()> {
        self.input.init()
    }

    pub fn gather(&mut self, acc: &mut dyn Accumulator) -> anyhow::Result<()> {
        self.input.gather(acc)
    }

    /// Returns the function that finalizes the metrics produced by this input.
    pub fn metric_maker(&self) -> Arc<dyn MetricMaker> {
        Arc::new(InputMetricMaker {
            log_name: self.log_name(),
            tags: self.config.tags.clone(),
            default_tags: self.default_tags.clone(),
        })
    }
}

impl MetricMaker for InputMetricMaker {
    fn log_name(&self) -> &str {
        &self.log_name
    }

    fn make_metric(&self, mut metric: Metric) -> Option<Metric> {
        for (k, v) in self.tags.iter().chain(self.default_tags.iter()) {
            if metric.tag(k).is_none() {
                metric.add_tag(k.clone(), v.clone());
            }
        }
        Some(metric)
    }
}

/// Gathers metrics from `input` every `interval`, until `shutdown` is cancelled.
///
/// The first gathering happens after one interval. When the loop stops, `tx` is dropped.
/// `gather` may block, it runs on the blocking thread pool of tokio.
pub(crate) async fn run_input(
    mut input: RunningInput,
    tx: mpsc::Sender<Metric>,
    interval: Duration,
    precision: Duration,
    shutdown: CancellationToken,
) {
    let mut acc = MetricAccumulator::new(input.metric_maker()).with_precision(precision);
    let Some(start) = Instant::now().checked_add(interval) else {
        log::error!("{} cannot gather every {interval:?}: interval too large", acc.log_name());
        return;
    };
    let mut ticker = tokio::time::interval_at(start, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    log::debug!("{} gathers every {interval:?}", acc.log_name());

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                log::debug!("{} stopped by cancellation.", acc.log_name());
                break;
            }
            _ = ticker.tick() => {
                let log_name = acc.log_name().to_owned();
                let gathered = tokio::task::spawn_blocking(move || {
                    if let Err(e) = input.gather(&mut acc) {
                        acc.add_error(e);
                    }
                    (input, acc)
                })
                .await;
                match gathered {
                    Ok(back) => (input, acc) = back,
                    Err(e) => {
                        log::error!("{log_name} panicked while gathering, it will now stop: {e}");
                        break;
                    }
                }
                if let Err(e) = acc.flush(&tx).await {
                    log::error!("{} cannot send its metrics: {e}", acc.log_name());
                    break;
                }
            }
        }
    }
}
