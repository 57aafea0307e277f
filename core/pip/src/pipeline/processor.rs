use std::sync::Arc;

use tokio::sync::mpsc;

use crate::{
    accumulator::{Accumulator, MetricAccumulator, MetricMaker},
    metric::Metric,
    plugin::StreamingProcessor,
};

use super::PluginConfig;

/// A processor plugin, ready to be run.
pub struct RunningProcessor {
    processor: Box<dyn StreamingProcessor>,
    config: PluginConfig,
    order: i64,
}

/// The processors of the pipeline, in the order in which they are applied.
#[derive(Default)]
pub struct RunningProcessors(Vec<RunningProcessor>);

/// Processors forward their metrics unchanged.
struct ProcessorMetricMaker {
    log_name: String,
}

impl RunningProcessor {
    pub fn new(processor: Box<dyn StreamingProcessor>, config: PluginConfig) -> Self {
        Self {
            processor,
            config,
            order: 0,
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

    pub fn order(&self) -> i64 {
        self.order
    }

    pub fn set_order(&mut self, order: i64) {
        self.order = order;
    }

    pub fn init(&mut self) -> anyhow::Result<()> {
        self.processor.init()
    }

    pub fn start(&mut self, acc: &mut dyn Accumulator) -> anyhow::Result<()> {
        self.processor.start(acc)
    }

    pub fn add(&mut self, metric: Metric, acc: &mut dyn Accumulator) -> anyhow::Result<()> {
        self.processor.add(metric, acc)
    }

    pub fn stop(&mut self) -> anyhow::Result<()> {
        self.processor.stop()
    }

    pub fn metric_maker(&self) -> Arc<dyn MetricMaker> {
        Arc::new(ProcessorMetricMaker {
            log_name: self.log_name(),
        })
    }
}

impl MetricMaker for ProcessorMetricMaker {
    fn log_name(&self) -> &str {
        &self.log_name
    }

    fn make_metric(&self, metric: Metric) -> Option<Metric> {
        Some(metric)
    }
}

impl RunningProcessors {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, processor: RunningProcessor) {
        self.0.push(processor);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RunningProcessor> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, RunningProcessor> {
        self.0.iter_mut()
    }

    /// Sorts the processors by `order`. Processors with the same order keep their relative position.
    pub fn sort(&mut self) {
        self.0.sort_by_key(RunningProcessor::order);
    }
}

impl IntoIterator for RunningProcessors {
    type Item = RunningProcessor;
    type IntoIter = std::vec::IntoIter<RunningProcessor>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// A started processor and the channels around it.
pub(crate) struct ProcessorUnit {
    pub processor: RunningProcessor,
    pub acc: MetricAccumulator,
    pub rx: mpsc::Receiver<Metric>,
    pub tx: mpsc::Sender<Metric>,
}

/// Applies the processor to every metric of its input channel, until the channel is closed.
///
/// Then stops the processor and drops the output channel, which lets the next stage stop.
pub(crate) async fn run_processor(unit: ProcessorUnit) {
    let ProcessorUnit {
        mut processor,
        mut acc,
        mut rx,
        tx,
    } = unit;

    // metrics produced by `start`
    let mut downstream_ok = acc.flush(&tx).await.is_ok();

    while downstream_ok {
        if let Some(metric) = rx.recv().await {
            if let Err(e) = processor.add(metric, &mut acc) {
                // the metric has been consumed by the processor: it is not forwarded
                acc.add_error(e);
            }
            if let Err(e) = acc.flush(&tx).await {
                log::error!("{} cannot send its metrics: {e}", acc.log_name());
                downstream_ok = false;
            }
        } else {
            log::debug!("The channel connected to {} has been closed, it will stop.", acc.log_name());
            break;
        }
    }

    if let Err(e) = processor.stop() {
        log::error!("Error while stopping {}: {e:#}", acc.log_name());
    }
    drop(tx);
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use pretty_assertions::assert_eq;
    use tokio::sync::mpsc;

    use super::{ProcessorUnit, RunningProcessor, RunningProcessors, run_processor};
    use crate::{
        accumulator::{Accumulator, MetricAccumulator},
        metric::{Fields, Metric, Tags, ValueType},
        pipeline::PluginConfig,
        plugin::{PluginDescriber, PluginKind, StreamingProcessor},
    };

    /// Fails on metrics named "bad", forwards the others.
    struct Picky;
    impl PluginDescriber for Picky {}
    impl StreamingProcessor for Picky {
        fn start(&mut self, acc: &mut dyn Accumulator) -> anyhow::Result<()> {
            let fields = Fields::from_iter([(String::from("started"), true.into())]);
            acc.add_fields("picky_start", fields, Tags::new(), None);
            Ok(())
        }

        fn add(&mut self, metric: Metric, acc: &mut dyn Accumulator) -> anyhow::Result<()> {
            if metric.name() == "bad" {
                anyhow::bail!("I don't like this one");
            }
            acc.add_metric(metric);
            Ok(())
        }

        fn stop(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn metric(name: &str) -> Metric {
        let fields = Fields::from_iter([(String::from("v"), 1i64.into())]);
        Metric::new(name, Tags::new(), fields, SystemTime::now(), ValueType::Gauge).unwrap()
    }

    fn processor(name: &str, order: i64) -> RunningProcessor {
        let mut p = RunningProcessor::new(Box::new(Picky), PluginConfig::new(PluginKind::Processor, name));
        p.set_order(order);
        p
    }

    #[test]
    fn stable_sort_by_order() {
        let mut processors = RunningProcessors::new();
        processors.push(processor("a", 0));
        processors.push(processor("b", -1));
        processors.push(processor("c", 0));
        processors.push(processor("d", 5));
        processors.sort();
        let names: Vec<_> = processors.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["b", "a", "c", "d"]);
    }

    #[tokio::test]
    async fn errors_drop_the_metric_and_close_cascades() {
        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let mut processor = processor("picky", 0);
        let mut acc = MetricAccumulator::new(processor.metric_maker());
        processor.start(&mut acc).unwrap();

        let task = tokio::spawn(run_processor(ProcessorUnit {
            processor,
            acc,
            rx: in_rx,
            tx: out_tx,
        }));
        for name in ["good", "bad", "good too"] {
            in_tx.send(metric(name)).await.unwrap();
        }
        drop(in_tx);
        task.await.unwrap();

        let mut names = Vec::new();
        while let Some(m) = out_rx.recv().await {
            names.push(m.name().to_owned());
        }
        assert_eq!(names, vec!["picky_start", "good", "good too"]);
    }
}
