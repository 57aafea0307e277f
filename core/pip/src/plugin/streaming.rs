use crate::{accumulator::Accumulator, config::ConfigTable, metric::Metric};

use super::{PluginDescriber, Processor, StreamingProcessor};

/// Turns a [`Processor`] into a [`StreamingProcessor`].
///
/// Each metric is applied on its own and the results are forwarded downstream.
pub struct StreamingAdapter<P> {
    processor: P,
}

impl<P: Processor> StreamingAdapter<P> {
    pub fn new(processor: P) -> Self {
        Self { processor }
    }

    pub fn inner(&self) -> &P {
        &self.processor
    }
}

impl<P: Processor> PluginDescriber for StreamingAdapter<P> {
    fn description(&self) -> &'static str {
        self.processor.description()
    }

    fn sample_config(&self) -> &'static str {
        self.processor.sample_config()
    }
}

impl<P: Processor> StreamingProcessor for StreamingAdapter<P> {
    fn configure(&mut self, settings: &mut ConfigTable) -> anyhow::Result<()> {
        self.processor.configure(settings)
    }

    fn init(&mut self) -> anyhow::Result<()> {
        self.processor.init()
    }

    fn start(&mut self, _acc: &mut dyn Accumulator) -> anyhow::Result<()> {
        Ok(())
    }

    fn add(&mut self, metric: Metric, acc: &mut dyn Accumulator) -> anyhow::Result<()> {
        for m in self.processor.apply(vec![metric]) {
            acc.add_metric(m);
        }
        Ok(())
    }

    fn stop(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}
