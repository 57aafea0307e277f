//! The `printer` processor, which is the default processor of the agent.

use pip::{
    metric::Metric,
    plugin::{DuplicatePluginError, PluginDescriber, PluginRegistry, Processor},
};

pub const NAME: &str = "printer";

/// Logs every metric that passes through it, and forwards it unchanged.
pub struct Printer;

impl PluginDescriber for Printer {
    fn description(&self) -> &'static str {
        "Print all metrics that pass through this filter."
    }
}

impl Processor for Printer {
    fn apply(&mut self, metrics: Vec<Metric>) -> Vec<Metric> {
        for m in &metrics {
            log::info!("Processor {m}");
        }
        metrics
    }
}

pub fn register(registry: &mut PluginRegistry) -> Result<(), DuplicatePluginError> {
    registry.processors.add_processor(NAME, || Printer)
}
