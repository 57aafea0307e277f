//! Plugin interfaces.
//!
//! A plugin is one of:
//! - an [`Input`], which gathers metrics periodically;
//! - a [`Processor`] or a [`StreamingProcessor`], which transforms metrics;
//! - an [`Output`], which writes metrics somewhere.
//!
//! Plugins are created by the factories of a [`PluginRegistry`], configured with the
//! table found in the config file, and finally wrapped in their running counterpart
//! (see the [`pipeline`](crate::pipeline) module).
//!
//! Every hook that is not strictly needed has a default implementation,
//! which makes the simplest plugins very short:
//!
//! ```
//! use pip::accumulator::Accumulator;
//! use pip::metric::{Fields, Tags};
//! use pip::plugin::{Input, PluginDescriber};
//!
//! struct Constant;
//!
//! impl PluginDescriber for Constant {
//!     fn description(&self) -> &'static str {
//!         "Always measures 42"
//!     }
//! }
//!
//! impl Input for Constant {
//!     fn gather(&mut self, acc: &mut dyn Accumulator) -> anyhow::Result<()> {
//!         let fields = Fields::from_iter([(String::from("answer"), 42i64.into())]);
//!         acc.add_gauge("constant", fields, Tags::new(), None);
//!         Ok(())
//!     }
//! }
//! ```

use std::fmt;

use crate::{
    accumulator::Accumulator,
    config::ConfigTable,
    metric::Metric,
    parsers::{Parser, ParserFactory},
};

pub mod registry;
pub mod streaming;

pub use registry::{DuplicatePluginError, PluginRegistry, Registry};
pub use streaming::StreamingAdapter;

/// The three kinds of plugins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginKind {
    Input,
    Output,
    Processor,
}

impl PluginKind {
    /// Name of the config namespace that contains the plugins of this kind, e.g. `inputs`.
    pub fn namespace(self) -> &'static str {
        match self {
            PluginKind::Input => "inputs",
            PluginKind::Output => "outputs",
            PluginKind::Processor => "processors",
        }
    }
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PluginKind::Input => "input",
            PluginKind::Output => "output",
            PluginKind::Processor => "processor",
        };
        f.write_str(s)
    }
}

/// Human-readable information about a plugin.
pub trait PluginDescriber {
    /// One-line description of the plugin.
    fn description(&self) -> &'static str {
        ""
    }

    /// Example configuration, as TOML keys (without the table header).
    fn sample_config(&self) -> &'static str {
        ""
    }
}

/// Gathers metrics, periodically.
pub trait Input: PluginDescriber + Send {
    /// Applies the settings of the plugin.
    ///
    /// The plugin must take the keys that it recognizes out of `settings`,
    /// for instance with [`ConfigTable::decode`]. The remaining keys are reported as errors.
    fn configure(&mut self, settings: &mut ConfigTable) -> anyhow::Result<()> {
        let _ = settings;
        Ok(())
    }

    /// Called once, before the first call to [`gather`](Self::gather).
    fn init(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Gathers metrics and pushes them to the accumulator.
    ///
    /// An error does not stop the pipeline: it is logged and the next gathering happens as usual.
    fn gather(&mut self, acc: &mut dyn Accumulator) -> anyhow::Result<()>;

    /// Returns the parser capability of this input, if it has one.
    fn as_parser_input(&mut self) -> Option<&mut dyn ParserInput> {
        None
    }

    /// Returns the parser-factory capability of this input, if it has one.
    fn as_parser_factory_input(&mut self) -> Option<&mut dyn ParserFactoryInput> {
        None
    }
}

/// Capability of an input that reads data in a configurable format.
pub trait ParserInput {
    fn set_parser(&mut self, parser: Box<dyn Parser>);
}

/// Capability of an input that needs a new parser from time to time (e.g. one per file).
pub trait ParserFactoryInput {
    fn set_parser_factory(&mut self, factory: ParserFactory);
}

/// Writes metrics to an external system.
pub trait Output: PluginDescriber + Send {
    /// See [`Input::configure`].
    fn configure(&mut self, settings: &mut ConfigTable) -> anyhow::Result<()> {
        let _ = settings;
        Ok(())
    }

    fn init(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Connects to the external system, before the first write.
    fn connect(&mut self) -> anyhow::Result<()>;

    /// Closes the connection, after the last write.
    fn close(&mut self) -> anyhow::Result<()>;

    fn write(&mut self, metrics: &[Metric]) -> anyhow::Result<()>;
}

/// Transforms metrics, without any other lifecycle than [`init`](Self::init).
///
/// Register it with [`Registry::add_processor`] to turn it into a [`StreamingProcessor`].
pub trait Processor: PluginDescriber + Send {
    /// See [`Input::configure`].
    fn configure(&mut self, settings: &mut ConfigTable) -> anyhow::Result<()> {
        let _ = settings;
        Ok(())
    }

    fn init(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Transforms a batch of metrics. Returning an empty vec drops them.
    fn apply(&mut self, metrics: Vec<Metric>) -> Vec<Metric>;
}

/// Transforms metrics one by one, with a start/stop lifecycle.
pub trait StreamingProcessor: PluginDescriber + Send {
    /// See [`Input::configure`].
    fn configure(&mut self, settings: &mut ConfigTable) -> anyhow::Result<()> {
        let _ = settings;
        Ok(())
    }

    fn init(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Starts the processor. Metrics added to `acc` are forwarded downstream.
    fn start(&mut self, acc: &mut dyn Accumulator) -> anyhow::Result<()>;

    /// Processes one metric. The processor owns the metric: it must add it to `acc` to forward it.
    fn add(&mut self, metric: Metric, acc: &mut dyn Accumulator) -> anyhow::Result<()>;

    /// Stops the processor, after the last call to [`add`](Self::add).
    fn stop(&mut self) -> anyhow::Result<()>;
}
