//! Running plugins: the lifecycle wrappers and the tasks of the pipeline.
//!
//! The pipeline is a chain of stages linked by bounded channels:
//!
//! ```text
//! inputs ──▶ processor 1 ──▶ … ──▶ processor n ──▶ outputs
//! ```
//!
//! Every stage owns the sending half of the channel that leads to the next stage.
//! When a stage stops, it drops its sender, which closes the channel once every
//! sender is gone, and the next stage stops after having processed the remaining metrics.

use std::fmt;

use crate::{metric::Tags, plugin::PluginKind};

pub mod input;
pub mod output;
pub mod processor;

pub use input::RunningInput;
pub use output::RunningOutput;
pub use processor::{RunningProcessor, RunningProcessors};

/// Configuration shared by all plugin kinds, resolved when the config is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginConfig {
    pub kind: PluginKind,
    /// Name of the plugin in the registry.
    pub name: String,
    /// Optional name given by the user, to distinguish multiple instances of the same plugin.
    pub alias: Option<String>,
    pub tags: Tags,
}

impl PluginConfig {
    pub fn new(kind: PluginKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            alias: None,
            tags: Tags::new(),
        }
    }

    /// Identity of the plugin instance in the logs, e.g. `inputs.cpu` or `inputs.cpu::core0`.
    pub fn log_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PluginConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind.namespace(), self.name)?;
        if let Some(alias) = &self.alias {
            write!(f, "::{alias}")?;
        }
        Ok(())
    }
}
