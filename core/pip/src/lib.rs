//! Core of a telemetry agent.
//!
//! The agent periodically gathers metrics from *inputs*, transforms them with a chain of
//! *processors* and writes them to *outputs*. Every input, processor and output is a plugin.
//!
//! # Overview
//!
//! - [`metric`]: the data that flows through the pipeline.
//! - [`plugin`]: the plugin traits and the [`PluginRegistry`](plugin::PluginRegistry).
//! - [`accumulator`]: how plugins emit metrics and errors.
//! - [`config`]: loading the TOML configuration and resolving the plugins it declares.
//! - [`pipeline`]: the running plugins and the tasks that drive them.
//! - [`agent`]: startup, run and shutdown of the whole pipeline.
//! - [`parsers`]: parsers for the inputs that read data in a configurable format.
//!
//! # Example
//!
//! ```no_run
//! use pip::{agent::Agent, config::ConfigBuilder, plugin::PluginRegistry};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let mut registry = PluginRegistry::new();
//! // register the plugins here, with registry.inputs.add(...), etc.
//!
//! let config = ConfigBuilder::new(&registry).build_from_file("pip_config.toml")?;
//! let shutdown = CancellationToken::new();
//! Agent::new(config).run(shutdown).await?;
//! # Ok(())
//! # }
//! ```

pub mod accumulator;
pub mod agent;
pub mod config;
pub mod metric;
pub mod parsers;
pub mod pipeline;
pub mod plugin;

#[cfg(any(test, feature = "test"))]
pub mod test;
