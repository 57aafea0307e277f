//! The agent runs the pipeline built from a [`Config`].
//!
//! Startup happens in this order, and stops at the first error:
//! 1. init every input, then every processor, then every output;
//! 2. connect the outputs;
//! 3. start the processors, from the last one to the first one;
//! 4. start one gathering task per input.
//!
//! Once started, the agent runs until its [`CancellationToken`] is cancelled. The inputs
//! stop first, and each stage stops when the channel that feeds it is closed.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::{sync::mpsc, task::JoinSet};
use tokio_util::sync::CancellationToken;

use crate::{
    accumulator::{DEFAULT_PRECISION, MetricAccumulator},
    config::Config,
    metric::Metric,
    pipeline::{
        RunningInput, RunningOutput, RunningProcessor, RunningProcessors,
        input::run_input,
        output::run_outputs,
        processor::{ProcessorUnit, run_processor},
    },
};

/// Settings of the `[agent]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct AgentSettings {
    /// Default time between two gatherings of an input.
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Precision of the timestamps assigned by the inputs.
    #[serde(with = "humantime_serde")]
    pub precision: Duration,
    /// Capacity of the channels between the stages of the pipeline.
    pub channel_capacity: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            precision: DEFAULT_PRECISION,
            channel_capacity: 100,
        }
    }
}

/// Error that prevents the pipeline from starting.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("could not initialize {plugin}")]
    PluginInit {
        plugin: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("could not connect {plugin}")]
    OutputConnect {
        plugin: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("could not start {plugin}")]
    ProcessorStart {
        plugin: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Runs the pipeline.
pub struct Agent {
    config: Config,
}

/// The outputs and the channel that feeds them.
struct OutputUnit {
    outputs: Vec<RunningOutput>,
    rx: mpsc::Receiver<Metric>,
}

impl Agent {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs the pipeline until `shutdown` is cancelled and every metric gathered has been written.
    ///
    /// Fails without starting any task if a plugin cannot be initialized, an output
    /// cannot be connected or a processor cannot be started.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), AgentError> {
        let Config {
            agent: settings,
            mut inputs,
            mut processors,
            mut outputs,
            ..
        } = self.config;
        log::info!(
            "Agent config: interval: {:?}, precision: {:?}, channel capacity: {}",
            settings.interval,
            settings.precision,
            settings.channel_capacity
        );

        init_plugins(&mut inputs, &mut processors, &mut outputs)?;

        let capacity = settings.channel_capacity.max(1);
        let (mut next, output_unit) = start_outputs(outputs, capacity)?;
        let processor_units = match start_processors(next.clone(), processors, capacity) {
            Ok((head, units)) => {
                next = head;
                units
            }
            Err(e) => {
                close_outputs(output_unit.outputs);
                return Err(e);
            }
        };

        if inputs.is_empty() {
            log::warn!("No input configured, the pipeline will stop immediately.");
        }

        let mut tasks = JoinSet::new();
        tasks.spawn(run_outputs(output_unit.outputs, output_unit.rx));
        for unit in processor_units {
            tasks.spawn(run_processor(unit));
        }
        for input in inputs {
            let interval = input.interval().unwrap_or(settings.interval);
            tasks.spawn(run_input(
                input,
                next.clone(),
                interval,
                settings.precision,
                shutdown.clone(),
            ));
        }
        // The inputs hold the only remaining senders of the head channel.
        drop(next);
        log::info!("Pipeline started.");

        while let Some(res) = tasks.join_next().await {
            if let Err(e) = res {
                log::error!("A pipeline task failed: {e}");
            }
        }
        log::info!("Pipeline stopped.");
        Ok(())
    }
}

/// Initializes every input, then every processor, then every output.
fn init_plugins(
    inputs: &mut [RunningInput],
    processors: &mut RunningProcessors,
    outputs: &mut [RunningOutput],
) -> Result<(), AgentError> {
    for input in inputs.iter_mut() {
        input.init().map_err(|source| AgentError::PluginInit {
            plugin: input.log_name(),
            source,
        })?;
    }
    for processor in processors.iter_mut() {
        processor.init().map_err(|source| AgentError::PluginInit {
            plugin: processor.log_name(),
            source,
        })?;
    }
    for output in outputs.iter_mut() {
        output.init().map_err(|source| AgentError::PluginInit {
            plugin: output.log_name(),
            source,
        })?;
    }
    Ok(())
}

/// Connects the outputs and creates the channel that feeds them.
///
/// If an output cannot be connected, the outputs that are already connected are closed.
fn start_outputs(
    mut outputs: Vec<RunningOutput>,
    capacity: usize,
) -> Result<(mpsc::Sender<Metric>, OutputUnit), AgentError> {
    for i in 0..outputs.len() {
        log::info!("Connecting {}", outputs[i].log_name());
        if let Err(source) = outputs[i].connect() {
            let plugin = outputs[i].log_name();
            let connected = outputs.drain(..i).collect();
            close_outputs(connected);
            return Err(AgentError::OutputConnect { plugin, source });
        }
        log::debug!("Successfully connected {}", outputs[i].log_name());
    }
    let (tx, rx) = mpsc::channel(capacity);
    Ok((tx, OutputUnit { outputs, rx }))
}

fn close_outputs(outputs: Vec<RunningOutput>) {
    for mut output in outputs {
        if let Err(e) = output.close() {
            log::error!("Error closing {}: {e:#}", output.log_name());
        }
    }
}

/// Starts the processors and chains them, from the outputs up to the inputs.
///
/// `dst` is the channel of the outputs. Returns the channel that the inputs must
/// send to, and the processors to run, in the order of `processors`.
///
/// If a processor fails to start, the processors that are already started are stopped
/// and their channels are closed.
fn start_processors(
    mut dst: mpsc::Sender<Metric>,
    processors: RunningProcessors,
    capacity: usize,
) -> Result<(mpsc::Sender<Metric>, Vec<ProcessorUnit>), AgentError> {
    let processors: Vec<RunningProcessor> = processors.into_iter().collect();
    let mut started: Vec<ProcessorUnit> = Vec::with_capacity(processors.len());

    // The last processor is connected to the outputs, so we start from the end.
    for mut processor in processors.into_iter().rev() {
        let (src_tx, src_rx) = mpsc::channel(capacity);
        let mut acc = MetricAccumulator::new(processor.metric_maker());
        log::debug!("Starting {}", processor.log_name());
        if let Err(source) = processor.start(&mut acc) {
            let plugin = processor.log_name();
            for mut unit in started.into_iter().rev() {
                if let Err(e) = unit.processor.stop() {
                    log::error!("Error while stopping {}: {e:#}", unit.processor.log_name());
                }
                // dropping the unit closes its channels
            }
            return Err(AgentError::ProcessorStart { plugin, source });
        }
        started.push(ProcessorUnit {
            processor,
            acc,
            rx: src_rx,
            tx: dst,
        });
        dst = src_tx;
    }
    started.reverse();
    Ok((dst, started))
}
