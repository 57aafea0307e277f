use std::slice;

use tokio::sync::mpsc;

use crate::{metric::Metric, plugin::Output};

use super::PluginConfig;

/// An output plugin, ready to be run.
pub struct RunningOutput {
    output: Box<dyn Output>,
    config: PluginConfig,
    written: u64,
    failed_writes: u64,
}

impl RunningOutput {
    pub fn new(output: Box<dyn Output>, config: PluginConfig) -> Self {
        Self {
            output,
            config,
            written: 0,
            failed_writes: 0,
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

    pub fn init(&mut self) -> anyhow::Result<()> {
        self.output.init()
    }

    pub fn connect(&mut self) -> anyhow::Result<()> {
        self.output.connect()
    }

    pub fn close(&mut self) -> anyhow::Result<()> {
        self.output.close()
    }

    /// Writes one metric. A failed write is logged and the metric is lost.
    pub fn add_metric(&mut self, metric: &Metric) {
        match self.output.write(slice::from_ref(metric)) {
            Ok(()) => self.written += 1,
            Err(e) => {
                self.failed_writes += 1;
                log::error!("Error in plugin {}: {e:#}", self.log_name());
            }
        }
    }

    /// Number of metrics written successfully.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn failed_writes(&self) -> u64 {
        self.failed_writes
    }
}

/// Sends every metric of `rx` to every output, until the channel is closed.
///
/// Then closes the outputs. Writing may block, so the outputs are moved to the blocking
/// thread pool of tokio for each metric, and moved back afterwards.
pub(crate) async fn run_outputs(mut outputs: Vec<RunningOutput>, mut rx: mpsc::Receiver<Metric>) {
    while let Some(metric) = rx.recv().await {
        let written = tokio::task::spawn_blocking(move || {
            for output in outputs.iter_mut() {
                output.add_metric(&metric);
            }
            outputs
        })
        .await;
        match written {
            Ok(back) => outputs = back,
            Err(e) => {
                log::error!("An output panicked, the outputs will now stop: {e}");
                return;
            }
        }
    }
    log::info!("Hang on, flushing any cached metrics before shutdown");

    let closed = tokio::task::spawn_blocking(move || {
        for output in outputs.iter_mut() {
            log::debug!(
                "{} wrote {} metrics ({} failed writes)",
                output.log_name(),
                output.written(),
                output.failed_writes()
            );
            if let Err(e) = output.close() {
                log::error!("Error closing {}: {e:#}", output.log_name());
            }
        }
    })
    .await;
    if let Err(e) = closed {
        log::error!("An output panicked while closing: {e}");
    }
}
