//! The `file` input: reads whole files on each gathering and parses them.
//!
//! The content of the files is parsed according to the `data_format` of the plugin
//! (see [`pip::parsers`]). Each file gets its own parser.
//!
//! ```toml
//! [[inputs.file]]
//! files = ["/sys/class/thermal/thermal_zone0/temp"]
//! data_format = "value"
//! data_type = "integer"
//! ```

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use indoc::indoc;
use pip::{
    accumulator::Accumulator,
    config::ConfigTable,
    parsers::ParserFactory,
    plugin::{DuplicatePluginError, Input, ParserFactoryInput, PluginDescriber, PluginRegistry},
};
use serde::{Deserialize, Serialize};

pub const NAME: &str = "file";

/// Name of the tag that holds the path of the file a metric comes from.
pub const FILE_TAG: &str = "file";

#[derive(Default)]
pub struct FileInput {
    config: Config,
    parser_factory: Option<ParserFactory>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
struct Config {
    /// Files to read.
    files: Vec<PathBuf>,
}

impl PluginDescriber for FileInput {
    fn description(&self) -> &'static str {
        "Parse a complete file each interval"
    }

    fn sample_config(&self) -> &'static str {
        indoc! {r#"
            ## Files to parse each interval.
            files = ["/tmp/metrics.out"]

            ## Data format to consume.
            data_format = "value"
            data_type = "integer"
        "#}
    }
}

impl Input for FileInput {
    fn configure(&mut self, settings: &mut ConfigTable) -> anyhow::Result<()> {
        self.config = settings.decode()?;
        Ok(())
    }

    fn init(&mut self) -> anyhow::Result<()> {
        if self.config.files.is_empty() {
            log::warn!("No file to read: the file input will not produce anything.");
        }
        Ok(())
    }

    fn gather(&mut self, acc: &mut dyn Accumulator) -> anyhow::Result<()> {
        let factory = self
            .parser_factory
            .as_ref()
            .context("the file input has no parser")?;
        for path in &self.config.files {
            let res = read_file(path, factory, acc).with_context(|| format!("failed to read {}", path.display()));
            acc.add_result(res);
        }
        Ok(())
    }

    fn as_parser_factory_input(&mut self) -> Option<&mut dyn ParserFactoryInput> {
        Some(self)
    }
}

impl ParserFactoryInput for FileInput {
    fn set_parser_factory(&mut self, factory: ParserFactory) {
        self.parser_factory = Some(factory);
    }
}

fn read_file(path: &Path, factory: &ParserFactory, acc: &mut dyn Accumulator) -> anyhow::Result<()> {
    let content = fs::read(path)?;
    let mut parser = factory()?;
    let file_tag = path.display().to_string();
    for mut m in parser.parse(&content)? {
        if m.tag(FILE_TAG).is_none() {
            m.add_tag(FILE_TAG, file_tag.clone());
        }
        acc.add_metric(m);
    }
    Ok(())
}

pub fn register(registry: &mut PluginRegistry) -> Result<(), DuplicatePluginError> {
    registry.inputs.add(NAME, || Box::new(FileInput::default()))
}
