//! Turns a configuration document into running plugins.

use std::{path::Path, time::Duration};

use crate::{
    agent::AgentSettings,
    metric::Tags,
    parsers::{ParserConfig, new_parser, parser_factory},
    pipeline::{PluginConfig, RunningInput, RunningOutput, RunningProcessor, RunningProcessors},
    plugin::{PluginKind, PluginRegistry},
};

use super::{
    ConfigTable, Loader, SettingsError,
    error::{BadTypeError, ConfigError},
};

/// Output that is always part of the pipeline.
pub const DEFAULT_OUTPUT: &str = "simpleoutput";

/// Processor that is always part of the pipeline.
pub const DEFAULT_PROCESSOR: &str = "printer";

/// Everything the agent needs to run.
pub struct Config {
    /// Global tags, added to every metric gathered by the inputs.
    pub tags: Tags,
    pub agent: AgentSettings,
    pub inputs: Vec<RunningInput>,
    pub outputs: Vec<RunningOutput>,
    pub processors: RunningProcessors,
    pub input_filters: Vec<String>,
    pub output_filters: Vec<String>,
    pub processor_filters: Vec<String>,
}

/// Builds a [`Config`] from a TOML document, with the plugins of a registry.
///
/// # Example
///
/// ```
/// use pip::config::ConfigBuilder;
/// use pip::plugin::PluginRegistry;
///
/// let registry = PluginRegistry::new();
/// let res = ConfigBuilder::new(&registry).build_from_str("[inputs.cpu]");
/// // nothing is registered, not even the default output
/// assert!(res.is_err());
/// ```
pub struct ConfigBuilder<'r> {
    registry: &'r PluginRegistry,
    input_filters: Vec<String>,
    output_filters: Vec<String>,
    processor_filters: Vec<String>,
}

impl Config {
    pub fn new() -> Self {
        Self {
            tags: Tags::new(),
            agent: AgentSettings::default(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            processors: RunningProcessors::new(),
            input_filters: Vec::new(),
            output_filters: Vec::new(),
            processor_filters: Vec::new(),
        }
    }

    pub fn input_names(&self) -> Vec<&str> {
        self.inputs.iter().map(|i| i.name()).collect()
    }

    pub fn output_names(&self) -> Vec<&str> {
        self.outputs.iter().map(|o| o.name()).collect()
    }

    pub fn processor_names(&self) -> Vec<&str> {
        self.processors.iter().map(|p| p.name()).collect()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl<'r> ConfigBuilder<'r> {
    pub fn new(registry: &'r PluginRegistry) -> Self {
        Self {
            registry,
            input_filters: Vec::new(),
            output_filters: Vec::new(),
            processor_filters: Vec::new(),
        }
    }

    /// Only the inputs with these names will be created. An empty list selects every input.
    pub fn input_filters(mut self, filters: Vec<String>) -> Self {
        self.input_filters = filters;
        self
    }

    /// Only the outputs with these names will be created, except the default output.
    pub fn output_filters(mut self, filters: Vec<String>) -> Self {
        self.output_filters = filters;
        self
    }

    /// Only the processors with these names will be created, except the default processor.
    pub fn processor_filters(mut self, filters: Vec<String>) -> Self {
        self.processor_filters = filters;
        self
    }

    /// Loads a config file, with environment variable substitution, and builds it.
    pub fn build_from_file(&self, path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let table = Loader::parse_file(path.as_ref())
            .substitute_env_variables(true)
            .load()?;
        self.build(table)
    }

    /// Parses a config, with environment variable substitution, and builds it.
    pub fn build_from_str(&self, content: &str) -> Result<Config, ConfigError> {
        let table = Loader::parse_str(content).substitute_env_variables(true).load()?;
        self.build(table)
    }

    /// Builds the config from a parsed document.
    pub fn build(&self, mut table: toml::Table) -> Result<Config, ConfigError> {
        let mut config = Config {
            input_filters: self.input_filters.clone(),
            output_filters: self.output_filters.clone(),
            processor_filters: self.processor_filters.clone(),
            ..Config::new()
        };

        // Global tags first: the inputs need them.
        for key in ["tags", "global_tags"] {
            if let Some(value) = table.remove(key) {
                parse_tags(key, value, &mut config.tags)?;
            }
        }
        if let Some(value) = table.remove("agent") {
            config.agent = value.try_into().map_err(ConfigError::AgentSettings)?;
            check_interval("agent", config.agent.interval)?;
        }

        self.add_defaults(&mut config)?;

        for (key, value) in table {
            match key.as_str() {
                "inputs" | "plugins" => {
                    for_each_plugin(&key, value, |name, t| self.add_input(&mut config, name, t))?;
                }
                "outputs" => {
                    for_each_plugin(&key, value, |name, t| self.add_output(&mut config, name, t))?;
                }
                "processors" => {
                    for_each_plugin(&key, value, |name, t| self.add_processor(&mut config, name, t))?;
                }
                _ => match value {
                    // legacy: a top-level plugin is an input
                    toml::Value::Table(t) => self.add_input(&mut config, &key, t)?,
                    other => return Err(BadTypeError::new(key.clone(), "table", &other).into()),
                },
            }
        }

        config.processors.sort();
        log::debug!(
            "Built config with inputs {:?}, processors {:?}, outputs {:?}",
            config.input_names(),
            config.processor_names(),
            config.output_names()
        );
        Ok(config)
    }

    fn add_defaults(&self, config: &mut Config) -> Result<(), ConfigError> {
        if self.registry.outputs.lookup(DEFAULT_OUTPUT).is_none() {
            return Err(ConfigError::MissingDefault {
                kind: PluginKind::Output,
                name: DEFAULT_OUTPUT,
            });
        }
        if self.registry.processors.lookup(DEFAULT_PROCESSOR).is_none() {
            return Err(ConfigError::MissingDefault {
                kind: PluginKind::Processor,
                name: DEFAULT_PROCESSOR,
            });
        }
        self.push_output(config, DEFAULT_OUTPUT, toml::Table::new())?;
        self.push_processor(config, DEFAULT_PROCESSOR, toml::Table::new())
    }

    fn add_input(&self, config: &mut Config, name: &str, table: toml::Table) -> Result<(), ConfigError> {
        if !is_selected(&config.input_filters, name) {
            log::debug!("input {name} is filtered out");
            return Ok(());
        }
        let mut input = self.registry.inputs.create(name).ok_or_else(|| ConfigError::UndefinedPlugin {
            kind: PluginKind::Input,
            name: name.to_owned(),
        })?;
        let mut settings = ConfigTable::new(table);
        let plugin_config = plugin_config(PluginKind::Input, name, &mut settings)?;
        let interval = settings
            .take::<humantime_serde::Serde<Duration>>("interval")
            .map_err(|source| invalid_settings(&plugin_config, source))?
            .map(humantime_serde::Serde::into_inner);
        if let Some(interval) = interval {
            check_interval(&plugin_config.log_name(), interval)?;
        }

        // The parser settings are consumed before the settings of the plugin.
        if let Some(target) = input.as_parser_input() {
            let parser_config = build_parser_config(&plugin_config, &mut settings, &config.tags)?;
            let parser = new_parser(&parser_config).map_err(|source| ConfigError::Parser {
                plugin: plugin_config.log_name(),
                source,
            })?;
            target.set_parser(parser);
        } else if let Some(target) = input.as_parser_factory_input() {
            let parser_config = build_parser_config(&plugin_config, &mut settings, &config.tags)?;
            target.set_parser_factory(parser_factory(parser_config));
        }

        input
            .configure(&mut settings)
            .map_err(|source| configure_error(&plugin_config, source))?;
        check_all_consumed(&plugin_config, &settings)?;

        let mut running = RunningInput::new(input, plugin_config);
        running.set_default_tags(config.tags.clone());
        if let Some(interval) = interval {
            running.set_interval(interval);
        }
        config.inputs.push(running);
        Ok(())
    }

    fn add_output(&self, config: &mut Config, name: &str, table: toml::Table) -> Result<(), ConfigError> {
        if !is_selected(&config.output_filters, name) {
            log::debug!("output {name} is filtered out");
            return Ok(());
        }
        self.push_output(config, name, table)
    }

    fn push_output(&self, config: &mut Config, name: &str, table: toml::Table) -> Result<(), ConfigError> {
        let mut output = self
            .registry
            .outputs
            .create(name)
            .ok_or_else(|| ConfigError::UndefinedPlugin {
                kind: PluginKind::Output,
                name: name.to_owned(),
            })?;
        let mut settings = ConfigTable::new(table);
        let plugin_config = plugin_config(PluginKind::Output, name, &mut settings)?;
        output
            .configure(&mut settings)
            .map_err(|source| configure_error(&plugin_config, source))?;
        check_all_consumed(&plugin_config, &settings)?;
        config.outputs.push(RunningOutput::new(output, plugin_config));
        Ok(())
    }

    fn add_processor(&self, config: &mut Config, name: &str, table: toml::Table) -> Result<(), ConfigError> {
        if !is_selected(&config.processor_filters, name) {
            log::debug!("processor {name} is filtered out");
            return Ok(());
        }
        self.push_processor(config, name, table)
    }

    fn push_processor(&self, config: &mut Config, name: &str, table: toml::Table) -> Result<(), ConfigError> {
        let mut processor =
            self.registry
                .processors
                .create(name)
                .ok_or_else(|| ConfigError::UndefinedPlugin {
                    kind: PluginKind::Processor,
                    name: name.to_owned(),
                })?;
        let mut settings = ConfigTable::new(table);
        let plugin_config = plugin_config(PluginKind::Processor, name, &mut settings)?;
        let order = settings
            .take::<i64>("order")
            .map_err(|source| invalid_settings(&plugin_config, source))?;
        processor
            .configure(&mut settings)
            .map_err(|source| configure_error(&plugin_config, source))?;
        check_all_consumed(&plugin_config, &settings)?;

        let mut running = RunningProcessor::new(processor, plugin_config);
        running.set_order(order.unwrap_or_default());
        config.processors.push(running);
        Ok(())
    }
}

fn is_selected(filters: &[String], name: &str) -> bool {
    filters.is_empty() || filters.iter().any(|f| f == name)
}

/// Calls `f` for each plugin of a namespace (e.g. `inputs`).
///
/// A plugin is either a table or an array of tables (one per instance).
fn for_each_plugin(
    namespace: &str,
    value: toml::Value,
    mut f: impl FnMut(&str, toml::Table) -> Result<(), ConfigError>,
) -> Result<(), ConfigError> {
    let plugins = match value {
        toml::Value::Table(t) => t,
        other => return Err(BadTypeError::new(namespace.to_owned(), "table", &other).into()),
    };
    for (name, value) in plugins {
        match value {
            toml::Value::Table(t) => f(&name, t)?,
            toml::Value::Array(instances) => {
                for (i, instance) in instances.into_iter().enumerate() {
                    match instance {
                        toml::Value::Table(t) => f(&name, t)?,
                        other => {
                            let path = format!("{namespace}.{name}[{i}]");
                            return Err(BadTypeError::new(path, "table", &other).into());
                        }
                    }
                }
            }
            other => {
                let path = format!("{namespace}.{name}");
                return Err(BadTypeError::new(path, "table or array of tables", &other).into());
            }
        }
    }
    Ok(())
}

fn parse_tags(key: &str, value: toml::Value, tags: &mut Tags) -> Result<(), ConfigError> {
    let table = match value {
        toml::Value::Table(t) => t,
        other => return Err(BadTypeError::new(key.to_owned(), "table", &other).into()),
    };
    for (k, v) in table {
        match v {
            toml::Value::String(s) => {
                tags.insert(k, s);
            }
            other => return Err(BadTypeError::new(format!("{key}.{k}"), "string", &other).into()),
        }
    }
    Ok(())
}

/// Extracts the keys that are common to every plugin.
fn plugin_config(kind: PluginKind, name: &str, settings: &mut ConfigTable) -> Result<PluginConfig, ConfigError> {
    let mut config = PluginConfig::new(kind, name);
    config.alias = settings
        .take::<String>("alias")
        .map_err(|source| invalid_settings(&config, source))?;
    if let Some(tags) = settings
        .take::<Tags>("tags")
        .map_err(|source| invalid_settings(&config, source))?
    {
        config.tags = tags;
    }
    Ok(config)
}

fn build_parser_config(
    plugin: &PluginConfig,
    settings: &mut ConfigTable,
    global_tags: &Tags,
) -> Result<ParserConfig, ConfigError> {
    let mut parser_config: ParserConfig = settings
        .decode()
        .map_err(|source| invalid_settings(plugin, source))?;
    parser_config.metric_name = plugin.name.clone();
    parser_config.default_tags = global_tags.clone();
    Ok(parser_config)
}

/// Rejects the intervals that the input tasks cannot schedule.
fn check_interval(owner: &str, interval: Duration) -> Result<(), ConfigError> {
    if interval.is_zero() {
        return Err(ConfigError::ZeroInterval(owner.to_owned()));
    }
    if tokio::time::Instant::now().checked_add(interval).is_none() {
        return Err(ConfigError::IntervalTooLarge {
            owner: owner.to_owned(),
            interval,
        });
    }
    Ok(())
}

fn check_all_consumed(plugin: &PluginConfig, settings: &ConfigTable) -> Result<(), ConfigError> {
    if settings.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::UnrecognizedOption {
            plugin: plugin.log_name(),
            keys: settings.keys().map(String::from).collect(),
        })
    }
}

fn invalid_settings(plugin: &PluginConfig, source: SettingsError) -> ConfigError {
    ConfigError::InvalidSettings {
        plugin: plugin.log_name(),
        source,
    }
}

fn configure_error(plugin: &PluginConfig, source: anyhow::Error) -> ConfigError {
    ConfigError::Plugin {
        plugin: plugin.log_name(),
        source,
    }
}
