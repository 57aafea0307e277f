//! Bootstrap of the agent: logging, plugin registration and plugin documentation.

use env_logger::Env;
use pip::plugin::{DuplicatePluginError, PluginDescriber, PluginRegistry, Registry};

/// Initializes the global logger.
///
/// Call this first! The default level is `info`, use `RUST_LOG` to change it.
pub fn init_logger() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    // Print a warning if we are running in debug mode.
    #[cfg(debug_assertions)]
    {
        log::warn!("DEBUG assertions are enabled, this build of the agent is fine for debugging, but not for production.");
    }
}

/// Registers every plugin that is built into the agent.
pub fn register_plugins(registry: &mut PluginRegistry) -> Result<(), DuplicatePluginError> {
    plugin_simple::register(registry)?;
    plugin_printer::register(registry)?;
    plugin_file::register(registry)?;
    Ok(())
}

/// Lists the plugins by kind, with their description.
pub fn list_plugins(registry: &PluginRegistry) -> String {
    let mut out = String::new();
    list_kind(&mut out, &registry.inputs);
    list_kind(&mut out, &registry.processors);
    list_kind(&mut out, &registry.outputs);
    out
}

fn list_kind<T: PluginDescriber + ?Sized>(out: &mut String, registry: &Registry<T>) {
    out.push_str(&format!("{}:\n", registry.kind().namespace()));
    for name in registry.names() {
        if let Some(plugin) = registry.create(name) {
            out.push_str(&format!("  - {name}: {}\n", plugin.description()));
        }
    }
}

/// Generates a configuration that declares every plugin with its sample settings.
pub fn sample_config(registry: &PluginRegistry) -> String {
    let mut out = String::from("[agent]\ninterval = \"3s\"\n\n[global_tags]\n# dc = \"eu-west\"\n");
    sample_kind(&mut out, &registry.inputs);
    sample_kind(&mut out, &registry.processors);
    sample_kind(&mut out, &registry.outputs);
    out
}

fn sample_kind<T: PluginDescriber + ?Sized>(out: &mut String, registry: &Registry<T>) {
    for name in registry.names() {
        let Some(plugin) = registry.create(name) else {
            continue;
        };
        out.push('\n');
        let description = plugin.description();
        if !description.is_empty() {
            out.push_str(&format!("# {description}\n"));
        }
        out.push_str(&format!("[[{}.{name}]]\n", registry.kind().namespace()));
        for line in plugin.sample_config().lines() {
            if line.is_empty() {
                out.push('\n');
            } else {
                out.push_str(&format!("  {line}\n"));
            }
        }
    }
}
