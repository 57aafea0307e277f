use anyhow::Context;
use clap::Parser;
use pip::{agent::Agent, config::ConfigBuilder, plugin::PluginRegistry};
use pip_agent::{init_logger, list_plugins, register_plugins, sample_config};
use tokio_util::sync::CancellationToken;

use cli::{Cli, Command, CommonArgs, ConfigArgs, ConfigCommand, PluginsArgs, PluginsCommand};

const BINARY: &str = env!("CARGO_BIN_NAME");
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Main agent function.
///
/// The steps are:
/// - register the available plugins
/// - parse the CLI
/// - parse the config file and build the pipeline
/// - run the pipeline until Ctrl+C
///
/// About errors: we use `anyhow::Result` and `context` instead of `expect` to get
/// nicer error messages (`expect` prints errors with `Debug`).
fn main() -> anyhow::Result<()> {
    init_logger();

    let mut registry = PluginRegistry::new();
    register_plugins(&mut registry).context("invalid plugin set")?;

    // Special flags like --help will exit. In other cases, we continue.
    let args = Cli::parse();

    match args.command.unwrap_or(Command::Run) {
        Command::Plugins(PluginsArgs {
            command: PluginsCommand::List,
        }) => {
            println!("Available plugins:");
            print!("{}", list_plugins(&registry));
        }
        Command::Config(ConfigArgs {
            command: ConfigCommand::Sample,
        }) => {
            print!("{}", sample_config(&registry));
        }
        Command::Run => {
            print_welcome();
            run(&args.common, &registry)?;
        }
    }
    Ok(())
}

/// Prints a short welcome message.
fn print_welcome() {
    log::info!("Starting agent '{BINARY}' v{VERSION}");
}

/// Builds the pipeline from the config file, and runs it until Ctrl+C.
fn run(args: &CommonArgs, registry: &PluginRegistry) -> anyhow::Result<()> {
    let config = ConfigBuilder::new(registry)
        .input_filters(args.input_filter.clone())
        .output_filters(args.output_filter.clone())
        .processor_filters(args.processor_filter.clone())
        .build_from_file(&args.config)
        .context("invalid configuration")?;
    log::info!(
        "Loaded inputs: {}, processors: {}, outputs: {}",
        config.input_names().join(" "),
        config.processor_names().join(" "),
        config.output_names().join(" ")
    );

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("could not start the async runtime")?;

    rt.block_on(async {
        let shutdown = CancellationToken::new();
        let on_signal = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    log::info!("Received Ctrl+C, stopping the agent...");
                    on_signal.cancel();
                }
                Err(e) => log::error!("Unable to listen for Ctrl+C, the agent will not stop gracefully: {e}"),
            }
        });
        Agent::new(config).run(shutdown).await
    })
    .context("startup failure")?;

    log::info!("Agent stopped.");
    Ok(())
}

/// Agent command-line interface (CLI).
///
/// We use `clap` to parse these options, therefore the structs
/// derive [`clap::Args`] or other clap trait implementations.
mod cli {
    use clap::{Args, Parser, Subcommand};

    // NOTE: the doc comment attached to `Cli` is used by clap as the description of
    // the application. It is displayed at the start of the help message.

    /// Telemetry agent: gather, process and write metrics.
    #[derive(Parser)]
    #[command(version)]
    pub struct Cli {
        #[command(subcommand)]
        pub command: Option<Command>,

        #[command(flatten)]
        pub common: CommonArgs,
    }

    #[derive(Subcommand)]
    pub enum Command {
        /// Run the pipeline until Ctrl+C.
        ///
        /// This is the default command.
        Run,

        /// Manipulate the configuration.
        Config(ConfigArgs),

        /// Get plugins information.
        Plugins(PluginsArgs),
    }

    #[derive(Args)]
    pub struct ConfigArgs {
        #[command(subcommand)]
        pub command: ConfigCommand,
    }

    #[derive(Subcommand)]
    pub enum ConfigCommand {
        /// Print a configuration that declares every available plugin.
        Sample,
    }

    #[derive(Args)]
    pub struct PluginsArgs {
        #[command(subcommand)]
        pub command: PluginsCommand,
    }

    #[derive(Subcommand)]
    pub enum PluginsCommand {
        /// Print the available plugins.
        List,
    }

    /// Common CLI arguments.
    #[derive(Args, Clone)]
    pub struct CommonArgs {
        /// Path to the config file.
        #[arg(long, env = "PIP_CONFIG", default_value = "pip_config.toml")]
        pub config: String,

        /// Inputs to enable, separated by commas, ex. `simple,file`.
        ///
        /// The other inputs of the config file are ignored.
        #[arg(long, value_delimiter = ',')]
        pub input_filter: Vec<String>,

        /// Outputs to enable, separated by commas.
        #[arg(long, value_delimiter = ',')]
        pub output_filter: Vec<String>,

        /// Processors to enable, separated by commas.
        #[arg(long, value_delimiter = ',')]
        pub processor_filter: Vec<String>,
    }
}
