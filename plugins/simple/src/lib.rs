//! A demo input and a demo output, which are also the default output of the agent.
mod input;
mod output;

use pip::plugin::{DuplicatePluginError, PluginRegistry};

pub use input::SimpleInput;
pub use output::SimpleOutput;

pub const INPUT_NAME: &str = "simple";
pub const OUTPUT_NAME: &str = "simpleoutput";

/// Registers the `simple` input and the `simpleoutput` output.
pub fn register(registry: &mut PluginRegistry) -> Result<(), DuplicatePluginError> {
    registry.inputs.add(INPUT_NAME, || Box::new(SimpleInput::default()))?;
    registry.outputs.add(OUTPUT_NAME, || Box::new(SimpleOutput::stdout()))?;
    Ok(())
}
