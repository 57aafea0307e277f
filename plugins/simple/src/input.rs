use indoc::indoc;
use pip::{
    accumulator::Accumulator,
    config::ConfigTable,
    metric::{Fields, Tags},
    plugin::{Input, PluginDescriber},
};
use serde::{Deserialize, Serialize};

/// Measures how good things are, which is always "pretty good".
#[derive(Default)]
pub struct SimpleInput {
    config: Config,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
struct Config {
    /// Indicates if everything is fine.
    ok: bool,
    /// Logged on startup.
    tip: String,
}

impl PluginDescriber for SimpleInput {
    fn description(&self) -> &'static str {
        "a demo plugin"
    }

    fn sample_config(&self) -> &'static str {
        indoc! {r#"
            ## Indicate if everything is fine
            ok = true
        "#}
    }
}

impl Input for SimpleInput {
    fn configure(&mut self, settings: &mut ConfigTable) -> anyhow::Result<()> {
        self.config = settings.decode()?;
        Ok(())
    }

    fn init(&mut self) -> anyhow::Result<()> {
        log::info!("Simple input initialized, ok = {}", self.config.ok);
        if !self.config.tip.is_empty() {
            log::info!("simple.tip: {}", self.config.tip);
        }
        Ok(())
    }

    fn gather(&mut self, acc: &mut dyn Accumulator) -> anyhow::Result<()> {
        let fields = Fields::from_iter([
            (String::from("value"), "pretty good".into()),
            (String::from("ok"), self.config.ok.into()),
        ]);
        acc.add_fields("simple", fields, Tags::new(), None);
        Ok(())
    }
}
