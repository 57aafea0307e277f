use std::io::{self, Write};

use indoc::indoc;
use pip::{
    config::ConfigTable,
    metric::Metric,
    plugin::{Output, PluginDescriber},
};
use serde::{Deserialize, Serialize};

/// Prints the metrics, one per line.
pub struct SimpleOutput {
    config: Config,
    writer: Box<dyn Write + Send>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
struct Config {
    ok: bool,
}

impl SimpleOutput {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            config: Config::default(),
            writer: Box::new(writer),
        }
    }
}

impl PluginDescriber for SimpleOutput {
    fn description(&self) -> &'static str {
        "a demo output"
    }

    fn sample_config(&self) -> &'static str {
        indoc! {r#"
            ok = true
        "#}
    }
}

impl Output for SimpleOutput {
    fn configure(&mut self, settings: &mut ConfigTable) -> anyhow::Result<()> {
        self.config = settings.decode()?;
        Ok(())
    }

    fn init(&mut self) -> anyhow::Result<()> {
        log::debug!("Simple output initialized, ok = {}", self.config.ok);
        Ok(())
    }

    fn connect(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn close(&mut self) -> anyhow::Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    fn write(&mut self, metrics: &[Metric]) -> anyhow::Result<()> {
        for m in metrics {
            writeln!(self.writer, "{m}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{self, Write},
        sync::{Arc, Mutex},
        time::{Duration, SystemTime},
    };

    use pip::{
        metric::{Fields, Metric, Tags, ValueType},
        plugin::Output,
    };
    use pretty_assertions::assert_eq;

    use super::SimpleOutput;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn writes_one_line_per_metric() -> anyhow::Result<()> {
        let buf = SharedBuf::default();
        let mut output = SimpleOutput::new(buf.clone());
        output.connect()?;

        let t = SystemTime::UNIX_EPOCH + Duration::from_secs(2);
        let fields = Fields::from_iter([(String::from("value"), "pretty good".into())]);
        let tags = Tags::from([(String::from("host"), String::from("a"))]);
        let m = Metric::new("simple", tags, fields, t, ValueType::Untyped)?;
        output.write(&[m.clone(), m])?;
        output.close()?;

        let text = String::from_utf8(buf.0.lock().unwrap().clone())?;
        let expected = "simple,host=a value=\"pretty good\" 2000000000\n";
        assert_eq!(text, expected.repeat(2));
        Ok(())
    }
}
