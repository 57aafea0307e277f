//! Plugins used by the integration tests.
#![allow(dead_code)]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use pip::{
    accumulator::Accumulator,
    config::ConfigTable,
    metric::{Fields, Metric, Tags},
    parsers::{Parser, ParserFactory},
    plugin::{Input, Output, ParserFactoryInput, ParserInput, PluginDescriber, PluginRegistry, Processor, StreamingProcessor},
};
use serde::{Deserialize, Serialize};

/// What the test plugins have seen.
#[derive(Clone, Default)]
pub struct Probe {
    pub written: Arc<Mutex<Vec<Metric>>>,
    pub gathered: Arc<AtomicUsize>,
    pub connected: Arc<AtomicBool>,
    pub closed: Arc<AtomicBool>,
    pub events: Arc<Mutex<Vec<String>>>,
}

impl Probe {
    pub fn event(&self, e: impl Into<String>) {
        self.events.lock().unwrap().push(e.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn written(&self) -> Vec<Metric> {
        self.written.lock().unwrap().clone()
    }
}

#[derive(Deserialize, Serialize, Default)]
#[serde(default)]
struct SimpleSettings {
    ok: bool,
    fail_init: bool,
    fail_every_other: bool,
}

/// Emits one metric per gathering.
pub struct SimpleInput {
    probe: Probe,
    settings: SimpleSettings,
}

impl PluginDescriber for SimpleInput {}

impl Input for SimpleInput {
    fn configure(&mut self, settings: &mut ConfigTable) -> anyhow::Result<()> {
        self.settings = settings.decode()?;
        Ok(())
    }

    fn init(&mut self) -> anyhow::Result<()> {
        if self.settings.fail_init {
            anyhow::bail!("init failed on purpose");
        }
        self.probe.event("init input");
        Ok(())
    }

    fn gather(&mut self, acc: &mut dyn Accumulator) -> anyhow::Result<()> {
        let n = self.probe.gathered.fetch_add(1, Ordering::Relaxed);
        if self.settings.fail_every_other && n % 2 == 1 {
            anyhow::bail!("gathering {n} failed");
        }
        let fields = Fields::from_iter([
            (String::from("value"), "pretty good".into()),
            (String::from("ok"), self.settings.ok.into()),
        ]);
        acc.add_fields("simple", fields, Tags::new(), None);
        Ok(())
    }
}

/// Keeps the written metrics in the probe.
pub struct RecordingOutput {
    probe: Probe,
    fail_connect: bool,
}

impl PluginDescriber for RecordingOutput {}

impl Output for RecordingOutput {
    fn configure(&mut self, settings: &mut ConfigTable) -> anyhow::Result<()> {
        self.fail_connect = settings.take("fail_connect")?.unwrap_or(false);
        let _: Option<bool> = settings.take("ok")?;
        Ok(())
    }

    fn init(&mut self) -> anyhow::Result<()> {
        self.probe.event("init output");
        Ok(())
    }

    fn connect(&mut self) -> anyhow::Result<()> {
        if self.fail_connect {
            anyhow::bail!("connection refused");
        }
        self.probe.connected.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn close(&mut self) -> anyhow::Result<()> {
        self.probe.closed.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn write(&mut self, metrics: &[Metric]) -> anyhow::Result<()> {
        self.probe.written.lock().unwrap().extend_from_slice(metrics);
        Ok(())
    }
}

/// Forwards everything.
pub struct Passthrough;

impl PluginDescriber for Passthrough {}

impl Processor for Passthrough {
    fn apply(&mut self, metrics: Vec<Metric>) -> Vec<Metric> {
        metrics
    }
}

#[derive(Deserialize, Serialize, Default)]
#[serde(default)]
struct TaggerSettings {
    label: String,
    fail_start: bool,
}

/// Appends its label to the `visited` tag of each metric.
pub struct Tagger {
    probe: Probe,
    settings: TaggerSettings,
}

impl PluginDescriber for Tagger {}

impl StreamingProcessor for Tagger {
    fn configure(&mut self, settings: &mut ConfigTable) -> anyhow::Result<()> {
        self.settings = settings.decode()?;
        Ok(())
    }

    fn init(&mut self) -> anyhow::Result<()> {
        self.probe.event(format!("init {}", self.settings.label));
        Ok(())
    }

    fn start(&mut self, _acc: &mut dyn Accumulator) -> anyhow::Result<()> {
        if self.settings.fail_start {
            anyhow::bail!("start failed on purpose");
        }
        self.probe.event(format!("start {}", self.settings.label));
        Ok(())
    }

    fn add(&mut self, mut metric: Metric, acc: &mut dyn Accumulator) -> anyhow::Result<()> {
        let visited = match metric.tag("visited") {
            Some(v) => format!("{v}>{}", self.settings.label),
            None => self.settings.label.clone(),
        };
        metric.add_tag("visited", visited);
        acc.add_metric(metric);
        Ok(())
    }

    fn stop(&mut self) -> anyhow::Result<()> {
        self.probe.event(format!("stop {}", self.settings.label));
        Ok(())
    }
}

/// An input that reads a fixed text with its parser.
#[derive(Default)]
pub struct ParsingInput {
    parser: Option<Box<dyn Parser>>,
    text: String,
}

impl PluginDescriber for ParsingInput {}

impl ParserInput for ParsingInput {
    fn set_parser(&mut self, parser: Box<dyn Parser>) {
        self.parser = Some(parser);
    }
}

impl Input for ParsingInput {
    fn configure(&mut self, settings: &mut ConfigTable) -> anyhow::Result<()> {
        self.text = settings.take("text")?.unwrap_or_default();
        Ok(())
    }

    fn gather(&mut self, acc: &mut dyn Accumulator) -> anyhow::Result<()> {
        let parser = self.parser.as_mut().ok_or_else(|| anyhow::anyhow!("no parser"))?;
        for m in parser.parse(self.text.as_bytes())? {
            acc.add_metric(m);
        }
        Ok(())
    }

    fn as_parser_input(&mut self) -> Option<&mut dyn ParserInput> {
        Some(self)
    }
}

/// An input that creates a parser on each gathering and parses a fixed text.
#[derive(Default)]
pub struct FactoryInput {
    factory: Option<ParserFactory>,
}

impl PluginDescriber for FactoryInput {}

impl ParserFactoryInput for FactoryInput {
    fn set_parser_factory(&mut self, factory: ParserFactory) {
        self.factory = Some(factory);
    }
}

impl Input for FactoryInput {
    fn gather(&mut self, acc: &mut dyn Accumulator) -> anyhow::Result<()> {
        let factory = self.factory.as_ref().ok_or_else(|| anyhow::anyhow!("no parser factory"))?;
        let mut parser = factory()?;
        for m in parser.parse(b"1")? {
            acc.add_metric(m);
        }
        Ok(())
    }

    fn as_parser_factory_input(&mut self) -> Option<&mut dyn ParserFactoryInput> {
        Some(self)
    }
}

/// Registers the test plugins, under the names used by the default pipeline.
pub fn registry(probe: &Probe) -> PluginRegistry {
    let mut registry = PluginRegistry::new();

    let p = probe.clone();
    registry
        .inputs
        .add("simple", move || {
            Box::new(SimpleInput {
                probe: p.clone(),
                settings: SimpleSettings::default(),
            })
        })
        .unwrap();
    registry
        .inputs
        .add("parsing", || Box::new(ParsingInput::default()))
        .unwrap();
    registry
        .inputs
        .add("factory", || Box::new(FactoryInput::default()))
        .unwrap();

    let p = probe.clone();
    registry
        .outputs
        .add("simpleoutput", move || {
            Box::new(RecordingOutput {
                probe: p.clone(),
                fail_connect: false,
            })
        })
        .unwrap();

    registry.processors.add_processor("printer", || Passthrough).unwrap();
    let p = probe.clone();
    registry
        .processors
        .add("tagger", move || {
            Box::new(Tagger {
                probe: p.clone(),
                settings: TaggerSettings::default(),
            })
        })
        .unwrap();

    registry
}
