//! Name-to-factory tables of the available plugins.

use std::collections::BTreeMap;

use super::{Input, Output, PluginKind, Processor, StreamingAdapter, StreamingProcessor};

/// Zero-argument constructor of a plugin.
pub type Factory<T> = Box<dyn Fn() -> Box<T> + Send + Sync>;

/// Registry of the plugins of one kind.
///
/// Names are unique: registering the same name twice is an error.
pub struct Registry<T: ?Sized> {
    kind: PluginKind,
    factories: BTreeMap<String, Factory<T>>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("duplicate plugin name: {kind} '{name}' is already registered")]
pub struct DuplicatePluginError {
    pub kind: PluginKind,
    pub name: String,
}

/// All the available plugins.
///
/// The registry is filled at startup, by calling the registration function of each plugin
/// crate, then passed to the [`ConfigBuilder`](crate::config::ConfigBuilder).
pub struct PluginRegistry {
    pub inputs: Registry<dyn Input>,
    pub outputs: Registry<dyn Output>,
    pub processors: Registry<dyn StreamingProcessor>,
}

impl<T: ?Sized> Registry<T> {
    pub fn new(kind: PluginKind) -> Self {
        Self {
            kind,
            factories: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> PluginKind {
        self.kind
    }

    /// Registers a factory under the given name.
    pub fn add<F>(&mut self, name: &str, factory: F) -> Result<(), DuplicatePluginError>
    where
        F: Fn() -> Box<T> + Send + Sync + 'static,
    {
        if self.factories.contains_key(name) {
            return Err(DuplicatePluginError {
                kind: self.kind,
                name: name.to_owned(),
            });
        }
        log::trace!("registering {} '{name}'", self.kind);
        self.factories.insert(name.to_owned(), Box::new(factory));
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&Factory<T>> {
        self.factories.get(name)
    }

    /// Creates a new instance of the plugin `name`, if it exists.
    pub fn create(&self, name: &str) -> Option<Box<T>> {
        self.lookup(name).map(|factory| factory())
    }

    /// Returns the registered names, in alphabetical order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl Registry<dyn StreamingProcessor> {
    /// Registers a simple [`Processor`], which is turned into a [`StreamingProcessor`]
    /// by a [`StreamingAdapter`].
    pub fn add_processor<P, F>(&mut self, name: &str, factory: F) -> Result<(), DuplicatePluginError>
    where
        P: Processor + 'static,
        F: Fn() -> P + Send + Sync + 'static,
    {
        self.add(name, move || Box::new(StreamingAdapter::new(factory())))
    }
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            inputs: Registry::new(PluginKind::Input),
            outputs: Registry::new(PluginKind::Output),
            processors: Registry::new(PluginKind::Processor),
        }
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}
