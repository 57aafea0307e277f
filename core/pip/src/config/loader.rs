use std::{borrow::Cow, path::PathBuf, str::FromStr, sync::LazyLock};

use regex::{Captures, Regex};

use super::error::{LoadError, LoadErrorCause};

/// `${NAME}` or `$NAME`.
static ENV_VAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$\{(\w+)\}|\$(\w+)").expect("valid regex"));

const BOM: char = '\u{feff}';

/// Loads the agent configuration from a TOML document.
pub struct Loader {
    source: Source,
    substitute_env: bool,
}

enum Source {
    File(PathBuf),
    Text(String),
}

impl Loader {
    /// Creates a new `Loader` that will read `config_file` on [`load`](Self::load).
    pub fn parse_file<P: Into<PathBuf>>(config_file: P) -> Self {
        Self {
            source: Source::File(config_file.into()),
            substitute_env: false,
        }
    }

    /// Creates a new `Loader` that will parse `content` on [`load`](Self::load).
    pub fn parse_str(content: impl Into<String>) -> Self {
        Self {
            source: Source::Text(content.into()),
            substitute_env: false,
        }
    }

    /// Enables or disables the substitution of environment variables.
    ///
    /// Variable substitution is performed _before_ passing the content of the config
    /// to the TOML parser. See [`substitute_env`].
    pub fn substitute_env_variables(mut self, substitute_env: bool) -> Self {
        self.substitute_env = substitute_env;
        self
    }

    /// Loads the configuration with the provided settings.
    ///
    /// The order of keys is the order of the document.
    pub fn load(self) -> Result<toml::Table, LoadError> {
        let config_file = match &self.source {
            Source::File(path) => path.clone(),
            Source::Text(_) => PathBuf::from("<inline>"),
        };
        self.load_impl().map_err(|kind| LoadError { config_file, kind })
    }

    fn load_impl(self) -> Result<toml::Table, LoadErrorCause> {
        let content = match self.source {
            Source::File(path) => {
                let bytes = std::fs::read(path).map_err(LoadErrorCause::Read)?;
                String::from_utf8(bytes).map_err(LoadErrorCause::InvalidUtf8)?
            }
            Source::Text(content) => content,
        };
        let content = content.strip_prefix(BOM).unwrap_or(&content);
        let content = if self.substitute_env {
            substitute_env(content)
        } else {
            Cow::Borrowed(content)
        };
        Ok(toml::Table::from_str(&content)?)
    }
}

/// Replaces `${NAME}` and `$NAME` by the value of the `NAME` environment variable.
///
/// Variables that are not set, or whose value is not valid UTF-8, are left untouched.
/// The values are escaped so that they can appear inside a TOML basic string.
pub fn substitute_env(input: &str) -> Cow<'_, str> {
    ENV_VAR.replace_all(input, |caps: &Captures| {
        let whole = &caps[0];
        let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
        match std::env::var(name) {
            Ok(value) => escape_value(&value),
            Err(_) => whole.to_owned(),
        }
    })
}

fn escape_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
