//! Connection configuration.
//!
//! A [`TabulaConfig`] names the dialect, the connection string, the cursor page
//! size and the schema compile mode. It is read once at startup, from TOML or
//! from `TABULA_*` environment variables, and consumed read-only by
//! [`connect`](crate::connect).

use std::path::Path;

use serde::{Deserialize, Serialize};
use tabula_core::{Error, Result};
use tabula_query::DialectKind;
use tabula_schema::CompileMode;
use tabula_session::DEFAULT_PAGE_SIZE;

/// Prefix of the environment variables read by [`TabulaConfig::from_env`].
pub const ENV_PREFIX: &str = "TABULA_";

/// Database configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TabulaConfig {
    /// SQL dialect (`sqlite`, `mysql`, `sqlserver`).
    pub dialect: DialectKind,
    /// Driver connection string. For SQLite a path, `sqlite://<path>` or `:memory:`.
    pub connection_string: String,
    /// Rows fetched per cursor page (default: 100).
    pub page_size: usize,
    /// How the schema compiler treats disruptive changes.
    pub compile_mode: CompileMode,
}

impl Default for TabulaConfig {
    fn default() -> Self {
        Self {
            dialect: DialectKind::Sqlite,
            connection_string: ":memory:".to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            compile_mode: CompileMode::Normal,
        }
    }
}

impl TabulaConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the dialect.
    pub fn dialect(mut self, dialect: DialectKind) -> Self {
        self.dialect = dialect;
        self
    }

    /// Set the connection string.
    pub fn connection_string(mut self, connection_string: impl Into<String>) -> Self {
        self.connection_string = connection_string.into();
        self
    }

    /// Set the cursor page size.
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the schema compile mode.
    pub fn compile_mode(mut self, mode: CompileMode) -> Self {
        self.compile_mode = mode;
        self
    }

    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| Error::Config(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read '{}': {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Defaults overridden by `TABULA_DIALECT`, `TABULA_CONNECTION_STRING`,
    /// `TABULA_PAGE_SIZE` and `TABULA_COMPILE_MODE`.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars())
    }

    /// Like [`TabulaConfig::from_env`], over an explicit variable list.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();
        for (key, value) in vars {
            let Some(name) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value = value.as_ref();
            match name {
                "DIALECT" => config.dialect = value.parse()?,
                "CONNECTION_STRING" | "URL" => config.connection_string = value.to_string(),
                "PAGE_SIZE" => {
                    config.page_size = value.trim().parse().map_err(|_| {
                        Error::Config(format!("{ENV_PREFIX}PAGE_SIZE must be a number, got '{value}'"))
                    })?;
                }
                "COMPILE_MODE" => config.compile_mode = value.parse()?,
                _ => {}
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Reject a zero page size or an empty connection string.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(Error::Config("page_size must be at least 1".to_string()));
        }
        if self.connection_string.trim().is_empty() {
            return Err(Error::Config("connection_string is empty".to_string()));
        }
        Ok(())
    }
}
