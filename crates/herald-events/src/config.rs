//! Event manager configuration.
//!
//! Configuration can come from code, from the environment, from a JSON file,
//! or from a `.env` style file.
//!
//! # Environment Variables
//!
//! - `HERALD_LAZY_LOADING`: Accept listener identifiers (`true`/`false`)
//! - `HERALD_EVENTS`: Comma-separated event names to register up front
//! - `HERALD_ANCHOR_WILDCARDS`: Require wildcard patterns to cover whole names

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{EventError, Result};

/// Environment variable for the lazy loading flag.
pub const LAZY_LOADING_ENV: &str = "HERALD_LAZY_LOADING";

/// Environment variable for the initial event names.
pub const EVENTS_ENV: &str = "HERALD_EVENTS";

/// Environment variable for anchored wildcard matching.
pub const ANCHOR_WILDCARDS_ENV: &str = "HERALD_ANCHOR_WILDCARDS";

/// Configuration for an [`EventManager`](crate::EventManager).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Whether listeners may be added by identifier.
    pub lazy_loading: bool,
    /// Event names registered when the manager is built.
    pub events: Vec<String>,
    /// Whether wildcard patterns must match the whole event name.
    pub anchor_wildcards: bool,
}

impl ManagerConfig {
    /// Creates a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the lazy loading flag.
    pub fn with_lazy_loading(mut self, flag: bool) -> Self {
        self.lazy_loading = flag;
        self
    }

    /// Sets the initial event names.
    pub fn with_events<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.events = events.into_iter().map(Into::into).collect();
        self
    }

    /// Sets anchored wildcard matching.
    pub fn with_anchor_wildcards(mut self, flag: bool) -> Self {
        self.anchor_wildcards = flag;
        self
    }

    /// Builds a config from the process environment.
    ///
    /// Unset variables keep their default values.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Builds a config from a `.env` style file.
    ///
    /// The file is read without modifying the process environment.
    pub fn from_env_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let iter = dotenvy::from_path_iter(path)
            .map_err(|e| EventError::Config(format!("{}: {e}", path.display())))?;

        let mut vars = HashMap::new();
        for item in iter {
            let (key, value) =
                item.map_err(|e| EventError::Config(format!("{}: {e}", path.display())))?;
            vars.insert(key, value);
        }

        Self::from_vars(|key| vars.get(key).cloned())
    }

    /// Builds a config from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| EventError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json(&content)
    }

    /// Parses a config from JSON text.
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| EventError::Config(e.to_string()))
    }

    fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(value) = lookup(LAZY_LOADING_ENV) {
            config.lazy_loading = parse_flag(LAZY_LOADING_ENV, &value)?;
        }
        if let Some(value) = lookup(ANCHOR_WILDCARDS_ENV) {
            config.anchor_wildcards = parse_flag(ANCHOR_WILDCARDS_ENV, &value)?;
        }
        if let Some(value) = lookup(EVENTS_ENV) {
            config.events = value
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(String::from)
                .collect();
        }

        Ok(config)
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(EventError::Config(format!(
            "{key}: expected a boolean, got '{other}'"
        ))),
    }
}
