//! Settings for the CLI and the default engine registry.
//!
//! Settings come from a TOML file; environment lookups see a `.env` file in
//! the working directory overlaid by the process environment.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dialect::Dialect;
use crate::error::{Error, Result};

/// Environment variable pointing at a settings file.
pub const CONFIG_ENV: &str = "QSTRINGS_CONFIG";
/// Environment variable overriding the history database.
pub const HISTORY_ENV: &str = "QSTRINGS_HISTORY";
/// Token appended to the history location as a connection qualifier.
pub const TOKEN_ENV: &str = "MD_TOKEN";

/// Settings file contents plus the environment they were loaded with.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// History database location.
    pub history: Option<PathBuf>,
    /// Engine used when none is given.
    pub engine: Option<String>,
    /// Dialect used to parse query strings.
    pub dialect: Dialect,
    pub hf_model: Option<String>,
    pub hf_base_url: Option<String>,
    pub quiet: bool,

    #[serde(skip)]
    env: HashMap<String, String>,
}

impl Settings {
    /// Load settings from a TOML file, with the current environment.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        let mut settings = Self::from_toml(&content)?;
        settings.env = load_env(Path::new(".env"));
        Ok(settings)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load the default settings file.
    ///
    /// Looks in the following locations:
    /// 1. `$QSTRINGS_CONFIG`
    /// 2. `./qstrings.toml`
    /// 3. `~/.config/qstrings/config.toml`
    /// 4. Returns defaults if none exists
    pub fn load() -> Result<Self> {
        let env = load_env(Path::new(".env"));

        let candidates = env
            .get(CONFIG_ENV)
            .map(PathBuf::from)
            .into_iter()
            .chain(std::iter::once(PathBuf::from("qstrings.toml")))
            .chain(dirs::config_dir().map(|d| d.join("qstrings").join("config.toml")));

        for path in candidates {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Ok(Self {
            env,
            ..Self::default()
        })
    }

    /// Replace the environment these settings see.
    pub fn with_env<K, V>(mut self, env: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.env = env.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self
    }

    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    /// Where the history database lives.
    ///
    /// 1. `explicit`
    /// 2. `$QSTRINGS_HISTORY`, with `?motherduck_token=$MD_TOKEN` when set
    /// 3. `history` from the settings file
    /// 4. `history.duckdb` in the user data directory
    pub fn history_path(&self, explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }

        if let Some(history) = self.env_var(HISTORY_ENV) {
            let mut location = history.to_string();
            if let Some(token) = self.env_var(TOKEN_ENV) {
                location.push_str(&format!("?motherduck_token={token}"));
            }
            return PathBuf::from(location);
        }

        if let Some(history) = &self.history {
            return history.clone();
        }

        dirs::data_dir()
            .map(|d| d.join("qstrings"))
            .unwrap_or_default()
            .join("history.duckdb")
    }
}

/// Process environment layered over the `KEY=VALUE` lines of `path`.
pub fn load_env(path: &Path) -> HashMap<String, String> {
    let mut env = std::fs::read_to_string(path)
        .map(|content| parse_dotenv(&content))
        .unwrap_or_default();
    for (k, v) in std::env::vars_os() {
        if let (Ok(k), Ok(v)) = (k.into_string(), v.into_string()) {
            env.insert(k, v);
        }
    }
    env
}

/// Parse `.env` content: `KEY=VALUE` lines, `#` comments, optional `export`
/// prefix and matching surrounding quotes.
pub fn parse_dotenv(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let line = line.strip_prefix("export ").unwrap_or(line);
            let (key, value) = line.split_once('=')?;
            let value = value.trim();
            let value = ['"', '\'']
                .iter()
                .find_map(|q| value.strip_prefix(*q).and_then(|v| v.strip_suffix(*q)))
                .unwrap_or(value);
            Some((key.trim().to_string(), value.to_string()))
        })
        .collect()
}
