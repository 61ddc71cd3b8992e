//! Arvados settings: `~/.config/arvados/settings.conf` overlaid with the
//! `ARVADOS_*` environment.
//!
//! # Design
//! The file holds one `NAME=VALUE` per line with no comments or quoting.
//! Each line is split at its first `=`, so values may themselves contain
//! `=`. A line without `=` fails the whole load rather than being skipped.
//! Environment variables are applied after the file, so they win.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::env::Env;
use crate::error::ConfigError;

/// Prefix shared by every setting imported from the environment.
pub const ENV_PREFIX: &str = "ARVADOS_";

pub const API_HOST: &str = "ARVADOS_API_HOST";
pub const API_TOKEN: &str = "ARVADOS_API_TOKEN";
pub const API_HOST_INSECURE: &str = "ARVADOS_API_HOST_INSECURE";
pub const DEBUG: &str = "ARVADOS_DEBUG";
pub const EXTERNAL_CLIENT: &str = "ARVADOS_EXTERNAL_CLIENT";

/// Sent when no token is configured, so the server answers with a
/// recognizable authentication error.
// TODO: decide whether a missing token should fail construction instead.
pub const TOKEN_NOT_SET: &str = "ARVADOS_API_TOKEN_not_set";

/// Immutable name→value settings for one process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    values: BTreeMap<String, String>,
}

impl Settings {
    /// Location of the settings file under `home`.
    pub fn default_path(home: &Path) -> PathBuf {
        home.join(".config").join("arvados").join("settings.conf")
    }

    /// Load the default settings file for `env`'s home directory.
    pub fn load_default(env: &dyn Env) -> Result<Self, ConfigError> {
        let home = env.home_dir().ok_or(ConfigError::HomeDirectoryUnknown)?;
        Self::load(&Self::default_path(&home), env)
    }

    /// Load `path` (if it exists), then overlay prefixed environment variables.
    pub fn load(path: &Path, env: &dyn Env) -> Result<Self, ConfigError> {
        let mut values = BTreeMap::new();

        if path.exists() {
            let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            for (index, raw) in contents.lines().enumerate() {
                let line = raw.trim_end();
                let (name, value) = line.split_once('=').ok_or_else(|| ConfigError::MalformedLine {
                    path: path.to_path_buf(),
                    line_number: index + 1,
                    line: line.to_string(),
                })?;
                values.insert(name.to_string(), value.to_string());
            }
            tracing::debug!(path = %path.display(), count = values.len(), "loaded settings file");
        }

        for (name, value) in env.vars() {
            if name.starts_with(ENV_PREFIX) {
                values.insert(name, value);
            }
        }

        Ok(Self { values })
    }

    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `ARVADOS_API_HOST`, required for every handle.
    pub fn api_host(&self) -> Result<&str, ConfigError> {
        self.get(API_HOST).ok_or(ConfigError::MissingSetting(API_HOST))
    }

    /// `ARVADOS_API_TOKEN`, or [`TOKEN_NOT_SET`] when absent.
    pub fn api_token(&self) -> &str {
        self.get(API_TOKEN).unwrap_or(TOKEN_NOT_SET)
    }

    /// Whether TLS certificate validation should be skipped.
    pub fn insecure(&self) -> bool {
        self.get(API_HOST_INSECURE).is_some_and(is_truthy)
    }

    /// `ARVADOS_DEBUG` enables verbose diagnostics by presence alone.
    pub fn debug(&self) -> bool {
        self.contains(DEBUG)
    }

    pub fn external_client(&self) -> bool {
        self.get(EXTERNAL_CLIENT).is_some_and(is_truthy)
    }
}

/// Case-insensitive `true`, `1`, or `yes`.
pub fn is_truthy(value: &str) -> bool {
    ["true", "1", "yes"]
        .iter()
        .any(|t| value.eq_ignore_ascii_case(t))
}
