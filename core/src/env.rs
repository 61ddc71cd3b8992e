//! Access to the process environment and home directory.
//!
//! Settings loading and cache-directory resolution go through [`Env`] so
//! tests can supply a [`StaticEnv`] instead of mutating process state.

use std::collections::HashMap;
use std::path::PathBuf;

/// Read-only view of environment variables and the user's home directory.
pub trait Env: Send + Sync {
    /// Value of one environment variable, if set and valid UTF-8.
    fn var(&self, name: &str) -> Option<String>;

    /// Every environment variable with a UTF-8 name and value.
    fn vars(&self) -> Vec<(String, String)>;

    /// The current user's home directory.
    fn home_dir(&self) -> Option<PathBuf>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsEnv;

impl Env for OsEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    fn vars(&self) -> Vec<(String, String)> {
        std::env::vars().collect()
    }

    fn home_dir(&self) -> Option<PathBuf> {
        dirs::home_dir()
    }
}

/// A fixed environment, for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct StaticEnv {
    pub home_dir: Option<PathBuf>,
    pub vars: HashMap<String, String>,
}

impl StaticEnv {
    pub fn new(home_dir: impl Into<PathBuf>) -> Self {
        Self {
            home_dir: Some(home_dir.into()),
            vars: HashMap::new(),
        }
    }

    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }
}

impl Env for StaticEnv {
    fn var(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }

    fn vars(&self) -> Vec<(String, String)> {
        self.vars
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn home_dir(&self) -> Option<PathBuf> {
        self.home_dir.clone()
    }
}
