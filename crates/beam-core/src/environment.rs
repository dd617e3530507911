//! Read-only snapshot of the process environment.
//!
//! Captured once at startup and shared as `Arc<Environment>` with every
//! runner and task. Substitution (`${env:NAME}`) and `~/` expansion read from
//! this snapshot, never from ambient process state, so tests can supply a
//! fully controlled environment.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Variable exported to every child process so scripts can detect the host.
pub const HOST_MARKER_VAR: &str = "BEAM";

/// Snapshot of environment variables, home and working directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
    home: Option<PathBuf>,
    cwd: PathBuf,
}

impl Environment {
    /// Capture the current process environment.
    #[must_use]
    pub fn capture() -> Self {
        Self {
            vars: std::env::vars().collect(),
            home: dirs::home_dir(),
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/")),
        }
    }

    /// Start building an explicit environment (useful for tests).
    #[must_use]
    pub fn builder() -> EnvironmentBuilder {
        EnvironmentBuilder::default()
    }

    /// Look up a variable.
    #[must_use]
    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// All variables in name order.
    pub fn vars(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The user's home directory, if known.
    #[must_use]
    pub fn home(&self) -> Option<&Path> {
        self.home.as_deref()
    }

    /// Working directory at capture time.
    #[must_use]
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Expand a `~/`-prefixed path against the home directory.
    ///
    /// Returns `None` when the path has no `~/` prefix or no home is known.
    #[must_use]
    pub fn expand_home(&self, path: &str) -> Option<PathBuf> {
        let rest = path.strip_prefix("~/")?;
        self.home.as_ref().map(|home| home.join(rest))
    }
}

/// Builder for [`Environment`].
#[derive(Debug, Default)]
pub struct EnvironmentBuilder {
    vars: BTreeMap<String, String>,
    home: Option<PathBuf>,
    cwd: Option<PathBuf>,
}

impl EnvironmentBuilder {
    #[must_use]
    pub fn var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = Some(home.into());
        self
    }

    #[must_use]
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    #[must_use]
    pub fn build(self) -> Environment {
        Environment {
            vars: self.vars,
            home: self.home,
            cwd: self.cwd.unwrap_or_else(|| PathBuf::from("/")),
        }
    }
}
