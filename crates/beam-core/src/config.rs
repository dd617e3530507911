//! Configuration management for beam
//!
//! Handles discovery, loading and validation of beam.toml files.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::environment::Environment;
use crate::error::Remediation;
use crate::page::{Action, ActionKind, Command, ListItem, PageSource, Request};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "BEAM_CONFIG";

/// File name searched for in the current directory and its ancestors.
pub const CONFIG_FILE_NAME: &str = "beam.toml";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to read config file {0}: {1}")]
    ReadFailed(String, String),

    #[error("Failed to parse config: {0}")]
    ParseFailed(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl ConfigError {
    #[must_use]
    pub fn remediation(&self) -> Remediation {
        match self {
            Self::FileNotFound(path) => Remediation::new(format!(
                "Config file not found: {path}. Verify the path and retry."
            ))
            .command("Check path", format!("ls -l \"{path}\""))
            .alternative(format!("Unset {CONFIG_ENV_VAR} to use the default search.")),
            Self::ReadFailed(path, _) => Remediation::new(format!(
                "Failed to read config file: {path}. Check permissions."
            ))
            .command("Check permissions", format!("ls -l \"{path}\"")),
            Self::ParseFailed(_) => Remediation::new("Fix the TOML syntax of the config file."),
            Self::ValidationError(_) => {
                Remediation::new("Each [[root]] entry needs exactly one of command, path or url.")
            }
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// HTTP generator settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Terminal UI settings
    #[serde(default)]
    pub ui: UiConfig,

    /// Entries of the root list
    #[serde(default)]
    pub root: Vec<RootEntry>,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format (pretty, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Optional log file
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Shell for bare-string command lines
    #[serde(default = "default_shell")]
    pub shell: String,

    /// Title used for pages that do not set one
    #[serde(default = "default_title")]
    pub title: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            log_file: None,
            shell: default_shell(),
            title: default_title(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_shell() -> String {
    "sh".to_string()
}

fn default_title() -> String {
    "Beam".to_string()
}

/// HTTP configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HttpConfig {
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("beam/{}", env!("CARGO_PKG_VERSION"))
}

impl HttpConfig {
    /// Build the shared HTTP client.
    pub fn client(&self) -> crate::Result<reqwest::Client> {
        Ok(reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .user_agent(&self.user_agent)
            .build()?)
    }
}

/// UI configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UiConfig {
    /// Event poll interval in milliseconds
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Show item accessories in lists
    #[serde(default = "default_true")]
    pub show_accessories: bool,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            show_accessories: true,
        }
    }
}

fn default_tick_ms() -> u64 {
    50
}

fn default_true() -> bool {
    true
}

/// One entry of the root list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RootEntry {
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    /// Command line, word-split and run without a shell
    #[serde(default)]
    pub command: Option<String>,
    /// Page file
    #[serde(default)]
    pub path: Option<String>,
    /// Page endpoint
    #[serde(default)]
    pub url: Option<String>,
    /// Working directory for `command`
    #[serde(default)]
    pub dir: Option<String>,
}

impl RootEntry {
    fn source_count(&self) -> usize {
        [&self.command, &self.path, &self.url]
            .iter()
            .filter(|source| source.is_some())
            .count()
    }

    /// List item that pushes this entry's page.
    pub fn to_item(&self) -> crate::Result<ListItem> {
        let source = match (&self.command, &self.path, &self.url) {
            (Some(line), None, None) => {
                let mut command = Command::parse_line(line)?;
                command.dir.clone_from(&self.dir);
                PageSource::Command(command)
            }
            (None, Some(path), None) => PageSource::Path(path.clone()),
            (None, None, Some(url)) => PageSource::Request(Request::get(url.clone())),
            _ => {
                return Err(ConfigError::ValidationError(format!(
                    "root entry `{}` must have exactly one of command, path or url",
                    self.title
                ))
                .into());
            }
        };
        let mut item = ListItem::new(self.title.clone())
            .with_action(Action::new(ActionKind::Push { page: source }).with_title("Open"));
        item.subtitle.clone_from(&self.subtitle);
        Ok(item)
    }
}

impl Config {
    /// Parse configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(text).map_err(|err| ConfigError::ParseFailed(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound(path.display().to_string())
            } else {
                ConfigError::ReadFailed(path.display().to_string(), err.to_string())
            }
        })?;
        Self::from_toml_str(&text)
    }

    /// Locate the config file: `$BEAM_CONFIG`, then the nearest `beam.toml`
    /// in the working directory or its ancestors, then the user config
    /// directory.
    pub fn discover(env: &Environment) -> Result<Option<PathBuf>, ConfigError> {
        if let Some(explicit) = env.var(CONFIG_ENV_VAR).filter(|v| !v.is_empty()) {
            let path = PathBuf::from(explicit);
            if !path.is_file() {
                return Err(ConfigError::FileNotFound(explicit.to_string()));
            }
            return Ok(Some(path));
        }
        for dir in env.cwd().ancestors() {
            let candidate = dir.join(CONFIG_FILE_NAME);
            if candidate.is_file() {
                return Ok(Some(candidate));
            }
        }
        Ok(dirs::config_dir()
            .map(|dir| dir.join("beam").join(CONFIG_FILE_NAME))
            .filter(|path| path.is_file()))
    }

    /// Load configuration from the discovered location, or defaults when
    /// there is none.
    pub fn load(env: &Environment) -> Result<(Self, Option<PathBuf>), ConfigError> {
        match Self::discover(env)? {
            Some(path) => Ok((Self::load_from(&path)?, Some(path))),
            None => Ok((Self::default(), None)),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.general.shell.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "general.shell must not be empty".to_string(),
            ));
        }
        if self.ui.tick_ms == 0 {
            return Err(ConfigError::ValidationError(
                "ui.tick_ms must be positive".to_string(),
            ));
        }
        for entry in &self.root {
            if entry.source_count() != 1 {
                return Err(ConfigError::ValidationError(format!(
                    "root entry `{}` must have exactly one of command, path or url",
                    entry.title
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.shell, "sh");
        assert_eq!(config.http.timeout_secs, 30);
        assert_eq!(config.ui.tick_ms, 50);
        assert!(config.ui.show_accessories);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_sections_and_roots() {
        let config = Config::from_toml_str(
            r#"
            [general]
            shell = "bash"
            title = "Launcher"

            [http]
            timeout_secs = 5

            [[root]]
            title = "Files"
            command = "ls-page --all"
            dir = "~/src"

            [[root]]
            title = "Docs"
            url = "https://example.com/docs.json"
            "#,
        )
        .unwrap();
        assert_eq!(config.general.shell, "bash");
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.http.timeout_secs, 5);
        assert_eq!(config.root.len(), 2);

        let item = config.root[0].to_item().unwrap();
        assert_eq!(item.title, "Files");
        let ActionKind::Push {
            page: PageSource::Command(command),
        } = &item.actions[0].kind
        else {
            panic!("expected command push");
        };
        assert_eq!(command.dir.as_deref(), Some("~/src"));
    }

    #[test]
    fn root_entry_needs_exactly_one_source() {
        let err = Config::from_toml_str(
            r#"
            [[root]]
            title = "Both"
            path = "a.json"
            url = "https://x.test"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));

        let err = Config::from_toml_str("[[root]]\ntitle = \"None\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = Config::from_toml_str("[general\nshell=").unwrap_err();
        assert!(matches!(err, ConfigError::ParseFailed(_)));
    }

    #[test]
    fn discover_prefers_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let explicit = dir.path().join("custom.toml");
        std::fs::write(&explicit, "").unwrap();
        let env = Environment::builder()
            .var(CONFIG_ENV_VAR, explicit.display().to_string())
            .cwd(dir.path())
            .build();
        assert_eq!(Config::discover(&env).unwrap(), Some(explicit));
    }

    #[test]
    fn discover_missing_explicit_path_is_an_error() {
        let env = Environment::builder()
            .var(CONFIG_ENV_VAR, "/definitely/not/here.toml")
            .build();
        assert!(matches!(
            Config::discover(&env),
            Err(ConfigError::FileNotFound(_))
        ));
    }

    #[test]
    fn discover_walks_up_to_nearest_file() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        let file = dir.path().join("a").join(CONFIG_FILE_NAME);
        std::fs::write(&file, "[ui]\ntick_ms = 10\n").unwrap();
        let env = Environment::builder().cwd(&nested).build();
        assert_eq!(Config::discover(&env).unwrap(), Some(file.clone()));
        let (config, path) = Config::load(&env).unwrap();
        assert_eq!(config.ui.tick_ms, 10);
        assert_eq!(path, Some(file));
    }

    #[test]
    fn remediation_mentions_path() {
        let err = ConfigError::FileNotFound("/x/beam.toml".to_string());
        assert!(err.remediation().render_plain().contains("/x/beam.toml"));
    }
}
