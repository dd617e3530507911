//! Error types for beam-core

use std::fmt::Write;
use std::path::PathBuf;

use thiserror::Error;

/// Actionable remediation guidance for an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remediation {
    /// One-line summary of how to fix the issue
    pub summary: String,
    /// Suggested commands to resolve or diagnose the issue
    pub commands: Vec<(String, String)>,
    /// Additional alternative guidance
    pub alternatives: Vec<String>,
}

impl Remediation {
    /// Create a new remediation with a summary
    #[must_use]
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            commands: Vec::new(),
            alternatives: Vec::new(),
        }
    }

    /// Add a labelled command
    #[must_use]
    pub fn command(mut self, label: impl Into<String>, command: impl Into<String>) -> Self {
        self.commands.push((label.into(), command.into()));
        self
    }

    /// Add an alternative suggestion
    #[must_use]
    pub fn alternative(mut self, alternative: impl Into<String>) -> Self {
        self.alternatives.push(alternative.into());
        self
    }

    /// Render remediation text for human-readable output
    #[must_use]
    pub fn render_plain(&self) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "To fix:");
        let _ = writeln!(output, "  {}", self.summary);

        if !self.commands.is_empty() {
            let _ = writeln!(output, "  Commands:");
            for (label, command) in &self.commands {
                let _ = writeln!(output, "    - {label}: {command}");
            }
        }

        if !self.alternatives.is_empty() {
            let _ = writeln!(output, "  Alternatives:");
            for alt in &self.alternatives {
                let _ = writeln!(output, "    - {alt}");
            }
        }

        output
    }
}

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification used by the error overlay and by callers that need
/// to tell a failing producer apart from a malformed page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The producer failed: non-zero exit, HTTP status, unreadable file.
    Generator,
    /// The output is not JSON/YAML or fails schema validation.
    Decode,
    /// The page decodes but is internally inconsistent.
    Structural,
    /// An action cannot run against the current base location.
    Precondition,
    /// Configuration, logging or terminal failures outside a frame.
    Environment,
}

/// Main error type for beam-core
#[derive(Error, Debug)]
pub enum Error {
    /// Process exited with a non-zero status
    #[error("command exited with code {code}: {stderr}")]
    CommandFailed { code: i32, stderr: String },

    /// Process could not be started
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Command descriptor is empty or cannot be word-split
    #[error("invalid command line: {0}")]
    CommandLine(String),

    /// HTTP transport failure
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx HTTP response
    #[error("unexpected response status: {0}")]
    HttpStatus(String),

    /// File could not be read
    #[error("failed to read {}: {source}", path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Page file with an extension other than json/yaml/yml
    #[error("unsupported file type: {}", .0.display())]
    UnsupportedFileType(PathBuf),

    /// Output is not valid JSON
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Output is not valid YAML
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Output does not match the page schema
    #[error("invalid page: {0}")]
    Validation(#[from] crate::validate::ValidationError),

    /// Page violates a structural invariant
    #[error("invalid page: {0}")]
    Structural(String),

    /// Action cannot run against the current base location
    #[error("{0}")]
    Precondition(String),

    /// URL could not be parsed or resolved
    #[error("invalid url `{url}`: {reason}")]
    Url { url: String, reason: String },

    /// Clipboard or opener collaborator failure
    #[error("{0}")]
    Platform(String),

    /// Configuration errors
    #[error("config error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CommandFailed { .. }
            | Self::Spawn { .. }
            | Self::CommandLine(_)
            | Self::Http(_)
            | Self::HttpStatus(_)
            | Self::ReadFile { .. }
            | Self::UnsupportedFileType(_) => ErrorKind::Generator,
            Self::Json(_) | Self::Yaml(_) | Self::Validation(_) => ErrorKind::Decode,
            Self::Structural(_) => ErrorKind::Structural,
            Self::Precondition(_) | Self::Url { .. } => ErrorKind::Precondition,
            Self::Platform(_) | Self::Config(_) | Self::Io(_) => ErrorKind::Environment,
        }
    }

    /// Return remediation guidance when available.
    #[must_use]
    pub fn remediation(&self) -> Option<Remediation> {
        match self {
            Self::Spawn { program, source }
                if source.kind() == std::io::ErrorKind::PermissionDenied =>
            {
                Some(
                    Remediation::new(format!("`{program}` is not executable."))
                        .command("Make executable", format!("chmod +x {program}")),
                )
            }
            Self::Spawn { program, source } if source.kind() == std::io::ErrorKind::NotFound => {
                Some(
                    Remediation::new(format!("`{program}` was not found."))
                        .alternative("Check that the program is installed and on PATH.")
                        .alternative("Use an absolute path or a path relative to the page."),
                )
            }
            Self::UnsupportedFileType(_) => Some(
                Remediation::new("Page files must end in .json, .yaml or .yml.")
                    .command("Validate a page", "beam validate <file>"),
            ),
            Self::Json(_) | Self::Validation(_) => Some(
                Remediation::new("The producer emitted output that is not a valid page.")
                    .command("Validate output", "<command> | beam validate")
                    .alternative("Make sure nothing else is printed to stdout."),
            ),
            Self::Yaml(_) => Some(Remediation::new("Check the YAML syntax of the page file.")),
            Self::Precondition(_) => Some(
                Remediation::new("Processes and files can only be used from local pages.")
                    .alternative("Use a fetch action to load remote pages."),
            ),
            Self::Config(err) => Some(err.remediation()),
            _ => None,
        }
    }

    /// Message shown in the error overlay: the error itself followed by any
    /// remediation guidance.
    #[must_use]
    pub fn render_plain(&self) -> String {
        match self.remediation() {
            Some(remediation) => format!("{self}\n\n{}", remediation.render_plain()),
            None => self.to_string(),
        }
    }
}
