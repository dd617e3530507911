//! OS integration used by `copy` and `open` actions.

use std::path::Path;
use std::sync::{Arc, Mutex};

use url::Url;

use crate::error::{Error, Result};
use crate::location::is_qualified_url;

/// Clipboard and opener collaborators.
pub trait Platform {
    fn copy_to_clipboard(&self, text: &str) -> Result<()>;

    /// Open a URL or a local path with the user's default handler.
    fn open_target(&self, target: &str) -> Result<()>;
}

/// The real clipboard and default browser.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPlatform;

impl Platform for SystemPlatform {
    fn copy_to_clipboard(&self, text: &str) -> Result<()> {
        let mut clipboard = arboard::Clipboard::new()
            .map_err(|err| Error::Platform(format!("clipboard unavailable: {err}")))?;
        clipboard
            .set_text(text.to_string())
            .map_err(|err| Error::Platform(format!("failed to copy to clipboard: {err}")))
    }

    fn open_target(&self, target: &str) -> Result<()> {
        let url = target_url(target)?;
        webbrowser::open(&url)
            .map_err(|err| Error::Platform(format!("failed to open {target}: {err}")))
    }
}

/// URL handed to the opener: URLs as-is, local paths as `file://` URLs.
pub fn target_url(target: &str) -> Result<String> {
    if is_qualified_url(target) {
        return Ok(target.to_string());
    }
    Url::from_file_path(Path::new(target))
        .map(String::from)
        .map_err(|()| Error::Url {
            url: target.to_string(),
            reason: "not an absolute path".to_string(),
        })
}

/// A collaborator call recorded by [`RecordingPlatform`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    Copy(String),
    Open(String),
}

/// In-memory platform for tests and headless runs.
#[derive(Debug, Clone, Default)]
pub struct RecordingPlatform {
    calls: Arc<Mutex<Vec<PlatformCall>>>,
    fail: bool,
}

impl RecordingPlatform {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A platform whose every call fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            calls: Arc::default(),
            fail: true,
        }
    }

    #[must_use]
    pub fn calls(&self) -> Vec<PlatformCall> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    fn record(&self, call: PlatformCall) -> Result<()> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        if self.fail {
            Err(Error::Platform("platform unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

impl Platform for RecordingPlatform {
    fn copy_to_clipboard(&self, text: &str) -> Result<()> {
        self.record(PlatformCall::Copy(text.to_string()))
    }

    fn open_target(&self, target: &str) -> Result<()> {
        self.record(PlatformCall::Open(target.to_string()))
    }
}
