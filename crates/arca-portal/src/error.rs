//! Browser driver errors.

use arca_core::EnrollError;
use thiserror::Error;

/// Errors raised by a browser session.
///
/// These are driver-level failures. Workflow failures (no identity, no admin
/// surface, no download) are reported by the steps as [`EnrollError`].
#[derive(Debug, Error)]
pub enum BrowserError {
    /// Chrome/Chromium could not be found or started.
    #[error("failed to launch browser: {0}")]
    Launch(String),

    /// A DevTools protocol command failed.
    #[error("browser protocol error: {0}")]
    Protocol(String),

    /// No element matched a locator that an action required.
    #[error("element not found: {0}")]
    ElementNotFound(String),

    /// A surface handle does not belong to this session.
    #[error("unknown surface: {0}")]
    UnknownSurface(String),

    /// The session was already closed.
    #[error("browser session is closed")]
    Closed,

    /// Local file error (uploads, downloads).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<chromiumoxide::error::CdpError> for BrowserError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        BrowserError::Protocol(err.to_string())
    }
}

impl From<BrowserError> for EnrollError {
    fn from(err: BrowserError) -> Self {
        EnrollError::Browser(err.to_string())
    }
}
