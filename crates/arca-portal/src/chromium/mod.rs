//! Chromium driver over the DevTools protocol.

mod script;
mod session;

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

pub use session::ChromiumSession;

use crate::error::BrowserError;
use crate::session::{BrowserSession, SessionFactory};

const EXECUTABLE_NAMES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
];

const WELL_KNOWN_PATHS: &[&str] = &[
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    "/run/current-system/sw/bin/google-chrome",
    "/run/current-system/sw/bin/chromium",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
];

/// Browser launch settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChromiumOptions {
    /// Run without a visible window.
    pub headless: bool,
    /// Explicit browser executable; discovered when `None`.
    pub chrome_path: Option<PathBuf>,
    /// Parent of the per-session profile and download directories.
    pub work_root: PathBuf,
    /// Pass `--no-sandbox` (needed when running as root in containers).
    pub no_sandbox: bool,
}

impl Default for ChromiumOptions {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            work_root: env::temp_dir().join("arca-browser"),
            no_sandbox: false,
        }
    }
}

/// Launches one Chromium per enrollment.
#[derive(Debug, Clone, Default)]
pub struct ChromiumLauncher {
    options: ChromiumOptions,
}

impl ChromiumLauncher {
    pub fn new(options: ChromiumOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ChromiumOptions {
        &self.options
    }
}

#[async_trait]
impl SessionFactory for ChromiumLauncher {
    async fn open_session(&self) -> Result<Box<dyn BrowserSession>, BrowserError> {
        let session = ChromiumSession::launch(&self.options).await?;
        Ok(Box::new(session))
    }
}

/// Find a Chrome/Chromium executable on `PATH` or in well-known locations.
pub fn find_chrome() -> Option<PathBuf> {
    find_chrome_in(env::var_os("PATH"))
}

fn find_chrome_in(path_var: Option<OsString>) -> Option<PathBuf> {
    if let Some(path_var) = path_var {
        for dir in env::split_paths(&path_var) {
            for name in EXECUTABLE_NAMES {
                let candidate = dir.join(name);
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }
    }

    WELL_KNOWN_PATHS
        .iter()
        .map(Path::new)
        .find(|candidate| candidate.exists())
        .map(Path::to_path_buf)
}
