//! Server configuration.

use std::path::PathBuf;
use std::time::Duration;

use arca_portal::{ChromiumOptions, DEFAULT_PORTAL_URL};

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// HTTP server bind address.
    pub bind_addr: String,

    /// Directory all artifacts are written to.
    pub work_dir: PathBuf,

    /// Landing page the browser opens first.
    pub portal_url: String,

    /// Run the browser without a window.
    pub headless: bool,

    /// Explicit Chrome/Chromium executable.
    pub chrome_path: Option<PathBuf>,

    /// Launch the browser with `--no-sandbox`.
    pub no_sandbox: bool,

    /// `openssl` executable.
    pub openssl_path: String,

    /// Timeout for each `openssl` invocation (seconds).
    pub tool_timeout_secs: u64,

    /// Maximum number of enrollments (browser sessions) in flight.
    pub max_concurrent_enrollments: usize,
}

impl Config {
    /// Timeout for each `openssl` invocation.
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    /// Browser launch options derived from this configuration.
    ///
    /// Per-session profiles and downloads go under `<work_dir>/.browser`.
    pub fn browser_options(&self) -> ChromiumOptions {
        ChromiumOptions {
            headless: self.headless,
            chrome_path: self.chrome_path.clone(),
            work_root: self.work_dir.join(".browser"),
            no_sandbox: self.no_sandbox,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            work_dir: PathBuf::from("csrs"),
            portal_url: DEFAULT_PORTAL_URL.to_string(),
            headless: true,
            chrome_path: None,
            no_sandbox: false,
            openssl_path: "openssl".to_string(),
            tool_timeout_secs: 60,
            max_concurrent_enrollments: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.work_dir, PathBuf::from("csrs"));
        assert_eq!(config.tool_timeout(), Duration::from_secs(60));
        assert_eq!(config.max_concurrent_enrollments, 2);
    }

    #[test]
    fn test_browser_work_root_is_inside_work_dir() {
        let config = Config {
            work_dir: PathBuf::from("/srv/arca"),
            ..Config::default()
        };
        let options = config.browser_options();
        assert_eq!(options.work_root, PathBuf::from("/srv/arca/.browser"));
        assert!(options.headless);
    }
}
