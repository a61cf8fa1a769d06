//! Browser session seam.
//!
//! A [`BrowserSession`] owns one browser and every surface (page, popup) it
//! opens during a single enrollment. Steps address surfaces through
//! [`SurfaceId`] handles and never close them individually; the whole session
//! is released with [`BrowserSession::close`].

use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::BrowserError;

/// Handle to a surface owned by a session.
///
/// Surfaces are numbered in the order the session first saw them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(usize);

impl SurfaceId {
    /// Create a handle from its index.
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Index of the surface in its session.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface#{}", self.0)
    }
}

/// ARIA role used by accessible-name locators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Link,
    Button,
    Combobox,
    Spinbutton,
    Textbox,
}

/// How to find an element on a surface.
///
/// Accessible-name matches are case-insensitive substring matches on the
/// whitespace-normalized name. Lookups descend into same-origin frames.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Locator {
    /// CSS selector; the first match is used.
    Css { selector: String },

    /// Element with an ARIA role and, optionally, an accessible name.
    Role { role: Role, name: Option<String> },

    /// Role match scoped to the table row whose first cell equals `row_text`.
    RoleInRow {
        role: Role,
        name: String,
        row_text: String,
    },
}

impl Locator {
    /// CSS selector locator.
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css {
            selector: selector.into(),
        }
    }

    /// Role + accessible name locator.
    pub fn role(role: Role, name: impl Into<String>) -> Self {
        Self::Role {
            role,
            name: Some(name.into()),
        }
    }

    /// Role-only locator.
    pub fn any_role(role: Role) -> Self {
        Self::Role { role, name: None }
    }

    /// Role + name locator scoped to a table row.
    pub fn in_row(role: Role, name: impl Into<String>, row_text: impl Into<String>) -> Self {
        Self::RoleInRow {
            role,
            name: name.into(),
            row_text: row_text.into(),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css { selector } => write!(f, "css={}", selector),
            Self::Role { role, name: None } => write!(f, "role={:?}", role),
            Self::Role {
                role,
                name: Some(name),
            } => write!(f, "role={:?}[name~=\"{}\"]", role, name),
            Self::RoleInRow {
                role,
                name,
                row_text,
            } => write!(f, "row[\"{}\"] >> role={:?}[name~=\"{}\"]", row_text, role, name),
        }
    }
}

/// Marker for "surfaces that exist now", taken before an action that may
/// open a popup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopupWatch {
    opener: SurfaceId,
    baseline: usize,
}

impl PopupWatch {
    /// Create a watch over surfaces opened after `baseline` were known.
    pub fn new(opener: SurfaceId, baseline: usize) -> Self {
        Self { opener, baseline }
    }

    /// Surface whose action may open the popup.
    pub fn opener(&self) -> SurfaceId {
        self.opener
    }

    /// Number of surfaces known when the watch was armed.
    pub fn baseline(&self) -> usize {
        self.baseline
    }
}

/// One browser instance and the surfaces it owns.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Open a new top-level surface at `url`.
    async fn open(&self, url: &str) -> Result<SurfaceId, BrowserError>;

    /// Activate an element the way a user would (scrolled into view,
    /// pointer click at its center).
    async fn click(&self, surface: SurfaceId, target: &Locator) -> Result<(), BrowserError>;

    /// Activate an element programmatically, ignoring visibility and
    /// occlusion.
    async fn force_click(&self, surface: SurfaceId, target: &Locator)
        -> Result<(), BrowserError>;

    /// Replace the value of an input and fire its input/change events.
    async fn fill(
        &self,
        surface: SurfaceId,
        target: &Locator,
        value: &str,
    ) -> Result<(), BrowserError>;

    /// Attach a local file to a file-input control.
    async fn set_input_file(
        &self,
        surface: SurfaceId,
        target: &Locator,
        path: &Path,
    ) -> Result<(), BrowserError>;

    /// Whether a matching element exists and is rendered.
    async fn is_visible(&self, surface: SurfaceId, target: &Locator)
        -> Result<bool, BrowserError>;

    /// Whether a matching element exists and is not disabled.
    async fn is_enabled(&self, surface: SurfaceId, target: &Locator)
        -> Result<bool, BrowserError>;

    /// Text content of the first match, if any element matches.
    async fn text_content(
        &self,
        surface: SurfaceId,
        target: &Locator,
    ) -> Result<Option<String>, BrowserError>;

    /// Trimmed text content of every match, in document order.
    async fn all_texts(
        &self,
        surface: SurfaceId,
        target: &Locator,
    ) -> Result<Vec<String>, BrowserError>;

    /// Arm a watch for popups opened by `opener` from now on.
    async fn watch_popups(&self, opener: SurfaceId) -> Result<PopupWatch, BrowserError>;

    /// Wait up to `timeout` for a surface opened after the watch was armed.
    ///
    /// Returns `None` when nothing opened in time.
    async fn wait_for_popup(
        &self,
        watch: PopupWatch,
        timeout: Duration,
    ) -> Result<Option<SurfaceId>, BrowserError>;

    /// Activate `trigger` and capture the download it initiates.
    ///
    /// Returns `None` when no download started and completed within
    /// `timeout`.
    async fn download(
        &self,
        surface: SurfaceId,
        trigger: &Locator,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, BrowserError>;

    /// Close the browser and every surface. Safe to call more than once.
    async fn close(&self) -> Result<(), BrowserError>;
}

/// Creates one fresh session per enrollment.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open_session(&self) -> Result<Box<dyn BrowserSession>, BrowserError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_display() {
        assert_eq!(Locator::css("#cmdIngresar").to_string(), "css=#cmdIngresar");
        assert_eq!(
            Locator::role(Role::Link, "Ver").to_string(),
            "role=Link[name~=\"Ver\"]"
        );
        assert_eq!(Locator::any_role(Role::Spinbutton).to_string(), "role=Spinbutton");
    }

    #[test]
    fn test_locator_serializes_for_page_scripts() {
        let json = serde_json::to_value(Locator::in_row(Role::Link, "Ver", "CERT_1")).unwrap();
        assert_eq!(json["kind"], "role_in_row");
        assert_eq!(json["role"], "link");
        assert_eq!(json["name"], "Ver");
        assert_eq!(json["row_text"], "CERT_1");
    }
}
