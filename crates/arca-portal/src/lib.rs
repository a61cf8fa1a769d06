//! ARCA portal automation.
//!
//! Drives the tax-authority web portal through a [`BrowserSession`]: login
//! ([`auth`]), navigation to certificate administration ([`navigation`]),
//! alias registration, CSR upload and certificate download
//! ([`enrollment`]). The production driver is [`chromium`]; the
//! `testing` feature adds a scripted in-memory portal.

pub mod auth;
pub mod chromium;
pub mod enrollment;
pub mod error;
pub mod layout;
pub mod navigation;
pub mod session;
pub mod wait;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use auth::{authenticate, Authenticated};
pub use chromium::{find_chrome, ChromiumLauncher, ChromiumOptions, ChromiumSession};
pub use enrollment::{download_certificate, submit_csr, Confirmation, Submission};
pub use error::BrowserError;
pub use layout::{NavigationTimeouts, PortalLayout, StepTimeouts, DEFAULT_PORTAL_URL};
pub use navigation::{reach_admin_surface, AdminRoute, AdminSurface, NavState, NavStep, NavigationMachine};
pub use session::{BrowserSession, Locator, PopupWatch, Role, SessionFactory, SurfaceId};
