//! Navigation from the authenticated portal to certificate administration.
//!
//! The portal reaches the administration form through one of several UI
//! variants: the link may be listed directly or only after a search, an
//! optional "Continue" modal may sit in front of it, and the form may open in
//! a popup or replace the current page. [`NavigationMachine`] folds those
//! variants into one state machine:
//!
//! ```text
//! Start -> LocateAdminLink --found--> ModalCheck --modal--> PopupOrSameSurfaceAfterModal --> AdminSurfaceReady
//!                 |                        |
//!              missing                  no modal
//!                 v                        v
//!           FallbackLink --found--> ModalCheck      PopupOrSameSurfaceDirect --> AdminSurfaceReady
//!                 |
//!              missing --> NavigationError
//! ```
//!
//! Every state waits at most once, for a bounded time, and has exactly one
//! fallback transition.

use std::fmt;

use arca_core::EnrollError;
use tracing::{debug, info, warn};

use crate::error::BrowserError;
use crate::layout::{NavigationTimeouts, PortalLayout};
use crate::session::{BrowserSession, Locator, PopupWatch, SurfaceId};
use crate::wait::{poll_until, wait_visible};

/// States of the navigation machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavState {
    Start,
    LocateAdminLink,
    FallbackLink,
    ModalCheck { watch: PopupWatch },
    PopupOrSameSurfaceAfterModal { watch: PopupWatch },
    PopupOrSameSurfaceDirect { watch: PopupWatch },
    AdminSurfaceReady { surface: SurfaceId, route: AdminRoute },
    NavigationError { reason: String },
}

impl NavState {
    /// Data-free tag of the state, for traces.
    pub fn kind(&self) -> NavStep {
        match self {
            Self::Start => NavStep::Start,
            Self::LocateAdminLink => NavStep::LocateAdminLink,
            Self::FallbackLink => NavStep::FallbackLink,
            Self::ModalCheck { .. } => NavStep::ModalCheck,
            Self::PopupOrSameSurfaceAfterModal { .. } => NavStep::PopupOrSameSurfaceAfterModal,
            Self::PopupOrSameSurfaceDirect { .. } => NavStep::PopupOrSameSurfaceDirect,
            Self::AdminSurfaceReady { .. } => NavStep::AdminSurfaceReady,
            Self::NavigationError { .. } => NavStep::NavigationError,
        }
    }
}

/// State tag recorded in the navigation trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NavStep {
    Start,
    LocateAdminLink,
    FallbackLink,
    ModalCheck,
    PopupOrSameSurfaceAfterModal,
    PopupOrSameSurfaceDirect,
    AdminSurfaceReady,
    NavigationError,
}

impl fmt::Display for NavStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Which UI variant led to the administration surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdminRoute {
    /// Modal confirmed, form opened in a popup.
    ModalThenPopup,
    /// Modal confirmed, form rendered on the same surface.
    ModalThenSameSurface,
    /// No modal, form opened in a popup.
    DirectPopup,
    /// No modal, form rendered on the same surface.
    DirectSameSurface,
}

impl AdminRoute {
    /// Whether the "Continue" modal was part of the route.
    pub fn via_modal(&self) -> bool {
        matches!(self, Self::ModalThenPopup | Self::ModalThenSameSurface)
    }
}

/// Successful navigation outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminSurface {
    /// Surface that shows the certificate administration form.
    pub surface: SurfaceId,

    /// Variant that was taken.
    pub route: AdminRoute,

    /// Whether the "Add service" fallback link was used.
    pub via_fallback_link: bool,

    /// States visited, in order, ending with `AdminSurfaceReady`.
    pub trail: Vec<NavStep>,
}

/// State machine that reaches the certificate administration surface.
pub struct NavigationMachine<'a> {
    session: &'a dyn BrowserSession,
    layout: &'a PortalLayout,
    timeouts: NavigationTimeouts,
    active: SurfaceId,
    via_fallback_link: bool,
    trail: Vec<NavStep>,
}

impl<'a> NavigationMachine<'a> {
    /// Create a machine starting on the authenticated surface.
    pub fn new(
        session: &'a dyn BrowserSession,
        start: SurfaceId,
        layout: &'a PortalLayout,
        timeouts: NavigationTimeouts,
    ) -> Self {
        Self {
            session,
            layout,
            timeouts,
            active: start,
            via_fallback_link: false,
            trail: Vec::new(),
        }
    }

    /// Drive the machine to a terminal state.
    pub async fn run(mut self) -> Result<AdminSurface, EnrollError> {
        let mut state = NavState::Start;
        loop {
            self.trail.push(state.kind());
            debug!(state = %state.kind(), active = %self.active, "Navigation state");

            state = match state {
                NavState::Start => NavState::LocateAdminLink,
                NavState::LocateAdminLink => self.locate_admin_link().await?,
                NavState::FallbackLink => self.fallback_link().await?,
                NavState::ModalCheck { watch } => self.modal_check(watch).await?,
                NavState::PopupOrSameSurfaceAfterModal { watch } => {
                    self.popup_or_same_surface(watch, true).await?
                }
                NavState::PopupOrSameSurfaceDirect { watch } => {
                    self.popup_or_same_surface(watch, false).await?
                }
                NavState::AdminSurfaceReady { surface, route } => {
                    info!(
                        surface = %surface,
                        route = ?route,
                        via_fallback_link = self.via_fallback_link,
                        "Certificate administration surface ready"
                    );
                    return Ok(AdminSurface {
                        surface,
                        route,
                        via_fallback_link: self.via_fallback_link,
                        trail: self.trail,
                    });
                }
                NavState::NavigationError { reason } => {
                    warn!(reason = %reason, trail = ?self.trail, "Navigation failed");
                    return Err(EnrollError::Navigation(reason));
                }
            };
        }
    }

    /// S1: find the admin link, directly or through the search box.
    async fn locate_admin_link(&mut self) -> Result<NavState, BrowserError> {
        let session = self.session;
        let layout = self.layout;
        let surface = self.active;
        let admin_link = &layout.admin_link;
        let search_box = &layout.search_box;

        let entry = poll_until(self.timeouts.link_wait, self.timeouts.poll_interval, move || async move {
            if session.is_visible(surface, admin_link).await? {
                return Ok(Some(LinkEntry::Listed));
            }
            if session.is_visible(surface, search_box).await? {
                return Ok(Some(LinkEntry::Search));
            }
            Ok(None)
        })
        .await?;

        let found = match entry {
            Some(LinkEntry::Listed) => true,
            Some(LinkEntry::Search) => {
                debug!(query = %layout.search_query, "Searching for the admin link");
                session
                    .fill(surface, search_box, &layout.search_query)
                    .await?;
                wait_visible(
                    session,
                    surface,
                    admin_link,
                    self.timeouts.link_wait,
                    self.timeouts.poll_interval,
                )
                .await?
            }
            None => false,
        };

        if !found {
            warn!(locator = %admin_link, "Admin link not found, trying the fallback link");
            return Ok(NavState::FallbackLink);
        }

        let watch = self.activate(admin_link).await?;
        Ok(NavState::ModalCheck { watch })
    }

    /// Fallback of S1: the "Add service" link.
    async fn fallback_link(&mut self) -> Result<NavState, BrowserError> {
        let layout = self.layout;
        let fallback = &layout.fallback_link;
        let found = wait_visible(
            self.session,
            self.active,
            fallback,
            self.timeouts.link_wait,
            self.timeouts.poll_interval,
        )
        .await?;

        if !found {
            return Ok(NavState::NavigationError {
                reason: format!(
                    "certificate administration unreachable: neither {} nor {} was found",
                    layout.admin_link, fallback
                ),
            });
        }

        self.via_fallback_link = true;
        let watch = self.activate(fallback).await?;
        Ok(NavState::ModalCheck { watch })
    }

    /// S2: optional "Continue" modal, possibly inside a frame.
    async fn modal_check(&mut self, watch: PopupWatch) -> Result<NavState, BrowserError> {
        let layout = self.layout;
        let continue_button = &layout.continue_button;
        let present = wait_visible(
            self.session,
            self.active,
            continue_button,
            self.timeouts.modal_wait,
            self.timeouts.poll_interval,
        )
        .await?;

        if !present {
            debug!("No confirmation modal");
            return Ok(NavState::PopupOrSameSurfaceDirect { watch });
        }

        // The modal renders partially covered, so a pointer click can land
        // on the overlay instead of the button.
        info!("Confirmation modal present, forcing continue");
        self.session
            .force_click(self.active, continue_button)
            .await?;
        Ok(NavState::PopupOrSameSurfaceAfterModal { watch })
    }

    /// S3/S4: adopt a new popup, or keep the active surface.
    async fn popup_or_same_surface(
        &mut self,
        watch: PopupWatch,
        after_modal: bool,
    ) -> Result<NavState, BrowserError> {
        let popup = self
            .session
            .wait_for_popup(watch, self.timeouts.popup_wait)
            .await?;

        let route = match (popup, after_modal) {
            (Some(surface), true) => {
                self.active = surface;
                AdminRoute::ModalThenPopup
            }
            (Some(surface), false) => {
                self.active = surface;
                AdminRoute::DirectPopup
            }
            (None, true) => AdminRoute::ModalThenSameSurface,
            (None, false) => AdminRoute::DirectSameSurface,
        };

        if popup.is_none() {
            debug!(surface = %self.active, "No popup opened, reusing the active surface");
        }

        Ok(NavState::AdminSurfaceReady {
            surface: self.active,
            route,
        })
    }

    /// Click a link with a popup watch armed beforehand.
    async fn activate(
        &mut self,
        link: &Locator,
    ) -> Result<PopupWatch, BrowserError> {
        let watch = self.session.watch_popups(self.active).await?;
        self.session.click(self.active, link).await?;
        info!(locator = %link, surface = %self.active, "Activated link");
        Ok(watch)
    }
}

#[derive(Debug, Clone, Copy)]
enum LinkEntry {
    Listed,
    Search,
}

/// Reach the certificate administration surface from `start`.
pub async fn reach_admin_surface(
    session: &dyn BrowserSession,
    start: SurfaceId,
    layout: &PortalLayout,
    timeouts: NavigationTimeouts,
) -> Result<AdminSurface, EnrollError> {
    NavigationMachine::new(session, start, layout, timeouts)
        .run()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::auth::authenticate;
    use crate::layout::StepTimeouts;
    use crate::testing::{AdminLinkVariant, PortalScript, ScriptedPortal};

    async fn navigate(script: PortalScript) -> (ScriptedPortal, SurfaceId, Result<AdminSurface, EnrollError>) {
        let portal = ScriptedPortal::new(script);
        let layout = PortalLayout::default();
        let landing = portal.open("https://portal.test/").await.unwrap();
        let authenticated = authenticate(
            &portal,
            landing,
            "20111111111",
            "secret",
            &layout,
            &StepTimeouts::default(),
        )
        .await
        .unwrap();

        let result = reach_admin_surface(
            &portal,
            authenticated.surface,
            &layout,
            NavigationTimeouts::default(),
        )
        .await;
        (portal, authenticated.surface, result)
    }

    fn took_exactly_one_branch(trail: &[NavStep]) -> bool {
        let after_modal = trail.contains(&NavStep::PopupOrSameSurfaceAfterModal);
        let direct = trail.contains(&NavStep::PopupOrSameSurfaceDirect);
        after_modal != direct
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_then_direct_popup() {
        let (_, start, result) = navigate(PortalScript::default()).await;
        let admin = result.unwrap();
        assert_eq!(admin.route, AdminRoute::DirectPopup);
        assert_ne!(admin.surface, start);
        assert!(!admin.via_fallback_link);
        assert!(took_exactly_one_branch(&admin.trail));
        assert_eq!(
            admin.trail,
            vec![
                NavStep::Start,
                NavStep::LocateAdminLink,
                NavStep::ModalCheck,
                NavStep::PopupOrSameSurfaceDirect,
                NavStep::AdminSurfaceReady,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_modal_then_popup() {
        let script = PortalScript {
            modal: true,
            ..PortalScript::default()
        };
        let (portal, start, result) = navigate(script).await;
        let admin = result.unwrap();
        assert_eq!(admin.route, AdminRoute::ModalThenPopup);
        assert_ne!(admin.surface, start);
        assert!(took_exactly_one_branch(&admin.trail));
        assert!(portal.actions().iter().any(|a| a.starts_with("force_click")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_modal_then_same_surface() {
        let script = PortalScript {
            modal: true,
            admin_popup: false,
            ..PortalScript::default()
        };
        let (_, start, result) = navigate(script).await;
        let admin = result.unwrap();
        assert_eq!(admin.route, AdminRoute::ModalThenSameSurface);
        assert_eq!(admin.surface, start);
        assert!(took_exactly_one_branch(&admin.trail));
    }

    #[tokio::test(start_paused = true)]
    async fn test_direct_same_surface() {
        let script = PortalScript {
            admin_popup: false,
            ..PortalScript::default()
        };
        let (_, start, result) = navigate(script).await;
        let admin = result.unwrap();
        assert_eq!(admin.route, AdminRoute::DirectSameSurface);
        assert_eq!(admin.surface, start);
        assert!(!admin.route.via_modal());
    }

    #[tokio::test(start_paused = true)]
    async fn test_listed_link_skips_search() {
        let script = PortalScript {
            admin_link: AdminLinkVariant::Listed,
            ..PortalScript::default()
        };
        let (portal, _, result) = navigate(script).await;
        assert_eq!(result.unwrap().route, AdminRoute::DirectPopup);
        assert!(!portal.was_filled("certificados dig"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_link() {
        let script = PortalScript {
            admin_link: AdminLinkVariant::FallbackOnly,
            ..PortalScript::default()
        };
        let (_, _, result) = navigate(script).await;
        let admin = result.unwrap();
        assert!(admin.via_fallback_link);
        assert!(admin.trail.contains(&NavStep::FallbackLink));
        assert!(took_exactly_one_branch(&admin.trail));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_links_fail_within_bounded_waits() {
        let script = PortalScript {
            admin_link: AdminLinkVariant::Missing,
            ..PortalScript::default()
        };
        let started = tokio::time::Instant::now();
        let (_, _, result) = navigate(script).await;
        assert!(matches!(result, Err(EnrollError::Navigation(_))));

        // Search-box wait for the link, then one fallback wait.
        let timeouts = NavigationTimeouts::default();
        let budget = timeouts.link_wait * 3 + Duration::from_secs(1);
        assert!(started.elapsed() <= budget);
    }
}
