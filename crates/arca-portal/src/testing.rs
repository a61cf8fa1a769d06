//! Scripted in-memory portal.
//!
//! [`ScriptedPortal`] implements [`BrowserSession`] over a small state model
//! of the portal, keyed by the locators of [`PortalLayout::default`]. A
//! [`PortalScript`] picks the UI variant to simulate: login popup or not,
//! listed or searched admin link, optional modal, popup or same-surface admin
//! form, and what the download yields.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::BrowserError;
use crate::layout::PortalLayout;
use crate::session::{BrowserSession, Locator, PopupWatch, SessionFactory, SurfaceId};

/// How the admin link is exposed after login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminLinkVariant {
    /// Listed on the home page.
    Listed,
    /// Only shown after querying the search box.
    BehindSearch,
    /// Absent; only the "Add service" link exists.
    FallbackOnly,
    /// Neither link exists.
    Missing,
}

/// What the download control yields.
#[derive(Clone)]
pub enum CertificateSource {
    /// Fixed bytes.
    Bytes(Vec<u8>),
    /// Bytes derived from the uploaded CSR file.
    FromCsr(Arc<dyn Fn(&Path) -> Option<Vec<u8>> + Send + Sync>),
    /// No download ever starts.
    Never,
}

impl fmt::Debug for CertificateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::FromCsr(_) => f.write_str("FromCsr(..)"),
            Self::Never => f.write_str("Never"),
        }
    }
}

/// Behavior of a scripted portal.
#[derive(Debug, Clone)]
pub struct PortalScript {
    /// Account name shown after login; `None` never shows one.
    pub identity: Option<String>,
    /// Whether the login link opens a popup.
    pub login_popup: bool,
    pub admin_link: AdminLinkVariant,
    /// Whether a "Continue" modal appears after the admin link.
    pub modal: bool,
    /// Whether the admin form opens in a popup.
    pub admin_popup: bool,
    /// Whether confirming the form registers the alias.
    pub accept_csr: bool,
    /// Aliases already in the table.
    pub existing_aliases: Vec<String>,
    /// Whether new aliases are inserted at the top of the table.
    pub newest_first: bool,
    pub certificate: CertificateSource,
    /// Fail `open` with a launch error.
    pub fail_open: bool,
}

impl Default for PortalScript {
    fn default() -> Self {
        Self {
            identity: Some("PEREZ JUAN".to_string()),
            login_popup: true,
            admin_link: AdminLinkVariant::BehindSearch,
            modal: false,
            admin_popup: true,
            accept_csr: true,
            existing_aliases: Vec::new(),
            newest_first: false,
            certificate: CertificateSource::Bytes(b"-----BEGIN CERTIFICATE-----\n".to_vec()),
            fail_open: false,
        }
    }
}

#[derive(Debug, Default)]
struct PortalState {
    surfaces: usize,
    login_surface: Option<SurfaceId>,
    user_id_entered: bool,
    logged_in: bool,
    searched: bool,
    link_activated: bool,
    modal_open: bool,
    admin_surface: Option<SurfaceId>,
    form_open: bool,
    alias_value: Option<String>,
    uploaded: Option<PathBuf>,
    aliases: Vec<String>,
    opened_row: Option<String>,
    fills: Vec<String>,
    actions: Vec<String>,
    closed: bool,
}

impl PortalState {
    fn push_surface(&mut self) -> SurfaceId {
        let id = SurfaceId::new(self.surfaces);
        self.surfaces += 1;
        id
    }

    fn on_login(&self, surface: SurfaceId) -> bool {
        self.login_surface == Some(surface)
    }

    fn on_home(&self, surface: SurfaceId) -> bool {
        self.logged_in && self.on_login(surface)
    }

    fn on_admin(&self, surface: SurfaceId) -> bool {
        self.admin_surface == Some(surface)
    }

    fn ready_to_confirm(&self) -> bool {
        self.alias_value.is_some() && self.uploaded.is_some()
    }
}

/// In-memory [`BrowserSession`] driven by a [`PortalScript`].
///
/// Clones share state, so a test can keep a handle to a portal that was
/// handed to the code under test.
#[derive(Debug, Clone)]
pub struct ScriptedPortal {
    script: Arc<PortalScript>,
    layout: Arc<PortalLayout>,
    state: Arc<Mutex<PortalState>>,
}

impl ScriptedPortal {
    pub fn new(script: PortalScript) -> Self {
        let state = PortalState {
            aliases: script.existing_aliases.clone(),
            ..PortalState::default()
        };
        Self {
            script: Arc::new(script),
            layout: Arc::new(PortalLayout::default()),
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Whether any field was filled with `value`.
    pub fn was_filled(&self, value: &str) -> bool {
        self.lock().fills.iter().any(|v| v == value)
    }

    /// Actions in order, as `"<verb> <locator>"`.
    pub fn actions(&self) -> Vec<String> {
        self.lock().actions.clone()
    }

    /// Aliases in table order.
    pub fn registered_aliases(&self) -> Vec<String> {
        self.lock().aliases.clone()
    }

    /// File attached to the CSR input.
    pub fn uploaded_file(&self) -> Option<PathBuf> {
        self.lock().uploaded.clone()
    }

    /// Alias of the row whose view action was clicked.
    pub fn opened_row(&self) -> Option<String> {
        self.lock().opened_row.clone()
    }

    /// Whether `close` was called.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, PortalState> {
        // A poisoned lock only means another test thread panicked.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn live(&self) -> Result<MutexGuard<'_, PortalState>, BrowserError> {
        let state = self.lock();
        if state.closed {
            return Err(BrowserError::Closed);
        }
        Ok(state)
    }

    fn check_surface(state: &PortalState, surface: SurfaceId) -> Result<(), BrowserError> {
        if surface.index() < state.surfaces {
            Ok(())
        } else {
            Err(BrowserError::UnknownSurface(surface.to_string()))
        }
    }

    fn visible(&self, state: &PortalState, surface: SurfaceId, target: &Locator) -> bool {
        let layout = &*self.layout;
        let script = &*self.script;

        if *target == layout.login_link {
            return surface == SurfaceId::new(0) && state.login_surface.is_none();
        }
        if *target == layout.user_id_input || *target == layout.next_button {
            return state.on_login(surface) && !state.logged_in;
        }
        if *target == layout.password_input || *target == layout.submit_button {
            return state.on_login(surface) && state.user_id_entered && !state.logged_in;
        }
        if *target == layout.identity_text {
            return state.on_home(surface) && script.identity.is_some();
        }
        if *target == layout.search_box {
            return state.on_home(surface) && !state.link_activated;
        }
        if *target == layout.admin_link {
            let listed = match script.admin_link {
                AdminLinkVariant::Listed => true,
                AdminLinkVariant::BehindSearch => state.searched,
                AdminLinkVariant::FallbackOnly | AdminLinkVariant::Missing => false,
            };
            return state.on_home(surface) && !state.link_activated && listed;
        }
        if *target == layout.fallback_link {
            return state.on_home(surface)
                && !state.link_activated
                && script.admin_link == AdminLinkVariant::FallbackOnly;
        }
        if *target == layout.continue_button {
            return state.on_home(surface) && state.modal_open;
        }
        if *target == layout.add_alias_button {
            return state.on_admin(surface);
        }
        if *target == layout.alias_input || *target == layout.csr_file_input {
            return state.on_admin(surface) && state.form_open;
        }
        if *target == layout.download_button {
            return state.on_admin(surface) && state.opened_row.is_some();
        }
        if *target == layout.first_view_action() {
            return state.on_admin(surface) && !state.aliases.is_empty();
        }
        if let Locator::RoleInRow { row_text, .. } = target {
            return state.on_admin(surface) && state.aliases.iter().any(|a| a == row_text);
        }
        false
    }

    fn open_admin(&self, state: &mut PortalState) {
        let surface = if self.script.admin_popup {
            state.push_surface()
        } else {
            state.login_surface.unwrap_or(SurfaceId::new(0))
        };
        state.admin_surface = Some(surface);
    }

    fn activate(
        &self,
        state: &mut PortalState,
        surface: SurfaceId,
        target: &Locator,
    ) -> Result<(), BrowserError> {
        if !self.visible(state, surface, target) {
            return Err(BrowserError::ElementNotFound(target.to_string()));
        }
        let layout = &*self.layout;

        if *target == layout.login_link {
            let login = if self.script.login_popup {
                state.push_surface()
            } else {
                surface
            };
            state.login_surface = Some(login);
        } else if *target == layout.next_button {
            state.user_id_entered = true;
        } else if *target == layout.submit_button {
            state.logged_in = true;
        } else if *target == layout.admin_link || *target == layout.fallback_link {
            state.link_activated = true;
            if self.script.modal {
                state.modal_open = true;
            } else {
                self.open_admin(state);
            }
        } else if *target == layout.continue_button {
            state.modal_open = false;
            self.open_admin(state);
        } else if *target == layout.add_alias_button {
            if !state.form_open {
                state.form_open = true;
            } else if state.ready_to_confirm() {
                if self.script.accept_csr {
                    if let Some(alias) = state.alias_value.clone() {
                        if self.script.newest_first {
                            state.aliases.insert(0, alias);
                        } else {
                            state.aliases.push(alias);
                        }
                    }
                }
                state.form_open = false;
            }
        } else if let Locator::RoleInRow { row_text, .. } = target {
            state.opened_row = Some(row_text.clone());
        } else if *target == layout.first_view_action() {
            state.opened_row = state.aliases.first().cloned();
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserSession for ScriptedPortal {
    async fn open(&self, url: &str) -> Result<SurfaceId, BrowserError> {
        if self.script.fail_open {
            return Err(BrowserError::Launch(format!("scripted failure opening {}", url)));
        }
        let mut state = self.live()?;
        state.actions.push(format!("open {}", url));
        Ok(state.push_surface())
    }

    async fn click(&self, surface: SurfaceId, target: &Locator) -> Result<(), BrowserError> {
        let mut state = self.live()?;
        Self::check_surface(&state, surface)?;
        state.actions.push(format!("click {}", target));
        self.activate(&mut state, surface, target)
    }

    async fn force_click(&self, surface: SurfaceId, target: &Locator) -> Result<(), BrowserError> {
        let mut state = self.live()?;
        Self::check_surface(&state, surface)?;
        state.actions.push(format!("force_click {}", target));
        self.activate(&mut state, surface, target)
    }

    async fn fill(
        &self,
        surface: SurfaceId,
        target: &Locator,
        value: &str,
    ) -> Result<(), BrowserError> {
        let mut state = self.live()?;
        Self::check_surface(&state, surface)?;
        if !self.visible(&state, surface, target) {
            return Err(BrowserError::ElementNotFound(target.to_string()));
        }
        state.actions.push(format!("fill {}", target));
        state.fills.push(value.to_string());

        if *target == self.layout.search_box && value == self.layout.search_query {
            state.searched = true;
        } else if *target == self.layout.alias_input {
            state.alias_value = Some(value.to_string());
        }
        Ok(())
    }

    async fn set_input_file(
        &self,
        surface: SurfaceId,
        target: &Locator,
        path: &Path,
    ) -> Result<(), BrowserError> {
        let mut state = self.live()?;
        Self::check_surface(&state, surface)?;
        if !self.visible(&state, surface, target) {
            return Err(BrowserError::ElementNotFound(target.to_string()));
        }
        if !path.is_file() {
            return Err(BrowserError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} does not exist", path.display()),
            )));
        }
        state.actions.push(format!("upload {}", target));
        state.uploaded = Some(path.to_path_buf());
        Ok(())
    }

    async fn is_visible(&self, surface: SurfaceId, target: &Locator) -> Result<bool, BrowserError> {
        let state = self.live()?;
        Self::check_surface(&state, surface)?;
        Ok(self.visible(&state, surface, target))
    }

    async fn is_enabled(&self, surface: SurfaceId, target: &Locator) -> Result<bool, BrowserError> {
        let state = self.live()?;
        Self::check_surface(&state, surface)?;
        if !self.visible(&state, surface, target) {
            return Ok(false);
        }
        if *target == self.layout.add_alias_button && state.form_open {
            return Ok(state.ready_to_confirm());
        }
        Ok(true)
    }

    async fn text_content(
        &self,
        surface: SurfaceId,
        target: &Locator,
    ) -> Result<Option<String>, BrowserError> {
        let state = self.live()?;
        Self::check_surface(&state, surface)?;
        if *target == self.layout.identity_text && state.on_home(surface) {
            return Ok(self.script.identity.clone());
        }
        Ok(None)
    }

    async fn all_texts(
        &self,
        surface: SurfaceId,
        target: &Locator,
    ) -> Result<Vec<String>, BrowserError> {
        let state = self.live()?;
        Self::check_surface(&state, surface)?;
        if *target == self.layout.alias_column && state.on_admin(surface) {
            return Ok(state.aliases.clone());
        }
        Ok(Vec::new())
    }

    async fn watch_popups(&self, opener: SurfaceId) -> Result<PopupWatch, BrowserError> {
        let state = self.live()?;
        Self::check_surface(&state, opener)?;
        Ok(PopupWatch::new(opener, state.surfaces))
    }

    async fn wait_for_popup(
        &self,
        watch: PopupWatch,
        timeout: Duration,
    ) -> Result<Option<SurfaceId>, BrowserError> {
        {
            let state = self.live()?;
            if state.surfaces > watch.baseline() {
                return Ok(Some(SurfaceId::new(watch.baseline())));
            }
        }
        tokio::time::sleep(timeout).await;
        Ok(None)
    }

    async fn download(
        &self,
        surface: SurfaceId,
        trigger: &Locator,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, BrowserError> {
        let bytes = {
            let mut state = self.live()?;
            Self::check_surface(&state, surface)?;
            if !self.visible(&state, surface, trigger) {
                return Err(BrowserError::ElementNotFound(trigger.to_string()));
            }
            state.actions.push(format!("download {}", trigger));
            match &self.script.certificate {
                CertificateSource::Bytes(bytes) => Some(bytes.clone()),
                CertificateSource::FromCsr(sign) => state.uploaded.as_deref().and_then(|p| sign(p)),
                CertificateSource::Never => None,
            }
        };
        if bytes.is_none() {
            tokio::time::sleep(timeout).await;
        }
        Ok(bytes)
    }

    async fn close(&self) -> Result<(), BrowserError> {
        let mut state = self.lock();
        if !state.closed {
            state.actions.push("close".to_string());
            state.closed = true;
        }
        Ok(())
    }
}

/// [`SessionFactory`] handing out a fresh [`ScriptedPortal`] per session.
#[derive(Debug, Default)]
pub struct ScriptedFactory {
    script: PortalScript,
    sessions: Mutex<Vec<ScriptedPortal>>,
}

impl ScriptedFactory {
    pub fn new(script: PortalScript) -> Self {
        Self {
            script,
            sessions: Mutex::new(Vec::new()),
        }
    }

    /// Every portal handed out so far.
    pub fn sessions(&self) -> Vec<ScriptedPortal> {
        match self.sessions.lock() {
            Ok(sessions) => sessions.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl SessionFactory for ScriptedFactory {
    async fn open_session(&self) -> Result<Box<dyn BrowserSession>, BrowserError> {
        let portal = ScriptedPortal::new(self.script.clone());
        match self.sessions.lock() {
            Ok(mut sessions) => sessions.push(portal.clone()),
            Err(poisoned) => poisoned.into_inner().push(portal.clone()),
        }
        Ok(Box::new(portal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_closed_portal_rejects_actions() {
        let portal = ScriptedPortal::new(PortalScript::default());
        let landing = portal.open("https://portal.test/").await.unwrap();
        portal.close().await.unwrap();
        portal.close().await.unwrap();

        assert!(portal.is_closed());
        let result = portal.is_visible(landing, &PortalLayout::default().login_link).await;
        assert!(matches!(result, Err(BrowserError::Closed)));
    }

    #[tokio::test]
    async fn test_unknown_surface() {
        let portal = ScriptedPortal::new(PortalScript::default());
        portal.open("https://portal.test/").await.unwrap();
        let result = portal
            .is_visible(SurfaceId::new(7), &PortalLayout::default().login_link)
            .await;
        assert!(matches!(result, Err(BrowserError::UnknownSurface(_))));
    }

    #[tokio::test]
    async fn test_factory_tracks_sessions() {
        let factory = ScriptedFactory::new(PortalScript::default());
        let session = factory.open_session().await.unwrap();
        session.close().await.unwrap();
        let sessions = factory.sessions();
        assert_eq!(sessions.len(), 1);
        assert!(sessions[0].is_closed());
    }
}
