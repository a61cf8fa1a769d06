//! Portal layout and timing configuration.

use std::time::Duration;

use crate::session::{Locator, Role};

/// Production landing page of the portal.
pub const DEFAULT_PORTAL_URL: &str = "https://www.afip.gob.ar/landing/default.asp";

/// Where things are on the portal.
///
/// The defaults match the production ARCA/AFIP UI. Every step reads its
/// locators from here, so a portal redesign is a configuration change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalLayout {
    // Landing + login
    pub login_link: Locator,
    pub user_id_input: Locator,
    pub next_button: Locator,
    pub password_input: Locator,
    pub submit_button: Locator,
    pub identity_text: Locator,

    // Navigation to certificate administration
    pub admin_link: Locator,
    pub search_box: Locator,
    pub search_query: String,
    pub fallback_link: Locator,
    pub continue_button: Locator,

    // Certificate administration form
    pub add_alias_button: Locator,
    pub alias_input: Locator,
    pub csr_file_input: Locator,
    pub alias_column: Locator,
    pub view_action_name: String,
    pub download_button: Locator,
}

impl PortalLayout {
    /// "Ver" action in the row of `alias`.
    pub fn view_action_for(&self, alias: &str) -> Locator {
        Locator::in_row(Role::Link, self.view_action_name.clone(), alias)
    }

    /// First "Ver" action on the page.
    pub fn first_view_action(&self) -> Locator {
        Locator::role(Role::Link, self.view_action_name.clone())
    }
}

impl Default for PortalLayout {
    fn default() -> Self {
        Self {
            login_link: Locator::role(Role::Link, "Iniciar sesión"),
            user_id_input: Locator::any_role(Role::Spinbutton),
            next_button: Locator::role(Role::Button, "Siguiente"),
            password_input: Locator::css("input[type=\"password\"]"),
            submit_button: Locator::role(Role::Button, "Ingresar"),
            identity_text: Locator::css("nav#cabeceraAFIPlogoNegro strong.text-primary"),

            admin_link: Locator::role(Role::Link, "Administración de Certificados Digitales"),
            search_box: Locator::role(Role::Combobox, "Buscador"),
            search_query: "certificados dig".to_string(),
            fallback_link: Locator::role(Role::Link, "Adherir Servicio"),
            continue_button: Locator::role(Role::Button, "Continuar"),

            add_alias_button: Locator::css("#cmdIngresar"),
            alias_input: Locator::css("#txtAliasCertificado"),
            csr_file_input: Locator::css("input[type=\"file\"]"),
            alias_column: Locator::css("table tr td:first-child"),
            view_action_name: "Ver".to_string(),
            download_button: Locator::role(Role::Button, "Descargar"),
        }
    }
}

/// Bounded waits of the navigation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigationTimeouts {
    /// Wait for the admin link (primary) and again for the fallback link.
    pub link_wait: Duration,
    /// Wait for the optional "Continue" modal.
    pub modal_wait: Duration,
    /// Wait for a popup after activating the link or the modal.
    pub popup_wait: Duration,
    /// Interval between condition checks.
    pub poll_interval: Duration,
}

impl Default for NavigationTimeouts {
    fn default() -> Self {
        Self {
            link_wait: Duration::from_secs(10),
            modal_wait: Duration::from_secs(5),
            popup_wait: Duration::from_secs(10),
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// Bounded waits of the authentication and enrollment steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepTimeouts {
    /// Wait for the login popup.
    pub login_popup_wait: Duration,
    /// Wait for each login field to appear.
    pub field_wait: Duration,
    /// Wait for the account identity after submitting credentials.
    pub identity_wait: Duration,
    /// Wait for the add-alias form to open.
    pub form_wait: Duration,
    /// Wait for the confirm control to become enabled after the upload.
    pub upload_wait: Duration,
    /// Wait for the alias to show up in the results table.
    pub confirmation_wait: Duration,
    /// Wait for the download to start and complete.
    pub download_wait: Duration,
    /// Fixed delay used only when a readiness signal never appears.
    pub settle_fallback: Duration,
    /// Interval between condition checks.
    pub poll_interval: Duration,
}

impl Default for StepTimeouts {
    fn default() -> Self {
        Self {
            login_popup_wait: Duration::from_secs(15),
            field_wait: Duration::from_secs(15),
            identity_wait: Duration::from_secs(20),
            form_wait: Duration::from_secs(10),
            upload_wait: Duration::from_secs(10),
            confirmation_wait: Duration::from_secs(10),
            download_wait: Duration::from_secs(30),
            settle_fallback: Duration::from_secs(2),
            poll_interval: Duration::from_millis(250),
        }
    }
}
