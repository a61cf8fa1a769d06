//! Login step.
//!
//! Opens the login surface from the landing page, submits the CUIL and the
//! fiscal password, and reads the account name from the header of the
//! authenticated page. That header is the only signal that login worked.

use arca_core::{EnrollError, Identity};
use tracing::{info, warn};

use crate::layout::{PortalLayout, StepTimeouts};
use crate::session::{BrowserSession, SurfaceId};
use crate::wait::{poll_until, wait_visible};

/// A logged-in session position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authenticated {
    /// Account identity read from the portal.
    pub identity: Identity,

    /// Surface showing the authenticated portal.
    pub surface: SurfaceId,
}

/// Log in from `landing` and extract the account identity.
pub async fn authenticate(
    session: &dyn BrowserSession,
    landing: SurfaceId,
    user_id: &str,
    secret: &str,
    layout: &PortalLayout,
    timeouts: &StepTimeouts,
) -> Result<Authenticated, EnrollError> {
    let poll = timeouts.poll_interval;

    if !wait_visible(session, landing, &layout.login_link, timeouts.field_wait, poll).await? {
        return Err(EnrollError::Authentication(
            "login link not found on the landing page".to_string(),
        ));
    }

    let watch = session.watch_popups(landing).await?;
    session.click(landing, &layout.login_link).await?;
    let surface = match session
        .wait_for_popup(watch, timeouts.login_popup_wait)
        .await?
    {
        Some(popup) => popup,
        None => {
            warn!(surface = %landing, "Login did not open a popup, continuing on landing surface");
            landing
        }
    };
    info!(surface = %surface, "Login surface ready");

    if !wait_visible(session, surface, &layout.user_id_input, timeouts.field_wait, poll).await? {
        return Err(EnrollError::Authentication(
            "user identifier field not found".to_string(),
        ));
    }
    session.fill(surface, &layout.user_id_input, user_id).await?;
    session.click(surface, &layout.next_button).await?;

    if !wait_visible(session, surface, &layout.password_input, timeouts.field_wait, poll).await? {
        return Err(EnrollError::Authentication(
            "password field not found after submitting the user identifier".to_string(),
        ));
    }
    session.fill(surface, &layout.password_input, secret).await?;
    session.click(surface, &layout.submit_button).await?;

    let identity_text = &layout.identity_text;
    let identity = poll_until(timeouts.identity_wait, poll, move || async move {
        let text = session.text_content(surface, identity_text).await?;
        Ok(text.as_deref().and_then(Identity::from_display_name))
    })
    .await?
    .ok_or_else(|| {
        EnrollError::Authentication("could not read the account name (razón social)".to_string())
    })?;

    info!(identity = %identity, sanitized = identity.sanitized_name(), "Authenticated");
    Ok(Authenticated { identity, surface })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{PortalScript, ScriptedPortal};

    async fn run(script: PortalScript) -> (ScriptedPortal, Result<Authenticated, EnrollError>) {
        let portal = ScriptedPortal::new(script);
        let landing = portal.open("https://portal.test/").await.unwrap();
        let result = authenticate(
            &portal,
            landing,
            "20111111111",
            "secret",
            &PortalLayout::default(),
            &StepTimeouts::default(),
        )
        .await;
        (portal, result)
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_reads_identity_from_popup() {
        let (portal, result) = run(PortalScript::default()).await;
        let authenticated = result.unwrap();
        assert_eq!(authenticated.identity.sanitized_name(), "PEREZ_JUAN");
        assert_eq!(authenticated.surface, SurfaceId::new(1));
        assert!(portal.was_filled("20111111111"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_identity_fails_authentication() {
        let script = PortalScript {
            identity: None,
            ..PortalScript::default()
        };
        let (_, result) = run(script).await;
        assert!(matches!(result, Err(EnrollError::Authentication(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_identity_fails_authentication() {
        let script = PortalScript {
            identity: Some("   ".to_string()),
            ..PortalScript::default()
        };
        let (_, result) = run(script).await;
        assert!(matches!(result, Err(EnrollError::Authentication(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_without_popup_stays_on_landing() {
        let script = PortalScript {
            login_popup: false,
            ..PortalScript::default()
        };
        let (_, result) = run(script).await;
        assert_eq!(result.unwrap().surface, SurfaceId::new(0));
    }
}
