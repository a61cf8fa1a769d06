//! Alias registration, CSR upload and certificate download.

use std::path::Path;

use arca_core::{Alias, EnrollError, Identity};
use tracing::{debug, info, warn};

use crate::layout::{PortalLayout, StepTimeouts};
use crate::session::{BrowserSession, SurfaceId};
use crate::wait::{poll_until, wait_enabled, wait_visible};

/// How the new alias was confirmed in the results table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    /// A row carrying the submitted alias was found.
    Keyed,

    /// The alias never appeared; the last row is reported instead.
    ///
    /// This assumes the portal appends new aliases at the end of the table,
    /// which is not guaranteed.
    LastRow(String),

    /// The table had no rows at all.
    Unconfirmed,
}

impl Confirmation {
    /// Whether the alias itself was seen in the table.
    pub fn is_keyed(&self) -> bool {
        matches!(self, Self::Keyed)
    }
}

/// Outcome of submitting a CSR under a new alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub alias: Alias,
    pub confirmation: Confirmation,
}

/// Register a new alias on the admin surface and upload `csr_path` under it.
pub async fn submit_csr(
    session: &dyn BrowserSession,
    surface: SurfaceId,
    identity: &Identity,
    csr_path: &Path,
    layout: &PortalLayout,
    timeouts: &StepTimeouts,
) -> Result<Submission, EnrollError> {
    let poll = timeouts.poll_interval;
    let alias = Alias::now(identity);

    session.click(surface, &layout.add_alias_button).await?;
    if !wait_visible(session, surface, &layout.alias_input, timeouts.form_wait, poll).await? {
        warn!(
            locator = %layout.alias_input,
            delay_ms = timeouts.settle_fallback.as_millis() as u64,
            "Alias form not visible, falling back to a fixed delay"
        );
        tokio::time::sleep(timeouts.settle_fallback).await;
    }

    session
        .fill(surface, &layout.alias_input, alias.as_str())
        .await?;
    session
        .set_input_file(surface, &layout.csr_file_input, csr_path)
        .await?;
    debug!(alias = %alias, csr = %csr_path.display(), "Alias and CSR entered");

    if !wait_enabled(session, surface, &layout.add_alias_button, timeouts.upload_wait, poll).await? {
        warn!(
            delay_ms = timeouts.settle_fallback.as_millis() as u64,
            "Confirm control not enabled, falling back to a fixed delay"
        );
        tokio::time::sleep(timeouts.settle_fallback).await;
    }
    session.click(surface, &layout.add_alias_button).await?;

    let confirmation = confirm_alias(session, surface, &alias, layout, timeouts).await?;
    info!(alias = %alias, confirmation = ?confirmation, "CSR submitted");

    Ok(Submission {
        alias,
        confirmation,
    })
}

async fn confirm_alias(
    session: &dyn BrowserSession,
    surface: SurfaceId,
    alias: &Alias,
    layout: &PortalLayout,
    timeouts: &StepTimeouts,
) -> Result<Confirmation, EnrollError> {
    let column = &layout.alias_column;
    let wanted = alias.as_str();

    let seen = poll_until(timeouts.confirmation_wait, timeouts.poll_interval, move || async move {
        let texts = session.all_texts(surface, column).await?;
        Ok(texts.iter().any(|t| t == wanted).then_some(()))
    })
    .await?;

    if seen.is_some() {
        return Ok(Confirmation::Keyed);
    }

    let rows = session.all_texts(surface, column).await?;
    Ok(match rows.last() {
        Some(last) => {
            warn!(
                alias = %alias,
                last_row = %last,
                "Alias not found in the table, reporting the last row (assumes append order)"
            );
            Confirmation::LastRow(last.clone())
        }
        None => {
            warn!(alias = %alias, "Alias table is empty after submission");
            Confirmation::Unconfirmed
        }
    })
}

/// Download the certificate issued for `alias`.
pub async fn download_certificate(
    session: &dyn BrowserSession,
    surface: SurfaceId,
    alias: &Alias,
    layout: &PortalLayout,
    timeouts: &StepTimeouts,
) -> Result<Vec<u8>, EnrollError> {
    let poll = timeouts.poll_interval;

    let keyed = layout.view_action_for(alias.as_str());
    let view = if session.is_visible(surface, &keyed).await? {
        keyed
    } else {
        let first = layout.first_view_action();
        if !session.is_visible(surface, &first).await? {
            return Err(EnrollError::Download(format!(
                "no certificate row to open for alias {}",
                alias
            )));
        }
        warn!(alias = %alias, "No view action in the alias row, using the first one");
        first
    };
    session.click(surface, &view).await?;

    if !wait_visible(session, surface, &layout.download_button, timeouts.form_wait, poll).await? {
        return Err(EnrollError::Download(
            "download control did not appear".to_string(),
        ));
    }

    let bytes = session
        .download(surface, &layout.download_button, timeouts.download_wait)
        .await?
        .ok_or_else(|| {
            EnrollError::Download(format!(
                "no download completed within {}s",
                timeouts.download_wait.as_secs()
            ))
        })?;

    if bytes.is_empty() {
        return Err(EnrollError::Download("downloaded file is empty".to_string()));
    }

    info!(alias = %alias, bytes = bytes.len(), "Certificate downloaded");
    Ok(bytes)
}
