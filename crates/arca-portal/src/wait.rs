//! Bounded condition polling.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::error::BrowserError;
use crate::session::{BrowserSession, Locator, SurfaceId};

/// Poll `check` every `interval` until it yields a value or `timeout` passes.
///
/// The check runs at least once. Driver errors abort the wait. A single
/// check that hangs is abandoned once the deadline has passed, with at least
/// `interval` of grace.
pub async fn poll_until<T, F, Fut>(
    timeout: Duration,
    interval: Duration,
    mut check: F,
) -> Result<Option<T>, BrowserError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, BrowserError>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        let budget = deadline.saturating_duration_since(Instant::now()).max(interval);
        match tokio::time::timeout(budget, check()).await {
            Ok(checked) => {
                if let Some(value) = checked? {
                    return Ok(Some(value));
                }
            }
            Err(_) => {
                debug!(budget_ms = budget.as_millis() as u64, "Check did not return in time");
                return Ok(None);
            }
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        tokio::time::sleep(interval).await;
    }
}

/// Wait for `target` to be visible on `surface`.
pub async fn wait_visible(
    session: &dyn BrowserSession,
    surface: SurfaceId,
    target: &Locator,
    timeout: Duration,
    interval: Duration,
) -> Result<bool, BrowserError> {
    let found = poll_until(timeout, interval, move || async move {
        Ok(session.is_visible(surface, target).await?.then_some(()))
    })
    .await?;
    debug!(locator = %target, surface = %surface, visible = found.is_some(), "Visibility wait finished");
    Ok(found.is_some())
}

/// Wait for `target` to be enabled on `surface`.
pub async fn wait_enabled(
    session: &dyn BrowserSession,
    surface: SurfaceId,
    target: &Locator,
    timeout: Duration,
    interval: Duration,
) -> Result<bool, BrowserError> {
    let found = poll_until(timeout, interval, move || async move {
        Ok(session.is_enabled(surface, target).await?.then_some(()))
    })
    .await?;
    Ok(found.is_some())
}
