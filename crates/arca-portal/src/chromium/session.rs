use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    DownloadProgressState, EventDownloadProgress, EventDownloadWillBegin,
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::script::{self, Op, QueryResult};
use super::{find_chrome, ChromiumOptions};
use crate::error::BrowserError;
use crate::session::{BrowserSession, Locator, PopupWatch, SurfaceId};
use crate::wait::poll_until;

const POPUP_POLL: Duration = Duration::from_millis(250);
const CLOSE_WAIT: Duration = Duration::from_secs(5);

/// One Chromium process and the pages it opened.
///
/// Each session gets a private directory holding the browser profile and the
/// downloads; it is removed on [`BrowserSession::close`].
pub struct ChromiumSession {
    browser: Mutex<Option<Browser>>,
    handler_task: JoinHandle<()>,
    surfaces: Mutex<Vec<Page>>,
    session_dir: PathBuf,
    marks: AtomicU64,
}

impl Drop for ChromiumSession {
    // Dropped without close(), e.g. when the request future is cancelled.
    fn drop(&mut self) {
        // Dropping the browser starts killing the process.
        drop(self.browser.get_mut().take());
        self.handler_task.abort();
        if self.session_dir.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.session_dir) {
                warn!(error = %e, dir = %self.session_dir.display(), "Failed to remove session directory");
            }
        }
    }
}

impl ChromiumSession {
    /// Launch a browser configured by `options`.
    pub async fn launch(options: &ChromiumOptions) -> Result<Self, BrowserError> {
        let chrome = match &options.chrome_path {
            Some(path) => path.clone(),
            None => find_chrome().ok_or_else(|| {
                BrowserError::Launch(
                    "Chrome/Chromium not found. Install it or set the browser path".to_string(),
                )
            })?,
        };

        let session_dir = options.work_root.join(Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(session_dir.join("downloads")).await?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(&chrome)
            .viewport(None)
            .user_data_dir(session_dir.join("profile"))
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-infobars");
        if !options.headless {
            builder = builder.with_head();
        }
        if options.no_sandbox {
            builder = builder.no_sandbox();
        }
        let config = builder.build().map_err(BrowserError::Launch)?;

        let (browser, mut handler) = match Browser::launch(config).await {
            Ok(launched) => launched,
            Err(e) => {
                let _ = tokio::fs::remove_dir_all(&session_dir).await;
                return Err(BrowserError::Launch(e.to_string()));
            }
        };
        let handler_task = tokio::spawn(async move { while (handler.next().await).is_some() {} });

        let session = Self {
            browser: Mutex::new(Some(browser)),
            handler_task,
            surfaces: Mutex::new(Vec::new()),
            session_dir,
            marks: AtomicU64::new(0),
        };

        if let Err(e) = session.enable_downloads().await {
            let _ = session.close().await;
            return Err(e);
        }

        info!(
            chrome = %chrome.display(),
            headless = options.headless,
            session_dir = %session.session_dir.display(),
            "Browser launched"
        );
        Ok(session)
    }

    fn downloads_dir(&self) -> PathBuf {
        self.session_dir.join("downloads")
    }

    async fn enable_downloads(&self) -> Result<(), BrowserError> {
        let mut params = SetDownloadBehaviorParams::new(SetDownloadBehaviorBehavior::AllowAndName);
        params.download_path = Some(self.downloads_dir().to_string_lossy().into_owned());
        params.events_enabled = Some(true);

        let guard = self.browser.lock().await;
        let browser = guard.as_ref().ok_or(BrowserError::Closed)?;
        browser.execute(params).await?;
        Ok(())
    }

    async fn page(&self, surface: SurfaceId) -> Result<Page, BrowserError> {
        if self.browser.lock().await.is_none() {
            return Err(BrowserError::Closed);
        }
        self.surfaces
            .lock()
            .await
            .get(surface.index())
            .cloned()
            .ok_or_else(|| BrowserError::UnknownSurface(surface.to_string()))
    }

    /// Register pages the browser knows about but this session does not.
    async fn sync_surfaces(&self) -> Result<usize, BrowserError> {
        let pages = {
            let guard = self.browser.lock().await;
            let browser = guard.as_ref().ok_or(BrowserError::Closed)?;
            browser.pages().await?
        };

        let mut surfaces = self.surfaces.lock().await;
        for page in pages {
            let known = surfaces.iter().any(|p| p.target_id() == page.target_id());
            if !known {
                debug!(surface = surfaces.len(), target = ?page.target_id(), "New surface");
                surfaces.push(page);
            }
        }
        Ok(surfaces.len())
    }

    async fn query(
        &self,
        surface: SurfaceId,
        target: &Locator,
        op: Op,
        arg: &str,
    ) -> Result<QueryResult, BrowserError> {
        let page = self.page(surface).await?;
        let expression = script::query(target, op, arg)?;
        let evaluated = match page.evaluate(expression).await {
            Ok(evaluated) => evaluated,
            // Reads race with navigations that tear down the execution context.
            Err(e) if op.is_read_only() => {
                debug!(error = %e, locator = %target, "Query failed, treating element as absent");
                return Ok(QueryResult::default());
            }
            Err(e) => return Err(e.into()),
        };
        let result = evaluated
            .into_value::<QueryResult>()
            .map_err(|e| BrowserError::Protocol(format!("unexpected query result: {}", e)))?;
        Ok(result)
    }

    async fn require(
        &self,
        surface: SurfaceId,
        target: &Locator,
        op: Op,
        arg: &str,
    ) -> Result<QueryResult, BrowserError> {
        let result = self.query(surface, target, op, arg).await?;
        if !result.found {
            return Err(BrowserError::ElementNotFound(target.to_string()));
        }
        Ok(result)
    }

    /// First surface registered after `watch` was armed, preferring one the
    /// opener opened.
    async fn new_surface(&self, watch: PopupWatch) -> Option<SurfaceId> {
        let surfaces = self.surfaces.lock().await;
        let opener = surfaces.get(watch.opener().index()).map(|p| p.target_id().clone());
        let openers: Vec<_> = surfaces
            .iter()
            .skip(watch.baseline())
            .map(|p| p.opener_id().clone())
            .collect();
        pick_popup(opener.as_ref(), &openers).map(|i| SurfaceId::new(watch.baseline() + i))
    }

    /// Tag the element matched by `target` and return the selector for it.
    async fn mark(
        &self,
        surface: SurfaceId,
        target: &Locator,
    ) -> Result<(String, QueryResult), BrowserError> {
        let token = self.marks.fetch_add(1, Ordering::Relaxed).to_string();
        let result = self.require(surface, target, Op::Mark, &token).await?;
        Ok((script::marked_selector(&token), result))
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn open(&self, url: &str) -> Result<SurfaceId, BrowserError> {
        let page = {
            let guard = self.browser.lock().await;
            let browser = guard.as_ref().ok_or(BrowserError::Closed)?;
            browser.new_page(url).await?
        };

        let mut surfaces = self.surfaces.lock().await;
        let id = SurfaceId::new(surfaces.len());
        surfaces.push(page);
        info!(surface = %id, url = %url, "Opened surface");
        Ok(id)
    }

    async fn click(&self, surface: SurfaceId, target: &Locator) -> Result<(), BrowserError> {
        let (selector, marked) = self.mark(surface, target).await?;
        if !marked.top_level {
            // Frame content is out of reach for DOM queries from the page.
            debug!(locator = %target, "Element inside a frame, clicking from script");
            self.require(surface, target, Op::ForceClick, "").await?;
            return Ok(());
        }

        let page = self.page(surface).await?;
        page.find_element(selector).await?.click().await?;
        debug!(locator = %target, surface = %surface, "Clicked");
        Ok(())
    }

    async fn force_click(&self, surface: SurfaceId, target: &Locator) -> Result<(), BrowserError> {
        self.require(surface, target, Op::ForceClick, "").await?;
        debug!(locator = %target, surface = %surface, "Force clicked");
        Ok(())
    }

    async fn fill(
        &self,
        surface: SurfaceId,
        target: &Locator,
        value: &str,
    ) -> Result<(), BrowserError> {
        self.require(surface, target, Op::Fill, value).await?;
        debug!(locator = %target, surface = %surface, "Filled");
        Ok(())
    }

    async fn set_input_file(
        &self,
        surface: SurfaceId,
        target: &Locator,
        path: &Path,
    ) -> Result<(), BrowserError> {
        let absolute = tokio::fs::canonicalize(path).await?;
        let (selector, marked) = self.mark(surface, target).await?;
        if !marked.top_level {
            return Err(BrowserError::Protocol(format!(
                "file input {} is inside a frame",
                target
            )));
        }

        let page = self.page(surface).await?;
        let element = page.find_element(selector).await?;
        let mut params =
            SetFileInputFilesParams::new(vec![absolute.to_string_lossy().into_owned()]);
        params.backend_node_id = Some(element.backend_node_id);
        page.execute(params).await?;
        debug!(locator = %target, file = %absolute.display(), "File attached");
        Ok(())
    }

    async fn is_visible(&self, surface: SurfaceId, target: &Locator) -> Result<bool, BrowserError> {
        let result = self.query(surface, target, Op::Probe, "").await?;
        Ok(result.found && result.visible)
    }

    async fn is_enabled(&self, surface: SurfaceId, target: &Locator) -> Result<bool, BrowserError> {
        let result = self.query(surface, target, Op::Probe, "").await?;
        Ok(result.found && result.enabled)
    }

    async fn text_content(
        &self,
        surface: SurfaceId,
        target: &Locator,
    ) -> Result<Option<String>, BrowserError> {
        let result = self.query(surface, target, Op::Text, "").await?;
        Ok(if result.found { result.text } else { None })
    }

    async fn all_texts(
        &self,
        surface: SurfaceId,
        target: &Locator,
    ) -> Result<Vec<String>, BrowserError> {
        Ok(self.query(surface, target, Op::Texts, "").await?.texts)
    }

    async fn watch_popups(&self, opener: SurfaceId) -> Result<PopupWatch, BrowserError> {
        let known = self.sync_surfaces().await?;
        Ok(PopupWatch::new(opener, known))
    }

    async fn wait_for_popup(
        &self,
        watch: PopupWatch,
        timeout: Duration,
    ) -> Result<Option<SurfaceId>, BrowserError> {
        let popup = poll_until(timeout, POPUP_POLL, move || async move {
            self.sync_surfaces().await?;
            Ok(self.new_surface(watch).await)
        })
        .await?;

        match popup {
            Some(surface) => {
                let url = match self.page(surface).await {
                    Ok(page) => page.url().await.ok().flatten(),
                    Err(_) => None,
                };
                info!(
                    opener = %watch.opener(),
                    popup = %surface,
                    url = url.as_deref().unwrap_or("unknown"),
                    "Popup opened"
                );
            }
            None => debug!(opener = %watch.opener(), "No popup opened"),
        }
        Ok(popup)
    }

    async fn download(
        &self,
        surface: SurfaceId,
        trigger: &Locator,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, BrowserError> {
        let (mut begins, mut progress) = {
            let guard = self.browser.lock().await;
            let browser = guard.as_ref().ok_or(BrowserError::Closed)?;
            (
                browser.event_listener::<EventDownloadWillBegin>().await?,
                browser.event_listener::<EventDownloadProgress>().await?,
            )
        };

        self.click(surface, trigger).await?;

        let completed = tokio::time::timeout(timeout, async move {
            let Some(begin) = begins.next().await else {
                return None;
            };
            debug!(guid = %begin.guid, file = %begin.suggested_filename, "Download started");
            while let Some(event) = progress.next().await {
                if event.guid != begin.guid {
                    continue;
                }
                match event.state {
                    DownloadProgressState::Completed => return Some(begin.guid.clone()),
                    DownloadProgressState::Canceled => return None,
                    _ => {}
                }
            }
            None
        })
        .await;

        match completed {
            Ok(Some(guid)) => {
                let bytes = tokio::fs::read(self.downloads_dir().join(guid)).await?;
                Ok(Some(bytes))
            }
            Ok(None) => {
                warn!(locator = %trigger, "Download was canceled or never started");
                Ok(None)
            }
            Err(_) => {
                warn!(locator = %trigger, timeout_secs = timeout.as_secs(), "Download timed out");
                Ok(None)
            }
        }
    }

    async fn close(&self) -> Result<(), BrowserError> {
        let browser = self.browser.lock().await.take();
        let Some(mut browser) = browser else {
            return Ok(());
        };

        self.surfaces.lock().await.clear();
        if let Err(e) = browser.close().await {
            warn!(error = %e, "Browser did not acknowledge close");
        }
        match tokio::time::timeout(CLOSE_WAIT, browser.wait()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(error = %e, "Failed to wait for browser exit"),
            Err(_) => {
                warn!("Browser did not exit in time, killing it");
                if let Some(Err(e)) = browser.kill().await {
                    warn!(error = %e, "Failed to kill browser");
                }
            }
        }
        self.handler_task.abort();

        if let Err(e) = tokio::fs::remove_dir_all(&self.session_dir).await {
            warn!(error = %e, dir = %self.session_dir.display(), "Failed to remove session directory");
        }
        info!("Browser session closed");
        Ok(())
    }
}

/// Index of the popup among `candidates`, given each candidate's opener.
///
/// A candidate opened by `opener` wins. Otherwise the first one is taken,
/// since portals may open windows with `noopener`.
fn pick_popup<T: PartialEq>(opener: Option<&T>, candidates: &[Option<T>]) -> Option<usize> {
    if candidates.is_empty() {
        return None;
    }
    let matching = opener.and_then(|opener| {
        candidates
            .iter()
            .position(|candidate| candidate.as_ref() == Some(opener))
    });
    if matching.is_none() {
        debug!(candidates = candidates.len(), "No surface names the opener, taking the first new one");
    }
    Some(matching.unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_popup_prefers_surface_opened_by_opener() {
        let candidates = vec![Some("devtools"), None, Some("landing")];
        assert_eq!(pick_popup(Some(&"landing"), &candidates), Some(2));
    }

    #[test]
    fn test_popup_falls_back_to_first_new_surface() {
        let candidates = vec![None, Some("other")];
        assert_eq!(pick_popup(Some(&"landing"), &candidates), Some(0));
        assert_eq!(pick_popup(None, &candidates), Some(0));
        assert_eq!(pick_popup::<&str>(Some(&"landing"), &[]), None);
    }

    #[tokio::test]
    async fn test_dropped_session_removes_its_directory() {
        let root = tempfile::tempdir().unwrap();
        let session_dir = root.path().join("session");
        std::fs::create_dir_all(session_dir.join("downloads")).unwrap();
        std::fs::write(session_dir.join("downloads").join("partial"), b"x").unwrap();

        let session = ChromiumSession {
            browser: Mutex::new(None),
            handler_task: tokio::spawn(async {}),
            surfaces: Mutex::new(Vec::new()),
            session_dir: session_dir.clone(),
            marks: AtomicU64::new(0),
        };
        drop(session);

        assert!(!session_dir.exists());
    }
}
