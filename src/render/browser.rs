// SPDX-License-Identifier: MPL-2.0

//! Headless Chrome behind [`PageDriver`].
//!
//! The browser is launched on first use and kept for later renders. Its CDP
//! event handler runs on its own task; when that task ends the connection is
//! gone and the next request launches a fresh browser.
//!
//! Every tab is held by a [`TabGuard`]. Callers bound our futures with
//! timeouts, and a dropped future must still close its tab or the long-lived
//! browser accumulates them.

use crate::armory::TooltipFragment;
use crate::render::RenderError;
use crate::render::compose::GRID_ID;
use crate::render::renderer::PageDriver;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::element::Element;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// How often to look for the tooltip node while the item page loads
const ELEMENT_POLL: Duration = Duration::from_millis(250);

/// Grace period for a polite browser close before killing the process
const CLOSE_GRACE: Duration = Duration::from_secs(5);

const STYLESHEETS_JS: &str = r#"
Array.from(document.querySelectorAll('link[rel="stylesheet"]'))
    .map(link => link.href)
    .filter(href => href)
"#;

/// A page session that can be closed from a detached task.
#[async_trait]
trait Tab: Clone + Send + Sync + 'static {
    async fn close_tab(self);
}

#[async_trait]
impl Tab for Page {
    async fn close_tab(self) {
        if let Err(e) = self.close().await {
            debug!(error = %e, "failed to close tab");
        }
    }
}

/// Closes its tab on [`close`](Self::close), or in the background when
/// dropped before that.
struct TabGuard<T: Tab> {
    tab: T,
    open: bool,
}

impl<T: Tab> TabGuard<T> {
    fn new(tab: T) -> Self {
        Self { tab, open: true }
    }

    async fn close(mut self) {
        self.open = false;
        self.tab.clone().close_tab().await;
    }
}

impl<T: Tab> Drop for TabGuard<T> {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(self.tab.clone().close_tab());
            }
            Err(_) => warn!("tab dropped outside the runtime, left open"),
        }
    }
}

/// Browser instance with background event handler.
struct RunningBrowser {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl RunningBrowser {
    fn is_connected(&self) -> bool {
        !self.handler.is_finished()
    }
}

#[derive(Deserialize)]
struct ContentBox {
    width: f64,
    height: f64,
}

pub struct ChromeDriver {
    executable: Option<PathBuf>,
    selector: String,
    margin: u32,
    running: Option<RunningBrowser>,
}

impl ChromeDriver {
    pub fn new(executable: Option<PathBuf>, selector: &str, margin: u32) -> Self {
        Self {
            executable,
            selector: selector.to_string(),
            margin,
            running: None,
        }
    }

    /// Open a blank tab, launching or relaunching the browser as needed.
    async fn new_page(&mut self) -> Result<Page, RenderError> {
        if self.running.as_ref().is_some_and(|r| !r.is_connected()) {
            warn!("browser connection lost, relaunching");
            if let Some(mut stale) = self.running.take() {
                let _ = stale.browser.kill().await;
            }
        }

        if self.running.is_none() {
            self.running = Some(self.launch().await?);
        }

        let Some(running) = self.running.as_ref() else {
            return Err(RenderError::Launch("browser unavailable".to_string()));
        };
        Ok(running.browser.new_page("about:blank").await?)
    }

    async fn launch(&self) -> Result<RunningBrowser, RenderError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(1024, 768)
            .arg("--hide-scrollbars")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            .arg("--disable-sync");
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(RenderError::Launch)?;

        let (browser, mut handler) = Browser::launch(config).await?;

        // Drain CDP events; the stream ends when the browser goes away
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "browser event error");
                }
            }
        });

        info!("browser launched");
        Ok(RunningBrowser { browser, handler })
    }
}

#[async_trait]
impl PageDriver for ChromeDriver {
    async fn fetch_tooltip(&mut self, url: &str) -> Result<TooltipFragment, RenderError> {
        let tab = TabGuard::new(self.new_page().await?);
        let result = lift_tooltip(&tab.tab, url, &self.selector).await;
        tab.close().await;
        result
    }

    async fn capture(&mut self, document: &str) -> Result<Vec<u8>, RenderError> {
        let tab = TabGuard::new(self.new_page().await?);
        let result = snapshot(&tab.tab, document, self.margin).await;
        tab.close().await;
        result
    }

    async fn close(&mut self) {
        let Some(mut running) = self.running.take() else {
            return;
        };

        let closed = match timeout(CLOSE_GRACE, running.browser.close()).await {
            Ok(Ok(_)) => timeout(CLOSE_GRACE, running.browser.wait()).await.is_ok(),
            Ok(Err(e)) => {
                warn!(error = %e, "browser refused to close");
                false
            }
            Err(_) => {
                warn!("browser close timed out");
                false
            }
        };

        if !closed && let Some(Err(e)) = running.browser.kill().await {
            warn!(error = %e, "failed to kill browser process");
        }
        running.handler.abort();
        info!(forced = !closed, "browser shut down");
    }
}

async fn lift_tooltip(
    page: &Page,
    url: &str,
    selector: &str,
) -> Result<TooltipFragment, RenderError> {
    page.goto(url).await?;
    let element = wait_for_element(page, selector).await;

    let markup = element
        .outer_html()
        .await?
        .ok_or_else(|| RenderError::MissingTooltip(url.to_string()))?;
    let stylesheets: Vec<String> = page.evaluate(STYLESHEETS_JS).await?.into_value()?;

    Ok(TooltipFragment {
        markup,
        stylesheets,
    })
}

/// Poll until the node exists. Callers bound this with a timeout.
async fn wait_for_element(page: &Page, selector: &str) -> Element {
    loop {
        match page.find_element(selector).await {
            Ok(element) => return element,
            Err(_) => sleep(ELEMENT_POLL).await,
        }
    }
}

async fn snapshot(page: &Page, document: &str, margin: u32) -> Result<Vec<u8>, RenderError> {
    page.set_content(document).await?;

    let measure = format!(
        "(() => {{ const r = document.getElementById('{GRID_ID}').getBoundingClientRect(); \
         return {{ width: r.width, height: r.height }}; }})()"
    );
    let content: ContentBox = page.evaluate(measure).await?.into_value()?;

    let width = content.width.ceil() as i64 + i64::from(margin);
    let height = content.height.ceil() as i64 + i64::from(margin);
    page.execute(SetDeviceMetricsOverrideParams::new(width, height, 1.0, false))
        .await?;

    let params = ScreenshotParams::builder()
        .format(CaptureScreenshotFormat::Png)
        .full_page(true)
        .omit_background(true)
        .build();
    Ok(page.screenshot(params).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Default)]
    struct CountingTab {
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tab for CountingTab {
        async fn close_tab(self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_session_still_closes_tab() {
        let tab = CountingTab::default();
        let session = {
            let tab = tab.clone();
            async move {
                let guard = TabGuard::new(tab);
                std::future::pending::<()>().await;
                guard.close().await;
            }
        };

        assert!(timeout(Duration::from_secs(15), session).await.is_err());
        settle().await;

        assert_eq!(tab.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_finished_session_closes_tab_once() {
        let tab = CountingTab::default();

        TabGuard::new(tab.clone()).close().await;
        settle().await;

        assert_eq!(tab.closes.load(Ordering::SeqCst), 1);
    }
}
