// SPDX-License-Identifier: MPL-2.0

use crate::armory::{LootItem, TooltipFragment, item_page_url};
use crate::cache::{CacheDb, StyleCache, TooltipCache, blocking};
use crate::render::compose;
use crate::render::queue::RenderBackend;
use crate::render::RenderError;
use crate::state::Settings;
use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Browser operations the renderer needs. One call is one page session.
#[async_trait]
pub trait PageDriver: Send + 'static {
    /// Load an item page, wait for the tooltip node and lift it with the
    /// page's stylesheet links.
    async fn fetch_tooltip(&mut self, url: &str) -> Result<TooltipFragment, RenderError>;

    /// Render a standalone document and capture it as a transparent PNG.
    async fn capture(&mut self, document: &str) -> Result<Vec<u8>, RenderError>;

    async fn close(&mut self) {}
}

#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub item_page_url: String,
    pub attempts: u32,
    pub backoff: Duration,
    /// Applies to each tooltip attempt and to the final capture
    pub timeout: Duration,
    pub columns: usize,
}

impl RenderOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            item_page_url: settings.item_page_url.clone(),
            attempts: settings.tooltip_attempts.max(1),
            backoff: settings.tooltip_backoff(),
            timeout: settings.tooltip_timeout(),
            columns: settings.grid_columns.max(1),
        }
    }
}

/// Cache-first tooltip collection and grid capture.
pub struct TooltipRenderer<D> {
    driver: D,
    db: CacheDb,
    options: RenderOptions,
}

impl<D: PageDriver> TooltipRenderer<D> {
    pub fn new(driver: D, db: CacheDb, options: RenderOptions) -> Self {
        Self {
            driver,
            db,
            options,
        }
    }

    async fn tooltip(&mut self, item: &LootItem, realm_id: u32) -> Option<String> {
        let entry = item.entry;
        match blocking(&self.db, move |db| TooltipCache::new(db).get(entry, realm_id)).await {
            Ok(Some(markup)) => return Some(markup),
            Ok(None) => {}
            Err(e) => warn!(entry, realm_id, error = %e, "tooltip cache read failed"),
        }

        let url = item_page_url(&self.options.item_page_url, entry, realm_id);
        let fragment = self.fetch_with_retry(&url).await?;
        let markup = compose::sanitize(&fragment.markup);
        if markup.is_empty() {
            warn!(entry, "tooltip node was empty");
            return None;
        }

        let stored = markup.clone();
        let stylesheets = fragment.stylesheets;
        let written = blocking(&self.db, move |db| {
            let learned = StyleCache::new(db).remember(realm_id, &stylesheets)?;
            TooltipCache::new(db).store(entry, realm_id, &stored)?;
            Ok(learned)
        })
        .await;
        match written {
            Ok(true) => debug!(realm_id, "stylesheets cached for realm"),
            Ok(false) => {}
            Err(e) => warn!(entry, realm_id, error = %e, "tooltip cache write failed"),
        }

        Some(markup)
    }

    async fn fetch_with_retry(&mut self, url: &str) -> Option<TooltipFragment> {
        let attempts = self.options.attempts;
        for attempt in 1..=attempts {
            let outcome = match timeout(self.options.timeout, self.driver.fetch_tooltip(url)).await
            {
                Ok(result) => result,
                Err(_) => Err(RenderError::Timeout(self.options.timeout)),
            };

            match outcome {
                Ok(fragment) => return Some(fragment),
                Err(e) => {
                    warn!(url, attempt, attempts, error = %e, "tooltip fetch failed");
                }
            }

            if attempt < attempts {
                tokio::time::sleep(self.options.backoff * attempt).await;
            }
        }
        None
    }
}

#[async_trait]
impl<D: PageDriver> RenderBackend for TooltipRenderer<D> {
    async fn render(
        &mut self,
        items: &[LootItem],
        realm_id: u32,
    ) -> Result<Option<Vec<u8>>, RenderError> {
        let mut seen = HashSet::new();
        let mut fragments = Vec::new();

        for item in items.iter().filter(|i| seen.insert(i.entry)) {
            if let Some(markup) = self.tooltip(item, realm_id).await {
                fragments.push(markup);
            }
        }

        if fragments.is_empty() {
            info!(realm_id, items = items.len(), "no tooltips available, skipping image");
            return Ok(None);
        }

        let stylesheets = blocking(&self.db, move |db| StyleCache::new(db).get(realm_id))
            .await
            .unwrap_or_else(|e| {
                warn!(realm_id, error = %e, "stylesheet cache read failed");
                None
            })
            .unwrap_or_default();
        let document = compose::document(&fragments, &stylesheets, self.options.columns);

        let png = timeout(self.options.timeout, self.driver.capture(&document))
            .await
            .map_err(|_| RenderError::Timeout(self.options.timeout))??;

        let decoded = image::load_from_memory_with_format(&png, image::ImageFormat::Png)?;
        debug!(
            realm_id,
            tooltips = fragments.len(),
            width = decoded.width(),
            height = decoded.height(),
            "captured loot image"
        );

        Ok(Some(png))
    }

    async fn shutdown(&mut self) {
        self.driver.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct DriverLog {
        fetches: Arc<Mutex<Vec<String>>>,
        documents: Arc<Mutex<Vec<String>>>,
        closed: Arc<Mutex<bool>>,
    }

    /// Serves canned tooltips; URLs without one hang until the timeout.
    struct FakeDriver {
        tooltips: HashMap<String, TooltipFragment>,
        log: DriverLog,
    }

    #[async_trait]
    impl PageDriver for FakeDriver {
        async fn fetch_tooltip(&mut self, url: &str) -> Result<TooltipFragment, RenderError> {
            self.log.fetches.lock().unwrap().push(url.to_string());
            match self.tooltips.get(url) {
                Some(fragment) => Ok(fragment.clone()),
                None => std::future::pending().await,
            }
        }

        async fn capture(&mut self, document: &str) -> Result<Vec<u8>, RenderError> {
            self.log.documents.lock().unwrap().push(document.to_string());
            Ok(tiny_png())
        }

        async fn close(&mut self) {
            *self.log.closed.lock().unwrap() = true;
        }
    }

    fn tiny_png() -> Vec<u8> {
        let mut bytes = Vec::new();
        image::RgbaImage::new(4, 3)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn options() -> RenderOptions {
        RenderOptions {
            item_page_url: "https://armory.test/item/{entry}/{realm}".to_string(),
            attempts: 2,
            backoff: Duration::from_millis(500),
            timeout: Duration::from_secs(15),
            columns: 3,
        }
    }

    fn item(entry: u32) -> LootItem {
        LootItem {
            entry,
            name: format!("item {entry}"),
        }
    }

    fn renderer(
        tooltips: &[(u32, &str)],
        db: &CacheDb,
    ) -> (TooltipRenderer<FakeDriver>, DriverLog) {
        let log = DriverLog::default();
        let tooltips = tooltips
            .iter()
            .map(|(entry, markup)| {
                (
                    format!("https://armory.test/item/{entry}/7"),
                    TooltipFragment {
                        markup: markup.to_string(),
                        stylesheets: vec!["https://armory.test/tooltip.css".to_string()],
                    },
                )
            })
            .collect();
        let driver = FakeDriver {
            tooltips,
            log: log.clone(),
        };
        (
            TooltipRenderer::new(driver, db.clone(), options()),
            log,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_only_item_gives_no_image() {
        let db = CacheDb::open_in_memory().unwrap();
        let (mut renderer, log) = renderer(&[], &db);

        let image = renderer.render(&[item(12345)], 7).await.unwrap();

        assert_eq!(image, None);
        assert_eq!(log.fetches.lock().unwrap().len(), 2);
        assert!(log.documents.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_item_is_omitted_from_grid() {
        let db = CacheDb::open_in_memory().unwrap();
        let (mut renderer, log) = renderer(&[(40395, "<div>Torch</div>")], &db);

        let image = renderer
            .render(&[item(12345), item(40395), item(40395)], 7)
            .await
            .unwrap();

        assert_eq!(image, Some(tiny_png()));
        let documents = log.documents.lock().unwrap();
        assert_eq!(documents.len(), 1);
        assert!(documents[0].contains("<div>Torch</div>"));
        assert!(documents[0].contains("repeat(1, max-content)"));
        assert!(documents[0].contains("https://armory.test/tooltip.css"));
    }

    #[tokio::test]
    async fn test_fetched_tooltip_is_cached_and_reused() {
        let db = CacheDb::open_in_memory().unwrap();
        let (mut renderer, log) =
            renderer(&[(40395, "<div>Torch<script>x()</script></div>")], &db);

        renderer.render(&[item(40395)], 7).await.unwrap();
        renderer.render(&[item(40395)], 7).await.unwrap();

        assert_eq!(log.fetches.lock().unwrap().len(), 1);
        assert_eq!(
            TooltipCache::new(&db).get(40395, 7).unwrap().as_deref(),
            Some("<div>Torch</div>")
        );
        assert_eq!(
            StyleCache::new(&db).get(7).unwrap(),
            Some(vec!["https://armory.test/tooltip.css".to_string()])
        );
    }

    #[tokio::test]
    async fn test_cached_tooltips_keep_stylesheets_after_restart() {
        let db = CacheDb::open_in_memory().unwrap();
        let (mut first, _) = renderer(&[(40395, "<div>Torch</div>")], &db);
        first.render(&[item(40395)], 7).await.unwrap();
        drop(first);

        let (mut restarted, log) = renderer(&[], &db);
        let image = restarted.render(&[item(40395)], 7).await.unwrap();

        assert!(image.is_some());
        assert!(log.fetches.lock().unwrap().is_empty());
        let documents = log.documents.lock().unwrap();
        assert!(documents[0].contains(
            "<link rel=\"stylesheet\" href=\"https://armory.test/tooltip.css\">"
        ));
    }

    #[tokio::test]
    async fn test_cached_markup_skips_the_browser() {
        let db = CacheDb::open_in_memory().unwrap();
        TooltipCache::new(&db)
            .store(50000, 7, "<div>Cached</div>")
            .unwrap();
        let (mut renderer, log) = renderer(&[], &db);

        let image = renderer.render(&[item(50000)], 7).await.unwrap();

        assert!(image.is_some());
        assert!(log.fetches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_closes_driver() {
        let db = CacheDb::open_in_memory().unwrap();
        let (mut renderer, log) = renderer(&[], &db);

        renderer.shutdown().await;
        assert!(*log.closed.lock().unwrap());
    }
}
