pub mod details;
pub mod extract;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::browser::cookies::load_cookies;
use crate::config::Config;
use crate::models::{BrowserCookie, ProductRecord};
use crate::traits::{Browser, BrowserPage, ScraperConfig, Session};

use details::{DetailLimits, attach_descriptions};
use extract::extract_products;

#[derive(Clone)]
pub struct Scraper {
    browser: Arc<dyn Browser>,
    site: ScraperConfig,
    limits: DetailLimits,
    results_timeout: Duration,
    cookies_file: Option<PathBuf>,
    screenshot_path: Option<PathBuf>,
}

impl Scraper {
    pub fn new(browser: Arc<dyn Browser>, config: &Config) -> Self {
        Self {
            browser,
            site: config.site.clone(),
            limits: config.detail,
            results_timeout: config.results_timeout,
            cookies_file: config.cookies_file.clone(),
            screenshot_path: config.screenshot_path.clone(),
        }
    }

    /// Scrape the shopping results for `query`.
    ///
    /// Only a browser that cannot hand out a session is an error; a results
    /// page that never shows products yields an empty list.
    pub async fn search_products(&self, query: &str) -> Result<Vec<ProductRecord>> {
        info!("Searching for products matching {:?}", query);

        let session = self.open_session().await?;
        let products = self.scrape_session(session.as_ref(), query).await;

        if let Err(e) = session.close().await {
            warn!("Failed to close browser session: {:#}", e);
        }

        let products = products?;
        info!("Found {} products for {:?}", products.len(), query);
        Ok(products)
    }

    /// Title of `url` as seen by a fresh cookie-carrying session
    pub async fn page_title(&self, url: &str) -> Result<Option<String>> {
        let session = self.open_session().await?;
        let title = read_title(session.as_ref(), url).await;

        if let Err(e) = session.close().await {
            warn!("Failed to close browser session: {:#}", e);
        }
        title
    }

    async fn open_session(&self) -> Result<Box<dyn Session>> {
        let cookies: Vec<BrowserCookie> = match &self.cookies_file {
            Some(path) => load_cookies(path).await,
            None => Vec::new(),
        };

        self.browser
            .new_session(&cookies)
            .await
            .context("Failed to start browser session")
    }

    async fn scrape_session(&self, session: &dyn Session, query: &str) -> Result<Vec<ProductRecord>> {
        let Some(html) = self.load_results(session, query).await else {
            return Ok(Vec::new());
        };

        let extraction = extract_products(&html, &self.site.selectors, self.site.result_cap)?;
        if extraction.errors > 0 {
            warn!(
                "Skipped {} of {} products that could not be read",
                extraction.errors,
                extraction.errors + extraction.records.len()
            );
        }

        Ok(attach_descriptions(session, &self.site, self.limits, extraction.records).await)
    }

    /// Rendered results page, or `None` when the results never appeared
    async fn load_results(&self, session: &dyn Session, query: &str) -> Option<String> {
        let url = self.site.build_search_url(query);

        let page = match session.open(&url).await {
            Ok(page) => page,
            Err(e) => {
                warn!("Failed to load search page {}: {:#}", url, e);
                return None;
            }
        };

        if let Some(path) = &self.screenshot_path {
            save_screenshot(page.as_ref(), path).await;
        }

        let html = match page
            .wait_for(&self.site.selectors.product_container, self.results_timeout)
            .await
        {
            Ok(()) => match page.html().await {
                Ok(html) => Some(html),
                Err(e) => {
                    warn!("Failed to read search page: {:#}", e);
                    None
                }
            },
            Err(e) => {
                warn!("Error waiting for results: {:#}", e);
                None
            }
        };

        if let Err(e) = page.close().await {
            debug!("Failed to close search page: {:#}", e);
        }

        html
    }
}

async fn read_title(session: &dyn Session, url: &str) -> Result<Option<String>> {
    let page = session.open(url).await?;
    let title = page.title().await;
    if let Err(e) = page.close().await {
        debug!("Failed to close page: {:#}", e);
    }
    title
}

async fn save_screenshot(page: &dyn BrowserPage, path: &Path) {
    match write_screenshot(page, path).await {
        Ok(()) => info!("Screenshot saved: {}", path.display()),
        Err(e) => warn!("Failed to save screenshot: {:#}", e),
    }
}

async fn write_screenshot(page: &dyn BrowserPage, path: &Path) -> Result<()> {
    let png = page.screenshot(true).await?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, png)
        .await
        .with_context(|| format!("Failed to write screenshot to {}", path.display()))
}
