//! Traits and interfaces for browser-driven scraping

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use scraper::Selector;

use crate::models::BrowserCookie;

/// Configuration for the shopping site being scraped
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    /// Base URL used to resolve relative product links
    pub base_url: String,
    /// Search URL pattern with {query} placeholder
    pub search_url_pattern: String,
    /// CSS selectors for extracting data
    pub selectors: SiteSelectors,
    /// Which product links get a detail page fetch
    pub link_policy: LinkPolicy,
    /// Maximum number of result nodes read per search
    pub result_cap: usize,
}

impl ScraperConfig {
    /// Process a search query to create the search URL
    ///
    /// # Arguments
    /// * `query` - The free-text query to search for
    ///
    /// # Returns
    /// * `String` - The complete search URL
    pub fn build_search_url(&self, query: &str) -> String {
        let encoded = urlencoding::encode(query);
        self.search_url_pattern.replace("{query}", &encoded)
    }

    /// Convert a relative product link to an absolute URL
    pub fn resolve_link(&self, href: &str) -> String {
        if href.starts_with("http") {
            href.to_string()
        } else {
            format!("{}{}", self.base_url, href)
        }
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.google.com".to_string(),
            search_url_pattern: "https://www.google.com/search?q={query}&tbm=shop".to_string(),
            selectors: SiteSelectors::default(),
            link_policy: LinkPolicy::Any,
            result_cap: 5,
        }
    }
}

/// CSS selectors for different parts of a product listing
#[derive(Debug, Clone)]
pub struct SiteSelectors {
    /// Container selector for individual products
    pub product_container: String,
    /// Title selector within product container
    pub title: String,
    /// Price selector within product container
    pub price: String,
    /// Product link selector within product container
    pub link: String,
    /// Image selector within product container
    pub image: String,
    /// Rating text selector within product container
    pub rating: String,
    /// Description selector on the product detail page
    pub description: String,
}

impl SiteSelectors {
    /// Fail early on a selector that would never match anything.
    pub fn validate(&self) -> Result<()> {
        for (name, selector) in [
            ("product container", &self.product_container),
            ("title", &self.title),
            ("price", &self.price),
            ("link", &self.link),
            ("image", &self.image),
            ("rating", &self.rating),
            ("description", &self.description),
        ] {
            parse_selector(name, selector)?;
        }
        Ok(())
    }
}

impl Default for SiteSelectors {
    fn default() -> Self {
        Self {
            product_container: "div.sh-dgr__content".to_string(),
            title: "h3.tAxDx".to_string(),
            price: "span.a8Pemb".to_string(),
            link: "a.xCpuod".to_string(),
            image: "img".to_string(),
            rating: "span.Rsc7Yb".to_string(),
            description: "div.Zh8lCd".to_string(),
        }
    }
}

pub(crate) fn parse_selector(name: &str, selector: &str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|e| anyhow::anyhow!("Failed to parse {} selector: {:?}", name, e))
}

/// Decides whether a product link is worth a detail page fetch
#[derive(Debug, Clone, PartialEq)]
pub enum LinkPolicy {
    /// Any absolute or relative link
    Any,
    /// Only links containing the given path fragment
    PathContains(String),
}

impl LinkPolicy {
    pub fn accepts(&self, link: &str) -> bool {
        if link.trim().is_empty() {
            return false;
        }
        match self {
            Self::Any => true,
            Self::PathContains(fragment) => link.contains(fragment.as_str()),
        }
    }
}

/// A running browser that can hand out isolated sessions
#[async_trait]
pub trait Browser: Send + Sync {
    /// Create a session carrying the given cookies
    ///
    /// Cookies are applied once to the session, so every page opened
    /// from it shares them.
    async fn new_session(&self, cookies: &[BrowserCookie]) -> Result<Box<dyn Session>>;
}

/// An isolated browser context shared by all pages of one scrape
#[async_trait]
pub trait Session: Send + Sync {
    /// Open a new page and navigate it to `url`
    async fn open(&self, url: &str) -> Result<Box<dyn BrowserPage>>;

    /// Dispose of the session and every page still open in it
    async fn close(self: Box<Self>) -> Result<()>;
}

/// A single navigated page
#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// Wait until `selector` matches an element, up to `timeout`
    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<()>;

    /// Rendered HTML of the page
    async fn html(&self) -> Result<String>;

    async fn title(&self) -> Result<Option<String>>;

    /// PNG screenshot of the page
    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>>;

    async fn close(self: Box<Self>) -> Result<()>;
}
