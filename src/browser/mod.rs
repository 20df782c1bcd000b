//! Headless Chromium driven over the DevTools protocol.
//!
//! One browser process lives for the whole server run. Every scrape gets its
//! own browser context: cookies are installed into the context once, and each
//! page opened in it blocks image, stylesheet and script requests before it
//! navigates anywhere.

pub mod cookies;
#[cfg(test)]
pub mod fake;

use std::fmt::Display;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, CookieSameSite, SetBlockedUrLsParams, TimeSinceEpoch,
};
use chromiumoxide::cdp::browser_protocol::storage::SetCookiesParams;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::handler::Handler;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{BrowserConfig, Page};
use futures::{Stream, StreamExt};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::models::BrowserCookie;
use crate::traits::{Browser, BrowserPage, Session};

/// URL patterns dropped by every session page
pub const BLOCKED_RESOURCES: &[&str] = &[
    "*.png", "*.jpg", "*.jpeg", "*.gif", "*.svg", "*.webp", "*.css", "*.js",
];

const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// How to obtain a browser
#[derive(Debug, Clone)]
pub struct BrowserSettings {
    /// Chrome/Chromium binary; auto-detected when unset
    pub executable: Option<PathBuf>,
    pub headless: bool,
    /// DevTools endpoint of an already running browser (e.g. "ws://localhost:9222")
    pub remote_url: Option<String>,
    /// Deadline for a single DevTools command, navigation included
    pub request_timeout: Duration,
    pub blocked_resources: Vec<String>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            executable: None,
            headless: true,
            remote_url: None,
            request_timeout: Duration::from_secs(30),
            blocked_resources: BLOCKED_RESOURCES.iter().map(|p| (*p).to_string()).collect(),
        }
    }
}

/// A launched or connected Chromium instance
pub struct ChromeBrowser {
    browser: Arc<AsyncMutex<chromiumoxide::Browser>>,
    handler: Mutex<Option<JoinHandle<()>>>,
    blocked_resources: Vec<String>,
    owned: bool,
}

impl ChromeBrowser {
    /// Launch a local browser, or connect to `remote_url` when configured.
    pub async fn start(settings: &BrowserSettings) -> Result<Self> {
        if let Some(remote_url) = &settings.remote_url {
            return Self::connect_remote(remote_url, settings).await;
        }

        info!("Launching browser (headless={})", settings.headless);

        let mut builder = BrowserConfig::builder().request_timeout(settings.request_timeout);
        if let Some(executable) = &settings.executable {
            builder = builder.chrome_executable(executable);
        }
        // with_head means NOT headless
        if !settings.headless {
            builder = builder.with_head();
        }
        builder = builder
            .arg("--no-sandbox")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check");

        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build browser config: {}", e))?;

        let (browser, handler) = chromiumoxide::Browser::launch(config)
            .await
            .context("Failed to launch browser")?;

        Ok(Self::with_handler(browser, handler, settings, true))
    }

    async fn connect_remote(url: &str, settings: &BrowserSettings) -> Result<Self> {
        info!("Connecting to remote browser at {}", url);

        // The WebSocket endpoint is published on /json/version
        let http_url = url
            .replace("ws://", "http://")
            .replace("wss://", "https://");
        let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));

        let version: serde_json::Value = reqwest::Client::new()
            .get(&version_url)
            .timeout(settings.request_timeout)
            .send()
            .await
            .context("Failed to connect to remote browser")?
            .json()
            .await
            .context("Failed to parse browser version info")?;

        let ws_url = version
            .get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("No webSocketDebuggerUrl in response"))?;

        let (browser, handler) = chromiumoxide::Browser::connect(ws_url)
            .await
            .context("Failed to connect to remote browser")?;

        Ok(Self::with_handler(browser, handler, settings, false))
    }

    fn with_handler(
        browser: chromiumoxide::Browser,
        mut handler: Handler,
        settings: &BrowserSettings,
        owned: bool,
    ) -> Self {
        let handler = tokio::spawn(async move {
            drive_events(&mut handler).await;
        });

        Self {
            browser: Arc::new(AsyncMutex::new(browser)),
            handler: Mutex::new(Some(handler)),
            blocked_resources: settings.blocked_resources.clone(),
            owned,
        }
    }

    /// Close a browser we launched and stop the event loop.
    ///
    /// A remote browser is left running.
    pub async fn shutdown(&self) {
        if self.owned {
            info!("Closing browser");
            let mut browser = self.browser.lock().await;
            if let Err(e) = browser.close().await {
                debug!("Browser close returned: {}", e);
            }
            if let Err(e) = browser.wait().await {
                debug!("Browser process did not exit cleanly: {}", e);
            }
        }

        if let Ok(mut guard) = self.handler.lock()
            && let Some(handler) = guard.take()
        {
            handler.abort();
        }
    }
}

/// Poll the DevTools event stream until the connection goes away.
///
/// Messages that fail to decode are logged and skipped; the connection stays
/// usable after them. Returns how many events were handled.
async fn drive_events<S, E>(events: &mut S) -> usize
where
    S: Stream<Item = Result<(), E>> + Unpin,
    E: Display,
{
    let mut handled = 0;
    while let Some(event) = events.next().await {
        if let Err(e) = event {
            debug!("Browser event error: {}", e);
        }
        handled += 1;
    }
    warn!("Browser event stream closed");
    handled
}

fn cookie_param(cookie: &BrowserCookie) -> Option<CookieParam> {
    let mut builder = CookieParam::builder()
        .name(cookie.name.clone())
        .value(cookie.value.clone())
        .domain(cookie.domain.clone())
        .secure(cookie.secure)
        .http_only(cookie.http_only);
    if let Some(path) = &cookie.path {
        builder = builder.path(path.clone());
    }
    // Exports mark session cookies with a negative expiry
    if let Some(expires) = cookie.expires
        && expires >= 0.0
    {
        builder = builder.expires(TimeSinceEpoch::new(expires));
    }
    if let Some(same_site) = cookie.same_site.as_deref().and_then(same_site) {
        builder = builder.same_site(same_site);
    }

    match builder.build() {
        Ok(param) => Some(param),
        Err(e) => {
            warn!("Failed to build cookie {}: {}", cookie.name, e);
            None
        }
    }
}

fn same_site(value: &str) -> Option<CookieSameSite> {
    match value.to_ascii_lowercase().as_str() {
        "strict" => Some(CookieSameSite::Strict),
        "lax" => Some(CookieSameSite::Lax),
        "none" | "no_restriction" => Some(CookieSameSite::None),
        _ => None,
    }
}

#[async_trait]
impl Browser for ChromeBrowser {
    async fn new_session(&self, cookies: &[BrowserCookie]) -> Result<Box<dyn Session>> {
        let browser = self.browser.lock().await;
        let context_id = browser
            .execute(CreateBrowserContextParams::default())
            .await
            .context("Failed to create browser context")?
            .result
            .browser_context_id;
        debug!("Created browser context {:?}", context_id);

        let params: Vec<CookieParam> = cookies.iter().filter_map(cookie_param).collect();
        if !params.is_empty() {
            let count = params.len();
            let mut set_cookies = SetCookiesParams::new(params);
            set_cookies.browser_context_id = Some(context_id.clone());

            match browser.execute(set_cookies).await {
                Ok(_) => info!("Cookies loaded successfully ({})", count),
                Err(e) => warn!("Failed to install session cookies: {}", e),
            }
        }

        Ok(Box::new(ChromeSession {
            browser: Arc::clone(&self.browser),
            context_id,
            blocked_resources: self.blocked_resources.clone(),
        }))
    }
}

struct ChromeSession {
    browser: Arc<AsyncMutex<chromiumoxide::Browser>>,
    context_id: BrowserContextId,
    blocked_resources: Vec<String>,
}

#[async_trait]
impl Session for ChromeSession {
    async fn open(&self, url: &str) -> Result<Box<dyn BrowserPage>> {
        // Start blank so the blocking rules are in place before the real navigation
        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(self.context_id.clone())
            .build()
            .map_err(|e| anyhow::anyhow!("Invalid target params: {}", e))?;

        // Only page creation holds the lock; navigation runs unlocked
        let page = self
            .browser
            .lock()
            .await
            .new_page(target)
            .await
            .context("Failed to open page")?;

        if !self.blocked_resources.is_empty() {
            page.execute(SetBlockedUrLsParams::new(self.blocked_resources.clone()))
                .await
                .context("Failed to install resource blocking")?;
        }

        let navigated = page.goto(url).await.map(|_| ());
        if let Err(e) = navigated {
            let _ = page.close().await;
            return Err(e).with_context(|| format!("Failed to navigate to {url}"));
        }

        Ok(Box::new(ChromePage { page }))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.browser
            .lock()
            .await
            .execute(DisposeBrowserContextParams::new(self.context_id.clone()))
            .await
            .context("Failed to dispose browser context")?;
        Ok(())
    }
}

struct ChromePage {
    page: Page,
}

#[async_trait]
impl BrowserPage for ChromePage {
    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<()> {
        let appeared = async {
            while self.page.find_element(selector).await.is_err() {
                tokio::time::sleep(SELECTOR_POLL_INTERVAL).await;
            }
        };

        tokio::time::timeout(timeout, appeared)
            .await
            .map_err(|_| anyhow::anyhow!("Timed out after {:?} waiting for {}", timeout, selector))
    }

    async fn html(&self) -> Result<String> {
        Ok(self.page.content().await?)
    }

    async fn title(&self) -> Result<Option<String>> {
        Ok(self.page.get_title().await?)
    }

    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>> {
        let params = ScreenshotParams::builder().full_page(full_page).build();
        self.page
            .screenshot(params)
            .await
            .context("Failed to capture screenshot")
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.page.close().await?;
        Ok(())
    }
}
