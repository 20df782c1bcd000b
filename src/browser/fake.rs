//! Scripted in-memory browser used by the tests

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use scraper::{Html, Selector};

use crate::models::BrowserCookie;
use crate::traits::{Browser, BrowserPage, Session};

/// Canned response for one URL
#[derive(Debug, Clone, Default)]
pub struct FakePage {
    html: String,
    title: Option<String>,
    delay: Option<Duration>,
    fail: bool,
}

impl FakePage {
    pub fn html(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn titled(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    /// Make navigation take `delay` before it settles
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[derive(Debug, Default)]
struct Log {
    sessions: Vec<Vec<BrowserCookie>>,
    opened: Vec<(usize, String)>,
    waits: Vec<(String, Duration)>,
    closed_sessions: usize,
}

/// Serves fixture pages by URL and records every session and page it hands out
#[derive(Clone, Default)]
pub struct FakeBrowser {
    pages: HashMap<String, FakePage>,
    log: Arc<Mutex<Log>>,
    refuse_sessions: bool,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, page: FakePage) -> Self {
        self.pages.insert(url.to_string(), page);
        self
    }

    /// Every `new_session` call fails, as if the browser had crashed
    pub fn refusing_sessions(mut self) -> Self {
        self.refuse_sessions = true;
        self
    }

    pub fn opened_urls(&self) -> Vec<String> {
        self.log().opened.iter().map(|(_, url)| url.clone()).collect()
    }

    /// Pages opened, tagged with the id of the session that opened them
    pub fn opened(&self) -> Vec<(usize, String)> {
        self.log().opened.clone()
    }

    /// Cookies handed to each session, in creation order
    pub fn sessions(&self) -> Vec<Vec<BrowserCookie>> {
        self.log().sessions.clone()
    }

    /// Selectors waited for, with the timeout each wait was given
    pub fn waits(&self) -> Vec<(String, Duration)> {
        self.log().waits.clone()
    }

    pub fn closed_sessions(&self) -> usize {
        self.log().closed_sessions
    }

    fn log(&self) -> std::sync::MutexGuard<'_, Log> {
        self.log.lock().unwrap()
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn new_session(&self, cookies: &[BrowserCookie]) -> Result<Box<dyn Session>> {
        if self.refuse_sessions {
            bail!("browser is not running");
        }

        let id = {
            let mut log = self.log();
            log.sessions.push(cookies.to_vec());
            log.sessions.len() - 1
        };

        Ok(Box::new(FakeSession {
            id,
            pages: self.pages.clone(),
            log: Arc::clone(&self.log),
        }))
    }
}

struct FakeSession {
    id: usize,
    pages: HashMap<String, FakePage>,
    log: Arc<Mutex<Log>>,
}

#[async_trait]
impl Session for FakeSession {
    async fn open(&self, url: &str) -> Result<Box<dyn BrowserPage>> {
        self.log
            .lock()
            .unwrap()
            .opened
            .push((self.id, url.to_string()));

        let Some(page) = self.pages.get(url).cloned() else {
            bail!("net::ERR_NAME_NOT_RESOLVED at {url}");
        };
        if let Some(delay) = page.delay {
            tokio::time::sleep(delay).await;
        }
        if page.fail {
            bail!("navigation to {url} failed");
        }

        Ok(Box::new(FakePageHandle {
            page,
            log: Arc::clone(&self.log),
        }))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.log.lock().unwrap().closed_sessions += 1;
        Ok(())
    }
}

struct FakePageHandle {
    page: FakePage,
    log: Arc<Mutex<Log>>,
}

#[async_trait]
impl BrowserPage for FakePageHandle {
    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<()> {
        self.log
            .lock()
            .unwrap()
            .waits
            .push((selector.to_string(), timeout));

        // Absent selectors fail at once instead of sleeping out the timeout
        let found = {
            let selector = Selector::parse(selector)
                .map_err(|e| anyhow::anyhow!("bad selector: {:?}", e))?;
            Html::parse_document(&self.page.html)
                .select(&selector)
                .next()
                .is_some()
        };

        if found {
            Ok(())
        } else {
            bail!("timed out after {:?} waiting for {selector}", timeout)
        }
    }

    async fn html(&self) -> Result<String> {
        Ok(self.page.html.clone())
    }

    async fn title(&self) -> Result<Option<String>> {
        Ok(self.page.title.clone())
    }

    async fn screenshot(&self, _full_page: bool) -> Result<Vec<u8>> {
        Ok(b"\x89PNG\r\n\x1a\nfake".to_vec())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
