//! # Runtime Configuration
//!
//! Everything the server needs is read once at startup into a [`Config`] and
//! handed to the components that use it. Values come from environment
//! variables (a `.env` file is loaded first by `main`).
//!
//! | Variable                        | Default                           |
//! |---------------------------------|-----------------------------------|
//! | `SHOPPING_BIND_ADDR`            | `0.0.0.0:8000`                    |
//! | `SHOPPING_COOKIES_FILE`         | `cookies.json`                    |
//! | `SHOPPING_SCREENSHOT_PATH`      | `search_results_screenshot.png`   |
//! | `DATABASE_URL`                  | unset, persistence disabled       |
//! | `SHOPPING_RESULT_CAP`           | `5`                               |
//! | `SHOPPING_RESULTS_TIMEOUT_SECS` | `60`                              |
//! | `SHOPPING_FETCH_TIMEOUT_SECS`   | `30`                              |
//! | `SHOPPING_DETAIL_CONCURRENCY`   | `10`                              |
//! | `SHOPPING_DETAIL_LINK_FILTER`   | unset, every link is followed     |
//! | `SHOPPING_LIVENESS_URL`         | `https://www.google.com`          |
//! | `CHROME_EXECUTABLE`             | unset, auto-detected              |
//! | `CHROME_HEADLESS`               | `true`                            |
//! | `CHROME_REMOTE_URL`             | unset, a local browser is launched|
//! | `CHROME_REQUEST_TIMEOUT_SECS`   | `30`                              |
//!
//! `SHOPPING_FETCH_TIMEOUT_SECS` bounds each product detail fetch.
//! `CHROME_REQUEST_TIMEOUT_SECS` bounds every single DevTools command,
//! including the navigation to the search page.
//! Setting `SHOPPING_COOKIES_FILE` or `SHOPPING_SCREENSHOT_PATH` to an empty
//! string disables cookie loading or screenshot capture.

use std::fmt::Display;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::browser::BrowserSettings;
use crate::scraper::details::DetailLimits;
use crate::traits::{LinkPolicy, ScraperConfig};

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub cookies_file: Option<PathBuf>,
    pub screenshot_path: Option<PathBuf>,
    pub database_url: Option<String>,
    /// How long to wait for the results container to appear
    pub results_timeout: Duration,
    pub detail: DetailLimits,
    /// Page fetched by the liveness endpoint
    pub liveness_url: String,
    pub site: ScraperConfig,
    pub browser: BrowserSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            cookies_file: Some(PathBuf::from("cookies.json")),
            screenshot_path: Some(PathBuf::from("search_results_screenshot.png")),
            database_url: None,
            results_timeout: Duration::from_secs(60),
            detail: DetailLimits {
                concurrency: 10,
                timeout: Duration::from_secs(30),
            },
            liveness_url: "https://www.google.com".to_string(),
            site: ScraperConfig::default(),
            browser: BrowserSettings::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key/value source, starting from the defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(addr) = parse_var(&lookup, "SHOPPING_BIND_ADDR")? {
            config.bind_addr = addr;
        }
        if let Some(path) = lookup("SHOPPING_COOKIES_FILE") {
            config.cookies_file = non_empty(path).map(PathBuf::from);
        }
        if let Some(path) = lookup("SHOPPING_SCREENSHOT_PATH") {
            config.screenshot_path = non_empty(path).map(PathBuf::from);
        }
        config.database_url = lookup("DATABASE_URL").and_then(non_empty);

        if let Some(cap) = parse_var::<usize>(&lookup, "SHOPPING_RESULT_CAP")? {
            anyhow::ensure!(cap > 0, "SHOPPING_RESULT_CAP must be at least 1");
            config.site.result_cap = cap;
        }
        if let Some(secs) = parse_var(&lookup, "SHOPPING_RESULTS_TIMEOUT_SECS")? {
            config.results_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var(&lookup, "SHOPPING_FETCH_TIMEOUT_SECS")? {
            config.detail.timeout = Duration::from_secs(secs);
        }
        if let Some(concurrency) = parse_var::<usize>(&lookup, "SHOPPING_DETAIL_CONCURRENCY")? {
            anyhow::ensure!(
                concurrency > 0,
                "SHOPPING_DETAIL_CONCURRENCY must be at least 1"
            );
            config.detail.concurrency = concurrency;
        }
        if let Some(fragment) = lookup("SHOPPING_DETAIL_LINK_FILTER").and_then(non_empty) {
            config.site.link_policy = LinkPolicy::PathContains(fragment);
        }
        if let Some(url) = lookup("SHOPPING_LIVENESS_URL").and_then(non_empty) {
            config.liveness_url = url;
        }

        config.browser.executable = lookup("CHROME_EXECUTABLE")
            .and_then(non_empty)
            .map(PathBuf::from);
        if let Some(headless) = parse_var(&lookup, "CHROME_HEADLESS")? {
            config.browser.headless = headless;
        }
        config.browser.remote_url = lookup("CHROME_REMOTE_URL").and_then(non_empty);
        if let Some(secs) = parse_var(&lookup, "CHROME_REQUEST_TIMEOUT_SECS")? {
            config.browser.request_timeout = Duration::from_secs(secs);
        }

        config.site.selectors.validate()?;
        Ok(config)
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display + Send + Sync + 'static,
{
    lookup(key)
        .and_then(non_empty)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| anyhow::anyhow!("{e}"))
                .with_context(|| format!("Invalid value {raw:?} for {key}"))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.bind_addr.port(), 8000);
        assert_eq!(config.site.result_cap, 5);
        assert_eq!(config.results_timeout, Duration::from_secs(60));
        assert_eq!(config.site.link_policy, LinkPolicy::Any);
        assert_eq!(config.cookies_file, Some(PathBuf::from("cookies.json")));
        assert!(config.database_url.is_none());
        assert!(config.browser.headless);
    }

    #[test]
    fn overrides_from_environment() {
        let config = config_from(&[
            ("SHOPPING_BIND_ADDR", "127.0.0.1:9000"),
            ("SHOPPING_RESULT_CAP", "10"),
            ("SHOPPING_FETCH_TIMEOUT_SECS", "12"),
            ("SHOPPING_DETAIL_LINK_FILTER", "/shopping/product/"),
            ("SHOPPING_SCREENSHOT_PATH", ""),
            ("DATABASE_URL", "sqlite:products.db"),
            ("CHROME_HEADLESS", "false"),
        ])
        .unwrap();

        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:9000");
        assert_eq!(config.site.result_cap, 10);
        assert_eq!(config.detail.timeout, Duration::from_secs(12));
        assert_eq!(config.browser.request_timeout, Duration::from_secs(30));
        assert_eq!(
            config.site.link_policy,
            LinkPolicy::PathContains("/shopping/product/".to_string())
        );
        assert!(config.screenshot_path.is_none());
        assert_eq!(config.database_url.as_deref(), Some("sqlite:products.db"));
        assert!(!config.browser.headless);
    }

    #[test]
    fn browser_command_timeout_is_separate_from_detail_timeout() {
        let config = config_from(&[("CHROME_REQUEST_TIMEOUT_SECS", "45")]).unwrap();

        assert_eq!(config.browser.request_timeout, Duration::from_secs(45));
        assert_eq!(config.detail.timeout, Duration::from_secs(30));
    }

    #[test]
    fn rejects_malformed_values() {
        let err = config_from(&[("SHOPPING_RESULT_CAP", "many")]).unwrap_err();
        assert!(format!("{err:#}").contains("SHOPPING_RESULT_CAP"));

        assert!(config_from(&[("SHOPPING_DETAIL_CONCURRENCY", "0")]).is_err());
        assert!(config_from(&[("CHROME_HEADLESS", "sometimes")]).is_err());
    }
}
