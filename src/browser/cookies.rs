//! Cookie loading for browser sessions.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::models::BrowserCookie;

/// Load session cookies from a JSON export.
///
/// A missing or unreadable file is not fatal: the scrape runs without cookies.
pub async fn load_cookies(path: &Path) -> Vec<BrowserCookie> {
    match read_cookies(path).await {
        Ok(cookies) => {
            info!("Loaded {} cookies from {:?}", cookies.len(), path);
            cookies
        }
        Err(e) => {
            warn!("Error loading cookies: {:#}", e);
            Vec::new()
        }
    }
}

async fn read_cookies(path: &Path) -> Result<Vec<BrowserCookie>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read cookies file {path:?}"))?;
    let cookies: Vec<BrowserCookie> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse cookies file {path:?}"))?;

    Ok(cookies
        .into_iter()
        .filter(|cookie| {
            let usable = !cookie.name.is_empty() && !cookie.domain.is_empty();
            if !usable {
                debug!("Skipping cookie without name or domain");
            }
            usable
        })
        .collect())
}
