//! Product detail page fetching and merging descriptions back into records

use std::time::Duration;

use futures::StreamExt;
use futures::stream;
use tracing::{debug, info, warn};

use crate::models::{Field, ProductRecord};
use crate::scraper::extract::extract_description;
use crate::traits::{ScraperConfig, Session};

/// Bounds applied to the detail page fan-out
#[derive(Debug, Clone, Copy)]
pub struct DetailLimits {
    /// Maximum number of detail pages open at once
    pub concurrency: usize,
    /// Deadline for each page open and each page read
    pub timeout: Duration,
}

/// Fetch a single product description, substituting the sentinel on any failure
pub async fn fetch_description(
    session: &dyn Session,
    url: &str,
    selector: &str,
    timeout: Duration,
) -> Field<String> {
    debug!("Scraping product URL: {}", url);

    let page = match tokio::time::timeout(timeout, session.open(url)).await {
        Ok(Ok(page)) => page,
        Ok(Err(e)) => {
            warn!("Failed to open product page {}: {:#}", url, e);
            return Field::Unavailable;
        }
        Err(_) => {
            warn!("Timed out opening product page {}", url);
            return Field::Unavailable;
        }
    };

    let description = match tokio::time::timeout(timeout, page.html()).await {
        Ok(Ok(html)) => extract_description(&html, selector).unwrap_or_else(|e| {
            warn!("Failed to read description from {}: {:#}", url, e);
            Field::Unavailable
        }),
        Ok(Err(e)) => {
            warn!("Failed to read product page {}: {:#}", url, e);
            Field::Unavailable
        }
        Err(_) => {
            warn!("Timed out reading product page {}", url);
            Field::Unavailable
        }
    };

    if let Err(e) = page.close().await {
        debug!("Failed to close product page {}: {:#}", url, e);
    }

    description
}

/// Fetch descriptions for every record with an acceptable link and merge them in.
///
/// Each fetch carries the index of the record it belongs to, so records that
/// were skipped never shift results onto their neighbours.
pub async fn attach_descriptions(
    session: &dyn Session,
    config: &ScraperConfig,
    limits: DetailLimits,
    mut records: Vec<ProductRecord>,
) -> Vec<ProductRecord> {
    let jobs: Vec<(usize, String)> = records
        .iter()
        .enumerate()
        .filter_map(|(index, record)| {
            let link = record.link.value()?;
            config
                .link_policy
                .accepts(link)
                .then(|| (index, config.resolve_link(link)))
        })
        .collect();

    if jobs.is_empty() {
        return records;
    }

    info!(
        "Fetching {} product detail pages (up to {} at once)",
        jobs.len(),
        limits.concurrency
    );

    let selector = config.selectors.description.as_str();
    let results: Vec<(usize, Field<String>)> = stream::iter(jobs)
        .map(|(index, url)| async move {
            let description = fetch_description(session, &url, selector, limits.timeout).await;
            (index, description)
        })
        .buffer_unordered(limits.concurrency.max(1))
        .collect()
        .await;

    for (index, description) in results {
        records[index].description = description;
    }

    records
}
