use anyhow::Result;
use tracing::{error, info};

use crate::database::Database;
use crate::models::ProductRecord;
use crate::scraper::Scraper;

#[derive(Clone)]
pub struct ProductFinder {
    scraper: Scraper,
    database: Option<Database>,
}

impl ProductFinder {
    pub fn new(scraper: Scraper, database: Option<Database>) -> Self {
        Self { scraper, database }
    }

    /// Scrape products for `query` and persist them when a database is configured.
    ///
    /// Persistence failures are logged and never reach the caller.
    pub async fn find_products(&self, query: &str) -> Result<Vec<ProductRecord>> {
        let products = self.scraper.search_products(query).await?;

        if let Some(database) = &self.database
            && !products.is_empty()
        {
            match database.save_products(query, &products).await {
                Ok(()) => info!("Data successfully inserted into the database"),
                Err(e) => error!("Error inserting data into the database: {:#}", e),
            }
        }

        Ok(products)
    }

    pub async fn page_title(&self, url: &str) -> Result<Option<String>> {
        self.scraper.page_title(url).await
    }
}
