use anyhow::Result;
use chrono::Utc;
use sqlx::{Sqlite, SqlitePool, migrate::MigrateDatabase};
use tracing::info;

use crate::models::ProductRecord;

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn connect(db_url: &str) -> Result<Self> {
        // Create database file if it doesn't exist
        if !Sqlite::database_exists(db_url).await.unwrap_or(false) {
            info!("Creating database file");
            Sqlite::create_database(db_url).await?;
        }

        let pool = SqlitePool::connect(db_url).await?;

        // Run migrations
        info!("Running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("Database initialized successfully");
        Ok(Self { pool })
    }

    /// Insert one row per product; either the whole batch lands or none of it.
    pub async fn save_products(&self, query: &str, products: &[ProductRecord]) -> Result<()> {
        let scraped_at = Utc::now();
        let mut tx = self.pool.begin().await?;

        for (position, product) in products.iter().enumerate() {
            sqlx::query(
                r"
                INSERT INTO products
                    (query, position, title, price, link, image, rating, review_count, description, scraped_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )
            .bind(query)
            .bind(i64::try_from(position)?)
            .bind(product.title.value().map(String::as_str))
            .bind(product.price.value().map(String::as_str))
            .bind(product.link.value().map(String::as_str))
            .bind(product.image.value().map(String::as_str))
            .bind(product.rating.value().copied())
            .bind(product.review_count.value().copied())
            .bind(product.description.value().map(String::as_str))
            .bind(scraped_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!("Saved {} products for {:?}", products.len(), query);
        Ok(())
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
        }
    }
}
