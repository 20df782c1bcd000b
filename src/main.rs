use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

mod api;
mod browser;
mod config;
mod database;
mod models;
mod product_finder;
mod scraper;
mod traits;

use api::AppState;
use browser::ChromeBrowser;
use config::Config;
use database::Database;
use product_finder::ProductFinder;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    info!("Starting shopping scraper");

    let config = Config::from_env()?;

    let database = match &config.database_url {
        Some(url) => Some(Database::connect(url).await?),
        None => {
            warn!("DATABASE_URL not set - scraped products will not be persisted");
            None
        }
    };

    let browser = Arc::new(ChromeBrowser::start(&config.browser).await?);
    let scraper = scraper::Scraper::new(browser.clone(), &config);

    let state = AppState {
        finder: ProductFinder::new(scraper, database),
        liveness_url: Arc::from(config.liveness_url.as_str()),
        screenshot_path: config.screenshot_path.clone(),
    };

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("Listening on http://{}", config.bind_addr);

    let served = axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    browser.shutdown().await;
    served?;

    info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
