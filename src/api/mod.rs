//! HTTP API over the product scraper.
//!
//! Routes:
//!   GET /scrape/?query=<text>  product records as JSON, 404 when nothing was found
//!   GET /test                  title of the liveness page
//!   GET /view/                 screenshot of the most recent search page

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::models::ProductRecord;
use crate::product_finder::ProductFinder;

#[derive(Clone)]
pub struct AppState {
    pub finder: ProductFinder,
    pub liveness_url: Arc<str>,
    pub screenshot_path: Option<PathBuf>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/scrape/", get(scrape_handler))
        .route("/test", get(liveness_handler))
        .route("/view/", get(view_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        error!("Request failed: {:#}", e);
        Self::Internal(format!("{e:#}"))
    }
}

#[derive(Debug, Deserialize)]
pub struct ScrapeParams {
    query: String,
}

async fn scrape_handler(
    State(state): State<AppState>,
    Query(params): Query<ScrapeParams>,
) -> Result<Json<Vec<ProductRecord>>, ApiError> {
    let products = state.finder.find_products(&params.query).await?;
    if products.is_empty() {
        return Err(ApiError::NotFound("No products found".to_string()));
    }
    Ok(Json(products))
}

#[derive(Serialize)]
struct LivenessBody {
    title: String,
}

async fn liveness_handler(State(state): State<AppState>) -> Result<Json<LivenessBody>, ApiError> {
    let title = state.finder.page_title(&state.liveness_url).await?;
    info!("Liveness page title: {:?}", title);
    Ok(Json(LivenessBody {
        title: title.unwrap_or_default(),
    }))
}

async fn view_handler(State(state): State<AppState>) -> Result<Response, ApiError> {
    let not_found = || ApiError::NotFound("No screenshot captured yet".to_string());

    let path = state.screenshot_path.as_ref().ok_or_else(not_found)?;
    let png = match tokio::fs::read(path).await {
        Ok(png) => png,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
        Err(e) => return Err(ApiError::Internal(format!("Failed to read screenshot: {e}"))),
    };

    Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tempfile::{TempDir, tempdir};
    use tower::ServiceExt;

    use crate::browser::fake::{FakeBrowser, FakePage};
    use crate::config::Config;
    use crate::scraper::Scraper;
    use crate::scraper::extract::fixtures::{detail_page, product_node, results_page};

    const SEARCH_URL: &str = "https://www.google.com/search?q=kettle&tbm=shop";

    fn setup_test_app(browser: FakeBrowser) -> (Router, TempDir) {
        let dir = tempdir().unwrap();
        let config = Config {
            cookies_file: None,
            screenshot_path: Some(dir.path().join("search.png")),
            ..Config::default()
        };
        let scraper = Scraper::new(Arc::new(browser), &config);

        let state = AppState {
            finder: ProductFinder::new(scraper, None),
            liveness_url: Arc::from(config.liveness_url.as_str()),
            screenshot_path: config.screenshot_path.clone(),
        };
        (router(state), dir)
    }

    async fn send(app: Router, uri: &str) -> Response {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn kettle_shop() -> FakeBrowser {
        FakeBrowser::new()
            .with_page(
                SEARCH_URL,
                FakePage::html(results_page(&[
                    product_node("Gooseneck kettle", Some("/shopping/product/1"), Some("4,8 (2,031)")),
                    product_node("Stovetop kettle", None, None),
                ])),
            )
            .with_page(
                "https://www.google.com/shopping/product/1",
                FakePage::html(detail_page("Variable temperature")),
            )
    }

    #[tokio::test]
    async fn scrape_returns_products() {
        let (app, _dir) = setup_test_app(kettle_shop());

        let response = send(app, "/scrape/?query=kettle").await;
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(response).await;
        let products = json.as_array().unwrap();
        assert_eq!(products.len(), 2);
        assert_eq!(products[0]["title"], "Gooseneck kettle");
        assert_eq!(products[0]["rating"], 4.8);
        assert_eq!(products[0]["review_count"], 2031);
        assert_eq!(products[0]["description"], "Variable temperature");
        assert_eq!(products[1]["rating"], "N/A");
        assert_eq!(products[1]["review_count"], "N/A");
        assert_eq!(products[1]["description"], "N/A");
    }

    #[tokio::test]
    async fn scrape_without_results_is_not_found() {
        let browser = FakeBrowser::new().with_page(
            SEARCH_URL,
            FakePage::html("<html><body>unusual traffic</body></html>"),
        );
        let (app, _dir) = setup_test_app(browser);

        let response = send(app, "/scrape/?query=kettle").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["detail"], "No products found");
    }

    #[tokio::test]
    async fn scrape_failure_is_internal_error() {
        let (app, _dir) = setup_test_app(FakeBrowser::new().refusing_sessions());

        let response = send(app, "/scrape/?query=kettle").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let detail = json_body(response).await["detail"].as_str().unwrap().to_string();
        assert!(detail.contains("browser"));
    }

    #[tokio::test]
    async fn liveness_reports_page_title() {
        let browser = FakeBrowser::new().with_page(
            "https://www.google.com",
            FakePage::html("<html></html>").titled("Google"),
        );
        let (app, _dir) = setup_test_app(browser);

        let response = send(app, "/test").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["title"], "Google");
    }

    #[tokio::test]
    async fn view_before_any_scrape_is_not_found() {
        let (app, _dir) = setup_test_app(kettle_shop());

        let response = send(app, "/view/").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn view_serves_latest_screenshot() {
        let (app, _dir) = setup_test_app(kettle_shop());

        let response = send(app.clone(), "/scrape/?query=kettle").await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(app, "/view/").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(body.starts_with(b"\x89PNG"));
    }
}
