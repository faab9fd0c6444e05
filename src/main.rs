mod artifacts;
mod browser;
mod config;
mod description;
mod extract;
mod http;
mod llm;
mod metrics;
mod models;
mod pipeline;
#[cfg(test)]
mod testing;

use artifacts::{ArtifactSink, FsArtifactSink, NoopArtifactSink};
use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use browser::ChromiumBrowser;
use config::ScraperConfig;
use eyre::WrapErr;
use llm::{LlmClient, LlmConfig};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use models::{ApiError, ProductRecord, ScrapeQuery};
use pipeline::{Pipeline, PipelineError};
use serde_json::json;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{Instrument, error, info, info_span};
use tracing_subscriber::{EnvFilter, fmt};
use uuid::Uuid;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(target: "scraper.api", "server crashed: {err:?}");
    }
}

async fn run() -> eyre::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = ScraperConfig::from_env();
    let llm = LlmClient::new(LlmConfig::from_env());
    info!(target: "scraper.api", model = llm.model(), "completion client ready");

    let browser = ChromiumBrowser::launch(config.page_timeout + Duration::from_secs(10))
        .await
        .wrap_err("failed to launch headless chromium")?;

    let sink: Arc<dyn ArtifactSink> = if config.artifacts_enabled {
        Arc::new(FsArtifactSink::new(config.artifact_dir.clone()))
    } else {
        Arc::new(NoopArtifactSink)
    };
    let pipeline = Pipeline::new(config, Arc::new(llm), Arc::new(browser), sink);

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .wrap_err("failed to install prometheus recorder")?;
    let openapi: serde_json::Value = serde_yaml::from_str(include_str!("../docs/openapi.yaml"))
        .unwrap_or_else(|_| json!({"openapi": "3.0.3"}));

    let app = router(AppState {
        pipeline,
        openapi: Arc::new(openapi),
        prometheus_handle,
    });

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(3000);
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    info!(target: "scraper.api", "listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app.into_make_service())
        .await
        .wrap_err("server error")?;
    Ok(())
}

#[derive(Clone)]
struct AppState {
    pipeline: Pipeline,
    openapi: Arc<serde_json::Value>,
    prometheus_handle: PrometheusHandle,
}

fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods(Any)
        .allow_origin(Any);

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/openapi.json", get(openapi_json))
        .route("/scrape", get(scrape))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Health and readiness check.
///
/// - Method: `GET`
/// - Path: `/health`
///
/// Returns a small JSON payload with `status` and `service`.
async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "ebay-scraper-rs",
    }))
}

async fn openapi_json(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json((*state.openapi).clone())
}

/// Prometheus exposition of request counts, stage durations and extracted
/// record counts. Guarded by `X-Metrics-Key` when `METRICS_KEY` is set.
async fn metrics_endpoint(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Ok(secret) = std::env::var("METRICS_KEY") {
        let presented = headers
            .get("X-Metrics-Key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if presented != secret {
            return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
        }
    }
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.prometheus_handle.render(),
    )
        .into_response()
}

/// Scrape one search-results page and describe every product on it.
///
/// - Method: `GET`
/// - Path: `/scrape?keyword=<string>&page=<integer>`
/// - Response: JSON array of `ProductRecord`
///
/// `keyword` falls back to the configured default, `page` to `1`.
async fn scrape(
    State(state): State<AppState>,
    Query(query): Query<ScrapeQuery>,
) -> Result<Json<Vec<ProductRecord>>, AppError> {
    crate::metrics::inc_requests("/scrape");
    let keyword = query.keyword_or(&state.pipeline.config.default_keyword);
    let page = query.page_number();
    let span = info_span!(
        target: "scraper.api",
        "scrape",
        request_id = %Uuid::new_v4(),
        keyword = %keyword,
        page
    );
    let products = state.pipeline.run(&keyword, page).instrument(span).await?;
    Ok(Json(products))
}

#[derive(Debug)]
enum AppError {
    Pipeline(PipelineError),
}

impl From<PipelineError> for AppError {
    fn from(value: PipelineError) -> Self {
        Self::Pipeline(value)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Pipeline(err) => {
                error!(
                    target: "scraper.api",
                    stage = err.stage(),
                    detail = err.detail(),
                    "scrape request failed"
                );
                let payload = ApiError {
                    error: "Scraping failed".into(),
                };
                (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
            }
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let _ = fmt().with_env_filter(filter).try_init();
}
