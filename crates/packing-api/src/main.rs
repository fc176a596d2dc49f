mod config;

use anyhow::Context;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use packing_core::{
    build_manifest, record_from_values, ManifestRow, Packer, PackingResult, RawRecord,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::ApiConfig;

#[derive(Clone)]
struct AppState {
    packer: Arc<Packer>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting Packing API");

    let api_config = ApiConfig::from_env();
    let reference = api_config.load_reference()?;
    let engine_config = api_config.load_engine_config()?;
    let packer = Packer::new(reference, engine_config)?;
    info!(
        fee_rules = packer.reference().fee_table.len(),
        catalog_entries = packer.reference().catalog.len(),
        "Reference data loaded"
    );

    let state = AppState {
        packer: Arc::new(packer),
    };

    // Build application
    let app = Router::new()
        .route("/api/health", get(health_check))
        .route("/api/pack", post(pack))
        .route("/api/manifest/:view", post(manifest))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        );

    let addr = api_config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("API server listening on http://{}", addr);
    info!("Try: curl http://localhost:{}/api/health", addr.port());

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "packing-api",
        "version": env!("CARGO_PKG_VERSION"),
        "feeRules": state.packer.reference().fee_table.len(),
        "catalogEntries": state.packer.reference().catalog.len(),
    }))
}

fn into_records(rows: Vec<BTreeMap<String, Value>>) -> Vec<RawRecord> {
    rows.into_iter().map(record_from_values).collect()
}

/// Runs a packing pass off the async workers; the searches are CPU-bound.
async fn run_pack(packer: Arc<Packer>, records: Vec<RawRecord>) -> Result<PackingResult, AppError> {
    let result = tokio::task::spawn_blocking(move || packer.pack_records(&records))
        .await
        .context("Packing task failed")?;
    Ok(result)
}

/// Packs the posted order records
async fn pack(
    State(state): State<AppState>,
    Json(rows): Json<Vec<BTreeMap<String, Value>>>,
) -> Result<Json<PackingResult>, AppError> {
    info!("Received packing request with {} records", rows.len());

    let result = run_pack(state.packer, into_records(rows)).await?;

    info!(
        "Packing complete: {} boxes, {} unresolved fees",
        result.summary.boxes, result.summary.unresolved_fees
    );

    Ok(Json(result))
}

/// Packs the posted records and renders one manifest view
async fn manifest(
    State(state): State<AppState>,
    Path(view): Path<String>,
    Json(rows): Json<Vec<BTreeMap<String, Value>>>,
) -> Result<Json<Vec<ManifestRow>>, AppError> {
    let Some(manifest_view) = state.packer.config().view(&view).cloned() else {
        return Err(AppError::bad_request(format!(
            "Unknown manifest view '{}'",
            view
        )));
    };
    info!("Received manifest request for view '{}' with {} records", view, rows.len());

    let result = run_pack(Arc::clone(&state.packer), into_records(rows)).await?;
    let manifest_rows = build_manifest(&result, &manifest_view, state.packer.config());

    Ok(Json(manifest_rows))
}

/// Application error type
struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl AppError {
    fn bad_request(message: impl Into<String>) -> Self {
        AppError {
            status: StatusCode::BAD_REQUEST,
            error: anyhow::anyhow!(message.into()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: err,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("Request error: {}", self.error);

        (
            self.status,
            Json(json!({
                "error": self.error.to_string(),
            })),
        )
            .into_response()
    }
}
