//! HTTP handlers
//!
//! Provides the frontend config, flows and health endpoints.

pub mod csv;
pub mod frontend_config;
pub mod loki;
pub mod response;

use crate::handler::csv::{CsvFormatter, FlowCsvFormatter};
use crate::handler::frontend_config::FrontendConfigHandler;
use crate::handler::loki::{get_flows, FlowsQuery, LokiBackend};
use crate::handler::response::ResponseBuffer;
use axum::{
    extract::{Query, State},
    response::Response,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

/// API state shared across handlers
#[derive(Clone)]
pub struct ApiState {
    pub frontend_config: FrontendConfigHandler,
    pub loki: Option<LokiBackend>,
    pub csv_formatter: Arc<dyn CsvFormatter>,
}

impl ApiState {
    pub fn new(frontend_config: FrontendConfigHandler, loki: Option<LokiBackend>) -> Self {
        Self {
            frontend_config,
            loki,
            csv_formatter: Arc::new(FlowCsvFormatter),
        }
    }

    /// Replace the CSV formatter used for exports
    pub fn with_csv_formatter(mut self, formatter: Arc<dyn CsvFormatter>) -> Self {
        self.csv_formatter = formatter;
        self
    }
}

/// Create the API router
pub fn create_api_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/frontend-config", get(get_frontend_config))
        .route("/api/loki/flows", get(get_loki_flows))
        .route("/api/health", get(health_check))
        .with_state(state)
}

/// Get the frontend configuration document
async fn get_frontend_config(State(state): State<Arc<ApiState>>) -> ResponseBuffer {
    state.frontend_config.handle()
}

/// Query flows from Loki
async fn get_loki_flows(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<FlowsQuery>,
) -> Response {
    get_flows(state.loki.as_ref(), state.csv_formatter.clone(), &params).await
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
