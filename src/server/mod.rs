//! HTTP Server module
//!
//! Builds the handler state from the application configuration and serves
//! the API router.

use crate::config::AppConfig;
use crate::handler::frontend_config::get_config;
use crate::handler::loki::LokiBackend;
use crate::handler::{create_api_router, ApiState};
use crate::httpclient::HttpClient;
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Build handler state from the configuration
pub fn create_state(config: &AppConfig) -> anyhow::Result<ApiState> {
    let frontend_config = get_config(&config.server.frontend_config);

    let loki = match &config.loki.url {
        Some(url) => {
            let headers = config.loki.header_overrides()?;
            let client = HttpClient::new(config.loki.timeout(), &headers, config.loki.skip_tls)?;
            Some(LokiBackend::new(url.clone(), client))
        }
        None => {
            tracing::warn!("No Loki URL configured, flows endpoint disabled");
            None
        }
    };

    Ok(ApiState::new(frontend_config, loki))
}

/// Create the main server router
pub fn create_server_router(state: Arc<ApiState>) -> Router {
    create_api_router(state).layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
pub async fn start_server(config: AppConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);

    let state = Arc::new(create_state(&config)?);
    let app = create_server_router(state);

    tracing::info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
