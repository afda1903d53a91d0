//! Flow queries against Loki

use crate::handler::csv::CsvFormatter;
use crate::handler::response::{
    stream_response, write_csv, write_error, write_json, ResponseBuffer,
};
use crate::httpclient::HttpClient;
use crate::model::AggregatedQueryResponse;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;

const QUERY_RANGE_PATH: &str = "/loki/api/v1/query_range";

/// Query parameters of the flows endpoint
#[derive(Debug, Deserialize, Default)]
pub struct FlowsQuery {
    /// LogQL query
    pub query: Option<String>,
    pub limit: Option<u32>,
    pub start: Option<String>,
    pub end: Option<String>,
    /// `json` (default) or `csv`
    #[serde(default)]
    pub format: Option<String>,
    /// Comma-separated columns for CSV export
    #[serde(default)]
    pub columns: Option<String>,
}

impl FlowsQuery {
    fn columns(&self) -> Vec<String> {
        self.columns
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn is_csv(&self) -> bool {
        self.format
            .as_deref()
            .is_some_and(|f| f.eq_ignore_ascii_case("csv"))
    }
}

/// Loki endpoint with the client used to reach it
#[derive(Debug, Clone)]
pub struct LokiBackend {
    pub base_url: String,
    pub client: HttpClient,
}

impl LokiBackend {
    pub fn new(base_url: impl Into<String>, client: HttpClient) -> Self {
        Self {
            base_url: base_url.into(),
            client,
        }
    }

    /// Full `query_range` URL for `params`
    pub fn query_url(&self, query: &str, params: &FlowsQuery) -> Result<String, String> {
        let mut pairs = vec![("query", query.to_string())];
        if let Some(limit) = params.limit {
            pairs.push(("limit", limit.to_string()));
        }
        if let Some(start) = &params.start {
            pairs.push(("start", start.clone()));
        }
        if let Some(end) = &params.end {
            pairs.push(("end", end.clone()));
        }

        let base = format!("{}{}", self.base_url.trim_end_matches('/'), QUERY_RANGE_PATH);
        reqwest::Url::parse_with_params(&base, &pairs)
            .map(String::from)
            .map_err(|e| format!("Invalid Loki URL {}: {}", base, e))
    }
}

/// Fetch flows from Loki and render them as JSON or a streamed CSV export
pub async fn get_flows(
    loki: Option<&LokiBackend>,
    formatter: Arc<dyn CsvFormatter>,
    params: &FlowsQuery,
) -> Response {
    let result = match fetch_flows(loki, params).await {
        Ok(result) => result,
        Err(error) => return error.into_response(),
    };

    if params.is_csv() {
        let columns = params.columns();
        stream_response(move |sink| {
            write_csv(sink, StatusCode::OK, formatter.as_ref(), Some(&result), &columns)
        })
        .await
    } else {
        let mut buffer = ResponseBuffer::new();
        write_json(&mut buffer, StatusCode::OK, &result);
        buffer.into_response()
    }
}

/// Run the Loki query; failures come back as a rendered error envelope
async fn fetch_flows(
    loki: Option<&LokiBackend>,
    params: &FlowsQuery,
) -> Result<AggregatedQueryResponse, ResponseBuffer> {
    let mut error = ResponseBuffer::new();

    let Some(loki) = loki else {
        write_error(&mut error, StatusCode::SERVICE_UNAVAILABLE, "Loki is not configured");
        return Err(error);
    };
    let Some(query) = params.query.as_deref().filter(|q| !q.is_empty()) else {
        write_error(&mut error, StatusCode::BAD_REQUEST, "Missing query parameter");
        return Err(error);
    };

    let url = match loki.query_url(query, params) {
        Ok(url) => url,
        Err(message) => {
            write_error(&mut error, StatusCode::INTERNAL_SERVER_ERROR, &message);
            return Err(error);
        }
    };

    let (body, code) = match loki.client.get(&url).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(error = %e, url = %url, "Loki request failed");
            write_error(
                &mut error,
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("Error while fetching flows from Loki: {}", e),
            );
            return Err(error);
        }
    };

    if code != StatusCode::OK.as_u16() {
        let message = format!(
            "Error from Loki query: [{}] {}",
            code,
            String::from_utf8_lossy(&body)
        );
        tracing::warn!(status = %code, url = %url, "Loki query rejected");
        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_GATEWAY);
        write_error(&mut error, status, &message);
        return Err(error);
    }

    AggregatedQueryResponse::from_loki(&body).map_err(|e| {
        tracing::error!(error = %e, "Cannot parse Loki response");
        write_error(
            &mut error,
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("Cannot unmarshal Loki response: {}", e),
        );
        error
    })
}
