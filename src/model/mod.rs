//! Query result model
//!
//! `AggregatedQueryResponse` is the single result type handed to the
//! response writers. It is built from a Loki `query_range` response.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label set of a stream or series
pub type Labels = BTreeMap<String, String>;

/// A log stream: a label set and its `[timestamp, line]` entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stream {
    #[serde(rename = "stream", default)]
    pub labels: Labels,
    /// Entries as `(nanosecond timestamp, line)`
    #[serde(default)]
    pub values: Vec<(String, String)>,
}

/// A metric series: a label set and its `[unix seconds, value]` samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixSeries {
    #[serde(rename = "metric", default)]
    pub labels: Labels,
    #[serde(default)]
    pub values: Vec<(f64, String)>,
}

/// Result payload, tagged by `resultType`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "resultType", content = "result", rename_all = "lowercase")]
pub enum QueryResult {
    Streams(Vec<Stream>),
    Matrix(Vec<MatrixSeries>),
}

impl QueryResult {
    /// Name of the result type as sent on the wire
    pub fn type_name(&self) -> &'static str {
        match self {
            QueryResult::Streams(_) => "streams",
            QueryResult::Matrix(_) => "matrix",
        }
    }
}

/// Query result returned to the frontend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedQueryResponse {
    #[serde(flatten)]
    pub result: QueryResult,
    #[serde(default)]
    pub stats: serde_json::Value,
    #[serde(default)]
    pub is_mock: bool,
    pub unix_timestamp: i64,
}

#[derive(Debug, Deserialize)]
struct LokiResponse {
    #[serde(default)]
    status: String,
    data: LokiData,
}

#[derive(Debug, Deserialize)]
struct LokiData {
    #[serde(flatten)]
    result: QueryResult,
    #[serde(default)]
    stats: serde_json::Value,
}

impl AggregatedQueryResponse {
    /// Parse a Loki `query_range` response body
    pub fn from_loki(body: &[u8]) -> Result<Self, serde_json::Error> {
        let response: LokiResponse = serde_json::from_slice(body)?;
        tracing::trace!(status = %response.status, "Parsed Loki response");

        Ok(Self {
            result: response.data.result,
            stats: response.data.stats,
            is_mock: false,
            unix_timestamp: chrono::Utc::now().timestamp(),
        })
    }
}
