//! CSV formatting of query results
//!
//! A [`CsvFormatter`] turns a query result and a column selection into CSV
//! rows. [`write_csv`](crate::handler::response::write_csv) takes the
//! formatter as a parameter so tests can substitute their own.

use crate::model::{AggregatedQueryResponse, QueryResult};
use serde_json::{Map, Value};
use thiserror::Error;

/// CSV formatting errors
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("no query result to export")]
    MissingResult,

    #[error("no columns selected for export")]
    NoColumns,

    #[error("unsupported result type for CSV export: {0}")]
    UnsupportedResultType(&'static str),

    #[error("cannot parse flow line as JSON object: {0}")]
    InvalidFlow(String),
}

/// Converts a query result and a column list into CSV rows
pub trait CsvFormatter: Send + Sync {
    fn format(
        &self,
        result: Option<&AggregatedQueryResponse>,
        columns: &[String],
    ) -> Result<Vec<Vec<String>>, FormatError>;
}

/// Formats flow streams: a header row of column names, then one row per flow
#[derive(Debug, Clone, Copy, Default)]
pub struct FlowCsvFormatter;

impl CsvFormatter for FlowCsvFormatter {
    fn format(
        &self,
        result: Option<&AggregatedQueryResponse>,
        columns: &[String],
    ) -> Result<Vec<Vec<String>>, FormatError> {
        let result = result.ok_or(FormatError::MissingResult)?;
        if columns.is_empty() {
            return Err(FormatError::NoColumns);
        }

        let streams = match &result.result {
            QueryResult::Streams(streams) => streams,
            other => return Err(FormatError::UnsupportedResultType(other.type_name())),
        };

        let mut rows = Vec::with_capacity(1 + streams.iter().map(|s| s.values.len()).sum::<usize>());
        rows.push(columns.to_vec());

        for stream in streams {
            for (_, line) in &stream.values {
                let flow: Map<String, Value> = match serde_json::from_str(line) {
                    Ok(Value::Object(flow)) => flow,
                    _ => return Err(FormatError::InvalidFlow(line.clone())),
                };

                let row = columns
                    .iter()
                    .map(|column| match flow.get(column) {
                        Some(value) => cell(value),
                        None => stream.labels.get(column).cloned().unwrap_or_default(),
                    })
                    .collect();
                rows.push(row);
            }
        }

        Ok(rows)
    }
}

fn cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
