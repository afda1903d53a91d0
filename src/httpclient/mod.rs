//! Outbound HTTP client
//!
//! Single-attempt GET requests with a fixed timeout, client-level header
//! overrides and optional TLS verification bypass.

use reqwest::header::{HeaderName, HeaderValue};
use reqwest::Client;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use thiserror::Error;

/// Outbound client errors
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("invalid header name {0:?}")]
    InvalidHeaderName(String),

    #[error("invalid value for header {0}")]
    InvalidHeaderValue(String),

    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("invalid request: {0}")]
    Request(#[source] reqwest::Error),

    #[error("request failed: {0}")]
    Send(#[source] reqwest::Error),

    #[error("failed to read response body: {0}")]
    Body(#[source] reqwest::Error),
}

/// GET-only HTTP client, safe to share across tasks
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    headers: Vec<(HeaderName, Vec<HeaderValue>)>,
}

impl HttpClient {
    /// Create a new client.
    ///
    /// `timeout` bounds connecting, idle pooled connections and each whole
    /// request. `headers` replace same-named request headers on every call.
    pub fn new(
        timeout: Duration,
        headers: &HashMap<String, Vec<String>>,
        skip_tls: bool,
    ) -> Result<Self, ClientError> {
        // Keys differing only in case name the same header: visit them in
        // sorted order so the last spelling replaces the others every time
        let sorted: BTreeMap<&String, &Vec<String>> = headers.iter().collect();
        let mut merged: Vec<(HeaderName, Vec<HeaderValue>)> = Vec::with_capacity(sorted.len());
        for (name, values) in sorted {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ClientError::InvalidHeaderName(name.clone()))?;
            let values = values
                .iter()
                .map(|v| {
                    HeaderValue::from_str(v)
                        .map_err(|_| ClientError::InvalidHeaderValue(name.to_string()))
                })
                .collect::<Result<Vec<_>, _>>()?;

            match merged.iter_mut().find(|(existing, _)| *existing == name) {
                Some(entry) => entry.1 = values,
                None => merged.push((name, values)),
            }
        }
        let headers = merged;

        let mut builder = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .pool_idle_timeout(timeout);

        if skip_tls {
            builder = builder
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true);
            tracing::warn!("skipping TLS checks. SSL certificate verification is now disabled !");
        }

        let client = builder.build().map_err(ClientError::Build)?;

        Ok(Self { client, headers })
    }

    /// GET `url`, returning the whole body and the status code.
    ///
    /// Non-2xx statuses are not errors. On error nothing of the response is
    /// returned.
    pub async fn get(&self, url: &str) -> Result<(Vec<u8>, u16), ClientError> {
        let mut request = self.client.get(url).build().map_err(ClientError::Request)?;

        let request_headers = request.headers_mut();
        for (name, values) in &self.headers {
            request_headers.remove(name);
            for value in values {
                request_headers.append(name.clone(), value.clone());
            }
        }

        let response = self
            .client
            .execute(request)
            .await
            .map_err(ClientError::Send)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(ClientError::Body)?;

        tracing::debug!(url = %url, status = %status, bytes = %body.len(), "GET completed");

        Ok((body.to_vec(), status))
    }
}
