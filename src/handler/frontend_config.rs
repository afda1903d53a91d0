//! Frontend configuration
//!
//! Serves the YAML document configured at startup as JSON. A failed read is
//! retried on every request until one succeeds; from then on the document is
//! cached for the lifetime of the process.

use crate::handler::response::{write_error, write_json, ResponseBuffer, ResponseSink};
use axum::http::StatusCode;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use thiserror::Error;

/// Port naming settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortNaming {
    #[serde(default)]
    pub enable: bool,
    /// Port number to display name
    #[serde(default)]
    pub port_names: BTreeMap<String, String>,
}

/// Document served to the frontend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrontendConfig {
    #[serde(default)]
    pub port_naming: PortNaming,
}

/// Frontend configuration read errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {}: {}", .path.display(), .source)]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse {}: {}", .path.display(), .source)]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Read the frontend configuration file.
///
/// An empty path means no file is configured and yields the default
/// document, as does an empty file.
pub fn read_config_file(path: &str) -> Result<FrontendConfig, ConfigError> {
    if path.is_empty() {
        return Ok(FrontendConfig::default());
    }

    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: PathBuf::from(path),
        source,
    })?;
    if contents.trim().is_empty() {
        return Ok(FrontendConfig::default());
    }

    serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: PathBuf::from(path),
        source,
    })
}

/// Cached frontend configuration with retry-until-success refresh
#[derive(Debug)]
pub struct ConfigStore {
    path: String,
    /// Set once, on the first successful read
    document: OnceLock<Arc<FrontendConfig>>,
    /// Serializes the check/re-read/update sequence
    refresh: Mutex<()>,
}

impl ConfigStore {
    /// Create the store and perform the initial read
    pub fn new(path: impl Into<String>) -> Self {
        let store = Self {
            path: path.into(),
            document: OnceLock::new(),
            refresh: Mutex::new(()),
        };

        if let Err(e) = store.get_or_refresh() {
            tracing::error!(error = %e, "Could not read config file");
        }

        store
    }

    /// Cached document, re-reading the file while no read has succeeded yet
    pub fn get_or_refresh(&self) -> Result<Arc<FrontendConfig>, ConfigError> {
        if let Some(document) = self.document.get() {
            return Ok(document.clone());
        }

        let _guard = self.refresh.lock();
        // Another request may have refreshed while we waited for the lock
        if let Some(document) = self.document.get() {
            return Ok(document.clone());
        }

        let document = read_config_file(&self.path)?;
        let document = self.document.get_or_init(|| Arc::new(document)).clone();
        tracing::info!(path = %self.path, "Frontend config loaded");
        Ok(document)
    }

    /// Answer a config request on `sink`
    pub fn respond<S: ResponseSink + ?Sized>(&self, sink: &mut S) {
        match self.get_or_refresh() {
            Ok(document) => write_json(sink, StatusCode::OK, document.as_ref()),
            Err(e) => {
                tracing::error!(error = %e, "Could not read config file");
                write_error(sink, StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
            }
        }
    }
}

/// Request handler serving one [`ConfigStore`]
#[derive(Debug, Clone)]
pub struct FrontendConfigHandler {
    store: Arc<ConfigStore>,
}

impl FrontendConfigHandler {
    /// Render the configuration response
    pub fn handle(&self) -> ResponseBuffer {
        let mut buffer = ResponseBuffer::new();
        self.store.respond(&mut buffer);
        buffer
    }
}

/// Build the config request handler for `path`, performing the initial read
pub fn get_config(path: &str) -> FrontendConfigHandler {
    FrontendConfigHandler {
        store: Arc::new(ConfigStore::new(path)),
    }
}
