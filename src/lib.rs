//! Console Backend - Network Flows Console Plugin Server
//!
//! A Rust application providing:
//! - Frontend configuration served from a cached YAML document
//! - JSON and CSV rendering of flow query results
//! - Outbound HTTP client for the Loki backend

pub mod config;
pub mod handler;
pub mod httpclient;
pub mod model;
pub mod server;

pub use config::AppConfig;
pub use handler::frontend_config::{
    get_config, read_config_file, ConfigStore, FrontendConfig, FrontendConfigHandler,
};
pub use handler::response::{
    stream_response, write_csv, write_error, write_json, ChannelSink, ResponseBuffer, ResponseSink,
};
pub use httpclient::{ClientError, HttpClient};
pub use model::AggregatedQueryResponse;
