//! Integration tests for console-backend

use axum::{
    body::Body,
    extract::Query,
    http::{header, Request, StatusCode},
    routing,
    Router,
};
use console_backend::config::AppConfig;
use console_backend::server::{create_server_router, create_state};
use http_body_util::BodyExt;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceExt;

const LOKI_STREAMS: &str = r#"{
    "status": "success",
    "data": {
        "resultType": "streams",
        "result": [
            {
                "stream": {"app": "netobserv-flowcollector", "SrcK8S_Namespace": "default"},
                "values": [
                    ["1700000000000000000", "{\"SrcAddr\":\"10.0.0.1\",\"DstAddr\":\"10.0.0.2\",\"Bytes\":120}"],
                    ["1700000001000000000", "{\"SrcAddr\":\"10.0.0.3\",\"DstAddr\":\"10.0.0.4\",\"Bytes\":64,\"Owner\":\"a, b\"}"]
                ]
            }
        ],
        "stats": {}
    }
}"#;

/// Minimal Loki answering `query_range`; queries containing `bad` are rejected
async fn serve_fake_loki() -> SocketAddr {
    let app = Router::new().route(
        "/loki/api/v1/query_range",
        routing::get(|Query(params): Query<HashMap<String, String>>| async move {
            match params.get("query") {
                Some(q) if q.contains("bad") => {
                    (StatusCode::BAD_REQUEST, "parse error".to_string())
                }
                _ => (StatusCode::OK, LOKI_STREAMS.to_string()),
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn create_app_with_loki() -> Router {
    let addr = serve_fake_loki().await;
    let mut config = AppConfig::default();
    config.loki.url = Some(format!("http://{}", addr));
    create_server_router(Arc::new(create_state(&config).unwrap()))
}

async fn get(app: Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, String) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, String::from_utf8(body.to_vec()).unwrap())
}

#[test]
fn test_config_default() {
    let config = AppConfig::default();
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 9001);
    assert!(config.loki.url.is_none());
}

#[tokio::test]
async fn test_frontend_config_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, "portNaming:\n  enable: true\n  portNames:\n    \"53\": dns\n").unwrap();

    let mut config = AppConfig::default();
    config.server.frontend_config = path.to_string_lossy().into_owned();
    let app = create_server_router(Arc::new(create_state(&config).unwrap()));

    let (status, _, body) = get(app, "/api/frontend-config").await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["portNaming"]["enable"], true);
    assert_eq!(json["portNaming"]["portNames"]["53"], "dns");
}

#[tokio::test]
async fn test_flows_json() {
    let app = create_app_with_loki().await;
    let (status, headers, body) = get(app, "/api/loki/flows?query=%7Bapp%3D%22x%22%7D").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/json");
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["resultType"], "streams");
    assert_eq!(json["result"][0]["values"].as_array().unwrap().len(), 2);
    assert_eq!(json["isMock"], false);
}

#[tokio::test]
async fn test_flows_csv_export() {
    let app = create_app_with_loki().await;
    let (status, headers, body) = get(
        app,
        "/api/loki/flows?query=%7Bapp%3D%22x%22%7D&format=csv&columns=SrcAddr,Bytes,Owner,SrcK8S_Namespace",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "text/csv");
    let disposition = headers[header::CONTENT_DISPOSITION].to_str().unwrap();
    assert!(disposition.starts_with("attachment; filename=export-"));
    assert!(disposition.ends_with(".csv"));
    assert_eq!(
        body,
        "SrcAddr,Bytes,Owner,SrcK8S_Namespace\n\
         10.0.0.1,120,,default\n\
         10.0.0.3,64,\"a, b\",default\n"
    );
}

#[tokio::test]
async fn test_flows_csv_without_columns() {
    let app = create_app_with_loki().await;
    let (status, headers, body) =
        get(app, "/api/loki/flows?query=%7Bapp%3D%22x%22%7D&format=csv").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(headers.get(header::CONTENT_DISPOSITION).is_none());
    assert_eq!(headers[header::CONTENT_TYPE], "application/json");
    assert_eq!(body, r#"{"Message":"no columns selected for export"}"#);
}

#[tokio::test]
async fn test_flows_loki_error() {
    let app = create_app_with_loki().await;
    let (status, _, body) = get(app, "/api/loki/flows?query=bad").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        r#"{"Message":"Error from Loki query: [400] parse error"}"#
    );
}

#[tokio::test]
async fn test_flows_missing_query() {
    let app = create_app_with_loki().await;
    let (status, _, body) = get(app, "/api/loki/flows").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, r#"{"Message":"Missing query parameter"}"#);
}

/// Serve the full router on a real listener
async fn serve_app(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn test_flows_csv_download_over_http() {
    let addr = serve_app(create_app_with_loki().await).await;

    let response = reqwest::Client::new()
        .get(format!("http://{}/api/loki/flows", addr))
        .query(&[
            ("query", r#"{app="x"}"#),
            ("format", "csv"),
            ("columns", "SrcAddr,Bytes,Owner,SrcK8S_Namespace"),
        ])
        .timeout(std::time::Duration::from_secs(5))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers[header::TRANSFER_ENCODING], "chunked");
    assert!(headers.get(header::CONTENT_LENGTH).is_none());
    assert_eq!(headers[header::CONTENT_TYPE], "text/csv");
    assert!(headers[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .starts_with("attachment; filename=export-"));

    let body = response.text().await.unwrap();
    assert_eq!(
        body,
        "SrcAddr,Bytes,Owner,SrcK8S_Namespace\n\
         10.0.0.1,120,,default\n\
         10.0.0.3,64,\"a, b\",default\n"
    );
}

#[tokio::test]
async fn test_flows_csv_error_over_http() {
    let addr = serve_app(create_app_with_loki().await).await;

    let response = reqwest::Client::new()
        .get(format!("http://{}/api/loki/flows", addr))
        .query(&[("query", r#"{app="x"}"#), ("format", "csv")])
        .timeout(std::time::Duration::from_secs(5))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.headers().get(header::CONTENT_DISPOSITION).is_none());
    assert_eq!(
        response.text().await.unwrap(),
        r#"{"Message":"no columns selected for export"}"#
    );
}
