use std::path::PathBuf;

use axum::extract::Query;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;

use axum_byteranges::{ByteSource, Ranged, RangeConfig, RangeError, content_type_for};

#[derive(Debug, Clone, Deserialize)]
struct FileRequest {
    path: String,
    #[serde(default)]
    keep_overlaps: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let router = Router::new()
        .route("/", get(|| async { "Hello, World!" }))
        .route("/file", get(get_file));

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
    tracing::info!("listening on {}", listener.local_addr().unwrap());
    axum::serve(listener, router).await.unwrap();
}

// GET /file?path=Cargo.toml with an optional Range header
async fn get_file(headers: HeaderMap, Query(q): Query<FileRequest>) -> impl IntoResponse {
    let path = PathBuf::from(&q.path);
    match ByteSource::open(&path).await {
        Ok(source) => {
            let config = RangeConfig::default().coalesce_overlapping(!q.keep_overlaps);
            Ranged::from_headers(&headers, source, Some(content_type_for(&path)))
                .with_config(config)
                .into_response()
        }
        Err(err @ RangeError::SourceOpen { .. }) => {
            (StatusCode::NOT_FOUND, format!("Error: {}", err)).into_response()
        }
        Err(err) => {
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", err)).into_response()
        }
    }
}
