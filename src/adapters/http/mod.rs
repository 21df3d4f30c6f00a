//! HTTP inbound adapter.
//!
//! Admin authentication happens in front of this router; handlers assume an
//! authorised caller.

mod response;
mod upload;

pub use response::ErrorBody;
pub use upload::{stream_to_file, UploadMetadata, UploadResponse};

use crate::application::IngestPipeline;
use crate::ports::{processor::WatermarkEngine, repository::ProductRepository, storage::ObjectStorage};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn router<W, S, R>(pipeline: Arc<IngestPipeline<W, S, R>>, max_upload_bytes: usize) -> Router
where
    W: WatermarkEngine + 'static,
    S: ObjectStorage + 'static,
    R: ProductRepository + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/media/audio", post(upload::upload_audio::<W, S, R>))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(pipeline)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
