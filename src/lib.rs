//! Upload an image, have a local vision model describe it, show the result.
//!
//! The service exposes three routes:
//!
//! - `GET /` serves the browser page
//! - `POST /analyze` takes a multipart form with an `image` file and returns
//!   `{ "description", "imagePath" }`
//! - `GET /uploads/<name>` serves stored uploads

pub mod analyze;
pub mod config;
pub mod error;
pub mod inference;
pub mod page;
pub mod upload;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    services::ServeDir,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

pub use config::{Config, InferenceConfig};
pub use error::AppError;
pub use inference::{AnalysisRequest, AnalysisResponse, InferenceError, OllamaClient, VisionModel};
pub use upload::{generate_storage_name, UploadStore, UploadedFile};

/// Per-process state shared by every request.
pub struct AppState {
    pub store: UploadStore,
    pub model: Arc<dyn VisionModel>,
    pub prompt: String,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(config: &Config, model: Arc<dyn VisionModel>) -> Self {
        Self {
            store: UploadStore::new(config.upload_dir.clone()),
            model,
            prompt: config.inference.prompt.clone(),
            max_upload_bytes: config.max_upload_bytes,
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let uploads = ServeDir::new(state.store.dir());
    let body_limit = DefaultBodyLimit::max(state.max_upload_bytes);

    Router::new()
        .route("/", get(page::index))
        .route("/analyze", post(analyze::analyze_image).layer(body_limit))
        .nest_service(upload::UPLOADS_ROUTE, uploads)
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
