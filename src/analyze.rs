use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    response::Json,
};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::inference::AnalysisRequest;
use crate::AppState;

/// Body of a successful `/analyze` response.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    pub description: String,
    pub image_path: String,
}

/// `POST /analyze`: store the uploaded image, ask the model about it, relay the answer.
pub async fn analyze_image(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let start = Instant::now();

    // A body that is not multipart cannot carry the image field
    let mut multipart = multipart.map_err(|rejection| {
        tracing::debug!("multipart rejected: {}", rejection);
        AppError::NoImage
    })?;

    let upload = state.store.save(&mut multipart).await?;

    let request = AnalysisRequest {
        prompt: state.prompt.clone(),
        image_reference: upload.storage_path.clone(),
    };
    let analysis = state.model.describe(&request).await?;

    tracing::info!(
        image = %upload.stored_name,
        original = %upload.original_filename,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "image analyzed"
    );

    Ok(Json(AnalyzeResponse {
        description: analysis.description_text,
        image_path: upload.public_path(),
    }))
}
