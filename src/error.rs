use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::inference::InferenceError;

pub const NO_IMAGE_MESSAGE: &str = "No image uploaded";
pub const ANALYSIS_FAILED_MESSAGE: &str = "Failed to analyze image";

/// JSON body returned for every failed `/analyze` request.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    /// The request carried no `image` file field
    #[error("no image uploaded")]
    NoImage,

    /// The multipart body could not be read or broke the one-image rule
    #[error("invalid upload: {0}")]
    InvalidUpload(String),

    /// Writing the upload to disk failed
    #[error("failed to store upload: {0}")]
    Storage(#[from] std::io::Error),

    /// The vision model call failed
    #[error("analysis failed: {0}")]
    Inference(#[from] InferenceError),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NoImage | AppError::InvalidUpload(_) => StatusCode::BAD_REQUEST,
            AppError::Storage(_) | AppError::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show the browser; upstream details stay in the server log.
    pub fn user_message(&self) -> String {
        match self {
            AppError::NoImage => NO_IMAGE_MESSAGE.to_string(),
            AppError::InvalidUpload(reason) => reason.clone(),
            AppError::Storage(_) => "Failed to store upload".to_string(),
            AppError::Inference(_) => ANALYSIS_FAILED_MESSAGE.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Storage(_) | AppError::Inference(_) => {
                tracing::error!(error = ?self, "analyze request failed: {}", self);
            }
            AppError::NoImage | AppError::InvalidUpload(_) => {
                tracing::debug!("rejected upload: {}", self);
            }
        }

        let body = ErrorResponse {
            error: self.user_message(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}
