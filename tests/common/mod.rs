#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request};
use vision_analyzer::{
    router, AnalysisRequest, AnalysisResponse, AppState, Config, InferenceError, VisionModel,
};

pub const BOUNDARY: &str = "----vision-analyzer-test-boundary";

/// One part of a multipart form: field name, optional filename, content.
pub struct Part<'a> {
    pub name: &'a str,
    pub filename: Option<&'a str>,
    pub content_type: Option<&'a str>,
    pub data: &'a [u8],
}

impl<'a> Part<'a> {
    pub fn file(name: &'a str, filename: &'a str, data: &'a [u8]) -> Self {
        Self {
            name,
            filename: Some(filename),
            content_type: Some("image/png"),
            data,
        }
    }

    pub fn text(name: &'a str, value: &'a str) -> Self {
        Self {
            name,
            filename: None,
            content_type: None,
            data: value.as_bytes(),
        }
    }
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        let mut disposition = format!("Content-Disposition: form-data; name=\"{}\"", part.name);
        if let Some(filename) = part.filename {
            disposition.push_str(&format!("; filename=\"{filename}\""));
        }
        body.extend_from_slice(disposition.as_bytes());
        body.extend_from_slice(b"\r\n");
        if let Some(content_type) = part.content_type {
            body.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn analyze_request(parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/analyze")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

/// Describes an image by echoing its contents, so responses can be traced
/// back to the exact file that was sent.
#[derive(Default)]
pub struct EchoModel {
    pub requests: Mutex<Vec<AnalysisRequest>>,
}

#[async_trait]
impl VisionModel for EchoModel {
    async fn describe(&self, request: &AnalysisRequest) -> Result<AnalysisResponse, InferenceError> {
        self.requests.lock().unwrap().push(request.clone());
        let bytes = tokio::fs::read(&request.image_reference)
            .await
            .map_err(|source| InferenceError::ReadImage {
                path: request.image_reference.clone(),
                source,
            })?;
        Ok(AnalysisResponse {
            description_text: format!("echo: {}", String::from_utf8_lossy(&bytes)),
        })
    }
}

/// Always fails the way an unreachable model service would.
pub struct FailingModel;

#[async_trait]
impl VisionModel for FailingModel {
    async fn describe(&self, _request: &AnalysisRequest) -> Result<AnalysisResponse, InferenceError> {
        Err(InferenceError::MalformedReply("model exploded".to_string()))
    }
}

pub fn test_config(upload_dir: &Path) -> Config {
    Config {
        upload_dir: upload_dir.to_path_buf(),
        ..Config::default()
    }
}

pub fn test_app(upload_dir: &Path, model: Arc<dyn VisionModel>) -> axum::Router {
    test_app_with_config(test_config(upload_dir), model)
}

pub fn test_app_with_config(config: Config, model: Arc<dyn VisionModel>) -> axum::Router {
    router(Arc::new(AppState::new(&config, model)))
}

pub fn stored_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

pub async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}
