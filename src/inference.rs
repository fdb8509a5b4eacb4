use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::InferenceConfig;

/// Longest slice of an upstream error body kept in an error value.
const BODY_EXCERPT_LEN: usize = 500;

/// Prompt plus image handed to a vision model.
#[derive(Clone, Debug)]
pub struct AnalysisRequest {
    pub prompt: String,
    pub image_reference: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalysisResponse {
    pub description_text: String,
}

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("failed to read image {path}: {source}")]
    ReadImage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("request to model service failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("model service returned {status}: {message}")]
    Status {
        status: reqwest::StatusCode,
        message: String,
    },

    #[error("malformed reply from model service: {0}")]
    MalformedReply(String),
}

/// Something that can describe an image in text.
#[async_trait]
pub trait VisionModel: Send + Sync {
    async fn describe(&self, request: &AnalysisRequest) -> Result<AnalysisResponse, InferenceError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
    images: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    message: Option<ReplyMessage>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ErrorReply {
    error: String,
}

/// Client for Ollama's `/api/chat` endpoint.
///
/// One call sends one non-streaming request and awaits one reply. Failures are
/// returned as-is; nothing is retried. The only timeout is the one configured
/// in [`InferenceConfig::timeout`].
#[derive(Clone, Debug)]
pub struct OllamaClient {
    client: reqwest::Client,
    config: InferenceConfig,
}

impl OllamaClient {
    pub fn new(config: InferenceConfig) -> Result<Self, InferenceError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            config,
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl VisionModel for OllamaClient {
    async fn describe(&self, request: &AnalysisRequest) -> Result<AnalysisResponse, InferenceError> {
        let image = encode_image(&request.image_reference).await?;

        let payload = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &request.prompt,
                images: vec![image],
            }],
            stream: false,
        };

        tracing::info!(
            model = %self.config.model,
            image = %request.image_reference.display(),
            "sending image to model service"
        );

        let response = self.client.post(self.chat_url()).json(&payload).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorReply>(&body)
                .map(|reply| reply.error)
                .unwrap_or_else(|_| excerpt(&body));
            return Err(InferenceError::Status { status, message });
        }

        let description_text = parse_reply(&body)?;
        tracing::debug!(chars = description_text.len(), "model service replied");
        Ok(AnalysisResponse { description_text })
    }
}

/// Read the image and encode it the way Ollama expects inline images.
async fn encode_image(reference: &Path) -> Result<String, InferenceError> {
    let path = std::path::absolute(reference).unwrap_or_else(|_| reference.to_path_buf());
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(general_purpose::STANDARD.encode(bytes)),
        Err(source) => Err(InferenceError::ReadImage { path, source }),
    }
}

fn parse_reply(body: &str) -> Result<String, InferenceError> {
    let reply: ChatReply = serde_json::from_str(body)
        .map_err(|e| InferenceError::MalformedReply(format!("{e}: {}", excerpt(body))))?;

    if let Some(error) = reply.error {
        return Err(InferenceError::MalformedReply(error));
    }

    reply
        .message
        .map(|message| message.content)
        .ok_or_else(|| InferenceError::MalformedReply("reply has no message".to_string()))
}

fn excerpt(body: &str) -> String {
    body.chars().take(BODY_EXCERPT_LEN).collect()
}
