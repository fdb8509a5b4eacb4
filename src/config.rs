use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_UPLOAD_DIR: &str = "uploads";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
pub const DEFAULT_OLLAMA_PORT: u16 = 11434;
pub const DEFAULT_MODEL: &str = "llama3.2-vision";
pub const DEFAULT_PROMPT: &str = "What is in this image?";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Settings for the vision model backend.
#[derive(Clone, Debug)]
pub struct InferenceConfig {
    /// Base URL of the Ollama server (default: `http://127.0.0.1:11434`)
    pub base_url: String,
    /// Model name sent with every chat request (default: `llama3.2-vision`)
    pub model: String,
    /// Prompt paired with the uploaded image (default: `What is in this image?`)
    pub prompt: String,
    /// Whole-request timeout. `None` leaves reqwest's default, which never times out.
    pub timeout: Option<Duration>,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            prompt: DEFAULT_PROMPT.to_string(),
            timeout: None,
        }
    }
}

/// Server configuration, built once at startup and handed to the router.
#[derive(Clone, Debug)]
pub struct Config {
    /// Listen address (default: `0.0.0.0`)
    pub host: IpAddr,
    /// Listen port (default: 3000)
    pub port: u16,
    /// Directory uploads are written to and served from (default: `uploads`)
    pub upload_dir: PathBuf,
    /// Maximum accepted request body for `/analyze` (default: 10MB)
    pub max_upload_bytes: usize,
    pub inference: InferenceConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            upload_dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            inference: InferenceConfig::default(),
        }
    }
}

impl Config {
    /// Load a `.env` file if one exists, then apply overrides from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup on top of the defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("HOST") {
            config.host = parse("HOST", value)?;
        }
        if let Some(value) = lookup("PORT") {
            config.port = parse("PORT", value)?;
        }
        if let Some(value) = lookup("UPLOAD_DIR") {
            config.upload_dir = PathBuf::from(value);
        }
        if let Some(value) = lookup("MAX_UPLOAD_BYTES") {
            config.max_upload_bytes = parse("MAX_UPLOAD_BYTES", value)?;
        }
        if let Some(value) = lookup("OLLAMA_HOST") {
            config.inference.base_url = parse_base_url("OLLAMA_HOST", value)?;
        }
        if let Some(value) = lookup("OLLAMA_MODEL") {
            config.inference.model = value;
        }
        if let Some(value) = lookup("VISION_PROMPT") {
            config.inference.prompt = value;
        }
        if let Some(value) = lookup("OLLAMA_TIMEOUT_SECS") {
            let secs: u64 = parse("OLLAMA_TIMEOUT_SECS", value.clone())?;
            if secs == 0 {
                return Err(ConfigError::Invalid {
                    key: "OLLAMA_TIMEOUT_SECS",
                    value,
                    reason: "timeout must be at least one second; unset it for no timeout".to_string(),
                });
            }
            config.inference.timeout = Some(Duration::from_secs(secs));
        }

        Ok(config)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn parse<T>(key: &'static str, value: String) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let parsed = value.trim().parse::<T>();
    parsed.map_err(|e| ConfigError::Invalid {
        key,
        reason: e.to_string(),
        value,
    })
}

/// Accepts the same shapes Ollama clients do for `OLLAMA_HOST`: a full URL, or a
/// bare `host[:port]`, which gets `http://` and the default Ollama port.
fn parse_base_url(key: &'static str, value: String) -> Result<String, ConfigError> {
    let invalid = |value: String, reason: String| ConfigError::Invalid { key, value, reason };

    let trimmed = value.trim();
    let has_scheme = trimmed.contains("://");
    let candidate = if has_scheme {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };

    let mut url = match reqwest::Url::parse(&candidate) {
        Ok(url) => url,
        Err(e) => return Err(invalid(value, e.to_string())),
    };
    if !matches!(url.scheme(), "http" | "https") {
        let reason = format!("unsupported scheme {:?}", url.scheme());
        return Err(invalid(value, reason));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid(value, "missing host".to_string()));
    }
    // `Url::port` hides a scheme-default port, so look at the text for `:80`
    let authority = trimmed.split('/').next().unwrap_or_default();
    let explicit_port = authority
        .rsplit_once(':')
        .is_some_and(|(_, port)| port.parse::<u16>().is_ok());
    if !has_scheme && !explicit_port && url.set_port(Some(DEFAULT_OLLAMA_PORT)).is_err() {
        return Err(invalid(value, "cannot set port".to_string()));
    }

    Ok(url.as_str().trim_end_matches('/').to_string())
}
