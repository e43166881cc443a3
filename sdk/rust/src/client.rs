//! Async client for the loopback transcription API.

use std::path::Path;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_URL: &str = "http://127.0.0.1:8978";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with its JSON error envelope.
    #[error("server returned {status} ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("could not read audio file: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// HTTP status of an API error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub status: String,
    pub version: String,
    pub active_model: Option<String>,
    pub model_ready: bool,
    /// ISO-8601 timestamp.
    pub started_at: String,
    pub uptime_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    pub display_name: String,
    pub engine: String,
    pub size_mb: u32,
    pub language_count: u32,
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelList {
    pub models: Vec<Model>,
    pub active_model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcription {
    pub text: String,
    pub language: Option<String>,
    pub duration_secs: f64,
    pub model: String,
    pub completed_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscribeOptions {
    pub model: Option<String>,
    pub language: Option<String>,
    pub translate: bool,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn status(&self) -> Result<Status, ClientError> {
        let resp = self.client.get(self.url("/status")).send().await?;
        decode(resp).await
    }

    pub async fn models(&self) -> Result<ModelList, ClientError> {
        let resp = self.client.get(self.url("/models")).send().await?;
        decode(resp).await
    }

    /// Make `model` the active model.
    pub async fn select_model(&self, model: &str) -> Result<Model, ClientError> {
        let resp = self
            .client
            .post(self.url("/models/select"))
            .json(&serde_json::json!({ "model": model }))
            .send()
            .await?;
        decode(resp).await
    }

    /// Upload audio bytes for transcription.
    pub async fn transcribe(
        &self,
        audio: Vec<u8>,
        filename: &str,
        options: &TranscribeOptions,
    ) -> Result<Transcription, ClientError> {
        let part = Part::bytes(audio)
            .file_name(filename.to_string())
            .mime_str("application/octet-stream")?;
        let mut form = Form::new().part("file", part);
        if let Some(model) = &options.model {
            form = form.text("model", model.clone());
        }
        if let Some(language) = &options.language {
            form = form.text("language", language.clone());
        }
        if options.translate {
            form = form.text("task", "translate");
        }

        let resp = self
            .client
            .post(self.url("/transcribe"))
            .multipart(form)
            .send()
            .await?;
        decode(resp).await
    }

    /// Read `path` and upload it.
    pub async fn transcribe_file(
        &self,
        path: &Path,
        options: &TranscribeOptions,
    ) -> Result<Transcription, ClientError> {
        let audio = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());
        self.transcribe(audio, &filename, options).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ClientError> {
    let status = resp.status();
    let bytes = resp.bytes().await?;

    if !status.is_success() {
        return Err(match serde_json::from_slice::<ErrorEnvelope>(&bytes) {
            Ok(envelope) => ClientError::Api {
                status: status.as_u16(),
                code: envelope.error.code,
                message: envelope.error.message,
            },
            Err(_) => ClientError::Api {
                status: status.as_u16(),
                code: "error".to_string(),
                message: String::from_utf8_lossy(&bytes).into_owned(),
            },
        });
    }

    Ok(serde_json::from_slice(&bytes)?)
}
