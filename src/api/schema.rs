//! Typed request and response bodies.
//!
//! # Design Decisions
//! - JSON bodies decode strictly: unknown fields are rejected
//! - Multipart forms are collected by field name, so part order does not matter
//! - Every schema failure is a client error (400)

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::api::services::{ModelDescriptor, Task, Transcript, TranscriptionInput};
use crate::http::MultipartPart;
use crate::routing::HandlerError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("unexpected JSON shape: {0}")]
    Mismatch(String),

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("invalid value for `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("expected {expected} body, got `{actual}`")]
    UnsupportedMediaType { expected: &'static str, actual: String },
}

impl From<SchemaError> for HandlerError {
    fn from(e: SchemaError) -> Self {
        HandlerError::BadRequest(e.to_string())
    }
}

/// Decode a JSON body into `T`.
pub fn decode_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, SchemaError> {
    serde_json::from_slice(body).map_err(|e| {
        if e.is_data() {
            SchemaError::Mismatch(e.to_string())
        } else {
            SchemaError::InvalidJson(e.to_string())
        }
    })
}

/// Body of `POST /models/select`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelectModelRequest {
    pub model: String,
}

impl SelectModelRequest {
    pub fn validate(&self) -> Result<&str, SchemaError> {
        let model = self.model.trim();
        if model.is_empty() {
            return Err(SchemaError::InvalidField {
                field: "model",
                reason: "must not be empty".into(),
            });
        }
        Ok(model)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub version: String,
    pub active_model: Option<String>,
    pub model_ready: bool,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelDescriptor>,
    pub active_model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionResponse {
    pub text: String,
    pub language: Option<String>,
    pub duration_secs: f64,
    pub model: String,
    pub completed_at: DateTime<Utc>,
}

impl TranscriptionResponse {
    pub fn from_transcript(transcript: Transcript, completed_at: DateTime<Utc>) -> Self {
        Self {
            text: transcript.text,
            language: transcript.language,
            duration_secs: transcript.duration_secs,
            model: transcript.model,
            completed_at,
        }
    }
}

/// Fields of a `POST /transcribe` form.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscribeForm {
    pub file: MultipartPart,
    pub model: Option<String>,
    pub language: Option<String>,
    pub task: Task,
}

impl TranscribeForm {
    /// Collect form fields; `model` and `language` fall back to the query string.
    ///
    /// The first part of each name wins. Blank text fields count as absent.
    pub fn from_parts(
        parts: Vec<MultipartPart>,
        query: &HashMap<String, String>,
    ) -> Result<Self, SchemaError> {
        let mut file = None;
        let mut fields: HashMap<String, String> = HashMap::new();

        for part in parts {
            if part.name == "file" {
                if file.is_none() {
                    file = Some(part);
                }
                continue;
            }
            if fields.contains_key(&part.name) {
                continue;
            }
            let Some(text) = part.text() else {
                tracing::debug!(field = %part.name, "Ignoring non-text form field");
                continue;
            };
            let text = text.trim();
            if !text.is_empty() {
                fields.insert(part.name.clone(), text.to_string());
            }
        }

        let file = file.ok_or(SchemaError::MissingField("file"))?;
        if file.data.is_empty() {
            return Err(SchemaError::InvalidField {
                field: "file",
                reason: "upload is empty".into(),
            });
        }

        let from_query = |key: &str| {
            query
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let model = fields.remove("model").or_else(|| from_query("model"));
        let language = fields.remove("language").or_else(|| from_query("language"));
        let task = match fields.remove("task") {
            Some(task) => task
                .parse()
                .map_err(|reason| SchemaError::InvalidField { field: "task", reason })?,
            None => Task::default(),
        };

        Ok(Self {
            file,
            model,
            language,
            task,
        })
    }

    pub fn into_input(self) -> TranscriptionInput {
        TranscriptionInput {
            audio: self.file.data,
            filename: self.file.filename,
            content_type: self.file.content_type,
            model: self.model,
            language: self.language,
            task: self.task,
        }
    }
}
