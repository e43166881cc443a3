//! Collaborators the API handlers depend on.
//!
//! The HTTP layer never owns models or audio engines. It talks to them
//! through these traits so the host application (or a test) decides what
//! sits behind each endpoint.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http::DecodeMode;
use crate::routing::HandlerError;

/// Lifecycle of a model on this machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelState {
    NotDownloaded,
    Downloading,
    Downloaded,
    Loading,
    Ready,
}

impl ModelState {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelState::NotDownloaded => "not_downloaded",
            ModelState::Downloading => "downloading",
            ModelState::Downloaded => "downloaded",
            ModelState::Loading => "loading",
            ModelState::Ready => "ready",
        }
    }

    /// Whether the files are on disk, so the model may be made active.
    pub fn is_available(self) -> bool {
        matches!(self, ModelState::Downloaded | ModelState::Loading | ModelState::Ready)
    }
}

impl fmt::Display for ModelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Whisper,
    Parakeet,
}

/// One entry of the model listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub display_name: String,
    pub engine: Engine,
    pub size_mb: u32,
    pub language_count: u32,
    pub state: ModelState,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    #[default]
    Transcribe,
    /// Transcribe and translate to English.
    Translate,
}

impl std::str::FromStr for Task {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "transcribe" => Ok(Task::Transcribe),
            "translate" => Ok(Task::Translate),
            other => Err(format!("expected `transcribe` or `translate`, got `{other}`")),
        }
    }
}

/// Audio plus options, as received by `POST /transcribe`.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionInput {
    pub audio: Vec<u8>,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub model: Option<String>,
    pub language: Option<String>,
    pub task: Task,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub text: String,
    /// Detected or requested language code.
    pub language: Option<String>,
    pub duration_secs: f64,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("{0}")]
    NotReady(String),

    #[error("unknown model `{0}`")]
    UnknownModel(String),

    #[error("{0}")]
    Failed(String),
}

impl ServiceError {
    pub fn status(&self) -> u16 {
        match self {
            ServiceError::NotReady(_) => 503,
            ServiceError::UnknownModel(_) => 404,
            ServiceError::Failed(_) => 500,
        }
    }
}

impl From<ServiceError> for HandlerError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::NotReady(message) => HandlerError::NotReady(message),
            e @ ServiceError::UnknownModel(_) => HandlerError::NotFound(e.to_string()),
            ServiceError::Failed(message) => HandlerError::Internal(message),
        }
    }
}

/// Model inventory and selection.
///
/// Calls are synchronous; implementations own their synchronization.
pub trait ModelService: Send + Sync {
    fn models(&self) -> Vec<ModelDescriptor>;

    fn active_model(&self) -> Option<ModelDescriptor>;

    /// Look up a model by id, or by any other name the service accepts for it.
    fn resolve(&self, name: &str) -> Option<ModelDescriptor> {
        self.models().into_iter().find(|m| m.id == name)
    }

    fn select_model(&self, id: &str) -> Result<ModelDescriptor, ServiceError>;
}

pub trait TranscriptionService: Send + Sync {
    fn transcribe(&self, input: TranscriptionInput) -> BoxFuture<'static, Result<Transcript, ServiceError>>;
}

/// Everything a handler may use, injected at router construction.
#[derive(Clone)]
pub struct Services {
    pub models: Arc<dyn ModelService>,
    pub transcriber: Arc<dyn TranscriptionService>,
    pub started_at: DateTime<Utc>,
    pub multipart_mode: DecodeMode,
}

impl Services {
    pub fn new(models: Arc<dyn ModelService>, transcriber: Arc<dyn TranscriptionService>) -> Self {
        Self {
            models,
            transcriber,
            started_at: Utc::now(),
            multipart_mode: DecodeMode::default(),
        }
    }

    pub fn with_multipart_mode(mut self, mode: DecodeMode) -> Self {
        self.multipart_mode = mode;
        self
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("started_at", &self.started_at)
            .field("multipart_mode", &self.multipart_mode)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_parsing() {
        assert_eq!(" Translate ".parse::<Task>(), Ok(Task::Translate));
        assert_eq!("transcribe".parse::<Task>(), Ok(Task::Transcribe));
        assert!("summarize".parse::<Task>().is_err());
    }

    #[test]
    fn service_errors_keep_their_status() {
        for error in [
            ServiceError::NotReady("No model loaded".into()),
            ServiceError::UnknownModel("huge".into()),
            ServiceError::Failed("decoder crashed".into()),
        ] {
            let status = error.status();
            assert_eq!(HandlerError::from(error).status(), status);
        }
    }

    #[test]
    fn states_serialize_in_snake_case() {
        assert_eq!(
            serde_json::to_string(&ModelState::NotDownloaded).unwrap(),
            "\"not_downloaded\""
        );
        assert!(ModelState::Downloaded.is_available());
        assert!(!ModelState::Downloading.is_available());
    }
}
