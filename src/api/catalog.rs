//! Bundled service implementations.
//!
//! `ModelCatalog` knows the models the application can run and tracks their
//! state as reported by the host. `OfflineTranscriber` stands in until an
//! engine is wired up and answers every request with "not ready".

use std::sync::{PoisonError, RwLock};

use futures_util::future::{BoxFuture, FutureExt};

use crate::api::services::{
    Engine, ModelDescriptor, ModelService, ModelState, ServiceError, Transcript, TranscriptionInput,
    TranscriptionService,
};

pub const NO_MODEL_LOADED: &str = "No model loaded. Select and download a model in the application first.";

/// (id, display name, engine, size in MB, language count)
const KNOWN_MODELS: &[(&str, &str, Engine, u32, u32)] = &[
    ("whisper-tiny", "Whisper Tiny", Engine::Whisper, 39, 99),
    ("whisper-base", "Whisper Base", Engine::Whisper, 74, 99),
    ("whisper-small", "Whisper Small", Engine::Whisper, 244, 99),
    ("whisper-large-v3", "Whisper Large v3", Engine::Whisper, 1500, 99),
    ("whisper-large-v3-turbo", "Whisper Large v3 Turbo", Engine::Whisper, 800, 99),
    ("parakeet-tdt-0.6b-v3", "Parakeet TDT 0.6B v3", Engine::Parakeet, 600, 25),
];

/// Other names clients use for the known models: the desktop app's own ids
/// and the bare size names.
const MODEL_ALIASES: &[(&str, &str)] = &[
    ("openai_whisper-tiny", "whisper-tiny"),
    ("openai_whisper-base", "whisper-base"),
    ("openai_whisper-small", "whisper-small"),
    ("openai_whisper-large-v3", "whisper-large-v3"),
    ("openai_whisper-large-v3_turbo", "whisper-large-v3-turbo"),
    ("tiny", "whisper-tiny"),
    ("base", "whisper-base"),
    ("small", "whisper-small"),
    ("large-v3", "whisper-large-v3"),
    ("large-v3-turbo", "whisper-large-v3-turbo"),
    ("parakeet", "parakeet-tdt-0.6b-v3"),
];

/// Map an alias to its catalog id. Anything else is returned as is.
fn canonical_id(name: &str) -> &str {
    let name = name.trim();
    MODEL_ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map_or(name, |&(_, id)| id)
}

#[derive(Debug)]
struct CatalogState {
    models: Vec<ModelDescriptor>,
    active: Option<String>,
}

impl CatalogState {
    fn position(&self, name: &str) -> Option<usize> {
        let id = canonical_id(name);
        self.models.iter().position(|m| m.id == id)
    }
}

/// In-memory model inventory.
#[derive(Debug)]
pub struct ModelCatalog {
    state: RwLock<CatalogState>,
}

impl ModelCatalog {
    /// The known models, none downloaded.
    pub fn new() -> Self {
        let models = KNOWN_MODELS
            .iter()
            .map(|&(id, display_name, engine, size_mb, language_count)| ModelDescriptor {
                id: id.to_string(),
                display_name: display_name.to_string(),
                engine,
                size_mb,
                language_count,
                state: ModelState::NotDownloaded,
            })
            .collect();
        Self::with_models(models)
    }

    pub fn with_models(models: Vec<ModelDescriptor>) -> Self {
        Self {
            state: RwLock::new(CatalogState { models, active: None }),
        }
    }

    /// Record a state change reported by the host application.
    ///
    /// An active model that stops being available is deactivated.
    pub fn set_state(&self, id: &str, state: ModelState) -> Result<(), ServiceError> {
        let mut catalog = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let index = catalog
            .position(id)
            .ok_or_else(|| ServiceError::UnknownModel(id.to_string()))?;
        catalog.models[index].state = state;

        let id = catalog.models[index].id.clone();
        if !state.is_available() && catalog.active.as_deref() == Some(id.as_str()) {
            tracing::info!(model = %id, %state, "Active model no longer available, deactivating");
            catalog.active = None;
        }
        Ok(())
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelService for ModelCatalog {
    fn models(&self) -> Vec<ModelDescriptor> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .models
            .clone()
    }

    fn active_model(&self) -> Option<ModelDescriptor> {
        let catalog = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let active = catalog.active.as_deref()?;
        catalog.models.iter().find(|m| m.id == active).cloned()
    }

    fn resolve(&self, name: &str) -> Option<ModelDescriptor> {
        let catalog = self.state.read().unwrap_or_else(PoisonError::into_inner);
        catalog.position(name).map(|index| catalog.models[index].clone())
    }

    fn select_model(&self, id: &str) -> Result<ModelDescriptor, ServiceError> {
        let mut catalog = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let model = catalog
            .position(id)
            .map(|index| catalog.models[index].clone())
            .ok_or_else(|| ServiceError::UnknownModel(id.to_string()))?;

        if !model.state.is_available() {
            return Err(ServiceError::NotReady(format!(
                "Model `{}` is {} and cannot be selected",
                model.id, model.state
            )));
        }

        tracing::info!(model = %model.id, "Active model changed");
        catalog.active = Some(model.id.clone());
        Ok(model)
    }
}

/// Transcriber used when no engine is available.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineTranscriber;

impl TranscriptionService for OfflineTranscriber {
    fn transcribe(&self, input: TranscriptionInput) -> BoxFuture<'static, Result<Transcript, ServiceError>> {
        tracing::debug!(bytes = input.audio.len(), "Transcription requested while offline");
        async { Err(ServiceError::NotReady(NO_MODEL_LOADED.to_string())) }.boxed()
    }
}
