//! The local API exposed to other applications on this machine.
//!
//! # Routes
//! ```text
//! GET  /status         → server and active model status
//! GET  /models         → model inventory
//! POST /models/select  → make a downloaded model active
//! POST /transcribe     → multipart audio upload → transcript
//! ```
//!
//! Handlers get their collaborators through [`Services`]; nothing is global.

pub mod catalog;
pub mod handlers;
pub mod schema;
pub mod services;

use std::future::Future;
use std::sync::Arc;

use crate::http::{Request, Response};
use crate::routing::{Handler, HandlerError, Router};

pub use catalog::{ModelCatalog, OfflineTranscriber};
pub use schema::SchemaError;
pub use services::{
    ModelDescriptor, ModelService, ModelState, ServiceError, Services, Task, Transcript,
    TranscriptionInput, TranscriptionService,
};

/// Build the route table for the local API.
pub fn build_router(services: Arc<Services>) -> Router {
    Router::builder()
        .get("/status", with_services(&services, handlers::status))
        .get("/models", with_services(&services, handlers::models))
        .post("/models/select", with_services(&services, handlers::select_model))
        .post("/transcribe", with_services(&services, handlers::transcribe))
        .build()
}

fn with_services<F, Fut>(services: &Arc<Services>, endpoint: F) -> impl Handler
where
    F: Fn(Arc<Services>, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, HandlerError>> + Send + 'static,
{
    let services = Arc::clone(services);
    move |request: Request| endpoint(Arc::clone(&services), request)
}
