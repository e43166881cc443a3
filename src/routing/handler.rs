//! Handler call contract.
//!
//! A handler takes ownership of one [`Request`] and resolves to a [`Response`]
//! or a [`HandlerError`]. Errors are converted to JSON envelopes by the
//! connection driver; they never escape the dispatch boundary.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;

use crate::http::multipart::MultipartError;
use crate::http::{Request, Response};

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Response, HandlerError>> + Send>>;

/// An endpoint implementation.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, request: Request) -> HandlerFuture;
}

impl<F, Fut> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, HandlerError>> + Send + 'static,
{
    fn call(&self, request: Request) -> HandlerFuture {
        Box::pin(self(request))
    }
}

/// Failure of a handler invocation.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// A dependent service is not ready (no model loaded, engine busy...).
    #[error("{0}")]
    NotReady(String),

    /// The request was understood but its content is unusable.
    #[error("{0}")]
    BadRequest(String),

    /// The request names something that does not exist.
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),

    #[error("handler did not finish within {0:?}")]
    TimedOut(Duration),
}

impl HandlerError {
    pub fn status(&self) -> u16 {
        match self {
            HandlerError::NotReady(_) | HandlerError::TimedOut(_) => 503,
            HandlerError::BadRequest(_) => 400,
            HandlerError::NotFound(_) => 404,
            HandlerError::Internal(_) => 500,
        }
    }

    pub fn into_response(self) -> Response {
        Response::error(self.status(), self.to_string())
    }
}

impl From<MultipartError> for HandlerError {
    fn from(e: MultipartError) -> Self {
        HandlerError::BadRequest(e.to_string())
    }
}
