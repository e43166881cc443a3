//! Route lookup.
//!
//! # Responsibilities
//! - Store registered routes keyed by exact path, then method
//! - Resolve a (method, path) pair to a handler or an explicit miss
//!
//! # Design Decisions
//! - Immutable after `build()` (shared via `Arc`, no locks on lookup)
//! - Exact path matching only, no templates or prefixes
//! - A path registered under another method is a 405, not a 404

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::routing::handler::Handler;

/// Why a request could not be routed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("no route for {path}")]
    NotFound { path: String },

    #[error("{method} is not allowed on {path}")]
    MethodNotAllowed { method: String, path: String },
}

impl RouteError {
    pub fn status(&self) -> u16 {
        match self {
            RouteError::NotFound { .. } => 404,
            RouteError::MethodNotAllowed { .. } => 405,
        }
    }
}

/// The frozen route table.
pub struct Router {
    // path -> method -> handler; BTreeMap keeps allowed-method listings stable
    routes: HashMap<String, BTreeMap<String, Arc<dyn Handler>>>,
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::default()
    }

    /// Resolve a request target to its handler.
    pub fn resolve(&self, method: &str, path: &str) -> Result<Arc<dyn Handler>, RouteError> {
        let by_method = self.routes.get(path).ok_or_else(|| RouteError::NotFound {
            path: path.to_string(),
        })?;

        by_method
            .get(method)
            .cloned()
            .ok_or_else(|| RouteError::MethodNotAllowed {
                method: method.to_string(),
                path: path.to_string(),
            })
    }

    /// Methods registered for `path`, sorted.
    pub fn allowed_methods(&self, path: &str) -> Vec<&str> {
        self.routes
            .get(path)
            .map(|by_method| by_method.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// All (method, path) pairs, sorted by path then method.
    pub fn routes(&self) -> Vec<(&str, &str)> {
        let mut all: Vec<(&str, &str)> = self
            .routes
            .iter()
            .flat_map(|(path, by_method)| {
                by_method
                    .keys()
                    .map(move |method| (method.as_str(), path.as_str()))
            })
            .collect();
        all.sort_by(|a, b| a.1.cmp(b.1).then(a.0.cmp(b.0)));
        all
    }

    pub fn len(&self) -> usize {
        self.routes.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes())
            .finish()
    }
}

/// Collects routes at startup.
#[derive(Default)]
pub struct RouterBuilder {
    routes: HashMap<String, BTreeMap<String, Arc<dyn Handler>>>,
}

impl RouterBuilder {
    /// Register `handler` for an exact method and path.
    ///
    /// Registering the same pair twice keeps the later handler.
    pub fn route(mut self, method: &str, path: &str, handler: impl Handler) -> Self {
        let previous = self
            .routes
            .entry(path.to_string())
            .or_default()
            .insert(method.to_string(), Arc::new(handler));
        if previous.is_some() {
            tracing::warn!(method, path, "Route registered twice, keeping the later handler");
        }
        self
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.route("GET", path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.route("POST", path, handler)
    }

    pub fn build(self) -> Router {
        Router {
            routes: self.routes,
        }
    }
}
