//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Parsed Request (method, path)
//!     → router.rs (exact path lookup, then method)
//!     → Return: handler, NotFound or MethodNotAllowed
//!
//! Route registration (at startup):
//!     RouterBuilder::route(method, path, handler)...
//!     → build()
//!     → Freeze as immutable Router, shared via Arc
//! ```
//!
//! # Design Decisions
//! - Routes registered once at startup, immutable at runtime
//! - Exact matching only: deterministic and lock-free
//! - OPTIONS preflight is answered by the connection driver, not by routes
//! - Handlers receive their services at construction (no global lookups)

pub mod handler;
pub mod router;

pub use handler::{Handler, HandlerError, HandlerFuture};
pub use router::{RouteError, Router, RouterBuilder};
