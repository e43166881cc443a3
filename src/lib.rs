//! Embedded HTTP/1.1 API server for on-device applications.
//!
//! Serves a small JSON and multipart API on the loopback interface only.
//! Every connection carries exactly one request and one response.

pub mod api;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;

pub use config::schema::ApiConfig;
pub use http::ApiServer;
pub use lifecycle::Shutdown;
