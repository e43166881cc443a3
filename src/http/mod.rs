//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! socket bytes
//!     → request.rs (accumulated buffer → Request | Incomplete | error)
//!     → [routing layer picks a handler]
//!     → multipart.rs (handlers decoding form uploads)
//!     → response.rs (status, content type, body → bytes)
//!     → socket bytes
//!
//! server.rs owns the accept loop and spawns one connection driver per client.
//! ```

pub mod multipart;
pub mod request;
pub mod response;
pub mod server;

pub use multipart::{DecodeMode, MultipartError, MultipartPart};
pub use request::{ParseError, Request};
pub use response::Response;
pub use server::ApiServer;
