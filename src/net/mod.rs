//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (loopback-only bind, connection limits)
//!     → connection.rs (read, parse, route, dispatch, respond, close)
//!
//! Connection States:
//!     AwaitingHeaders → AwaitingBody(n) → Complete → Dispatching → Responding → Closed
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - One request per connection; keep-alive is not offered

pub mod connection;
pub mod listener;

pub use connection::{Connection, ConnectionSettings, ConnectionState, ConnectionTracker, Outcome};
pub use listener::{Listener, ListenerError};
