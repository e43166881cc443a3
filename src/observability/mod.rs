//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (pretty for development, JSON for machine parsing)
//!     → Metrics endpoint (Prometheus scrape, loopback only)
//! ```
//!
//! # Design Decisions
//! - Connection id flows through every log line of a connection
//! - Metrics are cheap no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
