//! Connection state machine and lifecycle tracking.
//!
//! # Responsibilities
//! - Accumulate bytes until the parser yields a request or an error
//! - Route, invoke the handler, serialize and write exactly one response
//! - Bound the time spent reading a request and running its handler
//! - Track live connections for graceful shutdown
//!
//! # States
//! ```text
//! AwaitingHeaders → AwaitingBody(n) → Complete → Dispatching → Responding → Closed
//!        │                 │              │            │
//!        └─────────────────┴──────────────┴────────────┴──→ Errored → Responding
//! ```
//! Malformed input and oversized bodies answer 400/413 without routing.
//! Unknown paths and wrong methods answer 404/405 without a handler.
//! Handler failures answer with a JSON error envelope; panics become 500.

use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::config::ApiConfig;
use crate::http::request::{self, Needed, ParseError, Request};
use crate::http::Response;
use crate::observability::metrics;
use crate::routing::{Handler, HandlerError, Router};

const READ_CHUNK: usize = 16 * 1024;

/// Global atomic counter for connection IDs.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Where a connection is in its single request/response exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    AwaitingHeaders,
    /// Headers parsed; this many body bytes still missing.
    AwaitingBody(usize),
    Complete,
    Dispatching,
    Responding,
    Errored,
    Closed,
}

/// How a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A response with this status was written.
    Responded(u16),
    /// Closed without a response: peer went away idle, or the read deadline passed.
    Abandoned,
}

/// Per-connection limits, shared by every connection of a server.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSettings {
    pub max_body_size: usize,
    pub max_header_size: usize,
    pub read_timeout: Duration,
    pub handler_timeout: Duration,
}

impl ConnectionSettings {
    pub fn from_config(config: &ApiConfig) -> Self {
        Self {
            max_body_size: config.limits.max_body_size,
            max_header_size: config.limits.max_header_size,
            read_timeout: Duration::from_secs(config.timeouts.read_secs),
            handler_timeout: Duration::from_secs(config.timeouts.handler_secs),
        }
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self::from_config(&ApiConfig::default())
    }
}

enum Received {
    Request(Request),
    Rejected(Response),
    Abandoned,
}

/// Drives one accepted connection from first byte to close.
pub struct Connection<S> {
    id: ConnectionId,
    peer: SocketAddr,
    stream: S,
    buffer: Vec<u8>,
    state: ConnectionState,
    router: Arc<Router>,
    settings: Arc<ConnectionSettings>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(
        id: ConnectionId,
        peer: SocketAddr,
        stream: S,
        router: Arc<Router>,
        settings: Arc<ConnectionSettings>,
    ) -> Self {
        Self {
            id,
            peer,
            stream,
            buffer: Vec::new(),
            state: ConnectionState::AwaitingHeaders,
            router,
            settings,
        }
    }

    /// Serve a single request, then close.
    pub async fn serve(mut self) -> std::io::Result<Outcome> {
        let started = std::time::Instant::now();

        let response = match self.receive().await? {
            Received::Request(request) => {
                let method = request.method.clone();
                let response = self.dispatch(request).await;
                metrics::record_request(&method, response.status(), started);
                response
            }
            Received::Rejected(response) => response,
            Received::Abandoned => {
                self.transition(ConnectionState::Closed);
                return Ok(Outcome::Abandoned);
            }
        };

        let status = response.status();
        self.respond(&response).await?;
        Ok(Outcome::Responded(status))
    }

    async fn receive(&mut self) -> std::io::Result<Received> {
        let deadline = Instant::now() + self.settings.read_timeout;
        let mut chunk = vec![0u8; READ_CHUNK];
        // no point re-parsing before this many bytes are buffered
        let mut wanted = 0;

        loop {
            if self.buffer.len() >= wanted {
                match request::parse_with_limit(&self.buffer, self.settings.max_body_size) {
                    Ok(request) => {
                        self.buffer = Vec::new();
                        self.transition(ConnectionState::Complete);
                        return Ok(Received::Request(request));
                    }
                    Err(ParseError::Incomplete(Needed::Headers)) => {
                        if self.buffer.len() > self.settings.max_header_size {
                            return Ok(self.reject(400, "request header block too large", "header_too_large"));
                        }
                        self.transition(ConnectionState::AwaitingHeaders);
                    }
                    Err(ParseError::Incomplete(Needed::Body(missing))) => {
                        wanted = self.await_body(missing);
                    }
                    Err(e @ ParseError::Malformed(_)) => {
                        return Ok(self.reject(400, e.to_string(), "malformed"));
                    }
                    Err(e @ ParseError::BodyTooLarge { .. }) => {
                        return Ok(self.reject(413, e.to_string(), "body_too_large"));
                    }
                }
            }

            // never read past the declared body into the reserved buffer
            let limit = match wanted.checked_sub(self.buffer.len()) {
                Some(remaining) if remaining > 0 => remaining.min(READ_CHUNK),
                _ => READ_CHUNK,
            };
            let read = match tokio::time::timeout_at(deadline, self.stream.read(&mut chunk[..limit])).await {
                Ok(read) => read?,
                Err(_) => {
                    tracing::warn!(
                        connection_id = %self.id,
                        state = ?self.state,
                        buffered = self.buffer.len(),
                        "Read deadline elapsed, closing"
                    );
                    metrics::record_rejection("read_timeout");
                    return Ok(Received::Abandoned);
                }
            };

            if read == 0 {
                if self.buffer.is_empty() {
                    tracing::trace!(connection_id = %self.id, "Peer closed without sending a request");
                    return Ok(Received::Abandoned);
                }
                return Ok(self.reject(400, "connection closed before the request was complete", "truncated"));
            }
            self.buffer.extend_from_slice(&chunk[..read]);

            if let ConnectionState::AwaitingBody(_) = self.state {
                self.state = ConnectionState::AwaitingBody(wanted.saturating_sub(self.buffer.len()));
            }
        }
    }

    /// Size the buffer for the whole body once, so a large upload is not
    /// grown by repeated doubling. Returns the buffer length that completes it.
    fn await_body(&mut self, missing: usize) -> usize {
        self.buffer.reserve_exact(missing);
        self.transition(ConnectionState::AwaitingBody(missing));
        self.buffer.len() + missing
    }

    async fn dispatch(&mut self, request: Request) -> Response {
        if request.method == "OPTIONS" {
            return Response::preflight();
        }

        let handler = match self.router.resolve(&request.method, &request.path) {
            Ok(handler) => handler,
            Err(e) => {
                tracing::debug!(
                    connection_id = %self.id,
                    error = %e,
                    allowed = ?self.router.allowed_methods(&request.path),
                    "Routing failed"
                );
                self.transition(ConnectionState::Errored);
                return Response::error(e.status(), e.to_string());
            }
        };

        self.transition(ConnectionState::Dispatching);
        tracing::debug!(
            connection_id = %self.id,
            peer = %self.peer,
            method = %request.method,
            path = %request.path,
            body_bytes = request.body.len(),
            "Dispatching request"
        );

        let timeout = self.settings.handler_timeout;
        let invocation = AssertUnwindSafe(handler.call(request)).catch_unwind();
        match tokio::time::timeout(timeout, invocation).await {
            Ok(Ok(Ok(response))) => response,
            Ok(Ok(Err(error))) => {
                tracing::warn!(connection_id = %self.id, status = error.status(), %error, "Handler failed");
                self.transition(ConnectionState::Errored);
                error.into_response()
            }
            Ok(Err(_)) => {
                tracing::error!(connection_id = %self.id, "Handler panicked");
                self.transition(ConnectionState::Errored);
                Response::error(500, "internal error while handling the request")
            }
            Err(_) => {
                tracing::warn!(connection_id = %self.id, ?timeout, "Handler timed out");
                self.transition(ConnectionState::Errored);
                HandlerError::TimedOut(timeout).into_response()
            }
        }
    }

    async fn respond(&mut self, response: &Response) -> std::io::Result<()> {
        self.transition(ConnectionState::Responding);
        let bytes = response.serialize();

        let written = tokio::time::timeout(self.settings.read_timeout, async {
            self.stream.write_all(&bytes).await?;
            self.stream.flush().await?;
            self.stream.shutdown().await
        })
        .await
        .unwrap_or_else(|_| {
            Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "client did not accept the response in time",
            ))
        });

        self.transition(ConnectionState::Closed);
        tracing::debug!(
            connection_id = %self.id,
            status = response.status(),
            bytes = bytes.len(),
            "Response written"
        );
        written
    }

    fn reject(&mut self, status: u16, message: impl Into<String>, reason: &'static str) -> Received {
        let message = message.into();
        tracing::debug!(connection_id = %self.id, status, reason, %message, "Rejecting request");
        metrics::record_rejection(reason);
        self.transition(ConnectionState::Errored);
        Received::Rejected(Response::error(status, message))
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state != next {
            tracing::trace!(connection_id = %self.id, from = ?self.state, to = ?next, "State transition");
            self.state = next;
        }
    }
}

/// Tracks live connections for graceful shutdown.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    inner: Arc<TrackerInner>,
}

#[derive(Debug, Default)]
struct TrackerInner {
    active: AtomicU64,
    idle: Notify,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new live connection. The guard releases it on drop.
    pub fn track(&self) -> ConnectionGuard {
        self.inner.active.fetch_add(1, Ordering::SeqCst);
        metrics::connection_opened();
        ConnectionGuard {
            inner: Arc::clone(&self.inner),
            id: ConnectionId::new(),
        }
    }

    pub fn active_count(&self) -> u64 {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Resolve once no connections are live.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.active_count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Guard for one tracked connection.
#[derive(Debug)]
pub struct ConnectionGuard {
    inner: Arc<TrackerInner>,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        metrics::connection_closed();
        if self.inner.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.idle.notify_waiters();
        }
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}
