//! Accept loop and connection hand-off.
//!
//! # Responsibilities
//! - Accept connections from the bounded listener until shutdown
//! - Spawn one connection driver per client inside a `connection` span
//! - Drain in-flight connections within the configured grace period

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpStream;
use tracing::Instrument;

use crate::config::ApiConfig;
use crate::lifecycle::ShutdownSignal;
use crate::net::connection::{Connection, ConnectionSettings, ConnectionTracker};
use crate::net::listener::{ConnectionPermit, Listener, ListenerError};
use crate::routing::Router;

/// Pause after a failed accept so a persistent error (e.g. fd exhaustion)
/// does not spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("listener failed: {0}")]
    Listener(#[from] ListenerError),
}

/// The local API server.
pub struct ApiServer {
    router: Arc<Router>,
    settings: Arc<ConnectionSettings>,
    drain_timeout: Duration,
    tracker: ConnectionTracker,
}

impl ApiServer {
    pub fn new(config: &ApiConfig, router: Router) -> Self {
        Self {
            router: Arc::new(router),
            settings: Arc::new(ConnectionSettings::from_config(config)),
            drain_timeout: Duration::from_secs(config.timeouts.drain_secs),
            tracker: ConnectionTracker::new(),
        }
    }

    /// Handle on the live connection count.
    pub fn tracker(&self) -> ConnectionTracker {
        self.tracker.clone()
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Serve until `shutdown` fires, then drain.
    pub async fn run(self, listener: Listener, mut shutdown: ShutdownSignal) -> Result<(), ServerError> {
        match listener.local_addr() {
            Ok(address) => tracing::info!(
                %address,
                routes = self.router.len(),
                "API server accepting connections"
            ),
            Err(e) => tracing::warn!(error = %e, "Could not read listener address"),
        }

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => self.spawn(stream, peer, permit),
                    Err(ListenerError::Accept(e)) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                    Err(e) => return Err(e.into()),
                },
            }
        }

        drop(listener);
        let active = self.tracker.active_count();
        tracing::info!(active, drain_timeout = ?self.drain_timeout, "Stopped accepting, draining connections");

        if tokio::time::timeout(self.drain_timeout, self.tracker.wait_idle())
            .await
            .is_err()
        {
            tracing::warn!(
                remaining = self.tracker.active_count(),
                "Drain deadline passed, abandoning connections"
            );
        }

        tracing::info!("API server stopped");
        Ok(())
    }

    fn spawn(&self, stream: TcpStream, peer: SocketAddr, permit: ConnectionPermit) {
        let guard = self.tracker.track();
        let id = guard.id();
        let connection = Connection::new(
            id,
            peer,
            stream,
            Arc::clone(&self.router),
            Arc::clone(&self.settings),
        );

        let span = tracing::info_span!("connection", connection_id = %id, %peer);
        tokio::spawn(
            async move {
                let _permit = permit;
                let _guard = guard;
                match connection.serve().await {
                    Ok(outcome) => tracing::debug!(?outcome, "Connection finished"),
                    Err(e) => tracing::debug!(error = %e, "Connection I/O failed"),
                }
            }
            .instrument(span),
        );
    }
}
