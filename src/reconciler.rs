//! Keeps the registry consistent with the container runtime: a full listing
//! at startup, then the live event stream.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::address::resolve_address;
use crate::container::short_id;
use crate::error::DiscoveryError;
use crate::metrics::{self, ReconcileOutcome};
use crate::registry::{ContainerRegistry, RegistryEntry};
use crate::resolvers::ResolverChain;
use crate::runtime::{ContainerEvent, ContainerRuntime};

/// Drives registry updates from runtime state.
///
/// Each event's procedure runs as an independent task; an apply token issued
/// at event arrival keeps same-identity installs in arrival order.
pub struct Reconciler<R> {
    runtime: Arc<R>,
    registry: ContainerRegistry,
    chain: Arc<ResolverChain>,
    tokens: AtomicU64,
}

impl<R: ContainerRuntime + 'static> Reconciler<R> {
    /// Create a reconciler over `runtime` writing into `registry`.
    pub fn new(runtime: Arc<R>, registry: ContainerRegistry, chain: Arc<ResolverChain>) -> Self {
        Self {
            runtime,
            registry,
            chain,
            tokens: AtomicU64::new(0),
        }
    }

    /// Populate from a full listing, mark the registry ready, then consume
    /// the event stream until shutdown.
    ///
    /// An event-stream error or end-of-stream is returned as a fatal
    /// [`DiscoveryError::EventStream`]: without the stream the registry would
    /// silently go stale, so the caller is expected to bring the process
    /// down rather than keep serving.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) -> Result<(), DiscoveryError> {
        self.populate().await?;
        self.registry.mark_ready();
        metrics::record_ready_state(true);

        let mut events = self.runtime.subscribe_events().await?;
        info!("container event stream established");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("reconciler shutting down");
                    return Ok(());
                }

                next = events.next() => match next {
                    Some(Ok(event)) => {
                        metrics::record_event(event.kind());
                        let token = self.next_token();
                        let this = Arc::clone(&self);
                        tokio::spawn(async move {
                            this.dispatch(event, token).await;
                        });
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "container event stream failed");
                        return Err(DiscoveryError::EventStream(e.to_string()));
                    }
                    None => {
                        error!("container event stream closed");
                        return Err(DiscoveryError::EventStream(
                            "event stream closed".to_string(),
                        ));
                    }
                },
            }
        }
    }

    fn next_token(&self) -> u64 {
        // Starts at 1 so every token orders after the registry's empty state.
        self.tokens.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// List and reconcile every running container. Per-container failures are
    /// absorbed by the update procedure; only a failed listing is fatal.
    async fn populate(&self) -> Result<(), DiscoveryError> {
        let ids = self.runtime.list_running().await?;
        info!(containers = ids.len(), "populating registry from full listing");

        for id in ids {
            let token = self.next_token();
            self.update_container(&id, token).await;
        }

        metrics::record_state_counts(
            self.registry.container_count(),
            self.registry.domain_count(),
        );
        Ok(())
    }

    async fn dispatch(&self, event: ContainerEvent, token: u64) {
        match &event {
            ContainerEvent::Started { id } => {
                debug!(container = short_id(id), "container started, resolving entry");
                self.update_container(id, token).await;
            }
            ContainerEvent::Died { id } => {
                debug!(container = short_id(id), "container died, dropping entry");
                self.remove_container(id, token);
            }
            ContainerEvent::NetworkConnected { id, network } => {
                debug!(
                    container = short_id(id),
                    network = network.as_str(),
                    "container connected to network, re-resolving entry"
                );
                self.update_container(id, token).await;
            }
            ContainerEvent::NetworkDisconnected { id, network } => {
                debug!(
                    container = short_id(id),
                    network = network.as_str(),
                    "container disconnected from network, re-resolving entry"
                );
                self.update_container(id, token).await;
            }
        }

        metrics::record_state_counts(
            self.registry.container_count(),
            self.registry.domain_count(),
        );
    }

    /// Inspect `id` and install or drop its registry entry. Every failure
    /// along the way is a transient per-container condition: log at debug and
    /// make sure no stale entry survives.
    async fn update_container(&self, id: &str, token: u64) {
        let snapshot = match self.runtime.inspect(id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                debug!(container = short_id(id), error = %e, "inspect failed, removing entry");
                self.registry.remove(id, token);
                metrics::record_reconcile(ReconcileOutcome::Removed);
                return;
            }
        };

        let address = match resolve_address(self.runtime.as_ref(), &snapshot).await {
            Ok(address) => address,
            Err(e) => {
                debug!(
                    container = snapshot.short_id(),
                    error = %e,
                    "no resolvable address, removing entry"
                );
                self.registry.remove(id, token);
                metrics::record_reconcile(ReconcileOutcome::Removed);
                return;
            }
        };

        let domains = self.chain.resolve_domains(&snapshot);
        if domains.is_empty() {
            debug!(
                container = snapshot.short_id(),
                "no domains resolved, removing entry"
            );
            self.registry.remove(id, token);
            metrics::record_reconcile(ReconcileOutcome::Removed);
            return;
        }

        let entry = RegistryEntry {
            snapshot,
            address,
            domains,
            revision: 0,
        };
        let outcome = if self.registry.upsert(entry, token) {
            ReconcileOutcome::Installed
        } else {
            ReconcileOutcome::Stale
        };
        metrics::record_reconcile(outcome);
    }

    fn remove_container(&self, id: &str, token: u64) {
        let outcome = if self.registry.remove(id, token) {
            ReconcileOutcome::Removed
        } else {
            ReconcileOutcome::Stale
        };
        metrics::record_reconcile(outcome);
    }
}
