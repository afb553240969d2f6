//! DNS server setup and lifecycle management.

use hickory_server::authority::{AuthorityObject, Catalog};
use hickory_server::ServerFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::authority::DockerAuthority;
use crate::config::DnsConfig;
use crate::error::DiscoveryError;
use crate::metrics;
use crate::reconciler::Reconciler;
use crate::registry::ContainerRegistry;
use crate::resolvers::ResolverChain;
use crate::runtime::DockerRuntime;

/// Interval for emitting state metrics.
const METRICS_INTERVAL: Duration = Duration::from_secs(10);

/// Periodically emit registry gauges.
async fn metrics_loop(registry: ContainerRegistry, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(METRICS_INTERVAL);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                emit_registry_metrics(&registry);
                debug!(
                    containers = registry.container_count(),
                    domains = registry.domain_count(),
                    "emitted state metrics"
                );
            }
            _ = shutdown.cancelled() => {
                debug!("metrics loop shutting down");
                return;
            }
        }
    }
}

/// A failed serving loop means dead listeners, which the process must not
/// survive with a success exit.
fn server_exit_result(result: Result<(), hickory_proto::ProtoError>) -> Result<(), DiscoveryError> {
    result.map_err(|e| {
        error!("DNS server error: {}", e);
        DiscoveryError::Proto(e)
    })
}

fn emit_registry_metrics(registry: &ContainerRegistry) {
    metrics::record_state_counts(registry.container_count(), registry.domain_count());
    metrics::record_ready_state(registry.is_ready());
    metrics::record_serial(registry.serial());
}

/// DNS server answering for containers discovered from the Docker daemon.
pub struct DnsServer {
    config: DnsConfig,
    registry: ContainerRegistry,
}

impl DnsServer {
    /// Create a new DNS server with the given configuration.
    pub fn new(config: DnsConfig) -> Self {
        Self {
            config,
            registry: ContainerRegistry::new(),
        }
    }

    /// Get a reference to the container registry.
    pub fn registry(&self) -> &ContainerRegistry {
        &self.registry
    }

    /// Run the DNS server until the shutdown token is cancelled.
    ///
    /// Returns an error if the event stream to the daemon fails: stale
    /// answers are worse than no answers, so the process is expected to exit
    /// and be restarted by its supervisor.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), DiscoveryError> {
        info!(
            listen_addr = %self.config.listen_addr,
            docker_endpoint = %self.config.docker_endpoint,
            "Starting docker-dns server"
        );

        // Validate the resolver chain before touching the daemon.
        let chain = Arc::new(ResolverChain::from_specs(&self.config.resolvers)?);

        let zones = self.config.zone_names(&chain.zone_suffixes());
        if zones.is_empty() {
            return Err(DiscoveryError::Config(
                "no zones configured: need at least one zone or a suffix-bearing resolver"
                    .to_string(),
            ));
        }

        // Connect to the Docker daemon and start the reconciler.
        let runtime = Arc::new(DockerRuntime::connect(&self.config.docker_endpoint)?);
        let reconciler = Arc::new(Reconciler::new(
            runtime,
            self.registry.clone(),
            Arc::clone(&chain),
        ));

        let reconciler_shutdown = shutdown.clone();
        let mut reconciler_handle = tokio::spawn(reconciler.run(reconciler_shutdown));

        // Wait for the initial population before accepting queries.
        info!("Waiting for initial container listing from Docker...");
        loop {
            if shutdown.is_cancelled() {
                info!("Shutdown requested before initial population completed");
                let _ = reconciler_handle.await;
                return Ok(());
            }

            if reconciler_handle.is_finished() {
                // The reconciler never returns Ok before shutdown, so this
                // is a startup failure.
                return match reconciler_handle.await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(e),
                    Err(e) => Err(DiscoveryError::EventStream(e.to_string())),
                };
            }

            if self.registry.is_ready() {
                info!(
                    containers = self.registry.container_count(),
                    domains = self.registry.domain_count(),
                    "Initial population complete"
                );
                break;
            }

            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        // One authority per zone, all over the shared registry.
        let mut catalog = Catalog::new();
        for zone in &zones {
            let authority = DockerAuthority::new(
                zone,
                self.registry.clone(),
                self.config.ttl,
                self.config.soa.clone(),
            )?;
            let authority: Arc<dyn AuthorityObject> = Arc::new(authority);
            catalog.upsert(authority.origin().clone(), vec![authority]);
        }

        // Create server
        let mut server = ServerFuture::new(catalog);

        // Bind UDP
        let udp_socket = UdpSocket::bind(self.config.listen_addr).await?;
        info!(addr = %self.config.listen_addr, "DNS UDP listening");
        server.register_socket(udp_socket);

        // Bind TCP
        let tcp_listener = TcpListener::bind(self.config.listen_addr).await?;
        info!(addr = %self.config.listen_addr, "DNS TCP listening");
        server.register_listener(tcp_listener, Duration::from_secs(30));

        info!(zones = ?zones, "DNS server ready to serve queries");

        // Start metrics loop
        let metrics_registry = self.registry.clone();
        let metrics_shutdown = shutdown.clone();
        let metrics_handle = tokio::spawn(async move {
            metrics_loop(metrics_registry, metrics_shutdown).await;
        });

        // Emit initial metrics
        emit_registry_metrics(&self.registry);

        // Run until shutdown or a fatal reconciler error.
        let (result, reconciler_joined) = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("DNS server shutdown requested");
                (Ok(()), false)
            }
            reconciler_result = &mut reconciler_handle => {
                let result = match reconciler_result {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => {
                        error!("Reconciler error: {}", e);
                        Err(e)
                    }
                    Err(e) => Err(DiscoveryError::EventStream(e.to_string())),
                };
                (result, true)
            }
            server_result = server.block_until_done() => {
                (server_exit_result(server_result), false)
            }
        };

        shutdown.cancel();

        // Wait for metrics loop to stop
        let _ = metrics_handle.await;

        if !reconciler_joined {
            info!("Waiting for reconciler to stop...");
            let _ = reconciler_handle.await;
        }

        info!("DNS server stopped");
        result
    }
}
