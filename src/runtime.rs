//! Container runtime boundary: the trait the reconciler consumes and its
//! Docker daemon implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::container::{InspectContainerOptions, ListContainersOptions};
use bollard::models::{ContainerInspectResponse, EventMessage, EventMessageTypeEnum};
use bollard::system::EventsOptions;
use bollard::Docker;
use futures::stream::BoxStream;
use futures::StreamExt;
use thiserror::Error;
use tracing::{debug, warn};

use crate::container::{ContainerSnapshot, NetworkAttachment, NetworkMode};

/// Connection timeout for daemon calls, in seconds.
const DAEMON_TIMEOUT_SECS: u64 = 120;

/// Errors surfaced by a container runtime implementation.
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    /// The daemon API call failed.
    #[error("container runtime api error: {0}")]
    Api(String),
    /// The requested container does not exist (anymore).
    #[error("container {0} not found")]
    NotFound(String),
}

/// A lifecycle notification relevant to discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerEvent {
    /// A container started.
    Started {
        /// Container identity.
        id: String,
    },
    /// A container stopped.
    Died {
        /// Container identity.
        id: String,
    },
    /// A container was attached to a network.
    NetworkConnected {
        /// Container identity.
        id: String,
        /// Network name.
        network: String,
    },
    /// A container was detached from a network.
    NetworkDisconnected {
        /// Container identity.
        id: String,
        /// Network name.
        network: String,
    },
}

impl ContainerEvent {
    /// Identity of the container the event concerns.
    pub fn container_id(&self) -> &str {
        match self {
            Self::Started { id }
            | Self::Died { id }
            | Self::NetworkConnected { id, .. }
            | Self::NetworkDisconnected { id, .. } => id,
        }
    }

    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Started { .. } => "container:start",
            Self::Died { .. } => "container:die",
            Self::NetworkConnected { .. } => "network:connect",
            Self::NetworkDisconnected { .. } => "network:disconnect",
        }
    }
}

/// Live event stream from the runtime. Ends only when the source does.
pub type EventStream = BoxStream<'static, Result<ContainerEvent, RuntimeError>>;

/// What the reconciler needs from the container runtime.
///
/// [`DockerRuntime`] is the production implementation; tests substitute an
/// in-memory one.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Identities of all currently running containers.
    async fn list_running(&self) -> Result<Vec<String>, RuntimeError>;

    /// Fresh metadata snapshot for one container.
    async fn inspect(&self, id: &str) -> Result<ContainerSnapshot, RuntimeError>;

    /// Subscribe to start/die/connect/disconnect events.
    async fn subscribe_events(&self) -> Result<EventStream, RuntimeError>;
}

/// [`ContainerRuntime`] backed by the Docker Engine API.
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect to the daemon at `endpoint` (`unix://...` or an HTTP/TCP
    /// address; empty selects the platform default socket).
    pub fn connect(endpoint: &str) -> Result<Self, RuntimeError> {
        let docker = if endpoint.is_empty() {
            Docker::connect_with_local_defaults()
        } else if endpoint.starts_with("unix://") {
            Docker::connect_with_unix(endpoint, DAEMON_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
        } else {
            Docker::connect_with_http(endpoint, DAEMON_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
        }
        .map_err(|e| RuntimeError::Api(e.to_string()))?;

        Ok(Self { docker })
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_running(&self) -> Result<Vec<String>, RuntimeError> {
        let summaries = self
            .docker
            .list_containers(Some(ListContainersOptions::<String> {
                all: false,
                ..Default::default()
            }))
            .await
            .map_err(|e| RuntimeError::Api(e.to_string()))?;

        Ok(summaries.into_iter().filter_map(|c| c.id).collect())
    }

    async fn inspect(&self, id: &str) -> Result<ContainerSnapshot, RuntimeError> {
        let response = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| match e {
                bollard::errors::Error::DockerResponseServerError {
                    status_code: 404, ..
                } => RuntimeError::NotFound(id.to_string()),
                other => RuntimeError::Api(other.to_string()),
            })?;

        snapshot_from_inspect(response)
    }

    async fn subscribe_events(&self) -> Result<EventStream, RuntimeError> {
        let mut filters = HashMap::new();
        filters.insert(
            "type".to_string(),
            vec!["container".to_string(), "network".to_string()],
        );
        filters.insert(
            "event".to_string(),
            vec![
                "start".to_string(),
                "die".to_string(),
                "connect".to_string(),
                "disconnect".to_string(),
            ],
        );
        let options = EventsOptions::<String> {
            filters,
            ..Default::default()
        };

        // Pump the daemon stream through a channel so the caller gets an
        // owned stream without tying its lifetime to this client.
        let (tx, mut rx) = tokio::sync::mpsc::channel(64);
        let docker = self.docker.clone();
        tokio::spawn(async move {
            let mut events = docker.events(Some(options));
            while let Some(item) = events.next().await {
                let forwarded = match item {
                    Ok(message) => match map_event(message) {
                        Some(event) => tx.send(Ok(event)).await,
                        None => continue,
                    },
                    Err(e) => {
                        let _ = tx.send(Err(RuntimeError::Api(e.to_string()))).await;
                        return;
                    }
                };
                if forwarded.is_err() {
                    debug!("event subscriber dropped, stopping daemon event pump");
                    return;
                }
            }
        });

        Ok(futures::stream::poll_fn(move |cx| rx.poll_recv(cx)).boxed())
    }
}

/// Map a raw daemon event to a [`ContainerEvent`], dropping anything the
/// daemon-side filter let through that discovery does not care about.
fn map_event(message: EventMessage) -> Option<ContainerEvent> {
    let action = message.action.as_deref()?;
    let actor = message.actor?;

    match message.typ? {
        EventMessageTypeEnum::CONTAINER => {
            let id = actor.id?;
            match action {
                "start" => Some(ContainerEvent::Started { id }),
                "die" => Some(ContainerEvent::Died { id }),
                _ => None,
            }
        }
        EventMessageTypeEnum::NETWORK => {
            let attributes = actor.attributes?;
            let id = attributes.get("container")?.clone();
            let network = attributes.get("name").cloned().unwrap_or_default();
            match action {
                "connect" => Some(ContainerEvent::NetworkConnected { id, network }),
                "disconnect" => Some(ContainerEvent::NetworkDisconnected { id, network }),
                _ => None,
            }
        }
        other => {
            warn!(?other, action, "unexpected event type passed the daemon filter");
            None
        }
    }
}

/// Convert a daemon inspect response into the discovery snapshot model.
fn snapshot_from_inspect(
    response: ContainerInspectResponse,
) -> Result<ContainerSnapshot, RuntimeError> {
    let id = response
        .id
        .ok_or_else(|| RuntimeError::Api("inspect response missing container id".to_string()))?;

    let config = response.config.unwrap_or_default();
    let settings = response.network_settings.unwrap_or_default();

    let networks = settings
        .networks
        .unwrap_or_default()
        .into_iter()
        .map(|(name, endpoint)| {
            (
                name,
                NetworkAttachment {
                    address: endpoint.ip_address.unwrap_or_default(),
                    aliases: endpoint.aliases.unwrap_or_default(),
                },
            )
        })
        .collect();

    let mode = response
        .host_config
        .and_then(|h| h.network_mode)
        .unwrap_or_else(|| "default".to_string());
    let network_mode = match mode.strip_prefix("container:") {
        Some(other) => NetworkMode::Container(other.to_string()),
        None => NetworkMode::Network(mode),
    };

    Ok(ContainerSnapshot {
        id,
        name: response.name.unwrap_or_default(),
        hostname: config.hostname.unwrap_or_default(),
        labels: config.labels.unwrap_or_default(),
        default_address: settings.ip_address.unwrap_or_default(),
        networks,
        network_mode,
    })
}
