//! Docker DNS - An authoritative DNS server backed by live Docker daemon state.
//!
//! This crate provides a DNS server that automatically serves A/AAAA records
//! for running containers. It takes a full listing at startup, then follows
//! the daemon's event stream and updates its records in real-time.
//!
//! ## Features
//!
//! - Real-time DNS updates from Docker container and network events
//! - Pluggable naming strategies: container name, hostname, label, network aliases
//! - Network-namespace-aware address resolution (`--net=container:<id>`)
//! - Graceful shutdown support
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         docker-dns                              │
//! │                                                                 │
//! │  ┌──────────────────┐    ┌──────────────────┐                  │
//! │  │ Docker Client    │───▶│ Container        │                  │
//! │  │ (event stream)   │    │ Registry         │                  │
//! │  └──────────────────┘    └────────┬─────────┘                  │
//! │         │                         │                             │
//! │         │ Events:                 ▼                             │
//! │         │ - container start/die   ┌──────────────────┐         │
//! │         │ - network (dis)connect  │  Hickory DNS     │◀── UDP/ │
//! │         │                         │  Server          │    TCP  │
//! │         └────────────────────────▶└──────────────────┘         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## DNS Resolution
//!
//! ```text
//! nginx.docker.loc
//!   → match against domains derived by the resolver chain
//!   → pick the most recently updated entry on a collision
//!   → return the A (or AAAA) record with the container's address
//! ```
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use docker_dns::{DnsConfig, DnsServer, ResolverSpec, SoaConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = DnsConfig {
//!         listen_addr: "[::]:5353".parse().unwrap(),
//!         docker_endpoint: "unix:///var/run/docker.sock".to_string(),
//!         ttl: 3600,
//!         zones: vec![],
//!         resolvers: vec![ResolverSpec::ContainerName {
//!             domain: "docker.loc".to_string(),
//!         }],
//!         soa: SoaConfig::default(),
//!     };
//!
//!     let shutdown = CancellationToken::new();
//!
//!     let server = DnsServer::new(config);
//!     server.run(shutdown).await.unwrap();
//! }
//! ```

#![warn(missing_docs)]

pub mod address;
pub mod authority;
pub mod config;
pub mod container;
pub mod error;
pub mod metrics;
pub mod reconciler;
pub mod registry;
pub mod resolvers;
pub mod runtime;
pub mod server;
pub mod telemetry;

// Re-export main types
pub use config::{Config, DnsConfig, ResolverSpec, SoaConfig, TelemetryConfig};
pub use container::{ContainerSnapshot, NetworkAttachment, NetworkMode};
pub use error::DiscoveryError;
pub use registry::{ContainerRegistry, RegistryEntry};
pub use resolvers::{DomainResolver, ResolverChain};
pub use runtime::{ContainerEvent, ContainerRuntime, DockerRuntime, RuntimeError};
pub use server::DnsServer;
