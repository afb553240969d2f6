//! Error types for docker-dns.

use thiserror::Error;

use crate::runtime::RuntimeError;

/// Errors that can occur in the discovery DNS server.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// IO error (network, file, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Container runtime client error
    #[error("container runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// DNS protocol error
    #[error("DNS protocol error: {0}")]
    Proto(#[from] hickory_proto::ProtoError),

    /// Invalid configuration, rejected before anything starts serving
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The daemon event stream errored or closed. Fatal: without it the
    /// registry would silently go stale.
    #[error("container event stream terminated: {0}")]
    EventStream(String),
}
