//! Point-in-time container metadata as reported by the daemon.

use std::collections::{BTreeMap, HashMap};

/// How a container reaches the network, as recorded in its host config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkMode {
    /// The container shares another container's network namespace.
    Container(String),
    /// The container is attached to a named network (including the default
    /// modes like `bridge`; the name keys into [`ContainerSnapshot::networks`]).
    Network(String),
}

/// One network attachment of a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkAttachment {
    /// Address on this network, as the raw daemon string. May be empty.
    pub address: String,
    /// Network-scoped aliases.
    pub aliases: Vec<String>,
}

/// Immutable view of one container at inspect time.
///
/// A fresh snapshot is produced by every inspect call; reconciliation replaces
/// snapshots whole and never mutates them in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSnapshot {
    /// Daemon-assigned identity, stable for the container's lifetime.
    pub id: String,
    /// Display name. The daemon reports it with a leading `/`.
    pub name: String,
    /// Configured hostname. May be empty.
    pub hostname: String,
    /// Label set.
    pub labels: HashMap<String, String>,
    /// Direct default-network address string. Empty when the container has no
    /// address on the default network.
    pub default_address: String,
    /// Per-network attachments, keyed by network name. Ordered so that
    /// iteration across networks is stable.
    pub networks: BTreeMap<String, NetworkAttachment>,
    /// Network-mode reference from the host config.
    pub network_mode: NetworkMode,
}

impl ContainerSnapshot {
    /// Display name with the daemon's leading `/` stripped.
    pub fn normalized_name(&self) -> &str {
        self.name.trim_start_matches('/')
    }

    /// Identity truncated for logging, the way the daemon CLI shows it.
    pub fn short_id(&self) -> &str {
        short_id(&self.id)
    }
}

/// Truncate an identity to twelve characters for logging. Ids are hex in
/// practice, but truncation stays on a character boundary regardless.
pub(crate) fn short_id(id: &str) -> &str {
    match id.char_indices().nth(12) {
        Some((end, _)) => &id[..end],
        None => id,
    }
}
