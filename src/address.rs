//! Deriving a container's routable address, following network-namespace
//! indirection through the runtime.

use std::net::IpAddr;

use thiserror::Error;
use tracing::debug;

use crate::container::{ContainerSnapshot, NetworkMode};
use crate::runtime::{ContainerRuntime, RuntimeError};

/// Maximum number of `container:` namespace hops to follow. The daemon does
/// not allow cycles, so this only guards against a misreporting daemon.
pub const MAX_NAMESPACE_HOPS: usize = 8;

/// Why a container has no resolvable address right now. All variants are
/// expected, transient conditions handled by dropping the registry entry.
#[derive(Debug, Error)]
pub enum AddressError {
    /// The daemon reports no address for the container.
    #[error("container has no address")]
    NoAddress,
    /// The network named by the container's network mode is missing from its
    /// attachments. Happens transiently while a disconnect event settles.
    #[error("unable to find network settings for the network {0}")]
    NetworkSettingsMissing(String),
    /// The container whose namespace is shared could not be inspected.
    #[error("shared network namespace container unavailable: {0}")]
    SharedNamespace(#[from] RuntimeError),
    /// More `container:` hops than the daemon could legitimately produce.
    #[error("network namespace indirection exceeded {MAX_NAMESPACE_HOPS} hops")]
    TooManyHops,
    /// The daemon reported an address string that does not parse.
    #[error("unparseable address {0:?}")]
    Unparseable(String),
}

fn parse_address(raw: &str) -> Result<IpAddr, AddressError> {
    if raw.is_empty() {
        // An empty string means "no address", never the zero address.
        return Err(AddressError::NoAddress);
    }
    raw.parse()
        .map_err(|_| AddressError::Unparseable(raw.to_string()))
}

/// Resolve the current routable address of `snapshot`'s container.
///
/// A direct default-network address wins. Otherwise the network-mode
/// reference decides: a shared namespace re-fetches the referenced
/// container's live snapshot and restarts, a named network is looked up in
/// the snapshot's attachments.
pub async fn resolve_address<R: ContainerRuntime + ?Sized>(
    runtime: &R,
    snapshot: &ContainerSnapshot,
) -> Result<IpAddr, AddressError> {
    let mut current = snapshot.clone();

    for _ in 0..MAX_NAMESPACE_HOPS {
        if !current.default_address.is_empty() {
            return parse_address(&current.default_address);
        }

        match &current.network_mode {
            NetworkMode::Container(other) => {
                debug!(
                    container = current.short_id(),
                    via = other.as_str(),
                    "container is in another container's network namespace"
                );
                current = runtime.inspect(other).await?;
            }
            NetworkMode::Network(name) => {
                let attachment = current
                    .networks
                    .get(name)
                    .ok_or_else(|| AddressError::NetworkSettingsMissing(name.clone()))?;
                return parse_address(&attachment.address);
            }
        }
    }

    Err(AddressError::TooManyHops)
}
