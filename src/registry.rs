//! The live directory of container identity → resolved entry, shared between
//! the reconciler (writer) and query resolution (readers).

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::container::ContainerSnapshot;

/// One container's resolved state. Installed and replaced whole, so a reader
/// never observes a new address paired with a stale domain list.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    /// The snapshot the entry was derived from.
    pub snapshot: ContainerSnapshot,
    /// Current routable address.
    pub address: IpAddr,
    /// Resolved domains in chain order, no trailing dot, duplicates allowed.
    pub domains: Vec<String>,
    /// Apply token of the change that installed this entry. Higher wins when
    /// two containers claim the same domain.
    pub revision: u64,
}

/// How many tokens behind the newest applied token a removed identity's
/// tombstone is kept. An in-flight update older than this cannot still be
/// pending, so the tombstone can go.
const TOMBSTONE_RETENTION: u64 = 1024;

#[derive(Debug, Default)]
struct RegistryInner {
    entries: HashMap<String, Arc<RegistryEntry>>,
    /// Last apply token seen per identity, kept after removal so a stale
    /// in-flight update cannot resurrect a dead container's entry. Pruned
    /// on removals once [`TOMBSTONE_RETENTION`] tokens have passed.
    applied: HashMap<String, u64>,
    latest_token: u64,
    serial: u32,
    ready: bool,
}

/// Thread-safe registry. Updates are infrequent relative to queries, so a
/// single reader-writer lock guards the whole map; no daemon call ever runs
/// while the lock is held.
#[derive(Debug, Clone, Default)]
pub struct ContainerRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl ContainerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically install or replace the entry for `entry.snapshot.id`.
    ///
    /// `token` orders same-identity changes: the call is a no-op returning
    /// `false` when a change with a newer token was already applied.
    pub fn upsert(&self, mut entry: RegistryEntry, token: u64) -> bool {
        let mut inner = self.inner.write();
        let id = entry.snapshot.id.clone();
        if inner.applied.get(&id).is_some_and(|&last| last > token) {
            debug!(container = %id, token, "discarding stale registry install");
            return false;
        }
        debug!(
            container = entry.snapshot.short_id(),
            address = %entry.address,
            domains = ?entry.domains,
            "installing registry entry"
        );
        entry.revision = token;
        inner.applied.insert(id.clone(), token);
        inner.entries.insert(id, Arc::new(entry));
        inner.latest_token = inner.latest_token.max(token);
        inner.serial = inner.serial.wrapping_add(1);
        true
    }

    /// Atomically delete the entry for `id` if present. Absence is not an
    /// error; the token is recorded either way.
    pub fn remove(&self, id: &str, token: u64) -> bool {
        let mut inner = self.inner.write();
        if inner.applied.get(id).is_some_and(|&last| last > token) {
            debug!(container = %id, token, "discarding stale registry removal");
            return false;
        }
        inner.applied.insert(id.to_string(), token);
        inner.latest_token = inner.latest_token.max(token);
        let removed = if inner.entries.remove(id).is_some() {
            debug!(container = %id, "removed registry entry");
            inner.serial = inner.serial.wrapping_add(1);
            true
        } else {
            false
        };

        // Tombstones are only created here, so this is the one place the
        // applied map can grow past the live entry set.
        let cutoff = inner.latest_token.saturating_sub(TOMBSTONE_RETENTION);
        let RegistryInner {
            entries, applied, ..
        } = &mut *inner;
        applied.retain(|id, token| entries.contains_key(id) || *token >= cutoff);

        removed
    }

    /// Find the entry claiming `qname`, which must be terminator-qualified
    /// (trailing dot). Matching is exact and case-sensitive against each
    /// stored domain with the terminator appended. When several containers
    /// claim the same domain the most recently updated entry wins.
    pub fn lookup_by_domain(&self, qname: &str) -> Option<Arc<RegistryEntry>> {
        let wanted = qname.strip_suffix('.')?;
        let inner = self.inner.read();
        inner
            .entries
            .values()
            .filter(|entry| entry.domains.iter().any(|d| d == wanted))
            .max_by_key(|entry| entry.revision)
            .cloned()
    }

    /// Number of registered containers.
    pub fn container_count(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// Combined number of resolved domains across all entries.
    pub fn domain_count(&self) -> usize {
        self.inner
            .read()
            .entries
            .values()
            .map(|entry| entry.domains.len())
            .sum()
    }

    /// Current SOA serial, bumped on every applied change.
    pub fn serial(&self) -> u32 {
        self.inner.read().serial
    }

    /// True once startup population has completed.
    pub fn is_ready(&self) -> bool {
        self.inner.read().ready
    }

    /// Mark startup population as complete.
    pub fn mark_ready(&self) {
        let mut inner = self.inner.write();
        inner.ready = true;
        debug!(
            containers = inner.entries.len(),
            "registry ready to serve queries"
        );
    }
}
