//! Naming strategies: deriving domain names from a container snapshot.
//!
//! Each strategy is a pure function over the snapshot. The chain's output is
//! the concatenation of each strategy's yield in configured order; duplicates
//! are permitted and case is preserved. Stored domains never carry a trailing
//! dot.

use tracing::trace;

use crate::config::ResolverSpec;
use crate::container::ContainerSnapshot;
use crate::error::DiscoveryError;

/// One configured naming strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainResolver {
    /// `<container name>.<domain>`, with the daemon's leading `/` stripped.
    ContainerName {
        /// Suffix domain to append.
        domain: String,
    },
    /// `<hostname>.<domain>`. An unset hostname yields the degenerate
    /// `.<domain>` name; such a name cannot match any real query.
    Hostname {
        /// Suffix domain to append.
        domain: String,
    },
    /// The exact value of one label, taken as a full domain name.
    Label {
        /// Label key to look for.
        key: String,
    },
    /// Network-scoped aliases, either for one network or for all attached
    /// networks in network-name order.
    NetworkAliases {
        /// Restrict to one network; all attached networks when unset.
        network: Option<String>,
    },
}

impl DomainResolver {
    /// Domain names this strategy derives from `snapshot`. An empty yield is
    /// not an error.
    pub fn resolve(&self, snapshot: &ContainerSnapshot) -> Vec<String> {
        match self {
            Self::ContainerName { domain } => {
                vec![format!("{}.{}", snapshot.normalized_name(), domain)]
            }
            Self::Hostname { domain } => {
                vec![format!("{}.{}", snapshot.hostname, domain)]
            }
            Self::Label { key } => snapshot.labels.get(key).cloned().into_iter().collect(),
            Self::NetworkAliases { network } => match network {
                Some(name) => snapshot
                    .networks
                    .get(name)
                    .map(|n| n.aliases.clone())
                    .unwrap_or_default(),
                // networks is an ordered map, so this concatenation is stable.
                None => snapshot
                    .networks
                    .values()
                    .flat_map(|n| n.aliases.iter().cloned())
                    .collect(),
            },
        }
    }

    /// Suffix domain this strategy claims authority under, if any.
    pub fn zone_suffix(&self) -> Option<&str> {
        match self {
            Self::ContainerName { domain } | Self::Hostname { domain } => Some(domain),
            Self::Label { .. } | Self::NetworkAliases { .. } => None,
        }
    }
}

/// Ordered, immutable-after-setup list of naming strategies.
#[derive(Debug, Clone)]
pub struct ResolverChain {
    resolvers: Vec<DomainResolver>,
}

impl ResolverChain {
    /// Validate configured specs into a chain. Rejects an empty chain and
    /// empty suffix domains or label keys before anything starts serving.
    pub fn from_specs(specs: &[ResolverSpec]) -> Result<Self, DiscoveryError> {
        if specs.is_empty() {
            return Err(DiscoveryError::Config(
                "resolver chain is empty; configure at least one naming strategy".to_string(),
            ));
        }

        let mut resolvers = Vec::with_capacity(specs.len());
        for spec in specs {
            resolvers.push(match spec {
                ResolverSpec::ContainerName { domain } => DomainResolver::ContainerName {
                    domain: normalize_domain(domain, "container-name")?,
                },
                ResolverSpec::Hostname { domain } => DomainResolver::Hostname {
                    domain: normalize_domain(domain, "hostname")?,
                },
                ResolverSpec::Label { key } => {
                    if key.is_empty() {
                        return Err(DiscoveryError::Config(
                            "label resolver requires a non-empty key".to_string(),
                        ));
                    }
                    DomainResolver::Label { key: key.clone() }
                }
                ResolverSpec::NetworkAliases { network } => DomainResolver::NetworkAliases {
                    network: network.clone().filter(|n| !n.is_empty()),
                },
            });
        }

        Ok(Self { resolvers })
    }

    /// All domains the chain derives for `snapshot`, in chain order. A
    /// strategy yielding nothing never aborts the chain.
    pub fn resolve_domains(&self, snapshot: &ContainerSnapshot) -> Vec<String> {
        let mut domains = Vec::new();
        for resolver in &self.resolvers {
            let yielded = resolver.resolve(snapshot);
            if yielded.is_empty() {
                trace!(
                    container = snapshot.short_id(),
                    resolver = ?resolver,
                    "naming strategy yielded no domains"
                );
            }
            domains.extend(yielded);
        }
        domains
    }

    /// Suffix domains configured on the chain, in chain order, deduplicated.
    pub fn zone_suffixes(&self) -> Vec<String> {
        let mut suffixes: Vec<String> = Vec::new();
        for resolver in &self.resolvers {
            if let Some(suffix) = resolver.zone_suffix() {
                if !suffixes.iter().any(|s| s == suffix) {
                    suffixes.push(suffix.to_string());
                }
            }
        }
        suffixes
    }
}

fn normalize_domain(domain: &str, strategy: &str) -> Result<String, DiscoveryError> {
    let trimmed = domain.trim_end_matches('.');
    if trimmed.is_empty() {
        return Err(DiscoveryError::Config(format!(
            "{strategy} resolver requires a non-empty suffix domain"
        )));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{NetworkAttachment, NetworkMode};
    use std::collections::{BTreeMap, HashMap};

    fn snapshot() -> ContainerSnapshot {
        let mut networks = BTreeMap::new();
        networks.insert(
            "a_net".to_string(),
            NetworkAttachment {
                address: "172.18.0.2".to_string(),
                aliases: vec!["alpha.loc".to_string()],
            },
        );
        networks.insert(
            "b_net".to_string(),
            NetworkAttachment {
                address: "172.19.0.2".to_string(),
                aliases: vec!["beta.loc".to_string(), "Beta-Alias.loc".to_string()],
            },
        );

        ContainerSnapshot {
            id: "fa155d6fd141".to_string(),
            name: "/evil_ptolemy".to_string(),
            hostname: "nginx".to_string(),
            labels: HashMap::from([(
                "coredns.dockerdiscovery.host".to_string(),
                "label-host.loc".to_string(),
            )]),
            default_address: "192.11.0.1".to_string(),
            networks,
            network_mode: NetworkMode::Network("a_net".to_string()),
        }
    }

    #[test]
    fn container_name_strips_slash_and_appends_suffix() {
        let resolver = DomainResolver::ContainerName {
            domain: "docker.loc".to_string(),
        };
        assert_eq!(resolver.resolve(&snapshot()), vec!["evil_ptolemy.docker.loc"]);
    }

    #[test]
    fn hostname_appends_suffix() {
        let resolver = DomainResolver::Hostname {
            domain: "home.example.org".to_string(),
        };
        assert_eq!(resolver.resolve(&snapshot()), vec!["nginx.home.example.org"]);
    }

    #[test]
    fn empty_hostname_yields_degenerate_name() {
        let resolver = DomainResolver::Hostname {
            domain: "home.example.org".to_string(),
        };
        let mut s = snapshot();
        s.hostname.clear();
        assert_eq!(resolver.resolve(&s), vec![".home.example.org"]);
    }

    #[test]
    fn label_yields_exact_value_or_nothing() {
        let resolver = DomainResolver::Label {
            key: "coredns.dockerdiscovery.host".to_string(),
        };
        assert_eq!(resolver.resolve(&snapshot()), vec!["label-host.loc"]);

        let absent = DomainResolver::Label {
            key: "unset.key".to_string(),
        };
        assert!(absent.resolve(&snapshot()).is_empty());
    }

    #[test]
    fn network_aliases_for_one_network() {
        let resolver = DomainResolver::NetworkAliases {
            network: Some("b_net".to_string()),
        };
        assert_eq!(
            resolver.resolve(&snapshot()),
            vec!["beta.loc", "Beta-Alias.loc"]
        );
    }

    #[test]
    fn network_aliases_for_unknown_network_yields_nothing() {
        let resolver = DomainResolver::NetworkAliases {
            network: Some("no_such_net".to_string()),
        };
        assert!(resolver.resolve(&snapshot()).is_empty());
    }

    #[test]
    fn network_aliases_across_all_networks_in_stable_order() {
        let resolver = DomainResolver::NetworkAliases { network: None };
        assert_eq!(
            resolver.resolve(&snapshot()),
            vec!["alpha.loc", "beta.loc", "Beta-Alias.loc"]
        );
    }

    #[test]
    fn chain_concatenates_in_configured_order() {
        let chain = ResolverChain::from_specs(&[
            ResolverSpec::ContainerName {
                domain: "docker.loc".to_string(),
            },
            ResolverSpec::Hostname {
                domain: "home.example.org".to_string(),
            },
            ResolverSpec::Label {
                key: "coredns.dockerdiscovery.host".to_string(),
            },
            ResolverSpec::NetworkAliases {
                network: Some("a_net".to_string()),
            },
        ])
        .unwrap();

        assert_eq!(
            chain.resolve_domains(&snapshot()),
            vec![
                "evil_ptolemy.docker.loc",
                "nginx.home.example.org",
                "label-host.loc",
                "alpha.loc",
            ]
        );
    }

    #[test]
    fn trailing_dots_are_normalized_at_setup() {
        let chain = ResolverChain::from_specs(&[ResolverSpec::Hostname {
            domain: "home.example.org.".to_string(),
        }])
        .unwrap();
        assert_eq!(
            chain.resolve_domains(&snapshot()),
            vec!["nginx.home.example.org"]
        );
    }

    #[test]
    fn empty_chain_is_a_config_error() {
        assert!(matches!(
            ResolverChain::from_specs(&[]),
            Err(DiscoveryError::Config(_))
        ));
    }

    #[test]
    fn empty_suffix_domain_is_a_config_error() {
        assert!(matches!(
            ResolverChain::from_specs(&[ResolverSpec::ContainerName {
                domain: ".".to_string(),
            }]),
            Err(DiscoveryError::Config(_))
        ));
    }

    #[test]
    fn zone_suffixes_come_from_suffix_strategies_only() {
        let chain = ResolverChain::from_specs(&[
            ResolverSpec::ContainerName {
                domain: "docker.loc".to_string(),
            },
            ResolverSpec::Hostname {
                domain: "home.example.org".to_string(),
            },
            ResolverSpec::Hostname {
                domain: "docker.loc".to_string(),
            },
            ResolverSpec::Label {
                key: "k".to_string(),
            },
        ])
        .unwrap();
        assert_eq!(chain.zone_suffixes(), vec!["docker.loc", "home.example.org"]);
    }
}
