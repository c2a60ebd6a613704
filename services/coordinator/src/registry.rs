//! Destination registry.
//!
//! Holds the peer coordinator address and the node that migrated workloads
//! are scheduled onto. The registry is written by `/configure` and read at
//! the start of every migration.
//!
//! The intended operating model is a single trusted operator who configures
//! the destination before triggering migrations. Concurrent `configure` and
//! `migrate` calls are still safe: updates replace the whole configuration
//! in one pointer swap, so a reader never sees the address from one call
//! paired with the node from another.

use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::info;

/// Where migrated workloads go.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DestinationConfig {
    /// Base URI of the destination coordinator (example: http://10.0.0.2:8080).
    pub address: String,

    /// Node name the new pod is pinned to.
    pub target_node: String,
}

impl DestinationConfig {
    /// Both fields must be present before a migration may start.
    pub fn is_configured(&self) -> bool {
        !self.address.is_empty() && !self.target_node.is_empty()
    }
}

/// Process-wide store of the current migration destination.
pub struct DestinationRegistry {
    current: ArcSwap<DestinationConfig>,
}

impl DestinationRegistry {
    /// Create an unconfigured registry.
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(DestinationConfig::default()),
        }
    }

    /// Replace the destination unconditionally.
    ///
    /// Acceptance is syntactic only: neither the address nor the node name
    /// is checked for reachability.
    pub fn configure(&self, address: impl Into<String>, target_node: impl Into<String>) {
        let config = DestinationConfig {
            address: address.into(),
            target_node: target_node.into(),
        };

        info!(
            address = %config.address,
            target_node = %config.target_node,
            "Destination configured"
        );

        self.current.store(Arc::new(config));
    }

    pub fn is_configured(&self) -> bool {
        self.current.load().is_configured()
    }

    /// Consistent view of the current destination.
    pub fn snapshot(&self) -> Arc<DestinationConfig> {
        self.current.load_full()
    }
}

impl Default for DestinationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registry_is_unconfigured() {
        let registry = DestinationRegistry::new();
        assert!(!registry.is_configured());
        assert_eq!(*registry.snapshot(), DestinationConfig::default());
    }

    #[test]
    fn test_configure_reflects_latest_call() {
        let registry = DestinationRegistry::new();

        registry.configure("http://10.0.0.2:8080", "node-b");
        registry.configure("http://10.0.0.3:8080", "node-c");

        let snapshot = registry.snapshot();
        assert!(registry.is_configured());
        assert_eq!(snapshot.address, "http://10.0.0.3:8080");
        assert_eq!(snapshot.target_node, "node-c");
    }

    #[test]
    fn test_empty_field_is_not_configured() {
        let registry = DestinationRegistry::new();

        registry.configure("http://10.0.0.2:8080", "");
        assert!(!registry.is_configured());

        registry.configure("", "node-b");
        assert!(!registry.is_configured());
    }

    #[test]
    fn test_reconfigure_overwrites_instead_of_merging() {
        let registry = DestinationRegistry::new();

        registry.configure("http://10.0.0.2:8080", "node-b");
        registry.configure("http://10.0.0.9:8080", "");

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.address, "http://10.0.0.9:8080");
        assert_eq!(snapshot.target_node, "");
        assert!(!registry.is_configured());
    }

    #[test]
    fn test_snapshot_is_unaffected_by_later_configure() {
        let registry = DestinationRegistry::new();
        registry.configure("http://10.0.0.2:8080", "node-b");

        let in_flight = registry.snapshot();
        registry.configure("http://10.0.0.3:8080", "node-c");

        assert_eq!(in_flight.target_node, "node-b");
        assert_eq!(registry.snapshot().target_node, "node-c");
    }
}
