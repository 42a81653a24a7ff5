//! Node configuration.

use serde::{Deserialize, Serialize};

use ocpi_node_core::VersionId;
use ocpi_node_store::AssetStoreConfig;
use ocpi_node_sync::{HandshakeConfig, OpenDataConfig};

use crate::error::{NodeError, Result};

/// Configuration for a [`Node`](crate::Node).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Public base URL every published endpoint lives under.
    pub base_url: String,
    /// Supported protocol versions. The first one is used for handshakes.
    pub versions: Vec<VersionId>,
    /// Modules served to callers without a token.
    pub open_data: OpenDataConfig,
    /// Outbound probe settings.
    pub handshake: HandshakeConfig,
    /// Resource store settings.
    pub assets: AssetStoreConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/ocpi".to_string(),
            versions: vec![VersionId::v2_2_1()],
            open_data: OpenDataConfig::default(),
            handshake: HandshakeConfig::default(),
            assets: AssetStoreConfig::default(),
        }
    }
}

impl NodeConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_open_data(mut self, open_data: OpenDataConfig) -> Self {
        self.open_data = open_data;
        self
    }

    pub fn with_handshake(mut self, handshake: HandshakeConfig) -> Self {
        self.handshake = handshake;
        self
    }

    pub fn with_allow_downgrades(mut self, allow: bool) -> Self {
        self.assets.allow_downgrades = allow;
        self
    }

    /// The version this node speaks in handshakes.
    pub fn protocol_version(&self) -> Option<&VersionId> {
        self.versions.first()
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(NodeError::InvalidConfig(format!(
                "base_url must be an http(s) URL, got {:?}",
                self.base_url
            )));
        }
        if self.versions.is_empty() {
            return Err(NodeError::InvalidConfig("no supported versions".into()));
        }
        if self.assets.event_capacity == 0 {
            return Err(NodeError::InvalidConfig("event_capacity must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = NodeConfig::default();
        config.validate().unwrap();
        assert_eq!(config.protocol_version(), Some(&VersionId::v2_2_1()));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: NodeConfig = serde_json::from_value(serde_json::json!({
            "base_url": "https://node.example/ocpi",
            "open_data": { "locations": true },
            "handshake": { "request_timeout_ms": 500 }
        }))
        .unwrap();

        assert!(config.open_data.locations);
        assert!(!config.open_data.tariffs);
        assert_eq!(config.handshake.request_timeout_ms, 500);
        assert_eq!(config.versions, vec![VersionId::v2_2_1()]);
        assert!(!config.assets.allow_downgrades);
    }

    #[test]
    fn test_invalid_configs() {
        assert!(NodeConfig::new("node.example").validate().is_err());

        let mut config = NodeConfig::new("https://node.example");
        config.versions.clear();
        assert!(matches!(config.validate(), Err(NodeError::InvalidConfig(_))));
    }
}
