use std::collections::BTreeMap;

use serde::Deserialize;

use hopsim_core::NodeIdentity;

/// Identity of this node.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    /// Logical name, reported by the health endpoint and in every log line.
    pub name: String,
    /// Log filter used when `RUST_LOG` is not set.
    pub log_level: String,
    /// Named on/off switches. `telemetry = false` forces OTLP export off.
    pub features: BTreeMap<String, bool>,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            name: "node".to_owned(),
            log_level: "info".to_owned(),
            features: BTreeMap::new(),
        }
    }
}

/// Peers this node can address by logical name.
///
/// ```toml
/// [[topology.nodes]]
/// name = "auth"
/// port = 3001
///
/// [[topology.nodes]]
/// name = "billing"
/// host = "10.0.0.7"
/// port = 3002
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    pub nodes: Vec<NodeIdentity>,
}
