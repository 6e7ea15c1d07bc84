use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::NodeName;

/// Feature flag that toggles OpenTelemetry export on a node.
pub const FEATURE_TELEMETRY: &str = "telemetry";

/// Identity of one node instance.
///
/// Used to address `http` actions by logical name and, on the receiving
/// side, to label diagnostics. It has no effect on how actions execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeIdentity {
    pub name: NodeName,
    #[serde(default = "default_host")]
    pub host: String,
    /// Listen port. Zero means "pick a free port" where that is supported.
    #[serde(default)]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Named on/off switches, e.g. `telemetry = false`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub features: BTreeMap<String, bool>,
}

fn default_host() -> String {
    "127.0.0.1".to_owned()
}

fn default_log_level() -> String {
    "info".to_owned()
}

impl NodeIdentity {
    #[must_use]
    pub fn new(name: impl Into<NodeName>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: default_host(),
            port,
            log_level: default_log_level(),
            features: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    #[must_use]
    pub fn with_feature(mut self, feature: impl Into<String>, enabled: bool) -> Self {
        self.features.insert(feature.into(), enabled);
        self
    }

    /// Whether `feature` is on. Unlisted features are on.
    pub fn feature_enabled(&self, feature: &str) -> bool {
        self.features.get(feature).copied().unwrap_or(true)
    }

    /// `http://host:port`
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Where an `http` action is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A fully formed URL.
    Url(String),
    /// A logical node plus a path on it.
    Node { name: String, path: String },
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(url) => f.write_str(url),
            Self::Node { name, path } => write!(f, "node://{name}{path}"),
        }
    }
}

/// Maps logical node names to their network identity.
#[derive(Debug, Clone, Default)]
pub struct NodeDirectory {
    nodes: HashMap<NodeName, NodeIdentity>,
}

impl NodeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a node.
    pub fn insert(&mut self, identity: NodeIdentity) {
        self.nodes.insert(identity.name.clone(), identity);
    }

    pub fn get(&self, name: &str) -> Option<&NodeIdentity> {
        self.nodes.get(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeIdentity> {
        self.nodes.values()
    }

    /// Turn a target into a URL. `None` when the node is not registered.
    pub fn resolve(&self, target: &Target) -> Option<String> {
        match target {
            Target::Url(url) => Some(url.clone()),
            Target::Node { name, path } => self
                .get(name)
                .map(|node| format!("{}{path}", node.base_url())),
        }
    }
}

impl FromIterator<NodeIdentity> for NodeDirectory {
    fn from_iter<I: IntoIterator<Item = NodeIdentity>>(iter: I) -> Self {
        let mut directory = Self::new();
        for identity in iter {
            directory.insert(identity);
        }
        directory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_defaults_from_toml_like_json() {
        let identity: NodeIdentity =
            serde_json::from_str(r#"{"name": "AuthService", "port": 3001}"#).unwrap();
        assert_eq!(identity.host, "127.0.0.1");
        assert_eq!(identity.log_level, "info");
        assert!(identity.feature_enabled(FEATURE_TELEMETRY));
        assert_eq!(identity.base_url(), "http://127.0.0.1:3001");
    }

    #[test]
    fn feature_flags() {
        let identity = NodeIdentity::new("a", 1).with_feature(FEATURE_TELEMETRY, false);
        assert!(!identity.feature_enabled(FEATURE_TELEMETRY));
        assert!(identity.feature_enabled("anything-else"));
    }

    #[test]
    fn directory_resolves_targets() {
        let directory: NodeDirectory = [
            NodeIdentity::new("auth", 3001),
            NodeIdentity::new("users", 3005).with_host("10.0.0.5"),
        ]
        .into_iter()
        .collect();

        assert_eq!(directory.len(), 2);
        assert_eq!(
            directory.resolve(&Target::Node {
                name: "users".into(),
                path: "/api/v1/user-info".into(),
            }),
            Some("http://10.0.0.5:3005/api/v1/user-info".into())
        );
        assert_eq!(
            directory.resolve(&Target::Url("http://example.com/x".into())),
            Some("http://example.com/x".into())
        );
        assert_eq!(
            directory.resolve(&Target::Node {
                name: "ghost".into(),
                path: String::new(),
            }),
            None
        );
    }

    #[test]
    fn target_display() {
        let target = Target::Node {
            name: "auth".into(),
            path: "/login".into(),
        };
        assert_eq!(target.to_string(), "node://auth/login");
    }
}
