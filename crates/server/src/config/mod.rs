mod node;
mod server;
mod telemetry;


pub use node::*;
pub use server::*;
pub use telemetry::*;

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use hopsim_core::{FEATURE_TELEMETRY, NodeDirectory, NodeIdentity, PayloadLimits};
use hopsim_executor::InterpreterConfig;
use hopsim_script::SandboxConfig;

use crate::error::ServerError;

/// Top-level configuration for a hopsim node, loaded from a TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeConfig {
    /// Identity of this node.
    #[serde(default)]
    pub node: NodeSection,
    /// HTTP server bind configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Script sandbox limits.
    #[serde(default)]
    pub script: SandboxConfig,
    /// Interpreter configuration.
    #[serde(default)]
    pub executor: InterpreterConfig,
    /// Outbound transport configuration.
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// Acceptance limits for inbound continuation payloads.
    #[serde(default)]
    pub payload: PayloadLimits,
    /// OpenTelemetry distributed tracing configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    /// Peers addressable by logical name.
    #[serde(default)]
    pub topology: TopologyConfig,
}

/// Command-line or environment overrides applied on top of the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub name: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
    pub no_telemetry: bool,
}

impl NodeConfig {
    /// Load configuration from `path`. A missing file yields the defaults;
    /// the flag reports whether the file was found.
    pub fn load(path: impl AsRef<Path>) -> Result<(Self, bool), ServerError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok((Self::default(), false));
        }
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&contents)?;
        Ok((config, true))
    }

    pub fn from_toml(contents: &str) -> Result<Self, ServerError> {
        toml::from_str(contents).map_err(|e| ServerError::Config(e.to_string()))
    }

    #[must_use]
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        if let Some(name) = overrides.name {
            self.node.name = name;
        }
        if let Some(host) = overrides.host {
            self.server.host = host;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(level) = overrides.log_level {
            self.node.log_level = level;
        }
        if overrides.no_telemetry {
            self.node.features.insert(FEATURE_TELEMETRY.to_owned(), false);
        }
        self
    }

    /// Reject configurations the node cannot run with.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.node.name.trim().is_empty() {
            return Err(ServerError::Config("node.name must not be empty".into()));
        }
        self.script
            .validate()
            .map_err(|e| ServerError::Config(e.to_string()))?;
        if self.executor.max_depth == 0 {
            return Err(ServerError::Config("executor.max_depth must be at least 1".into()));
        }
        if self.payload.max_depth == 0 || self.payload.max_bytes == 0 {
            return Err(ServerError::Config(
                "payload.max_depth and payload.max_bytes must be at least 1".into(),
            ));
        }
        if self.dispatch.timeout_seconds == 0 {
            return Err(ServerError::Config(
                "dispatch.timeout_seconds must be at least 1".into(),
            ));
        }
        self.telemetry.validate()
    }

    /// This node's identity, assembled from `[node]` and `[server]`.
    pub fn identity(&self) -> NodeIdentity {
        let mut identity = NodeIdentity::new(self.node.name.as_str(), self.server.port)
            .with_host(self.server.host.clone())
            .with_log_level(self.node.log_level.clone());
        identity.features.clone_from(&self.node.features);
        identity
    }

    /// Directory of the configured peers plus this node itself.
    pub fn directory(&self) -> NodeDirectory {
        let mut directory: NodeDirectory = self.topology.nodes.iter().cloned().collect();
        directory.insert(self.identity());
        directory
    }

    /// Whether OTLP export should be installed: enabled in `[telemetry]`
    /// and not switched off by the node's `telemetry` feature.
    pub fn telemetry_enabled(&self) -> bool {
        self.telemetry.enabled && self.identity().feature_enabled(FEATURE_TELEMETRY)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch.timeout_seconds)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_seconds)
    }
}
