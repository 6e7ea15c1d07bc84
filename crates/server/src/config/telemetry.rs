use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ServerError;

/// Transport used to ship spans to the collector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtlpProtocol {
    #[default]
    Grpc,
    Http,
}

impl fmt::Display for OtlpProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Grpc => "grpc",
            Self::Http => "http",
        })
    }
}

/// `[telemetry]`: span export for one node.
///
/// Every hop of an invocation is a span; with export on and the same
/// collector configured on every node, a whole call tree shows up as one
/// trace. The node's `telemetry` feature flag can still force export off.
///
/// ```toml
/// [telemetry]
/// enabled = true
/// endpoint = "http://localhost:4317"
/// protocol = "grpc"
/// sample_ratio = 1.0
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
    /// Collector address.
    pub endpoint: String,
    /// Overrides the reported `service.name`, which is the node name
    /// otherwise.
    pub service_name: Option<String>,
    /// Share of invocations traced, within `0.0..=1.0`.
    pub sample_ratio: f64,
    pub protocol: OtlpProtocol,
    pub timeout_seconds: u64,
    /// Extra resource attributes attached to every span of this node.
    pub resource_attributes: HashMap<String, String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "http://localhost:4317".to_owned(),
            service_name: None,
            sample_ratio: 1.0,
            protocol: OtlpProtocol::Grpc,
            timeout_seconds: 10,
            resource_attributes: HashMap::new(),
        }
    }
}

impl TelemetryConfig {
    /// Name reported for `node`'s spans.
    pub fn service_name_for(&self, node: &str) -> String {
        self.service_name.clone().unwrap_or_else(|| node.to_owned())
    }

    pub fn export_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        if !(0.0..=1.0).contains(&self.sample_ratio) {
            return Err(ServerError::Config(format!(
                "telemetry.sample_ratio must be within 0.0..=1.0, got {}",
                self.sample_ratio
            )));
        }
        if self.enabled && self.endpoint.trim().is_empty() {
            return Err(ServerError::Config(
                "telemetry.endpoint must be set when telemetry is enabled".into(),
            ));
        }
        Ok(())
    }
}
