//! Topology bootstrapper: start a scenario's nodes and fire its root requests.

use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument, warn};

use hopsim_core::HttpAction;
use hopsim_server::config::NodeConfig;

use crate::error::SimulationError;
use crate::harness::SimulationHarness;
use crate::scenario::Scenario;

/// Outcome of one root request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestReport {
    /// The request's name, or its target when unnamed.
    pub request: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RequestReport {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Reports for every root request, in scenario order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SimulationReport {
    pub requests: Vec<RequestReport>,
}

impl SimulationReport {
    pub fn succeeded(&self) -> usize {
        self.requests.iter().filter(|r| r.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.requests.len() - self.succeeded()
    }

    pub fn get(&self, request: &str) -> Option<&RequestReport> {
        self.requests.iter().find(|r| r.request == request)
    }
}

/// A scenario whose nodes are up.
#[derive(Debug)]
pub struct Simulation {
    scenario: Scenario,
    harness: SimulationHarness,
}

impl Simulation {
    pub async fn start(scenario: Scenario) -> Result<Self, SimulationError> {
        Self::start_with(scenario, &NodeConfig::default()).await
    }

    /// Start one node for every identity the request tree references.
    pub async fn start_with(
        scenario: Scenario,
        base: &NodeConfig,
    ) -> Result<Self, SimulationError> {
        scenario.validate()?;
        let nodes = scenario.referenced_nodes()?;
        info!(
            nodes = nodes.len(),
            requests = scenario.requests.len(),
            "starting simulation"
        );
        let harness = SimulationHarness::start_with(nodes, base).await?;
        Ok(Self { scenario, harness })
    }

    pub fn harness(&self) -> &SimulationHarness {
        &self.harness
    }

    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    /// Fire every root request after its start delay and collect the
    /// responses. Requests run concurrently; failures are reported, not
    /// returned.
    pub async fn run(&self) -> SimulationReport {
        let requests = join_all(self.scenario.requests.iter().map(|r| self.fire(r))).await;
        SimulationReport { requests }
    }

    #[instrument(skip_all, fields(request = %request.label()))]
    async fn fire(&self, request: &HttpAction) -> RequestReport {
        let delay = start_delay(request);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        info!(method = %request.method, "sending root request");
        match self.harness.send(request).await {
            Ok(response) => {
                info!(response = %response, "root request completed");
                RequestReport {
                    request: request.label(),
                    response: Some(response),
                    error: None,
                }
            }
            Err(e) => {
                warn!(error = %e, "root request failed");
                RequestReport {
                    request: request.label(),
                    response: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Stop every node, draining detached actions.
    pub async fn stop(self) -> Result<(), SimulationError> {
        self.harness.shutdown().await
    }
}

/// Start `scenario`, run it to completion and stop its nodes.
pub async fn run_scenario(
    scenario: Scenario,
    base: &NodeConfig,
) -> Result<SimulationReport, SimulationError> {
    let simulation = Simulation::start_with(scenario, base).await?;
    let report = simulation.run().await;
    simulation.stop().await?;
    info!(
        succeeded = report.succeeded(),
        failed = report.failed(),
        "simulation finished"
    );
    Ok(report)
}

/// Negative, non-finite or overflowing delays mean "send immediately".
fn start_delay(request: &HttpAction) -> Duration {
    Duration::try_from_secs_f64(request.start_delay_seconds).unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_delay_clamps_bad_values() {
        let request = |s: f64| HttpAction::to_node("a", "/").with_start_delay(s);
        assert_eq!(start_delay(&request(1.5)), Duration::from_millis(1500));
        assert_eq!(start_delay(&request(0.0)), Duration::ZERO);
        assert_eq!(start_delay(&request(-2.0)), Duration::ZERO);
        assert_eq!(start_delay(&request(f64::NAN)), Duration::ZERO);
    }

    #[test]
    fn report_counts_and_serializes() {
        let report = SimulationReport {
            requests: vec![
                RequestReport {
                    request: "ok".into(),
                    response: Some(Value::from("done")),
                    error: None,
                },
                RequestReport {
                    request: "broken".into(),
                    response: None,
                    error: Some("unknown node: ghost".into()),
                },
            ],
        };
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 1);
        assert!(report.get("broken").is_some_and(|r| !r.is_ok()));
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            serde_json::json!({"requests": [
                {"request": "ok", "response": "done"},
                {"request": "broken", "error": "unknown node: ghost"}
            ]})
        );
    }
}
