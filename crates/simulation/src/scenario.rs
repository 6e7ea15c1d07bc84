//! Scenario model: the node topology plus the root requests to send.
//!
//! ```json
//! {
//!   "nodes": [
//!     {"name": "gateway", "port": 0},
//!     {"name": "auth", "port": 0, "features": {"telemetry": false}}
//!   ],
//!   "requests": [
//!     {
//!       "name": "login",
//!       "node": "gateway",
//!       "path": "/login",
//!       "startDelaySeconds": 0.5,
//!       "actions": [
//!         {"type": "http", "node": "auth", "path": "/verify", "saveToContext": "auth",
//!          "actions": [{"type": "return", "data": {"ok": true}}]},
//!         {"type": "return", "data": "${auth}"}
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! Root requests without a `method` are sent as `POST`.

use std::collections::HashSet;
use std::path::Path;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use hopsim_core::{Action, ActionKind, HttpAction, NodeIdentity};

use crate::error::SimulationError;

/// Method for root requests that do not name one.
pub const ROOT_METHOD: &str = "POST";

/// A topology and the root requests that drive it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Node identities. A port of 0 gets an allocated one.
    #[serde(default)]
    pub nodes: Vec<NodeIdentity>,
    /// Root calls, each sent after its `startDelaySeconds`.
    #[serde(default, deserialize_with = "root_requests")]
    pub requests: Vec<HttpAction>,
}

fn root_requests<'de, D>(deserializer: D) -> Result<Vec<HttpAction>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<Value>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|mut request| {
            if let Value::Object(fields) = &mut request {
                fields
                    .entry("method")
                    .or_insert_with(|| Value::String(ROOT_METHOD.to_owned()));
            }
            serde_json::from_value(request).map_err(de::Error::custom)
        })
        .collect()
}

impl Scenario {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn node(mut self, identity: NodeIdentity) -> Self {
        self.nodes.push(identity);
        self
    }

    /// Add a root request. Unlike requests read from JSON, the method is
    /// taken as given.
    #[must_use]
    pub fn request(mut self, request: HttpAction) -> Self {
        self.requests.push(request);
        self
    }

    pub fn from_json(contents: &str) -> Result<Self, SimulationError> {
        serde_json::from_str(contents).map_err(|e| SimulationError::Scenario(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SimulationError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SimulationError::Scenario(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&contents)
    }

    /// Check that node names are unique and every root request has a target.
    pub fn validate(&self) -> Result<(), SimulationError> {
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.name.as_str()) {
                return Err(SimulationError::Configuration(format!(
                    "node {} is defined more than once",
                    node.name
                )));
            }
        }
        if let Some(request) = self.requests.iter().find(|r| r.target().is_none()) {
            return Err(SimulationError::Configuration(format!(
                "root request {} has neither origin nor node",
                request.label()
            )));
        }
        Ok(())
    }

    /// Identities of every node the request tree addresses by name, in order
    /// of first reference.
    pub fn referenced_nodes(&self) -> Result<Vec<NodeIdentity>, SimulationError> {
        collect_nodes(&self.requests)
            .into_iter()
            .map(|name| {
                self.nodes
                    .iter()
                    .find(|node| node.name.as_str() == name)
                    .cloned()
                    .ok_or(SimulationError::NodeNotFound(name))
            })
            .collect()
    }
}

/// Names of the nodes referenced by `requests` and every call nested in them,
/// deduplicated, in order of first reference. Calls addressed by `origin`
/// are not counted.
pub fn collect_nodes(requests: &[HttpAction]) -> Vec<String> {
    let mut names = Vec::new();
    let mut seen = HashSet::new();
    for request in requests {
        visit_call(request, &mut names, &mut seen);
    }
    names
}

fn visit_call(call: &HttpAction, names: &mut Vec<String>, seen: &mut HashSet<String>) {
    if call.origin.is_none()
        && let Some(node) = &call.node
        && seen.insert(node.clone())
    {
        names.push(node.clone());
    }
    visit_actions(&call.actions, names, seen);
}

fn visit_actions(actions: &[Action], names: &mut Vec<String>, seen: &mut HashSet<String>) {
    for action in actions {
        match &action.kind {
            ActionKind::Http(call) => visit_call(call, names, seen),
            ActionKind::Multi(group) => visit_actions(&group.actions, names, seen),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn checkout() -> Scenario {
        Scenario::new()
            .node(NodeIdentity::new("gateway", 0))
            .node(NodeIdentity::new("auth", 0))
            .node(NodeIdentity::new("billing", 0))
            .node(NodeIdentity::new("unused", 0))
            .request(
                HttpAction::to_node("gateway", "/checkout").with_actions(vec![
                    Action::multi(vec![Action::http(
                        HttpAction::to_node("billing", "/charge")
                            .with_actions(vec![Action::http(HttpAction::to_node("auth", "/"))]),
                    )]),
                    Action::http(HttpAction::to_node("auth", "/verify")),
                    Action::http(HttpAction::to_url("http://example.test", "/x")),
                ]),
            )
    }

    #[test]
    fn collects_nested_references_in_order() {
        assert_eq!(
            collect_nodes(&checkout().requests),
            vec!["gateway", "billing", "auth"]
        );
    }

    #[test]
    fn referenced_nodes_skip_unused_identities() {
        let nodes = checkout().referenced_nodes().unwrap();
        let names: Vec<_> = nodes.iter().map(|n| n.name.to_string()).collect();
        assert_eq!(names, vec!["gateway", "billing", "auth"]);
    }

    #[test]
    fn undefined_reference_is_node_not_found() {
        let scenario = Scenario::new()
            .node(NodeIdentity::new("gateway", 0))
            .request(HttpAction::to_node("gateway", "/").with_actions(vec![Action::http(
                HttpAction::to_node("ghost", "/"),
            )]));
        let err = scenario.referenced_nodes().unwrap_err();
        assert!(matches!(err, SimulationError::NodeNotFound(name) if name == "ghost"));
    }

    #[test]
    fn origin_wins_over_node_when_collecting() {
        let mut call = HttpAction::to_url("http://localhost:9", "/");
        call.node = Some("shadow".into());
        assert!(collect_nodes(&[call]).is_empty());
    }

    #[test]
    fn json_requests_default_to_post() {
        let scenario = Scenario::from_json(
            &json!({
                "nodes": [{"name": "gateway", "port": 4100}],
                "requests": [
                    {"node": "gateway", "path": "/a", "startDelaySeconds": 1.5},
                    {"node": "gateway", "path": "/b", "method": "PUT"}
                ]
            })
            .to_string(),
        )
        .unwrap();

        assert_eq!(scenario.nodes[0].port, 4100);
        assert_eq!(scenario.nodes[0].host, "127.0.0.1");
        assert_eq!(scenario.requests[0].method, "POST");
        assert!((scenario.requests[0].start_delay_seconds - 1.5).abs() < f64::EPSILON);
        assert_eq!(scenario.requests[1].method, "PUT");
    }

    #[test]
    fn nested_calls_keep_get_default() {
        let scenario = Scenario::from_json(
            r#"{"requests": [{"node": "a", "actions": [{"type": "http", "node": "b"}]}]}"#,
        )
        .unwrap();
        let ActionKind::Http(inner) = &scenario.requests[0].actions[0].kind else {
            panic!("expected http action");
        };
        assert_eq!(inner.method, "GET");
    }

    #[test]
    fn malformed_json_is_scenario_error() {
        let err = Scenario::from_json(r#"{"requests": [{"actions": [{"repeat": 2}]}]}"#)
            .unwrap_err();
        assert!(matches!(err, SimulationError::Scenario(_)));
    }

    #[test]
    fn validate_rejects_duplicates_and_targetless_requests() {
        let duplicate = Scenario::new()
            .node(NodeIdentity::new("a", 0))
            .node(NodeIdentity::new("a", 0));
        assert!(matches!(
            duplicate.validate(),
            Err(SimulationError::Configuration(_))
        ));

        let mut targetless = HttpAction::to_node("a", "/");
        targetless.node = None;
        let scenario = Scenario::new().request(targetless);
        assert!(matches!(
            scenario.validate(),
            Err(SimulationError::Configuration(_))
        ));

        assert!(checkout().validate().is_ok());
    }

    #[test]
    fn missing_file_is_scenario_error() {
        let err = Scenario::load("/nonexistent/hopsim-scenario.json").unwrap_err();
        assert!(matches!(err, SimulationError::Scenario(_)));
    }
}
