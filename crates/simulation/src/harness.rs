//! In-process multi-node harness.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::info;

use hopsim_client::{HttpDispatcher, NodeClient};
use hopsim_core::{HttpAction, NodeDirectory, NodeIdentity};
use hopsim_executor::{DispatchRequest, Dispatcher};
use hopsim_server::config::{NodeConfig, Overrides};
use hopsim_server::runtime;

use crate::error::SimulationError;
use crate::node::SimNode;
use crate::port_allocator::PortAllocator;

/// A set of running nodes that share one [`NodeDirectory`].
///
/// ```no_run
/// # async fn example() -> Result<(), hopsim_simulation::SimulationError> {
/// use hopsim_core::{Action, HttpAction, NodeIdentity};
/// use hopsim_simulation::SimulationHarness;
///
/// let harness = SimulationHarness::start(vec![
///     NodeIdentity::new("gateway", 0),
///     NodeIdentity::new("auth", 0),
/// ])
/// .await?;
///
/// let result = harness
///     .send(&HttpAction::to_node("gateway", "/").with_actions(vec![Action::ret("ok")]))
///     .await?;
/// assert_eq!(result, serde_json::json!("ok"));
///
/// harness.shutdown().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SimulationHarness {
    nodes: Vec<SimNode>,
    directory: Arc<NodeDirectory>,
    dispatcher: HttpDispatcher,
    ports: PortAllocator,
}

impl SimulationHarness {
    /// Start one node per identity with default node settings.
    pub async fn start(identities: Vec<NodeIdentity>) -> Result<Self, SimulationError> {
        Self::start_with(identities, &NodeConfig::default()).await
    }

    /// Start one node per identity, using `base` for everything except the
    /// identity (name, host, port, log level, features).
    ///
    /// Every listener is bound before any node is built, so the shared
    /// directory already holds the real ports when the first call arrives.
    pub async fn start_with(
        identities: Vec<NodeIdentity>,
        base: &NodeConfig,
    ) -> Result<Self, SimulationError> {
        let ports = PortAllocator::new();

        let mut bound = Vec::with_capacity(identities.len());
        for mut identity in identities {
            let listener = ports.bind(&identity.host, identity.port)?;
            listener.set_nonblocking(true)?;
            identity.port = listener.local_addr()?.port();
            bound.push((identity, listener));
        }

        let directory: Arc<NodeDirectory> =
            Arc::new(bound.iter().map(|(identity, _)| identity.clone()).collect());

        let mut nodes = Vec::with_capacity(bound.len());
        for (identity, listener) in bound {
            let config = node_config(base, &identity);
            config.validate()?;

            let state = runtime::build_state(&config, Arc::clone(&directory))?;
            let listener = tokio::net::TcpListener::from_std(listener)?;
            let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
            let shutdown = async move {
                let _ = shutdown_rx.await;
            };
            let handle = tokio::spawn(runtime::serve(
                listener,
                state,
                shutdown,
                config.shutdown_timeout(),
            ));

            info!(node = %identity.name, url = %identity.base_url(), "simulated node started");
            nodes.push(SimNode::new(identity, shutdown_tx, handle));
        }

        let dispatcher = HttpDispatcher::new(Arc::clone(&directory), base.dispatch_timeout())?;

        Ok(Self {
            nodes,
            directory,
            dispatcher,
            ports,
        })
    }

    pub fn nodes(&self) -> &[SimNode] {
        &self.nodes
    }

    pub fn node(&self, name: &str) -> Option<&SimNode> {
        self.nodes.iter().find(|node| node.name() == name)
    }

    pub fn directory(&self) -> &Arc<NodeDirectory> {
        &self.directory
    }

    pub fn ports(&self) -> &PortAllocator {
        &self.ports
    }

    /// Client for the named node.
    pub fn client(&self, name: &str) -> Result<NodeClient, SimulationError> {
        self.node(name)
            .ok_or_else(|| SimulationError::NodeNotFound(name.to_owned()))?
            .client()
    }

    /// Send a root request and return the node's response value.
    ///
    /// Logical targets resolve through the harness directory.
    pub async fn send(&self, request: &HttpAction) -> Result<Value, SimulationError> {
        let request = DispatchRequest::from_action(request)?;
        Ok(self.dispatcher.dispatch(request).await?)
    }

    /// Stop every node, waiting for each to drain.
    ///
    /// All nodes are stopped even when one fails; the first failure is
    /// returned.
    pub async fn shutdown(mut self) -> Result<(), SimulationError> {
        let mut first_error = None;
        for node in &mut self.nodes {
            let port = node.identity().port;
            if let Err(e) = node.stop().await {
                first_error.get_or_insert(e);
            }
            self.ports.release(port);
        }
        first_error.map_or(Ok(()), Err)
    }
}

fn node_config(base: &NodeConfig, identity: &NodeIdentity) -> NodeConfig {
    let mut config = base.clone().with_overrides(Overrides {
        name: Some(identity.name.to_string()),
        host: Some(identity.host.clone()),
        port: Some(identity.port),
        log_level: Some(identity.log_level.clone()),
        no_telemetry: false,
    });
    config.node.features.clone_from(&identity.features);
    config
}
