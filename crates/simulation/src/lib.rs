//! hopsim simulation
//!
//! Runs a whole topology inside one process: every node is a real HTTP
//! server on its own port, and all of them resolve logical node references
//! through one shared directory.
//!
//! ```no_run
//! use hopsim_simulation::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), SimulationError> {
//!     let scenario = Scenario::load("scenario.json")?;
//!     let report = run_scenario(scenario, &NodeConfig::default()).await?;
//!     for request in &report.requests {
//!         println!("{}: {:?}", request.request, request.response);
//!     }
//!     Ok(())
//! }
//! ```

pub mod bootstrap;
pub mod error;
pub mod harness;
pub mod node;
pub mod port_allocator;
pub mod scenario;

pub use bootstrap::{RequestReport, Simulation, SimulationReport, run_scenario};
pub use error::SimulationError;
pub use harness::SimulationHarness;
pub use node::SimNode;
pub use port_allocator::PortAllocator;
pub use scenario::{Scenario, collect_nodes};

/// Common imports for simulation tests.
pub mod prelude {
    pub use crate::bootstrap::{RequestReport, Simulation, SimulationReport, run_scenario};
    pub use crate::error::SimulationError;
    pub use crate::harness::SimulationHarness;
    pub use crate::scenario::Scenario;
    pub use hopsim_core::{Action, HttpAction, NodeIdentity};
    pub use hopsim_server::config::NodeConfig;
}
