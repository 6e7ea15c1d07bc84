//! Interprets hopsim action lists.
//!
//! An [`Interpreter`] walks a list of actions against a per-invocation
//! [`ContextStore`](hopsim_core::ContextStore), delegating `code` actions to a
//! [`ScriptHook`](hopsim_script::ScriptHook) and `http` actions to a
//! [`Dispatcher`]. The dispatcher is the only way out of the process, so the
//! interpreter can be driven entirely in memory in tests.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod interpreter;

pub use config::{DEFAULT_MAX_DEPTH, InterpreterConfig};
pub use dispatch::{DispatchError, DispatchRequest, Dispatcher};
pub use error::ExecutionError;
pub use interpreter::{Flow, Interpreter};
