pub mod action;
pub mod context;
pub mod error;
pub mod node;
pub mod outcome;
pub mod payload;
pub mod template;
pub mod types;

pub use action::{
    Action, ActionKind, ActionList, CodeAction, DEFAULT_LOG_MESSAGE, DEFAULT_METHOD,
    DEFAULT_WAIT_MS, HttpAction, LogAction, MultiAction, ReturnAction, SetAction, WaitAction,
};
pub use context::ContextStore;
pub use error::PayloadError;
pub use node::{FEATURE_TELEMETRY, NodeDirectory, NodeIdentity, Target};
pub use outcome::Ack;
pub use payload::{PAYLOAD_HEADER, PayloadLimits};
pub use types::{InvocationId, NodeName};
