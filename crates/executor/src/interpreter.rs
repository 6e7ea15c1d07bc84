use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::Value;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn};

use hopsim_core::outcome::{failure, unknown_kind};
use hopsim_core::{Ack, Action, ActionKind, ContextStore, HttpAction};
use hopsim_script::ScriptHook;

use crate::config::InterpreterConfig;
use crate::dispatch::{DispatchRequest, Dispatcher};
use crate::error::ExecutionError;

/// How an action list, or a single action, finished.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    /// Ran to completion. A single action carries its own result; an
    /// action list that runs out carries `[]`.
    Next(Value),
    /// A `return` fired; carries its resolved data.
    Return(Value),
}

impl Flow {
    pub fn into_value(self) -> Value {
        match self {
            Self::Next(value) | Self::Return(value) => value,
        }
    }
}

/// Executes action lists against a context store.
///
/// Cloning is cheap; clones share the dispatcher, the script hook and the
/// tracker of detached tasks.
#[derive(Debug, Clone)]
pub struct Interpreter {
    dispatcher: Arc<dyn Dispatcher>,
    scripts: Arc<dyn ScriptHook>,
    config: InterpreterConfig,
    detached: TaskTracker,
}

impl Interpreter {
    pub fn new(
        dispatcher: Arc<dyn Dispatcher>,
        scripts: Arc<dyn ScriptHook>,
        config: InterpreterConfig,
    ) -> Self {
        Self {
            dispatcher,
            scripts,
            config,
            detached: TaskTracker::new(),
        }
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    /// Run `actions` as one invocation with a fresh context store.
    ///
    /// The value of the first `return` reached, at any nesting level, is the
    /// result. A list that runs out yields `[]`. A fault yields
    /// `{"error": <message>, "code": <code>}`.
    pub async fn run(&self, actions: &[Action]) -> Value {
        let mut ctx = ContextStore::new();
        match self.execute(actions, &mut ctx).await {
            Ok(Flow::Return(value)) => value,
            Ok(Flow::Next(_)) => Value::Array(Vec::new()),
            Err(err) => {
                warn!(error = %err, code = err.code(), "invocation failed");
                failure(err.to_string(), err.code())
            }
        }
    }

    /// Execute `actions` in order against `ctx`.
    ///
    /// Stops at the first `return` and reports it as [`Flow::Return`]. A
    /// fault in a blocking action aborts the remaining actions.
    #[instrument(skip_all, fields(actions = actions.len()))]
    pub async fn execute(
        &self,
        actions: &[Action],
        ctx: &mut ContextStore,
    ) -> Result<Flow, ExecutionError> {
        self.execute_at(actions, ctx, 1).await
    }

    fn execute_at<'a>(
        &'a self,
        actions: &'a [Action],
        ctx: &'a mut ContextStore,
        depth: usize,
    ) -> BoxFuture<'a, Result<Flow, ExecutionError>> {
        Box::pin(async move {
            if depth > self.config.max_depth {
                return Err(ExecutionError::DepthExceeded {
                    depth,
                    max: self.config.max_depth,
                });
            }

            for action in actions {
                if action.verbose {
                    info!(
                        kind = action.kind.name(),
                        repeat = action.repeat,
                        wait = action.wait,
                        "processing action"
                    );
                }

                for _ in 0..action.repetitions() {
                    if !action.wait {
                        self.spawn_detached(action.clone(), ctx.snapshot(), depth);
                        continue;
                    }
                    if let Flow::Return(value) = self.perform(action, ctx, depth).await? {
                        return Ok(Flow::Return(value));
                    }
                }
            }

            Ok(Flow::Next(Value::Array(Vec::new())))
        })
    }

    /// Launch one repetition of `action` on its own task with a private copy
    /// of the store. Its faults and its `return` stay inside the task.
    fn spawn_detached(&self, action: Action, mut snapshot: ContextStore, depth: usize) {
        let interpreter = self.clone();
        let kind = action.kind.name().to_owned();
        debug!(kind = %kind, "launching detached action");
        self.detached.spawn(async move {
            match interpreter.perform(&action, &mut snapshot, depth).await {
                Ok(Flow::Return(_)) => {
                    debug!(kind = %kind, "detached action returned; value discarded");
                }
                Ok(Flow::Next(_)) => {}
                Err(err) => {
                    warn!(kind = %kind, error = %err, code = err.code(), "detached action failed");
                }
            }
        });
    }

    /// Run one repetition of a single action.
    async fn perform(
        &self,
        action: &Action,
        ctx: &mut ContextStore,
        depth: usize,
    ) -> Result<Flow, ExecutionError> {
        match &action.kind {
            ActionKind::Log(log) => {
                let message = log.message().to_owned();
                info!(kind = "log", "{message}");
                Ok(Flow::Next(Ack::Logged { message }.into_value()))
            }

            ActionKind::Wait(wait) => {
                let duration = wait.duration.unwrap_or(self.config.default_wait_ms);
                tokio::time::sleep(Duration::from_millis(duration)).await;
                Ok(Flow::Next(Ack::Waited { duration }.into_value()))
            }

            ActionKind::Set(set) => {
                ctx.set(set.key.clone(), set.value.clone());
                Ok(Flow::Next(
                    Ack::Set {
                        key: set.key.clone(),
                        value: set.value.clone(),
                    }
                    .into_value(),
                ))
            }

            ActionKind::Code(code) => {
                let value = self.scripts.run(&code.source, ctx).await?;
                Ok(Flow::Next(value))
            }

            ActionKind::Http(call) => self.call(call, ctx).await.map(Flow::Next),

            ActionKind::Multi(multi) => self.execute_at(&multi.actions, ctx, depth + 1).await,

            ActionKind::Return(ret) => Ok(Flow::Return(ctx.resolve(&ret.data))),

            ActionKind::Unknown(kind) => {
                warn!(kind = %kind, "unknown action type");
                Ok(Flow::Next(unknown_kind(kind)))
            }
        }
    }

    /// Dispatch an `http` action and optionally keep its response.
    async fn call(&self, call: &HttpAction, ctx: &mut ContextStore) -> Result<Value, ExecutionError> {
        let request = DispatchRequest::from_action(call)?;
        debug!(
            url = %request.target,
            method = %request.method,
            actions = request.actions.len(),
            "dispatching"
        );
        let response = self.dispatcher.dispatch(request).await?;

        if let Some(key) = &call.save_to_context {
            if is_truthy(&response) {
                ctx.set(key.clone(), response.clone());
            } else {
                warn!(
                    call = %call.label(),
                    key = %key,
                    "empty response; nothing saved to context"
                );
            }
        }
        Ok(response)
    }

    /// Number of detached tasks still running.
    pub fn detached_tasks(&self) -> usize {
        self.detached.len()
    }

    /// Wait up to `timeout` for detached tasks to finish. Returns whether
    /// they all did. New detached tasks may still be launched afterwards.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.detached.close();
        let drained = tokio::time::timeout(timeout, self.detached.wait())
            .await
            .is_ok();
        self.detached.reopen();
        drained
    }
}

/// Truthiness of a response value: `null`, `false`, zero and `""` are
/// falsy.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
