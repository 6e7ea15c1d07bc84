use std::sync::Arc;
use std::time::{Duration, Instant};

use hopsim_core::ContextStore;
use tracing::{debug, instrument, warn};

use crate::config::SandboxConfig;
use crate::error::ScriptError;
use crate::eval::{Control, Scope, exec_block};
use crate::hook::{ScriptHook, ScriptHttp};
use crate::parser::parse_program_with_nesting;

/// The built-in [`ScriptHook`]: parses and interprets the script language
/// under a wall-clock budget.
///
/// The budget covers parsing and evaluation. Evaluation checks the deadline
/// as it steps, so a script that never awaits still stops on time; awaits on
/// capabilities are cut short by the runtime timer.
///
/// Scripts see the context store as `ctx` (or `context`), a `logger`, and an
/// `http` client when one has been attached with [`Sandbox::with_http`].
/// Nothing else of the host is reachable.
#[derive(Debug, Clone, Default)]
pub struct Sandbox {
    config: SandboxConfig,
    http: Option<Arc<dyn ScriptHttp>>,
}

impl Sandbox {
    /// Create a sandbox after validating `config`.
    pub fn new(config: SandboxConfig) -> Result<Self, ScriptError> {
        config.validate()?;
        Ok(Self { config, http: None })
    }

    /// Attach the `http` capability.
    #[must_use]
    pub fn with_http(mut self, http: Arc<dyn ScriptHttp>) -> Self {
        self.http = Some(http);
        self
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }
}

#[async_trait::async_trait]
impl ScriptHook for Sandbox {
    #[instrument(skip_all, fields(source_bytes = source.len()))]
    async fn run(
        &self,
        source: &str,
        ctx: &mut ContextStore,
    ) -> Result<serde_json::Value, ScriptError> {
        let started = Instant::now();
        if source.len() > self.config.max_source_bytes {
            return Err(ScriptError::Fault(format!(
                "script source is {} bytes, limit is {}",
                source.len(),
                self.config.max_source_bytes
            )));
        }
        let program = parse_program_with_nesting(source, self.config.max_nesting)?;

        let budget = Duration::from_millis(self.config.timeout_ms);
        let mut scope =
            Scope::new(ctx, self.http.clone(), self.config).with_deadline(started + budget);
        let control = tokio::time::timeout(budget, exec_block(&program.body, &mut scope))
            .await
            .unwrap_or(Err(ScriptError::Timeout(self.config.timeout_ms)))
            .inspect_err(|err| {
                if err.is_timeout() {
                    warn!(timeout_ms = self.config.timeout_ms, "script timed out");
                }
            })?;

        let value = match control {
            Control::Return(value) => value.to_json(),
            Control::Next => serde_json::Value::Null,
        };
        debug!(result = %value, "script finished");
        Ok(value)
    }
}
