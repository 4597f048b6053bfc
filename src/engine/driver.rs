//! Driver - executes the current step's handler and feeds the result back
//!
//! The engines only decide what runs next. The driver closes the loop for
//! callers that want a plain `await` instead of wiring resolve/reject by hand.

use super::context::{ExecutionContext, StepId};
use super::error::EngineError;
use super::handler::{Handler, HandlerResult};
use super::run::{RunHandle, RunOutcome};
use crate::config::StepflowConfig;
use serde_json::Value;
use std::time::Duration;

/// The step an engine is waiting on
pub struct CurrentTask<U> {
    pub id: StepId,
    pub name: String,
    pub handler: Handler<U>,
}

/// Common surface of [`ChainEngine`](super::ChainEngine) and
/// [`WorkflowEngine`](super::WorkflowEngine)
pub trait Sequencer<U> {
    fn start(&mut self, data: U) -> Result<RunHandle, EngineError>;

    fn current_task(&self) -> Option<CurrentTask<U>>;

    fn context(&self) -> Option<&ExecutionContext<U>>;

    fn resolve_current(&mut self, output: Option<Value>);

    fn reject_current(&mut self, error: Value);
}

/// Runs handlers one at a time until the engine reaches a terminal state
#[derive(Debug, Clone, Default)]
pub struct Driver {
    step_timeout: Option<Duration>,
}

impl Driver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject any step whose handler does not finish within `timeout`
    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = Some(timeout);
        self
    }

    pub fn from_config(config: &StepflowConfig) -> Self {
        Self {
            step_timeout: config.defaults.step_timeout.map(Duration::from_millis),
        }
    }

    /// Start a run and drive it to completion
    pub async fn drive<U, S>(&self, engine: &mut S, data: U) -> Result<RunOutcome, EngineError>
    where
        S: Sequencer<U> + ?Sized,
    {
        let handle = engine.start(data)?;

        while let Some(task) = engine.current_task() {
            let Some(ctx) = engine.context() else {
                break;
            };

            tracing::debug!(step = %task.id, name = %task.name, "Executing step");
            let result = self.execute(&task, ctx).await;
            match result {
                Ok(output) => engine.resolve_current(output),
                Err(error) => engine.reject_current(error),
            }
        }

        handle.await
    }

    async fn execute<U>(&self, task: &CurrentTask<U>, ctx: &ExecutionContext<U>) -> HandlerResult {
        let Some(limit) = self.step_timeout else {
            return task.handler.execute(ctx).await;
        };

        match tokio::time::timeout(limit, task.handler.execute(ctx)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    step = %task.id,
                    timeout_ms = limit.as_millis() as u64,
                    "Step timed out"
                );
                Err(Value::String(format!(
                    "step timed out after {}ms",
                    limit.as_millis()
                )))
            }
        }
    }
}
