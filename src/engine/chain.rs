//! Linear task-chain engine
//!
//! Steps run strictly in registration order. The engine only tracks which
//! step is current; an external driver executes it and reports back.

use super::context::{ExecutionContext, StepId};
use super::driver::{CurrentTask, Sequencer};
use super::error::{ConfigurationError, EngineError};
use super::handler::{Handler, Step};
use super::run::{Observers, RunHandle, RunOutcome, RunState};
use serde_json::Value;

/// Runs a fixed, ordered sequence of steps
pub struct ChainEngine<U> {
    steps: Vec<Step<U>>,
    current_index: Option<usize>,
    state: RunState<U>,
    observers: Observers<U, usize>,
}

impl<U> Default for ChainEngine<U> {
    fn default() -> Self {
        Self {
            steps: Vec::new(),
            current_index: None,
            state: RunState::default(),
            observers: Observers::default(),
        }
    }
}

impl<U> ChainEngine<U> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step to the chain
    ///
    /// Fails if the id is already registered or a run is in progress.
    pub fn register(
        &mut self,
        step_id: impl Into<StepId>,
        step_name: impl Into<String>,
        handler: Handler<U>,
    ) -> Result<(), EngineError> {
        self.state.ensure_idle("register a step")?;

        let step_id = step_id.into();
        if self.steps.iter().any(|s| s.step_id == step_id) {
            return Err(EngineError::DuplicateRegistration { id: step_id });
        }

        tracing::debug!(step = %step_id, position = self.steps.len(), "Registered chain step");
        self.steps.push(Step {
            step_id,
            step_name: step_name.into(),
            handler,
        });
        Ok(())
    }

    pub fn steps(&self) -> &[Step<U>] {
        &self.steps
    }

    /// Set the single step-change observer, replacing any previous one
    pub fn set_on_step_change<F>(&mut self, mut observer: F)
    where
        F: FnMut(usize, &ExecutionContext<U>) + Send + 'static,
    {
        self.observers
            .set_on_step_change(Box::new(move |index: &usize, ctx: &ExecutionContext<U>| {
                observer(*index, ctx)
            }));
    }

    /// Set the single completion observer, replacing any previous one
    pub fn set_on_complete<F>(&mut self, observer: F)
    where
        F: FnMut(&RunOutcome, &ExecutionContext<U>) + Send + 'static,
    {
        self.observers.set_on_complete(Box::new(observer));
    }

    /// Start a run at the first step
    ///
    /// The returned handle resolves once the chain succeeds or a step rejects.
    pub fn run(&mut self, data: U) -> Result<RunHandle, EngineError> {
        self.state.ensure_idle("run")?;
        let first = self
            .steps
            .first()
            .ok_or(ConfigurationError::EmptyChain)?
            .step_id
            .clone();

        let handle = self.state.begin(data, first)?;
        self.current_index = Some(0);
        tracing::info!(steps = self.steps.len(), "Chain run started");
        self.notify_step_change();
        Ok(handle)
    }

    /// Complete the current step successfully
    ///
    /// No-op when no run is active.
    pub fn handle_resolve(&mut self, output: impl Into<Option<Value>>) {
        let output = output.into();
        let Some(index) = self.current_index else {
            tracing::debug!("Ignoring resolve: no step awaiting completion");
            return;
        };
        let (Some(ctx), Some(step)) = (self.state.active_mut(), self.steps.get(index)) else {
            return;
        };

        ctx.record_success(step.step_id.clone(), output.clone());
        tracing::info!(step = %step.step_id, index, "Step resolved");

        let next = index + 1;
        match self.steps.get(next) {
            Some(next_step) => {
                ctx.advance_to(next_step.step_id.clone());
                self.current_index = Some(next);
                self.notify_step_change();
            }
            None => self.complete(true, output),
        }
    }

    /// Fail the current step and halt the chain
    ///
    /// No-op when no run is active.
    pub fn handle_reject(&mut self, error: impl Into<Value>) {
        let Some(index) = self.current_index else {
            tracing::debug!("Ignoring reject: no step awaiting completion");
            return;
        };
        let (Some(ctx), Some(step)) = (self.state.active_mut(), self.steps.get(index)) else {
            return;
        };

        let error = error.into();
        tracing::warn!(step = %step.step_id, error = %error, "Step rejected, halting chain");
        ctx.add_error(step.step_id.clone(), step.step_name.clone(), error);
        self.complete(false, None);
    }

    /// The step awaiting completion, if any
    pub fn current_step(&self) -> Option<&Step<U>> {
        self.current_index.and_then(|i| self.steps.get(i))
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    /// Live context while running, final context after the last run
    pub fn context(&self) -> Option<&ExecutionContext<U>> {
        self.state.context()
    }

    pub fn is_running(&self) -> bool {
        self.state.is_active()
    }

    fn notify_step_change(&mut self) {
        if let (Some(index), Some(ctx)) = (self.current_index, self.state.context()) {
            self.observers.step_changed(&index, ctx);
        }
    }

    fn complete(&mut self, success: bool, result: Option<Value>) {
        let Some(outcome) = self.state.finish(success, result) else {
            return;
        };
        self.current_index = None;
        tracing::info!(success, "Chain run complete");
        if let Some(ctx) = self.state.context() {
            self.observers.completed(&outcome, ctx);
        }
    }
}

impl<U> Sequencer<U> for ChainEngine<U> {
    fn start(&mut self, data: U) -> Result<RunHandle, EngineError> {
        self.run(data)
    }

    fn current_task(&self) -> Option<CurrentTask<U>> {
        self.current_step().map(|step| CurrentTask {
            id: step.step_id.clone(),
            name: step.step_name.clone(),
            handler: step.handler.clone(),
        })
    }

    fn context(&self) -> Option<&ExecutionContext<U>> {
        self.state.context()
    }

    fn resolve_current(&mut self, output: Option<Value>) {
        self.handle_resolve(output);
    }

    fn reject_current(&mut self, error: Value) {
        self.handle_reject(error);
    }
}
