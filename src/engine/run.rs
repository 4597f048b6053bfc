//! Run lifecycle shared by both engines
//!
//! A run moves `Idle -> Active -> Finished`. The completion of a run is
//! delivered once through a oneshot channel wrapped by [`RunHandle`], and once
//! through the `on_complete` observer.

use super::context::{ExecutionContext, StepFailure, StepId};
use super::error::EngineError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Final result of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub success: bool,
    pub errors: Vec<StepFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl RunOutcome {
    /// The failure that halted the run, if any
    pub fn failure(&self) -> Option<&StepFailure> {
        self.errors.first()
    }
}

/// Future fulfilled exactly once when a run reaches its terminal state
#[derive(Debug)]
pub struct RunHandle {
    receiver: oneshot::Receiver<RunOutcome>,
}

impl RunHandle {
    /// Non-blocking check for a finished run
    ///
    /// Returns `None` while the run is still in progress and after the
    /// outcome has been taken.
    pub fn try_outcome(&mut self) -> Option<RunOutcome> {
        self.receiver.try_recv().ok()
    }
}

impl Future for RunHandle {
    type Output = Result<RunOutcome, EngineError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|res| res.map_err(|_| EngineError::Abandoned))
    }
}

/// Observer for step/node transitions, including the initial one
pub type StepChangeObserver<U, P> = Box<dyn FnMut(&P, &ExecutionContext<U>) + Send>;

/// Observer for run completion; receives the final context snapshot
pub type CompleteObserver<U> = Box<dyn FnMut(&RunOutcome, &ExecutionContext<U>) + Send>;

/// Single-slot observers: a later registration replaces the earlier one
pub(crate) struct Observers<U, P> {
    on_step_change: Option<StepChangeObserver<U, P>>,
    on_complete: Option<CompleteObserver<U>>,
}

impl<U, P> Default for Observers<U, P> {
    fn default() -> Self {
        Self {
            on_step_change: None,
            on_complete: None,
        }
    }
}

impl<U, P> Observers<U, P> {
    pub(crate) fn set_on_step_change(&mut self, observer: StepChangeObserver<U, P>) {
        self.on_step_change = Some(observer);
    }

    pub(crate) fn set_on_complete(&mut self, observer: CompleteObserver<U>) {
        self.on_complete = Some(observer);
    }

    pub(crate) fn step_changed(&mut self, position: &P, ctx: &ExecutionContext<U>) {
        if let Some(observer) = self.on_step_change.as_mut() {
            observer(position, ctx);
        }
    }

    pub(crate) fn completed(&mut self, outcome: &RunOutcome, ctx: &ExecutionContext<U>) {
        if let Some(observer) = self.on_complete.as_mut() {
            observer(outcome, ctx);
        }
    }
}

struct ActiveRun<U> {
    context: ExecutionContext<U>,
    completion: oneshot::Sender<RunOutcome>,
}

enum Phase<U> {
    Idle,
    Active(ActiveRun<U>),
    Finished(ExecutionContext<U>),
}

/// Context ownership and completion plumbing for one engine instance
pub(crate) struct RunState<U> {
    phase: Phase<U>,
}

impl<U> Default for RunState<U> {
    fn default() -> Self {
        Self { phase: Phase::Idle }
    }
}

impl<U> RunState<U> {
    pub(crate) fn is_active(&self) -> bool {
        matches!(self.phase, Phase::Active(_))
    }

    /// Fail with `RunInProgress` if a run is active
    pub(crate) fn ensure_idle(&self, action: &'static str) -> Result<(), EngineError> {
        if self.is_active() {
            return Err(EngineError::in_progress(action));
        }
        Ok(())
    }

    /// Begin a run positioned on `first`
    pub(crate) fn begin(&mut self, data: U, first: StepId) -> Result<RunHandle, EngineError> {
        self.ensure_idle("run")?;
        let (completion, receiver) = oneshot::channel();
        self.phase = Phase::Active(ActiveRun {
            context: ExecutionContext::start(data, first),
            completion,
        });
        Ok(RunHandle { receiver })
    }

    /// Live context of the active run, or the final context of the last run
    pub(crate) fn context(&self) -> Option<&ExecutionContext<U>> {
        match &self.phase {
            Phase::Idle => None,
            Phase::Active(run) => Some(&run.context),
            Phase::Finished(context) => Some(context),
        }
    }

    /// Live context, only while a run is active
    pub(crate) fn active_mut(&mut self) -> Option<&mut ExecutionContext<U>> {
        match &mut self.phase {
            Phase::Active(run) => Some(&mut run.context),
            _ => None,
        }
    }

    /// Enter the terminal state and fulfill the run future
    ///
    /// Returns `None` if no run was active.
    pub(crate) fn finish(&mut self, success: bool, result: Option<Value>) -> Option<RunOutcome> {
        if !self.is_active() {
            return None;
        }
        let Phase::Active(ActiveRun {
            mut context,
            completion,
        }) = std::mem::replace(&mut self.phase, Phase::Idle)
        else {
            return None;
        };

        context.halt();
        let outcome = RunOutcome {
            success,
            errors: context.errors().to_vec(),
            result,
        };
        // The caller may have dropped the handle and rely on the observer
        let _ = completion.send(outcome.clone());
        self.phase = Phase::Finished(context);
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_finish_fulfills_handle_once() {
        let mut state: RunState<()> = RunState::default();
        let handle = state.begin((), StepId::from("a")).unwrap();
        assert!(state.is_active());

        let outcome = state.finish(true, Some(json!(1))).unwrap();
        assert!(outcome.success);
        assert!(!state.is_active());
        assert!(state.finish(true, None).is_none());

        let received = handle.await.unwrap();
        assert_eq!(received, outcome);
        assert!(!state.context().unwrap().is_running());
    }

    #[test]
    fn test_begin_rejects_active_run() {
        let mut state: RunState<()> = RunState::default();
        let _handle = state.begin((), StepId::from("a")).unwrap();
        let err = state.begin((), StepId::from("a")).unwrap_err();
        assert_eq!(err, EngineError::in_progress("run"));
    }

    #[test]
    fn test_try_outcome() {
        let mut state: RunState<()> = RunState::default();
        let mut handle = state.begin((), StepId::from("a")).unwrap();
        assert!(handle.try_outcome().is_none());

        state.finish(false, None);
        let outcome = handle.try_outcome().unwrap();
        assert!(!outcome.success);
        assert!(outcome.result.is_none());
    }

    #[tokio::test]
    async fn test_dropped_state_abandons_handle() {
        let mut state: RunState<()> = RunState::default();
        let handle = state.begin((), StepId::from("a")).unwrap();
        drop(state);
        assert_eq!(handle.await, Err(EngineError::Abandoned));
    }

    #[test]
    fn test_outcome_serialization_omits_absent_result() {
        let outcome = RunOutcome {
            success: false,
            errors: vec![StepFailure {
                step_id: "a".into(),
                step_name: "a".into(),
                error: json!("boom"),
            }],
            result: None,
        };
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["errors"][0]["stepId"], "a");
        assert!(value.get("result").is_none());
        assert_eq!(outcome.failure().unwrap().error, json!("boom"));
    }
}
