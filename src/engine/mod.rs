//! Step sequencing engines
//!
//! [`ChainEngine`] runs an ordered list of steps; [`WorkflowEngine`] walks a
//! directed graph of nodes, picking the first edge whose condition holds.
//! Neither engine invokes handlers itself: the caller (or [`Driver`])
//! reports each step's result through `handle_resolve`/`handle_reject`.

mod chain;
mod context;
mod driver;
mod error;
mod handler;
mod run;
mod workflow;

pub use chain::ChainEngine;
pub use context::{ExecutionContext, StepFailure, StepId};
pub use driver::{CurrentTask, Driver, Sequencer};
pub use error::{ConfigurationError, EngineError};
pub use handler::{
    Condition, Edge, FnHandler, Handler, HandlerResult, Node, Step, StepHandler, from_fn,
};
pub use run::{CompleteObserver, RunHandle, RunOutcome, StepChangeObserver};
pub use workflow::WorkflowEngine;
