//! Step-sequencing engines for guided multi-step processes
//!
//! [`engine::ChainEngine`] walks an ordered list of steps and
//! [`engine::WorkflowEngine`] walks a graph of nodes joined by conditional
//! edges. Both keep an [`engine::ExecutionContext`] of results and errors,
//! notify observers on each transition, and complete a [`engine::RunHandle`]
//! once the run ends.

pub mod cli;
pub mod config;
pub mod engine;
pub mod logging;
pub mod template;
