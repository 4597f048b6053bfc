//! Condition expressions for workflow edges
//!
//! Definitions may attach a condition string to an edge. The string is kept
//! as text unless the workflow is loaded with conditions compiled, in which
//! case it becomes a minijinja expression evaluated against the serialized
//! execution context.
//!
//! # Example
//!
//! ```ignore
//! use stepflow::template::compile_condition;
//!
//! let cond = compile_condition::<serde_json::Value>("prevStepOutput == 'approved'")?;
//! let ok = cond(&ctx);
//! ```

mod conditionals;
mod errors;

pub use conditionals::{
    CompiledCondition, KNOWN_VARIABLES, compile_condition, evaluate_condition,
};
pub use errors::{TemplateError, suggest_correction};
