//! Edge condition expressions
//!
//! Conditions are minijinja expressions evaluated against the serialized
//! execution context, e.g. `prevStepOutput == 'approved'` or
//! `results.review.score > 3 and not errors`.

use super::errors::TemplateError;
use crate::engine::{Condition, ExecutionContext};
use minijinja::Environment;
use serde::Serialize;
use std::sync::Arc;

const TEMPLATE_NAME: &str = "condition";

/// Top-level names a condition may reference
pub const KNOWN_VARIABLES: &[&str] = &[
    "data",
    "isRunning",
    "results",
    "errors",
    "currentStepId",
    "prevStepId",
    "prevStepOutput",
];

/// A parsed condition, ready to evaluate any number of times
#[derive(Debug)]
pub struct CompiledCondition {
    source: String,
    env: Environment<'static>,
}

impl CompiledCondition {
    /// Parse `expr`; empty text always holds
    ///
    /// Fails on syntax errors and on top-level names outside
    /// [`KNOWN_VARIABLES`].
    pub fn new(expr: &str) -> Result<Self, TemplateError> {
        let expr = expr.trim();
        let template_str = if expr.is_empty() {
            "true".to_string()
        } else {
            format!("{{% if {expr} %}}true{{% else %}}false{{% endif %}}")
        };

        let mut env = Environment::new();
        env.add_template_owned(TEMPLATE_NAME, template_str)
            .map_err(|e| TemplateError::expression(format!("invalid expression syntax: {}", e)))?;

        let template = env.get_template(TEMPLATE_NAME)?;
        let mut unknown: Vec<String> = template
            .undeclared_variables(false)
            .into_iter()
            .filter(|name| !KNOWN_VARIABLES.contains(&name.as_str()))
            .collect();
        unknown.sort();
        if let Some(name) = unknown.into_iter().next() {
            return Err(TemplateError::undefined_variable(name, KNOWN_VARIABLES));
        }

        Ok(Self {
            source: expr.to_string(),
            env,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate against a context
    pub fn evaluate<U: Serialize>(
        &self,
        ctx: &ExecutionContext<U>,
    ) -> Result<bool, TemplateError> {
        let rendered = self
            .env
            .get_template(TEMPLATE_NAME)?
            .render(ctx)
            .map_err(|e| TemplateError::expression(e.to_string()))?;
        Ok(rendered == "true")
    }
}

/// Evaluate a one-off condition against a context
pub fn evaluate_condition<U: Serialize>(
    expr: &str,
    ctx: &ExecutionContext<U>,
) -> Result<bool, TemplateError> {
    CompiledCondition::new(expr)?.evaluate(ctx)
}

/// Compile `expr` into an edge predicate
///
/// Evaluation errors at run time count as "condition not met".
pub fn compile_condition<U>(expr: &str) -> Result<Condition<U>, TemplateError>
where
    U: Serialize + 'static,
{
    let compiled = Arc::new(CompiledCondition::new(expr)?);

    Ok(Arc::new(move |ctx: &ExecutionContext<U>| {
        match compiled.evaluate(ctx) {
            Ok(holds) => holds,
            Err(e) => {
                tracing::warn!(
                    condition = %compiled.source(),
                    error = %e,
                    "Condition evaluation failed, treating as false"
                );
                false
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::StepId;
    use serde_json::{Value, json};

    fn ctx() -> ExecutionContext<Value> {
        let data = json!({"amount": 250, "user": "ada"});
        let mut ctx = ExecutionContext::start(data, StepId::from("check"));
        ctx.record_success(StepId::from("check"), Some(json!({"score": 4})));
        ctx.advance_to(StepId::from("review"));
        ctx.record_success(StepId::from("review"), Some(json!("approved")));
        ctx
    }

    #[test]
    fn test_empty_condition() {
        assert!(evaluate_condition("", &ctx()).unwrap());
        assert!(evaluate_condition("  ", &ctx()).unwrap());
    }

    #[test]
    fn test_literals() {
        assert!(evaluate_condition("true", &ctx()).unwrap());
        assert!(!evaluate_condition("false", &ctx()).unwrap());
    }

    #[test]
    fn test_prev_output_equality() {
        let ctx = ctx();
        assert!(evaluate_condition("prevStepOutput == 'approved'", &ctx).unwrap());
        assert!(!evaluate_condition("prevStepOutput != 'approved'", &ctx).unwrap());
        assert!(evaluate_condition("prevStepId == 'review'", &ctx).unwrap());
    }

    #[test]
    fn test_data_and_results_access() {
        let ctx = ctx();
        assert!(evaluate_condition("data.amount > 100", &ctx).unwrap());
        assert!(evaluate_condition("results.check.score >= 4", &ctx).unwrap());
        assert!(evaluate_condition("data.user == 'ada' and not errors", &ctx).unwrap());
        assert!(
            evaluate_condition("(data.amount < 10) or results.review == 'approved'", &ctx).unwrap()
        );
    }

    #[test]
    fn test_syntax_error_rejected() {
        let err = CompiledCondition::new("prevStepOutput ==").unwrap_err();
        assert!(err.to_string().contains("invalid expression syntax"));
    }

    #[test]
    fn test_unknown_variable_suggests() {
        let err = CompiledCondition::new("prevStepOuput == 'x'").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("prevStepOuput"));
        assert!(msg.contains("did you mean 'prevStepOutput'"));
    }

    #[test]
    fn test_compiled_predicate_treats_errors_as_false() {
        let ctx = ctx();

        let holds: Condition<Value> = compile_condition("results.check.score == 4").unwrap();
        assert!(holds(&ctx));

        // Attribute lookup on an undefined value fails at evaluation time
        let broken: Condition<Value> = compile_condition("results.missing.deeper == 1").unwrap();
        assert!(!broken(&ctx));
    }
}
