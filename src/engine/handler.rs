//! Step handler contract and the registered step/node/edge types

use super::context::{ExecutionContext, StepId};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// What a handler reports: `Ok` resolves the step (with optional output),
/// `Err` rejects it with an error payload.
pub type HandlerResult = Result<Option<Value>, Value>;

/// A unit of work whose completion advances the engine
///
/// Engines never call handlers themselves. An external driver (the
/// [`Driver`](super::Driver), a UI, a test) executes the current step and
/// reports back through `handle_resolve` / `handle_reject`.
#[async_trait]
pub trait StepHandler<U>: Send + Sync {
    async fn execute(&self, ctx: &ExecutionContext<U>) -> HandlerResult;
}

/// Shared handle to a step handler
pub type Handler<U> = Arc<dyn StepHandler<U>>;

/// Handler backed by a synchronous closure
pub struct FnHandler<F>(F);

#[async_trait]
impl<U, F> StepHandler<U> for FnHandler<F>
where
    U: Send + Sync,
    F: Fn(&ExecutionContext<U>) -> HandlerResult + Send + Sync,
{
    async fn execute(&self, ctx: &ExecutionContext<U>) -> HandlerResult {
        (self.0)(ctx)
    }
}

/// Wrap a closure as a [`Handler`]
pub fn from_fn<U, F>(f: F) -> Handler<U>
where
    U: Send + Sync + 'static,
    F: Fn(&ExecutionContext<U>) -> HandlerResult + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}

/// Predicate gating traversal of a workflow edge
pub type Condition<U> = Arc<dyn Fn(&ExecutionContext<U>) -> bool + Send + Sync>;

/// A step of a [`ChainEngine`](super::ChainEngine)
pub struct Step<U> {
    pub step_id: StepId,
    pub step_name: String,
    pub handler: Handler<U>,
}

impl<U> Clone for Step<U> {
    fn clone(&self) -> Self {
        Self {
            step_id: self.step_id.clone(),
            step_name: self.step_name.clone(),
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<U> fmt::Debug for Step<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("step_id", &self.step_id)
            .field("step_name", &self.step_name)
            .finish_non_exhaustive()
    }
}

/// A node of a [`WorkflowEngine`](super::WorkflowEngine)
pub struct Node<U> {
    pub node_id: StepId,
    pub node_name: String,
    pub handler: Handler<U>,
}

impl<U> Node<U> {
    pub fn new(id: impl Into<StepId>, name: impl Into<String>, handler: Handler<U>) -> Self {
        Self {
            node_id: id.into(),
            node_name: name.into(),
            handler,
        }
    }
}

impl<U> Clone for Node<U> {
    fn clone(&self) -> Self {
        Self {
            node_id: self.node_id.clone(),
            node_name: self.node_name.clone(),
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<U> fmt::Debug for Node<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("node_id", &self.node_id)
            .field("node_name", &self.node_name)
            .finish_non_exhaustive()
    }
}

/// Directed, optionally guarded connection between two nodes
pub struct Edge<U> {
    pub from: StepId,
    pub to: StepId,
    pub condition: Option<Condition<U>>,

    /// Condition source text from a definition, kept verbatim
    pub expression: Option<String>,
}

impl<U> Edge<U> {
    /// Create an unconditional edge
    pub fn always(from: impl Into<StepId>, to: impl Into<StepId>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: None,
            expression: None,
        }
    }

    /// Create an edge guarded by a predicate over the live context
    pub fn when<F>(from: impl Into<StepId>, to: impl Into<StepId>, condition: F) -> Self
    where
        F: Fn(&ExecutionContext<U>) -> bool + Send + Sync + 'static,
    {
        Self {
            from: from.into(),
            to: to.into(),
            condition: Some(Arc::new(condition)),
            expression: None,
        }
    }

    /// Replace the predicate, e.g. after compiling `expression`
    pub fn with_condition(mut self, condition: Condition<U>) -> Self {
        self.condition = Some(condition);
        self
    }

    /// An edge qualifies if it has no condition or its condition holds
    pub fn permits(&self, ctx: &ExecutionContext<U>) -> bool {
        self.condition.as_ref().is_none_or(|cond| cond(ctx))
    }
}

impl<U> Clone for Edge<U> {
    fn clone(&self) -> Self {
        Self {
            from: self.from.clone(),
            to: self.to.clone(),
            condition: self.condition.clone(),
            expression: self.expression.clone(),
        }
    }
}

impl<U> fmt::Debug for Edge<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Edge")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("guarded", &self.condition.is_some())
            .field("expression", &self.expression)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_fn_handler_resolves_and_rejects() {
        let ctx = ExecutionContext::start(json!({"n": 2}), StepId::from("a"));

        let double = from_fn(|ctx: &ExecutionContext<Value>| {
            Ok(Some(json!(ctx.data["n"].as_i64().unwrap_or(0) * 2)))
        });
        assert_eq!(double.execute(&ctx).await, Ok(Some(json!(4))));

        let fail = from_fn(|_: &ExecutionContext<Value>| Err(json!("nope")));
        assert_eq!(fail.execute(&ctx).await, Err(json!("nope")));
    }

    #[test]
    fn test_edge_permits() {
        let ctx = ExecutionContext::start(json!({"go": true}), StepId::from("a"));

        let open: Edge<Value> = Edge::always("a", "b");
        assert!(open.permits(&ctx));

        let guarded: Edge<Value> = Edge::when("a", "b", |ctx: &ExecutionContext<Value>| {
            ctx.data["go"] == true
        });
        assert!(guarded.permits(&ctx));

        let closed: Edge<Value> = Edge::when("a", "b", |_: &ExecutionContext<Value>| false);
        assert!(!closed.permits(&ctx));
    }
}
