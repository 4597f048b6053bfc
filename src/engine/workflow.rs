//! Graph-based workflow engine
//!
//! Nodes are connected by directed, optionally guarded edges. After a node
//! resolves, the first outgoing edge (in registration order) whose condition
//! is absent or holds decides the next node. No qualifying edge ends the run.
//!
//! Cycles are not detected. A loop whose edges always qualify runs until a
//! node rejects, unless a transition ceiling is configured.

use super::context::{ExecutionContext, StepId};
use super::driver::{CurrentTask, Sequencer};
use super::error::{ConfigurationError, EngineError};
use super::handler::{Condition, Edge, Handler, Node};
use super::run::{Observers, RunHandle, RunOutcome, RunState};
use crate::config::{EdgeDefinition, StepflowConfig, WorkflowDefinition};
use crate::template::compile_condition;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Runs a set of named nodes by traversing edges from a start node
pub struct WorkflowEngine<U> {
    nodes: HashMap<StepId, Node<U>>,
    edges: Vec<Edge<U>>,
    start_node_id: Option<StepId>,
    current_node_id: Option<StepId>,

    /// Upper bound on node advances per run; `None` means unbounded
    max_transitions: Option<usize>,
    transitions: usize,

    state: RunState<U>,
    observers: Observers<U, StepId>,
}

impl<U> Default for WorkflowEngine<U> {
    fn default() -> Self {
        Self {
            nodes: HashMap::new(),
            edges: Vec::new(),
            start_node_id: None,
            current_node_id: None,
            max_transitions: None,
            transitions: 0,
            state: RunState::default(),
            observers: Observers::default(),
        }
    }
}

impl<U> WorkflowEngine<U> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply engine settings from the loaded configuration
    pub fn configure(&mut self, config: &StepflowConfig) {
        self.max_transitions = config.defaults.max_transitions;
    }

    pub fn with_max_transitions(mut self, limit: usize) -> Self {
        self.max_transitions = Some(limit);
        self
    }

    pub fn set_max_transitions(&mut self, limit: Option<usize>) {
        self.max_transitions = limit;
    }

    pub fn register_node(&mut self, node: Node<U>) -> Result<(), EngineError> {
        self.state.ensure_idle("register a node")?;
        if self.nodes.contains_key(&node.node_id) {
            return Err(EngineError::DuplicateRegistration { id: node.node_id });
        }

        tracing::debug!(node = %node.node_id, "Registered workflow node");
        self.nodes.insert(node.node_id.clone(), node);
        Ok(())
    }

    pub fn add_edge(&mut self, edge: Edge<U>) -> Result<(), EngineError> {
        self.state.ensure_idle("add an edge")?;
        tracing::debug!(from = %edge.from, to = %edge.to, guarded = edge.condition.is_some(), "Added workflow edge");
        self.edges.push(edge);
        Ok(())
    }

    pub fn set_start_node(&mut self, node_id: impl Into<StepId>) -> Result<(), EngineError> {
        self.state.ensure_idle("set the start node")?;
        self.start_node_id = Some(node_id.into());
        Ok(())
    }

    pub fn node(&self, node_id: &str) -> Option<&Node<U>> {
        self.nodes.get(node_id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node<U>> {
        self.nodes.values()
    }

    pub fn edges(&self) -> &[Edge<U>] {
        &self.edges
    }

    pub fn start_node_id(&self) -> Option<&StepId> {
        self.start_node_id.as_ref()
    }

    /// Set the single node-change observer, replacing any previous one
    pub fn set_on_node_change<F>(&mut self, observer: F)
    where
        F: FnMut(&StepId, &ExecutionContext<U>) + Send + 'static,
    {
        self.observers.set_on_step_change(Box::new(observer));
    }

    /// Set the single completion observer, replacing any previous one
    pub fn set_on_complete<F>(&mut self, observer: F)
    where
        F: FnMut(&RunOutcome, &ExecutionContext<U>) + Send + 'static,
    {
        self.observers.set_on_complete(Box::new(observer));
    }

    /// Start a run at the start node
    pub fn run(&mut self, data: U) -> Result<RunHandle, EngineError> {
        self.state.ensure_idle("run")?;
        let start = self
            .start_node_id
            .clone()
            .ok_or(ConfigurationError::MissingStartNode)?;
        self.check_graph(&start)?;

        let handle = self.state.begin(data, start.clone())?;
        tracing::info!(start = %start, nodes = self.nodes.len(), edges = self.edges.len(), "Workflow run started");
        self.current_node_id = Some(start);
        self.transitions = 0;
        self.notify_node_change();
        Ok(handle)
    }

    /// Complete the current node and follow the first qualifying edge
    ///
    /// No-op when no run is active. If following the edge would exceed the
    /// transition limit, the run fails on this node; its output stays
    /// recorded, since edge conditions were evaluated against it.
    pub fn handle_resolve(&mut self, output: impl Into<Option<Value>>) {
        let output = output.into();
        let Some(node_id) = self.current_node_id.clone() else {
            tracing::debug!("Ignoring resolve: no node awaiting completion");
            return;
        };
        let (Some(ctx), Some(node)) = (self.state.active_mut(), self.nodes.get(&node_id)) else {
            return;
        };

        ctx.record_success(node_id.clone(), output.clone());
        tracing::info!(node = %node_id, "Node resolved");

        let Some(next) = select_next(&self.edges, &node_id, ctx).cloned() else {
            self.complete(true, output);
            return;
        };

        if let Some(limit) = self.max_transitions.filter(|limit| self.transitions >= *limit) {
            tracing::warn!(node = %node_id, limit, "Transition limit reached, halting workflow");
            ctx.add_error(
                node_id,
                node.node_name.clone(),
                Value::String(format!("transition limit of {limit} exceeded")),
            );
            self.complete(false, None);
            return;
        }

        tracing::debug!(from = %node_id, to = %next, "Following edge");
        ctx.advance_to(next.clone());
        self.transitions += 1;
        self.current_node_id = Some(next);
        self.notify_node_change();
    }

    /// Fail the current node and halt the workflow
    ///
    /// No-op when no run is active.
    pub fn handle_reject(&mut self, error: impl Into<Value>) {
        let Some(node_id) = self.current_node_id.clone() else {
            tracing::debug!("Ignoring reject: no node awaiting completion");
            return;
        };
        let (Some(ctx), Some(node)) = (self.state.active_mut(), self.nodes.get(&node_id)) else {
            return;
        };

        let error = error.into();
        tracing::warn!(node = %node_id, error = %error, "Node rejected, halting workflow");
        ctx.add_error(node_id, node.node_name.clone(), error);
        self.complete(false, None);
    }

    /// The node awaiting completion, if any
    pub fn current_node(&self) -> Option<&Node<U>> {
        self.current_node_id
            .as_ref()
            .and_then(|id| self.nodes.get(id))
    }

    pub fn current_node_id(&self) -> Option<&StepId> {
        self.current_node_id.as_ref()
    }

    /// Live context while running, final context after the last run
    pub fn context(&self) -> Option<&ExecutionContext<U>> {
        self.state.context()
    }

    pub fn is_running(&self) -> bool {
        self.state.is_active()
    }

    /// Register the nodes and edges of a definition
    ///
    /// Each node's `componentName` is looked up in `handlers`. Loading is
    /// atomic: if any node fails to resolve, nothing is registered. Edge
    /// conditions given as text are kept on the edge but not compiled, so
    /// every loaded edge is unconditional.
    pub fn load_definition(
        &mut self,
        def: &WorkflowDefinition,
        handlers: &HashMap<String, Handler<U>>,
    ) -> Result<(), EngineError> {
        self.load_with(def, handlers, |_| Ok(None))
    }

    /// Like [`load_definition`](Self::load_definition), but compiles edge
    /// condition text into predicates over the serialized context
    ///
    /// A condition that fails to parse aborts the whole load.
    pub fn load_definition_with_conditions(
        &mut self,
        def: &WorkflowDefinition,
        handlers: &HashMap<String, Handler<U>>,
    ) -> Result<(), EngineError>
    where
        U: Serialize + 'static,
    {
        self.load_with(def, handlers, |edge| match edge.condition.as_deref() {
            None => Ok(None),
            Some(expr) => compile_condition(expr).map(Some).map_err(|e| {
                ConfigurationError::InvalidCondition {
                    from: edge.from.clone(),
                    to: edge.to.clone(),
                    message: e.to_string(),
                }
            }),
        })
    }

    fn load_with<F>(
        &mut self,
        def: &WorkflowDefinition,
        handlers: &HashMap<String, Handler<U>>,
        compile: F,
    ) -> Result<(), EngineError>
    where
        F: Fn(&EdgeDefinition) -> Result<Option<Condition<U>>, ConfigurationError>,
    {
        self.state.ensure_idle("load a definition")?;

        let mut seen = HashSet::new();
        let mut nodes = Vec::with_capacity(def.nodes.len());
        for node in &def.nodes {
            let handler = handlers.get(&node.component_name).ok_or_else(|| {
                ConfigurationError::MissingHandler {
                    component: node.component_name.clone(),
                    node_id: node.node_id.clone(),
                }
            })?;
            if !seen.insert(&node.node_id) || self.nodes.contains_key(&node.node_id) {
                return Err(EngineError::DuplicateRegistration {
                    id: node.node_id.clone(),
                });
            }
            nodes.push(Node::new(
                node.node_id.clone(),
                node.node_name.clone(),
                handler.clone(),
            ));
        }

        let mut edges = Vec::with_capacity(def.edges.len());
        for edge in &def.edges {
            edges.push(Edge {
                from: edge.from.clone(),
                to: edge.to.clone(),
                condition: compile(edge)?,
                expression: edge.condition.clone(),
            });
        }

        tracing::info!(
            nodes = nodes.len(),
            edges = edges.len(),
            start = %def.start_node_id,
            "Loaded workflow definition"
        );
        self.nodes
            .extend(nodes.into_iter().map(|n| (n.node_id.clone(), n)));
        self.edges.extend(edges);
        self.start_node_id = Some(def.start_node_id.clone());
        Ok(())
    }

    fn check_graph(&self, start: &StepId) -> Result<(), ConfigurationError> {
        if !self.nodes.contains_key(start) {
            return Err(ConfigurationError::UnknownStartNode(start.clone()));
        }
        for edge in &self.edges {
            for endpoint in [&edge.from, &edge.to] {
                if !self.nodes.contains_key(endpoint) {
                    return Err(ConfigurationError::DanglingEdge {
                        from: edge.from.clone(),
                        to: edge.to.clone(),
                        missing: endpoint.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn notify_node_change(&mut self) {
        if let (Some(node_id), Some(ctx)) = (self.current_node_id.as_ref(), self.state.context()) {
            self.observers.step_changed(node_id, ctx);
        }
    }

    fn complete(&mut self, success: bool, result: Option<Value>) {
        let Some(outcome) = self.state.finish(success, result) else {
            return;
        };
        self.current_node_id = None;
        tracing::info!(success, transitions = self.transitions, "Workflow run complete");
        if let Some(ctx) = self.state.context() {
            self.observers.completed(&outcome, ctx);
        }
    }
}

/// First outgoing edge of `from` that qualifies, in registration order
fn select_next<'a, U>(
    edges: &'a [Edge<U>],
    from: &StepId,
    ctx: &ExecutionContext<U>,
) -> Option<&'a StepId> {
    edges
        .iter()
        .filter(|edge| &edge.from == from)
        .find(|edge| edge.permits(ctx))
        .map(|edge| &edge.to)
}

impl<U> Sequencer<U> for WorkflowEngine<U> {
    fn start(&mut self, data: U) -> Result<RunHandle, EngineError> {
        self.run(data)
    }

    fn current_task(&self) -> Option<CurrentTask<U>> {
        self.current_node().map(|node| CurrentTask {
            id: node.node_id.clone(),
            name: node.node_name.clone(),
            handler: node.handler.clone(),
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
