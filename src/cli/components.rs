//! Built-in interactive components for `stepflow run`
//!
//! Definitions bind nodes to these by `componentName`. Input is read line by
//! line from a shared source, stdin in the binary.

use crate::engine::{ExecutionContext, Handler, HandlerResult, StepHandler};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::sync::Mutex;

pub const PROMPT: &str = "Prompt";
pub const CONFIRM: &str = "Confirm";
pub const PASS: &str = "Pass";

/// Names of the built-in components
pub const BUILTIN_COMPONENTS: &[&str] = &[PROMPT, CONFIRM, PASS];

/// Shared line-oriented input
pub type LineSource = Arc<Mutex<Lines<Box<dyn AsyncBufRead + Send + Unpin>>>>;

pub fn line_source<R>(reader: R) -> LineSource
where
    R: AsyncBufRead + Send + Unpin + 'static,
{
    let boxed: Box<dyn AsyncBufRead + Send + Unpin> = Box::new(reader);
    Arc::new(Mutex::new(boxed.lines()))
}

pub fn stdin_lines() -> LineSource {
    line_source(BufReader::new(tokio::io::stdin()))
}

fn ask(label: &str) {
    eprint!("{}", label);
    let _ = std::io::stderr().flush();
}

fn step_label<U>(ctx: &ExecutionContext<U>) -> String {
    ctx.current_step_id()
        .map(|id| id.to_string())
        .unwrap_or_default()
}

async fn read_line(input: &LineSource) -> Result<String, Value> {
    let mut lines = input.lock().await;
    match lines.next_line().await {
        Ok(Some(line)) => Ok(line.trim().to_string()),
        Ok(None) => Err(json!("input closed")),
        Err(e) => Err(json!(format!("failed to read input: {}", e))),
    }
}

/// Reads one line and resolves with it as a string
pub struct Prompt {
    input: LineSource,
}

impl Prompt {
    pub fn new(input: LineSource) -> Self {
        Self { input }
    }
}

#[async_trait]
impl<U: Send + Sync> StepHandler<U> for Prompt {
    async fn execute(&self, ctx: &ExecutionContext<U>) -> HandlerResult {
        ask(&format!("[{}] > ", step_label(ctx)));
        let line = read_line(&self.input).await?;
        Ok(Some(Value::String(line)))
    }
}

/// Asks a yes/no question and resolves with a boolean
///
/// Unrecognized answers re-ask.
pub struct Confirm {
    input: LineSource,
}

impl Confirm {
    pub fn new(input: LineSource) -> Self {
        Self { input }
    }
}

#[async_trait]
impl<U: Send + Sync> StepHandler<U> for Confirm {
    async fn execute(&self, ctx: &ExecutionContext<U>) -> HandlerResult {
        let label = step_label(ctx);
        loop {
            ask(&format!("[{}] continue? [y/n] ", label));
            let answer = read_line(&self.input).await?;
            match answer.to_ascii_lowercase().as_str() {
                "y" | "yes" => return Ok(Some(Value::Bool(true))),
                "n" | "no" => return Ok(Some(Value::Bool(false))),
                other => tracing::debug!(answer = other, "Unrecognized confirmation"),
            }
        }
    }
}

/// Resolves immediately, forwarding the previous step's output
pub struct Pass;

#[async_trait]
impl<U: Send + Sync> StepHandler<U> for Pass {
    async fn execute(&self, ctx: &ExecutionContext<U>) -> HandlerResult {
        Ok(ctx.prev_output().cloned())
    }
}

/// Component map for loading definitions
pub fn builtin_components<U>(input: LineSource) -> HashMap<String, Handler<U>>
where
    U: Send + Sync + 'static,
{
    let mut components: HashMap<String, Handler<U>> = HashMap::new();
    components.insert(PROMPT.into(), Arc::new(Prompt::new(input.clone())));
    components.insert(CONFIRM.into(), Arc::new(Confirm::new(input)));
    components.insert(PASS.into(), Arc::new(Pass));
    components
}
