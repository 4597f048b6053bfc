//! CLI command implementations

use super::components::{BUILTIN_COMPONENTS, LineSource, builtin_components};
use super::output::{OutputEvent, OutputHandler};
use crate::config::{
    StepflowConfig, WorkflowDefinition, find_definition, load_definition_file,
    parse_definition_file,
};
use crate::engine::{
    Driver, ExecutionContext, Handler, HandlerResult, StepHandler, WorkflowEngine,
};
use crate::template::CompiledCondition;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Wraps a component to report step timings and failures
struct Reported<U> {
    inner: Handler<U>,
    names: Arc<HashMap<String, String>>,
    output: Arc<dyn OutputHandler>,
}

#[async_trait]
impl<U: Send + Sync> StepHandler<U> for Reported<U> {
    async fn execute(&self, ctx: &ExecutionContext<U>) -> HandlerResult {
        let id = ctx
            .current_step_id()
            .map(|id| id.to_string())
            .unwrap_or_default();
        let name = self.names.get(&id).cloned().unwrap_or_else(|| id.clone());

        let start = Instant::now();
        let result = self.inner.execute(ctx).await;

        match &result {
            Ok(output) => self.output.emit(OutputEvent::StepComplete {
                id,
                name,
                duration_ms: start.elapsed().as_millis() as u64,
                output: output.clone(),
            }),
            Err(error) => self.output.emit(OutputEvent::StepError {
                id,
                name,
                error: error.clone(),
            }),
        }
        result
    }
}

/// Run a workflow definition with the built-in interactive components
///
/// Returns the process exit code: 0 on success, 1 on a step failure.
pub async fn run_definition(
    definition: &str,
    data: Value,
    working_dir: &Path,
    config: &StepflowConfig,
    output: Arc<dyn OutputHandler>,
    input: LineSource,
) -> Result<i32> {
    let path = find_definition(definition, Some(working_dir))?;
    let def = load_definition_file(&path)
        .with_context(|| format!("Failed to load workflow '{}'", definition))?;

    let names: Arc<HashMap<String, String>> = Arc::new(
        def.nodes
            .iter()
            .map(|n| (n.node_id.to_string(), n.node_name.clone()))
            .collect(),
    );

    let components: HashMap<String, Handler<Value>> = builtin_components(input)
        .into_iter()
        .map(|(component, inner)| {
            let reported: Handler<Value> = Arc::new(Reported {
                inner,
                names: names.clone(),
                output: output.clone(),
            });
            (component, reported)
        })
        .collect();

    let mut engine = WorkflowEngine::new();
    engine.configure(config);
    if config.defaults.compile_conditions() {
        engine.load_definition_with_conditions(&def, &components)?;
    } else {
        engine.load_definition(&def, &components)?;
    }

    let step_output = output.clone();
    let step_names = names.clone();
    engine.set_on_node_change(move |id, _ctx| {
        let name = step_names
            .get(id.as_str())
            .cloned()
            .unwrap_or_else(|| id.to_string());
        step_output.emit(OutputEvent::StepStart {
            id: id.to_string(),
            name,
        });
    });

    let started = Instant::now();
    let done_output = output.clone();
    engine.set_on_complete(move |outcome, ctx| {
        done_output.emit(OutputEvent::RunComplete {
            success: outcome.success,
            duration_ms: started.elapsed().as_millis() as u64,
            steps_completed: ctx.results().len(),
        });
    });

    output.emit(OutputEvent::RunStart {
        name: def.display_name(),
        nodes: def.nodes.len(),
    });
    tracing::info!(workflow = %def.display_name(), path = %path.display(), "Starting workflow");

    let outcome = Driver::from_config(config)
        .drive(&mut engine, data)
        .await
        .context("Workflow execution failed")?;

    output.result(&outcome);
    Ok(if outcome.success { 0 } else { 1 })
}

/// Problems that would stop a definition from running under `stepflow run`
///
/// Edge conditions are only checked when they would be compiled.
fn lint(def: &WorkflowDefinition, compile_conditions: bool) -> Vec<String> {
    let mut problems = def.validate().err().unwrap_or_default();

    for component in def.component_names() {
        if !BUILTIN_COMPONENTS.contains(&component) {
            problems.push(format!(
                "unknown component '{}' (built-in: {})",
                component,
                BUILTIN_COMPONENTS.join(", ")
            ));
        }
    }

    if compile_conditions {
        for edge in &def.edges {
            let Some(ref condition) = edge.condition else {
                continue;
            };
            if let Err(e) = CompiledCondition::new(condition) {
                problems.push(format!("edge {} -> {}: {}", edge.from, edge.to, e));
            }
        }
    }

    problems
}

/// Validate a workflow definition
pub fn validate_definition(
    definition: &str,
    working_dir: Option<&Path>,
    config: &StepflowConfig,
    handler: &dyn OutputHandler,
) -> i32 {
    let def = match find_definition(definition, working_dir)
        .and_then(|path| parse_definition_file(&path))
    {
        Ok(def) => def,
        Err(e) => {
            handler.emit(OutputEvent::Info {
                message: format!("✗ Failed to load workflow '{}': {:#}", definition, e),
            });
            return 1;
        }
    };

    let compile_conditions = config.defaults.compile_conditions();
    let problems = lint(&def, compile_conditions);
    if problems.is_empty() {
        handler.emit(OutputEvent::Info {
            message: format!(
                "✓ Workflow '{}' is valid ({} nodes, {} edges)",
                def.display_name(),
                def.nodes.len(),
                def.edges.len()
            ),
        });

        let uncompiled = def.edges.iter().filter(|e| e.condition.is_some()).count();
        if !compile_conditions && uncompiled > 0 {
            handler.emit(OutputEvent::Info {
                message: format!(
                    "  note: {} edge condition(s) kept as text; set compile_conditions to evaluate them",
                    uncompiled
                ),
            });
        }
        return 0;
    }

    handler.emit(OutputEvent::Info {
        message: format!(
            "✗ Workflow '{}' has {} error(s):",
            def.display_name(),
            problems.len()
        ),
    });
    for problem in &problems {
        handler.emit(OutputEvent::Info {
            message: format!("  - {}", problem),
        });
    }
    1
}

/// Render the effective configuration as TOML
pub fn show_config(config: &StepflowConfig) -> Result<String> {
    toml::to_string_pretty(config).context("serializing configuration")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::components::line_source;
    use crate::engine::RunOutcome;
    use serde_json::json;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct MockHandler {
        events: Mutex<Vec<OutputEvent>>,
        outcome: Mutex<Option<RunOutcome>>,
    }

    impl MockHandler {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                events: Mutex::new(Vec::new()),
                outcome: Mutex::new(None),
            })
        }

        fn events(&self) -> Vec<OutputEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    impl OutputHandler for MockHandler {
        fn emit(&self, event: OutputEvent) {
            self.events.lock().unwrap().push(event);
        }

        fn result(&self, outcome: &RunOutcome) {
            *self.outcome.lock().unwrap() = Some(outcome.clone());
        }
    }

    const APPROVAL: &str = r#"{
        "name": "approval",
        "startNodeId": "reason",
        "nodes": [
            { "nodeId": "reason", "nodeName": "Reason", "componentName": "Prompt" },
            { "nodeId": "confirm", "nodeName": "Confirm", "componentName": "Confirm" },
            { "nodeId": "done", "nodeName": "Done", "componentName": "Pass" },
            { "nodeId": "retry", "nodeName": "Retry", "componentName": "Prompt" }
        ],
        "edges": [
            { "from": "reason", "to": "confirm" },
            { "from": "confirm", "to": "done", "condition": "prevStepOutput" },
            { "from": "confirm", "to": "retry", "condition": "not prevStepOutput" }
        ]
    }"#;

    fn project(def: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        let workflows = dir.path().join(".stepflow/workflows");
        std::fs::create_dir_all(&workflows).unwrap();
        std::fs::write(workflows.join("approval.json"), def).unwrap();
        dir
    }

    fn stdin(text: &'static str) -> LineSource {
        line_source(tokio::io::BufReader::new(text.as_bytes()))
    }

    #[tokio::test]
    async fn test_run_definition_success() {
        let dir = project(APPROVAL);
        let handler = MockHandler::new();

        // Unconditional load: the first edge out of "confirm" always wins
        let code = run_definition(
            "approval",
            json!({}),
            dir.path(),
            &StepflowConfig::default(),
            handler.clone(),
            stdin("because\nn\n"),
        )
        .await
        .unwrap();

        assert_eq!(code, 0);
        let outcome = handler.outcome.lock().unwrap().clone().unwrap();
        assert_eq!(outcome.result, Some(json!(false)));

        let events = handler.events();
        assert!(matches!(events[0], OutputEvent::RunStart { nodes: 4, .. }));
        let started: Vec<String> = events
            .iter()
            .filter_map(|e| match e {
                OutputEvent::StepStart { id, .. } => Some(id.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(started, vec!["reason", "confirm", "done"]);
        assert!(matches!(
            events.last(),
            Some(OutputEvent::RunComplete {
                success: true,
                steps_completed: 3,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_run_definition_with_compiled_conditions() {
        let dir = project(APPROVAL);
        let handler = MockHandler::new();
        let mut config = StepflowConfig::default();
        config.defaults.compile_conditions = Some(true);

        let code = run_definition(
            "approval",
            json!({}),
            dir.path(),
            &config,
            handler.clone(),
            stdin("because\nno\nsecond try\n"),
        )
        .await
        .unwrap();

        assert_eq!(code, 0);
        let outcome = handler.outcome.lock().unwrap().clone().unwrap();
        assert_eq!(outcome.result, Some(json!("second try")));
    }

    #[tokio::test]
    async fn test_run_definition_step_failure_exit_code() {
        let dir = project(APPROVAL);
        let handler = MockHandler::new();

        let code = run_definition(
            "approval",
            json!({}),
            dir.path(),
            &StepflowConfig::default(),
            handler.clone(),
            stdin(""),
        )
        .await
        .unwrap();

        assert_eq!(code, 1);
        assert!(handler.events().iter().any(|e| matches!(
            e,
            OutputEvent::StepError { id, .. } if id == "reason"
        )));
    }

    #[tokio::test]
    async fn test_run_definition_unknown_component_fails_load() {
        let dir = project(&APPROVAL.replace("\"Pass\"", "\"Email\""));
        let handler = MockHandler::new();

        let result = run_definition(
            "approval",
            json!({}),
            dir.path(),
            &StepflowConfig::default(),
            handler.clone(),
            stdin(""),
        )
        .await;
        assert!(result.is_err());
        assert!(handler.events().is_empty());
    }

    fn compiling() -> StepflowConfig {
        let mut config = StepflowConfig::default();
        config.defaults.compile_conditions = Some(true);
        config
    }

    #[test]
    fn test_validate_definition() {
        let config = StepflowConfig::default();
        let dir = project(APPROVAL);
        let handler = MockHandler::new();
        assert_eq!(
            validate_definition("approval", Some(dir.path()), &config, &*handler),
            0
        );

        let dir = project(&APPROVAL.replace("\"Pass\"", "\"Email\""));
        let handler = MockHandler::new();
        assert_eq!(
            validate_definition("approval", Some(dir.path()), &config, &*handler),
            1
        );
        assert!(handler.events().iter().any(|e| matches!(
            e,
            OutputEvent::Info { message } if message.contains("unknown component 'Email'")
        )));
    }

    #[test]
    fn test_validate_reports_bad_condition_when_compiling() {
        let dir = project(&APPROVAL.replace("not prevStepOutput", "prevStepOutput =="));
        let handler = MockHandler::new();
        assert_eq!(
            validate_definition("approval", Some(dir.path()), &compiling(), &*handler),
            1
        );
        assert!(handler.events().iter().any(|e| matches!(
            e,
            OutputEvent::Info { message } if message.contains("edge confirm -> retry")
        )));
    }

    #[tokio::test]
    async fn test_validate_agrees_with_run_for_uncompiled_conditions() {
        // Not a minijinja expression, but never evaluated by the default loader
        let def = APPROVAL.replace("not prevStepOutput", "ctx.prevStepOutput === 'x'");
        let config = StepflowConfig::default();

        let dir = project(&def);
        let handler = MockHandler::new();
        assert_eq!(
            validate_definition("approval", Some(dir.path()), &config, &*handler),
            0
        );
        assert!(handler.events().iter().any(|e| matches!(
            e,
            OutputEvent::Info { message } if message.contains("2 edge condition(s) kept as text")
        )));

        let code = run_definition(
            "approval",
            json!({}),
            dir.path(),
            &config,
            MockHandler::new(),
            stdin("because\ny\n"),
        )
        .await
        .unwrap();
        assert_eq!(code, 0);
    }

    #[test]
    fn test_show_config() {
        let mut config = StepflowConfig::default();
        config.defaults.max_transitions = Some(50);
        let rendered = show_config(&config).unwrap();
        assert!(rendered.contains("max_transitions = 50"));

        let parsed: StepflowConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }
}
