//! Output handlers for CLI commands
//!
//! Supports console (pretty), JSON lines, and quiet output modes.

use crate::engine::RunOutcome;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Output mode for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputMode {
    #[default]
    Console,
    Json,
    Quiet,
}

/// Events emitted while a workflow runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutputEvent {
    RunStart {
        name: String,
        nodes: usize,
    },
    StepStart {
        id: String,
        name: String,
    },
    StepComplete {
        id: String,
        name: String,
        duration_ms: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        output: Option<Value>,
    },
    StepError {
        id: String,
        name: String,
        error: Value,
    },
    RunComplete {
        success: bool,
        duration_ms: u64,
        steps_completed: usize,
    },
    Info {
        message: String,
    },
}

/// Output handler trait
pub trait OutputHandler: Send + Sync {
    /// Emit an event
    fn emit(&self, event: OutputEvent);

    /// Write the final outcome
    fn result(&self, outcome: &RunOutcome);
}

/// Render a payload for humans: bare strings unquoted, everything else as JSON
fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Console output handler
pub struct ConsoleHandler {
    debug: bool,
}

impl ConsoleHandler {
    pub fn new(debug: bool) -> Self {
        Self { debug }
    }

    fn format_duration(ms: u64) -> String {
        if ms < 1000 {
            format!("{}ms", ms)
        } else {
            format!("{:.1}s", ms as f64 / 1000.0)
        }
    }
}

impl OutputHandler for ConsoleHandler {
    fn emit(&self, event: OutputEvent) {
        match event {
            OutputEvent::RunStart { name, nodes } => {
                eprintln!("Running workflow '{}' ({} nodes)", name, nodes);
            }
            OutputEvent::StepStart { id, name } => {
                eprintln!("▸ {} [{}]", name, id);
            }
            OutputEvent::StepComplete {
                duration_ms,
                output,
                ..
            } => {
                match output.filter(|_| self.debug) {
                    Some(out) => eprintln!(
                        "  ✓ ({}) -> {}",
                        Self::format_duration(duration_ms),
                        display_value(&out)
                    ),
                    None => eprintln!("  ✓ ({})", Self::format_duration(duration_ms)),
                }
            }
            OutputEvent::StepError { name, error, .. } => {
                eprintln!("  ✗ {}: {}", name, display_value(&error));
            }
            OutputEvent::RunComplete {
                success,
                duration_ms,
                steps_completed,
            } => {
                eprintln!();
                if success {
                    eprintln!(
                        "✓ Workflow completed successfully ({} steps in {})",
                        steps_completed,
                        Self::format_duration(duration_ms)
                    );
                } else {
                    eprintln!(
                        "✗ Workflow failed after {} steps ({})",
                        steps_completed,
                        Self::format_duration(duration_ms)
                    );
                }
            }
            OutputEvent::Info { message } => {
                eprintln!("{}", message);
            }
        }
    }

    fn result(&self, outcome: &RunOutcome) {
        for failure in &outcome.errors {
            eprintln!(
                "Error in step '{}' ({}): {}",
                failure.step_name,
                failure.step_id,
                display_value(&failure.error)
            );
        }
        if let Some(ref out) = outcome.result {
            println!("{}", display_value(out));
        }
    }
}

/// JSON lines output handler: one compact object per line
pub struct JsonHandler;

impl JsonHandler {
    fn json_line<T: Serialize>(value: &T) -> Option<String> {
        serde_json::to_string(value).ok()
    }

    fn print_json<T: Serialize>(&self, value: &T) {
        if let Some(line) = Self::json_line(value) {
            println!("{}", line);
        }
    }
}

impl OutputHandler for JsonHandler {
    fn emit(&self, event: OutputEvent) {
        self.print_json(&event);
    }

    fn result(&self, outcome: &RunOutcome) {
        self.print_json(outcome);
    }
}

/// Quiet handler: only the final result is printed
pub struct QuietHandler;

impl OutputHandler for QuietHandler {
    fn emit(&self, _event: OutputEvent) {}

    fn result(&self, outcome: &RunOutcome) {
        if let Some(ref out) = outcome.result {
            println!("{}", display_value(out));
        }
    }
}

/// Create an output handler based on mode
pub fn create_handler(mode: OutputMode, debug: bool) -> Arc<dyn OutputHandler> {
    match mode {
        OutputMode::Console => Arc::new(ConsoleHandler::new(debug)),
        OutputMode::Json => Arc::new(JsonHandler),
        OutputMode::Quiet => Arc::new(QuietHandler),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::ValueEnum;
    use serde_json::json;

    #[test]
    fn test_output_mode_parse() {
        assert_eq!(OutputMode::from_str("json", true), Ok(OutputMode::Json));
        assert_eq!(OutputMode::from_str("QUIET", true), Ok(OutputMode::Quiet));
        assert_eq!(OutputMode::from_str("console", true), Ok(OutputMode::Console));
        assert!(OutputMode::from_str("fancy", true).is_err());
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = OutputEvent::StepError {
            id: "review".into(),
            name: "Review".into(),
            error: json!("declined"),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "StepError");
        assert_eq!(value["id"], "review");
        assert_eq!(value["error"], "declined");

        let complete = OutputEvent::StepComplete {
            id: "a".into(),
            name: "A".into(),
            duration_ms: 3,
            output: None,
        };
        let value = serde_json::to_value(&complete).unwrap();
        assert!(value.get("output").is_none());
    }

    #[test]
    fn test_display_value() {
        assert_eq!(display_value(&json!("plain")), "plain");
        assert_eq!(display_value(&json!({"a": 1})), r#"{"a":1}"#);
        assert_eq!(display_value(&json!(true)), "true");
    }

    #[test]
    fn test_json_lines_are_single_line() {
        let outcome = RunOutcome {
            success: true,
            errors: Vec::new(),
            result: Some(json!({"nested": {"a": [1, 2]}})),
        };
        let line = JsonHandler::json_line(&outcome).unwrap();
        assert!(!line.contains('\n'));
        assert_eq!(
            serde_json::from_str::<RunOutcome>(&line).unwrap(),
            outcome
        );
    }

    #[test]
    fn test_console_format_duration() {
        assert_eq!(ConsoleHandler::format_duration(500), "500ms");
        assert_eq!(ConsoleHandler::format_duration(1000), "1.0s");
        assert_eq!(ConsoleHandler::format_duration(2500), "2.5s");
    }

    #[test]
    fn test_create_handler() {
        let outcome = RunOutcome {
            success: true,
            errors: Vec::new(),
            result: None,
        };
        for mode in [OutputMode::Console, OutputMode::Json, OutputMode::Quiet] {
            let handler = create_handler(mode, false);
            handler.emit(OutputEvent::Info {
                message: "test".into(),
            });
            handler.result(&outcome);
        }
    }
}
