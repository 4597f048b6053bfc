//! Per-run execution context
//!
//! The context is an explicit composite: engine-owned state (results, error
//! log, position) next to a typed `data` field carrying the caller's initial
//! data. Caller fields can never shadow engine fields.

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a chain step or workflow node
///
/// Definitions may use strings or integers; both are stored as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StepId(String);

impl StepId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StepId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for StepId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&StepId> for StepId {
    fn from(id: &StepId) -> Self {
        id.clone()
    }
}

impl From<u64> for StepId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl Borrow<str> for StepId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl Serialize for StepId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for StepId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct StepIdVisitor;

        impl Visitor<'_> for StepIdVisitor {
            type Value = StepId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string or integer id")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<StepId, E> {
                Ok(StepId::from(v))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<StepId, E> {
                Ok(StepId(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<StepId, E> {
                Ok(StepId::from(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<StepId, E> {
                Ok(StepId(v.to_string()))
            }
        }

        deserializer.deserialize_any(StepIdVisitor)
    }
}

/// One entry of the error log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepFailure {
    pub step_id: StepId,
    pub step_name: String,
    pub error: Value,
}

/// Mutable record of one run's progress
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext<U> {
    /// Caller-supplied initial data
    pub data: U,

    is_running: bool,

    /// Outputs by step id; `None` when a step resolved without output
    results: BTreeMap<StepId, Option<Value>>,

    errors: Vec<StepFailure>,

    current_step_id: Option<StepId>,

    prev_step_id: Option<StepId>,

    prev_step_output: Option<Value>,
}

impl<U> ExecutionContext<U> {
    /// Fresh context for a run that starts at `first`
    pub(crate) fn start(data: U, first: StepId) -> Self {
        Self {
            data,
            is_running: true,
            results: BTreeMap::new(),
            errors: Vec::new(),
            current_step_id: Some(first),
            prev_step_id: None,
            prev_step_output: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    /// Output stored for a step, if it resolved with one
    pub fn get_result(&self, id: &str) -> Option<&Value> {
        self.results.get(id).and_then(Option::as_ref)
    }

    /// Whether a step has resolved in this run (with or without output)
    pub fn has_result(&self, id: &str) -> bool {
        self.results.contains_key(id)
    }

    pub fn set_result(&mut self, id: impl Into<StepId>, output: Option<Value>) {
        self.results.insert(id.into(), output);
    }

    pub fn results(&self) -> &BTreeMap<StepId, Option<Value>> {
        &self.results
    }

    pub fn add_error(&mut self, id: impl Into<StepId>, name: impl Into<String>, error: Value) {
        self.errors.push(StepFailure {
            step_id: id.into(),
            step_name: name.into(),
            error,
        });
    }

    pub fn errors(&self) -> &[StepFailure] {
        &self.errors
    }

    pub fn current_step_id(&self) -> Option<&StepId> {
        self.current_step_id.as_ref()
    }

    pub fn prev_step_id(&self) -> Option<&StepId> {
        self.prev_step_id.as_ref()
    }

    pub fn prev_output(&self) -> Option<&Value> {
        self.prev_step_output.as_ref()
    }

    /// Store a successful step's output and make it the previous step
    pub(crate) fn record_success(&mut self, id: StepId, output: Option<Value>) {
        self.results.insert(id.clone(), output.clone());
        self.prev_step_id = Some(id);
        self.prev_step_output = output;
    }

    pub(crate) fn advance_to(&mut self, id: StepId) {
        self.current_step_id = Some(id);
    }

    /// Enter the terminal state
    pub(crate) fn halt(&mut self) {
        self.is_running = false;
        self.current_step_id = None;
    }
}
