//! Engine error types

use super::context::StepId;
use thiserror::Error;

/// The engine was set up in a way that cannot run
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("no start node set for workflow")]
    MissingStartNode,

    #[error("start node '{0}' is not registered")]
    UnknownStartNode(StepId),

    #[error("edge {from} -> {to} references unregistered node '{missing}'")]
    DanglingEdge {
        from: StepId,
        to: StepId,
        missing: StepId,
    },

    #[error("component '{component}' not found in handler map (node '{node_id}')")]
    MissingHandler { component: String, node_id: StepId },

    #[error("invalid condition on edge {from} -> {to}: {message}")]
    InvalidCondition {
        from: StepId,
        to: StepId,
        message: String,
    },

    #[error("chain has no registered steps")]
    EmptyChain,
}

/// Errors returned synchronously by engine operations
///
/// Step failures are not errors at this level: they are recorded in the
/// execution context and reported through the run outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("duplicate registration of id '{id}'")]
    DuplicateRegistration { id: StepId },

    #[error("cannot {action} while a run is in progress")]
    RunInProgress { action: &'static str },

    #[error("engine was dropped before the run reached a terminal state")]
    Abandoned,
}

impl EngineError {
    pub(crate) fn in_progress(action: &'static str) -> Self {
        Self::RunInProgress { action }
    }

    /// Returns true for errors raised before any run could start
    pub fn is_configuration(&self) -> bool {
        matches!(self, EngineError::Configuration(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::from(ConfigurationError::MissingHandler {
            component: "StartTask".into(),
            node_id: StepId::from("node-1"),
        });
        let msg = err.to_string();
        assert!(msg.contains("StartTask"));
        assert!(msg.contains("node-1"));
        assert!(err.is_configuration());

        let err = EngineError::in_progress("run");
        assert_eq!(err.to_string(), "cannot run while a run is in progress");
        assert!(!err.is_configuration());
    }

    #[test]
    fn test_dangling_edge_display() {
        let err = ConfigurationError::DanglingEdge {
            from: "a".into(),
            to: "b".into(),
            missing: "b".into(),
        };
        assert_eq!(
            err.to_string(),
            "edge a -> b references unregistered node 'b'"
        );
    }
}
