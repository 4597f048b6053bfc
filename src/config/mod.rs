//! Configuration and workflow definition loading

mod definition;
mod loader;

pub use definition::{
    EdgeDefinition, NodeDefinition, WorkflowDefinition, find_definition, load_definition_file,
    parse_definition_file,
};
pub use loader::{Defaults, LoggingConfig, StepflowConfig};
