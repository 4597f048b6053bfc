//! Serializable workflow definitions
//!
//! A definition names its nodes' components by string; the components are
//! bound to handlers when the definition is loaded into a
//! [`WorkflowEngine`](crate::engine::WorkflowEngine).

use crate::engine::StepId;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

/// Declarative node/edge description of a workflow
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WorkflowDefinition {
    /// Human-readable name, used in logs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub start_node_id: StepId,

    pub nodes: Vec<NodeDefinition>,

    #[serde(default)]
    pub edges: Vec<EdgeDefinition>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NodeDefinition {
    pub node_id: StepId,
    pub node_name: String,

    /// Key into the handler map supplied at load time
    pub component_name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EdgeDefinition {
    pub from: StepId,
    pub to: StepId,

    /// Condition expression; only evaluated when conditions are compiled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl WorkflowDefinition {
    pub fn from_json_str(contents: &str) -> Result<Self> {
        serde_json::from_str(contents).context("parsing workflow definition as JSON")
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("parsing workflow definition as TOML")
    }

    /// Display name: explicit name, else the start node id
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.start_node_id.to_string())
    }

    /// Distinct component names the definition refers to
    pub fn component_names(&self) -> BTreeSet<&str> {
        self.nodes
            .iter()
            .map(|n| n.component_name.as_str())
            .collect()
    }

    /// Validate the definition's structure
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.nodes.is_empty() {
            errors.push("definition has no nodes".to_string());
        }

        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.node_id.as_str()) {
                errors.push(format!("duplicate node id: {}", node.node_id));
            }
            if node.component_name.trim().is_empty() {
                errors.push(format!("node '{}' has an empty componentName", node.node_id));
            }
        }

        if !seen.contains(self.start_node_id.as_str()) {
            errors.push(format!(
                "start node '{}' is not declared",
                self.start_node_id
            ));
        }

        for edge in &self.edges {
            for endpoint in [&edge.from, &edge.to] {
                if !seen.contains(endpoint.as_str()) {
                    errors.push(format!(
                        "edge {} -> {} references unknown node '{}'",
                        edge.from, edge.to, endpoint
                    ));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Parse a definition file without validating it
///
/// `.toml` files are parsed as TOML, everything else as JSON.
pub fn parse_definition_file(path: &Path) -> Result<WorkflowDefinition> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;

    let is_toml = path.extension().is_some_and(|ext| ext == "toml");
    if is_toml {
        WorkflowDefinition::from_toml_str(&contents)
    } else {
        WorkflowDefinition::from_json_str(&contents)
    }
    .with_context(|| format!("parsing {}", path.display()))
}

/// Load and validate a definition file
pub fn load_definition_file(path: &Path) -> Result<WorkflowDefinition> {
    let definition = parse_definition_file(path)?;

    definition.validate().map_err(|errors| {
        anyhow::anyhow!(
            "workflow definition validation failed:\n  {}",
            errors.join("\n  ")
        )
    })?;

    Ok(definition)
}

/// Locate a definition by path or by name
///
/// Search order (first match wins):
/// 1. `name` as a literal path
/// 2. .stepflow/workflows/{name}.json|toml (project)
/// 3. ~/.config/stepflow/workflows/{name}.json|toml (user)
pub fn find_definition(name: &str, project_dir: Option<&Path>) -> Result<PathBuf> {
    let literal = PathBuf::from(shellexpand::tilde(name).into_owned());
    if literal.is_file() {
        return Ok(literal);
    }

    let project_root = project_dir
        .map(|p| p.join(".stepflow/workflows"))
        .unwrap_or_else(|| PathBuf::from(".stepflow/workflows"));
    let user_root = dirs::config_dir().map(|p| p.join("stepflow/workflows"));

    for root in std::iter::once(project_root).chain(user_root) {
        for ext in ["json", "toml"] {
            let candidate = root.join(format!("{}.{}", name, ext));
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
    }

    anyhow::bail!("workflow definition '{}' not found", name)
}
