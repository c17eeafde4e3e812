// SPDX-License-Identifier: MIT

//! YAML schema types for workflow definitions
//!
//! These mirror the on-disk definition format one-to-one. They carry no
//! invariants; `Workflow::from_definition` turns them into a validated graph.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_version() -> String {
    "1.0".to_string()
}

fn is_default_version(version: &str) -> bool {
    version == "1.0"
}

/// Top-level workflow definition
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct WorkflowDefinition {
    pub name: String,
    #[serde(default = "default_version", skip_serializing_if = "is_default_version")]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Starting state id; the first listed state when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_state: Option<String>,
    /// Text prepended to every rendered context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_context: Option<String>,
    /// Prerequisite name -> condition expression
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub checks: IndexMap<String, String>,
    #[serde(default)]
    pub states: Vec<StateDefinition>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub metadata: IndexMap<String, Value>,
}

/// A single state as written in the definition file
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StateDefinition {
    pub id: String,
    /// Display name; defaults to `id`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Template with `{key}` placeholders
    #[serde(default)]
    pub required_context: String,
    /// Action -> target state id, in declaration order
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub transitions: IndexMap<String, String>,
    /// Conditions that must hold before this state may be entered
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prerequisites: Vec<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub metadata: IndexMap<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_defaults() {
        let yaml = r#"
            id: draft
        "#;
        let state: StateDefinition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(state.id, "draft");
        assert!(state.name.is_none());
        assert_eq!(state.required_context, "");
        assert!(state.transitions.is_empty());
        assert!(state.prerequisites.is_empty());
        assert!(state.metadata.is_empty());
    }

    #[test]
    fn test_transitions_keep_declaration_order() {
        let yaml = r#"
            id: review
            transitions:
              reject: draft
              approve: published
              archive: archived
        "#;
        let state: StateDefinition = serde_yaml::from_str(yaml).unwrap();
        let actions: Vec<&str> = state.transitions.keys().map(|s| s.as_str()).collect();
        assert_eq!(actions, vec!["reject", "approve", "archive"]);
    }

    #[test]
    fn test_workflow_version_default() {
        let yaml = r#"
            name: minimal
            states:
              - id: only
        "#;
        let def: WorkflowDefinition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(def.version, "1.0");
        assert!(def.initial_state.is_none());
        assert!(def.checks.is_empty());
    }

    #[test]
    fn test_metadata_accepts_nested_values() {
        let yaml = r#"
            id: build
            metadata:
              owner: ci
              retries: 3
              tags: [fast, nightly]
        "#;
        let state: StateDefinition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(state.metadata["owner"], serde_json::json!("ci"));
        assert_eq!(state.metadata["retries"], serde_json::json!(3));
        assert_eq!(state.metadata["tags"], serde_json::json!(["fast", "nightly"]));
    }
}
