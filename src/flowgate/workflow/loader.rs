// SPDX-License-Identifier: MIT

//! Workflow loader - YAML file loading and validation
//!
//! JSON definitions load through the same path since YAML is a superset.

use super::graph::Workflow;
use super::types::WorkflowDefinition;
use crate::flowgate::error::{FlowgateError, Result};
use std::path::Path;
use tokio::fs;

/// Loads workflow definitions from YAML files
#[derive(Debug, Clone, Copy)]
pub struct WorkflowLoader;

impl WorkflowLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load and validate a workflow from a YAML file
    pub async fn load_workflow<P: AsRef<Path>>(&self, path: P) -> Result<Workflow> {
        let path = path.as_ref();
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FlowgateError::WorkflowNotFound(path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let workflow = Self::parse_yaml(&content)?;
        log::debug!(
            "Loaded workflow '{}' ({} states) from {}",
            workflow.name(),
            workflow.states().len(),
            path.display()
        );
        Ok(workflow)
    }

    /// Parse and validate a workflow from a YAML string
    pub fn parse_yaml(content: &str) -> Result<Workflow> {
        let def: WorkflowDefinition = serde_yaml::from_str(content)?;
        Ok(Workflow::from_definition(def)?)
    }
}

impl Default for WorkflowLoader {
    fn default() -> Self {
        Self::new()
    }
}
