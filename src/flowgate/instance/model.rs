// SPDX-License-Identifier: MIT

//! Workflow instance: one running execution of a workflow

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// One recorded transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub from_state: String,
    pub to_state: String,
    pub action: String,
    pub timestamp: DateTime<Utc>,
    /// Context update supplied with the transition (empty if none)
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Mutable state of a running workflow execution.
///
/// `current_state` is only ever changed by the engine, which keeps it
/// pointing at a state of the bound workflow. History is append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    id: String,
    workflow_name: String,
    current_state: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    context_data: Map<String, Value>,
    #[serde(default)]
    history: Vec<HistoryEntry>,
}

impl WorkflowInstance {
    /// Fresh instance with a random id, empty context and history
    pub fn new(workflow_name: impl Into<String>, initial_state: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            workflow_name: workflow_name.into(),
            current_state: initial_state.into(),
            created_at: now,
            updated_at: now,
            context_data: Map::new(),
            history: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn workflow_name(&self) -> &str {
        &self.workflow_name
    }

    pub fn current_state(&self) -> &str {
        &self.current_state
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn context_data(&self) -> &Map<String, Value> {
        &self.context_data
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Set one context key outside of a transition
    pub fn insert_context(&mut self, key: impl Into<String>, value: Value) {
        self.context_data.insert(key.into(), value);
        self.updated_at = Utc::now();
    }

    /// Apply a transition that has already been validated.
    ///
    /// Merge, history append, state change and timestamp refresh happen
    /// together so the instance is never observed half-updated.
    pub(crate) fn record_transition(
        &mut self,
        action: &str,
        target: &str,
        context_update: Option<Map<String, Value>>,
    ) {
        let now = Utc::now();
        let update = context_update.unwrap_or_default();
        for (key, value) in &update {
            self.context_data.insert(key.clone(), value.clone());
        }

        self.history.push(HistoryEntry {
            from_state: std::mem::replace(&mut self.current_state, target.to_string()),
            to_state: target.to_string(),
            action: action.to_string(),
            timestamp: now,
            metadata: update,
        });
        self.updated_at = now;
    }

    #[cfg(test)]
    pub(crate) fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
}
