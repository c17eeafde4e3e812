// SPDX-License-Identifier: MIT

//! Validated, immutable workflow graph
//!
//! A `Workflow` can only be obtained through `from_definition`, so every
//! value of the type satisfies: the initial state exists, state ids are
//! unique, and every transition target exists.

use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;

use super::condition::{self, Expression};
use super::types::{StateDefinition, WorkflowDefinition};
use crate::flowgate::error::ValidationError;

/// A node in the workflow graph
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    /// Template with `{key}` placeholders
    pub required_context: String,
    /// Action -> target state id, in declaration order
    pub transitions: IndexMap<String, String>,
    /// Conditions that must hold before this state may be entered
    pub prerequisites: Vec<String>,
    pub metadata: IndexMap<String, Value>,
}

impl State {
    /// A state with no outgoing transitions
    pub fn is_terminal(&self) -> bool {
        self.transitions.is_empty()
    }
}

/// A declarative prerequisite check, kept with its source text
#[derive(Debug, Clone, PartialEq)]
pub struct Check {
    pub source: String,
    pub expression: Expression,
}

/// Immutable workflow definition
#[derive(Debug, Clone)]
pub struct Workflow {
    name: String,
    version: String,
    description: Option<String>,
    initial_state: String,
    global_context: Option<String>,
    states: Vec<State>,
    checks: IndexMap<String, Check>,
    metadata: IndexMap<String, Value>,
    index: HashMap<String, usize>,
}

impl Workflow {
    /// Validate a raw definition into a workflow graph
    pub fn from_definition(def: WorkflowDefinition) -> Result<Self, ValidationError> {
        if def.states.is_empty() {
            return Err(ValidationError::NoStates(def.name));
        }

        let mut index = HashMap::with_capacity(def.states.len());
        for (i, state) in def.states.iter().enumerate() {
            if index.insert(state.id.clone(), i).is_some() {
                return Err(ValidationError::DuplicateState(state.id.clone()));
            }
        }

        let initial_state = def
            .initial_state
            .unwrap_or_else(|| def.states[0].id.clone());
        if !index.contains_key(&initial_state) {
            return Err(ValidationError::UnknownInitialState(initial_state));
        }

        for state in &def.states {
            for (action, target) in &state.transitions {
                if !index.contains_key(target) {
                    return Err(ValidationError::DanglingTransition {
                        state: state.id.clone(),
                        action: action.clone(),
                        target: target.clone(),
                    });
                }
            }
        }

        let mut checks = IndexMap::with_capacity(def.checks.len());
        for (name, source) in def.checks {
            let expression =
                condition::parse(&source).map_err(|e| ValidationError::InvalidCheck {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            checks.insert(name, Check { source, expression });
        }

        let states = def.states.into_iter().map(State::from).collect();

        Ok(Self {
            name: def.name,
            version: def.version,
            description: def.description,
            initial_state,
            global_context: def.global_context,
            states,
            checks,
            metadata: def.metadata,
            index,
        })
    }

    /// Convert back into the definition format
    pub fn to_definition(&self) -> WorkflowDefinition {
        WorkflowDefinition {
            name: self.name.clone(),
            version: self.version.clone(),
            description: self.description.clone(),
            initial_state: Some(self.initial_state.clone()),
            global_context: self.global_context.clone(),
            checks: self
                .checks
                .iter()
                .map(|(name, check)| (name.clone(), check.source.clone()))
                .collect(),
            states: self.states.iter().map(StateDefinition::from).collect(),
            metadata: self.metadata.clone(),
        }
    }

    /// Serialize to definition YAML
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&self.to_definition())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn initial_state(&self) -> &str {
        &self.initial_state
    }

    pub fn global_context(&self) -> Option<&str> {
        self.global_context.as_deref()
    }

    /// States in declaration order
    pub fn states(&self) -> &[State] {
        &self.states
    }

    /// Declarative prerequisite checks, by prerequisite name
    pub fn checks(&self) -> &IndexMap<String, Check> {
        &self.checks
    }

    pub fn metadata(&self) -> &IndexMap<String, Value> {
        &self.metadata
    }

    /// Look up a state by id
    pub fn get_state(&self, id: &str) -> Option<&State> {
        self.index.get(id).map(|&i| &self.states[i])
    }
}

impl From<StateDefinition> for State {
    fn from(def: StateDefinition) -> Self {
        Self {
            name: def.name.unwrap_or_else(|| def.id.clone()),
            id: def.id,
            description: def.description,
            required_context: def.required_context,
            transitions: def.transitions,
            prerequisites: def.prerequisites,
            metadata: def.metadata,
        }
    }
}

impl From<&State> for StateDefinition {
    fn from(state: &State) -> Self {
        Self {
            id: state.id.clone(),
            name: Some(state.name.clone()),
            description: state.description.clone(),
            required_context: state.required_context.clone(),
            transitions: state.transitions.clone(),
            prerequisites: state.prerequisites.clone(),
            metadata: state.metadata.clone(),
        }
    }
}
