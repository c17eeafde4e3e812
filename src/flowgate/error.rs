// SPDX-License-Identifier: MIT

//! Typed error handling for flowgate
//!
//! Every failure is surfaced to the immediate caller. Messages carry
//! enough detail (state, action, unmet prerequisites) that the caller
//! never has to re-inspect engine internals to explain a rejection.

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, FlowgateError>;

/// Top-level error type for flowgate
#[derive(Debug, Error)]
pub enum FlowgateError {
    /// Instance references, or a lookup requests, a state absent from the workflow
    #[error("State '{0}' not found")]
    StateNotFound(String),

    /// Requested action is not an outgoing transition of the current state
    #[error("Action '{action}' not allowed from state '{state}'. Available actions: [{}]", .available.join(", "))]
    TransitionNotAllowed {
        action: String,
        state: String,
        available: Vec<String>,
    },

    /// Target state's prerequisites are not satisfied
    #[error("Cannot transition to '{target}'. Unmet prerequisites: [{}]", .unmet.join(", "))]
    PrerequisiteNotMet { target: String, unmet: Vec<String> },

    /// Workflow definition failed load-time validation
    #[error("Invalid workflow: {0}")]
    Validation(#[from] ValidationError),

    /// Instance store failure
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// No stored instance with this id (or no active one for a workflow)
    #[error("Instance '{0}' not found")]
    InstanceNotFound(String),

    /// No workflow definition with this name in the catalog
    #[error("Workflow '{0}' not found")]
    WorkflowNotFound(String),

    /// Configuration errors (invalid env vars, bad flags)
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

/// Load-time workflow validation failures
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// The definition lists no states at all
    #[error("Workflow '{0}' defines no states")]
    NoStates(String),

    /// `initial_state` does not name a listed state
    #[error("Initial state '{0}' not found in workflow")]
    UnknownInitialState(String),

    /// A transition points at a state that is not listed
    #[error("State '{state}' has transition '{action}' to non-existent state '{target}'")]
    DanglingTransition {
        state: String,
        action: String,
        target: String,
    },

    /// Two states share an id
    #[error("Duplicate state id '{0}'")]
    DuplicateState(String),

    /// A declarative check expression failed to parse
    #[error("Check '{name}' has invalid expression: {reason}")]
    InvalidCheck { name: String, reason: String },
}

/// Instance store failures
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Reading or writing a snapshot failed
    #[error("Failed to {operation} instance '{id}': {source}")]
    Io {
        operation: &'static str,
        id: String,
        #[source]
        source: std::io::Error,
    },

    /// A snapshot could not be (de)serialized
    #[error("Failed to {operation} instance '{id}': {source}")]
    Serialization {
        operation: &'static str,
        id: String,
        #[source]
        source: serde_json::Error,
    },

    /// Instance id cannot be used as a file name
    #[error("Invalid instance id '{0}'")]
    InvalidId(String),

    /// The store directory itself is unusable
    #[error("Storage directory error: {0}")]
    Directory(#[source] std::io::Error),
}

impl FlowgateError {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// True for the lookup-style failures a front end reports as "not found"
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::StateNotFound(_) | Self::InstanceNotFound(_) | Self::WorkflowNotFound(_)
        )
    }

    /// True when the actor asked for something the workflow forbids right now
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::TransitionNotAllowed { .. } | Self::PrerequisiteNotMet { .. }
        )
    }
}
