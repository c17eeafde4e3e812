// SPDX-License-Identifier: MIT

//! Workflow definitions: schema types, validation into an immutable
//! graph, YAML loading, and the on-disk catalog.

pub mod catalog;
pub mod condition;
pub mod graph;
pub mod loader;
pub mod types;

pub use catalog::{CatalogEntry, WorkflowCatalog};
pub use graph::{Check, State, Workflow};
pub use loader::WorkflowLoader;
pub use types::{StateDefinition, WorkflowDefinition};
