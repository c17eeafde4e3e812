// SPDX-License-Identifier: MIT

//! Workflow instances and their persistence

pub mod model;
pub mod store;

pub use model::{HistoryEntry, WorkflowInstance};
pub use store::{FileStore, InstanceRecord, InstanceStore, MemoryStore};
