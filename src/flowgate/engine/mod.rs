// SPDX-License-Identifier: MIT

//! Workflow execution engine

pub mod checkers;
pub mod machine;
pub mod render;

pub use checkers::{CheckerRegistry, PrerequisiteChecker};
pub use machine::{InstanceSummary, StateMachine};
pub use render::substitute_placeholders;
