// SPDX-License-Identifier: MIT

//! Workflow state machine enforcement for AI agents

pub mod config;
pub mod engine;
pub mod error;
pub mod instance;
pub mod server;
pub mod workflow;

pub use error::{FlowgateError, Result};
