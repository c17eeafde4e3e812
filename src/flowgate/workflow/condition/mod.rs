// SPDX-License-Identifier: MIT

//! Declarative prerequisite checks
//!
//! A workflow may bind prerequisite names to small boolean expressions
//! evaluated against an instance's context data:
//! - `tests_pass == true`
//! - `coverage >= 80 and not blocked`
//! - `reviewers contains 'alice' or (hotfix and approved_by != null)`
//!
//! A bare path (`blocked`) is true when the key is present.

mod ast;
mod evaluator;
mod parser;

pub use ast::{CompareOp, Expression, Literal};
pub use evaluator::evaluate;
pub use parser::{parse, ParseError};
