// SPDX-License-Identifier: MIT

//! Syntax tree for check expressions

use std::fmt;

/// A parsed check expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// `path op literal`
    Compare {
        path: String,
        op: CompareOp,
        value: Literal,
    },
    /// Bare path: the key exists in context data
    Present(String),
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
    Not(Box<Expression>),
    /// `true` / `false`
    Constant(bool),
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Substring for strings, membership for arrays
    Contains,
}

/// Right-hand side of a comparison
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Number(f64),
    Boolean(bool),
    Null,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            CompareOp::Eq => "==",
            CompareOp::NotEq => "!=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Contains => "contains",
        };
        f.write_str(symbol)
    }
}

impl Expression {
    /// Context keys (first path segment) this expression reads
    pub fn referenced_keys(&self) -> Vec<&str> {
        let mut keys = Vec::new();
        self.collect_keys(&mut keys);
        keys
    }

    fn collect_keys<'a>(&'a self, keys: &mut Vec<&'a str>) {
        match self {
            Expression::Compare { path, .. } | Expression::Present(path) => {
                let root = path.split('.').next().unwrap_or(path);
                if !keys.contains(&root) {
                    keys.push(root);
                }
            }
            Expression::And(l, r) | Expression::Or(l, r) => {
                l.collect_keys(keys);
                r.collect_keys(keys);
            }
            Expression::Not(inner) => inner.collect_keys(keys),
            Expression::Constant(_) => {}
        }
    }
}
