// SPDX-License-Identifier: MIT

//! Named prerequisite predicates

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::flowgate::instance::WorkflowInstance;
use crate::flowgate::workflow::condition;
use crate::flowgate::workflow::Workflow;

/// Pure predicate over an instance snapshot
pub type PrerequisiteChecker = Arc<dyn Fn(&WorkflowInstance) -> bool + Send + Sync>;

/// Prerequisite name -> checker. Lives as long as the engine that owns it.
#[derive(Clone, Default)]
pub struct CheckerRegistry {
    checkers: HashMap<String, PrerequisiteChecker>,
}

impl CheckerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the workflow's declarative checks
    pub fn from_workflow(workflow: &Workflow) -> Self {
        let mut registry = Self::new();
        for (name, check) in workflow.checks() {
            let expression = check.expression.clone();
            registry.register(
                name.clone(),
                Arc::new(move |instance: &WorkflowInstance| {
                    condition::evaluate(&expression, instance.context_data())
                }),
            );
        }
        registry
    }

    /// Install a checker; the last registration for a name wins
    pub fn register(&mut self, name: impl Into<String>, checker: PrerequisiteChecker) {
        self.checkers.insert(name.into(), checker);
    }

    /// Whether `name` holds for `instance`.
    ///
    /// Without a registered checker the prerequisite is met iff `name` is a
    /// context key. Only presence counts; a `false` or empty value still
    /// satisfies it.
    pub fn is_met(&self, name: &str, instance: &WorkflowInstance) -> bool {
        match self.checkers.get(name) {
            Some(checker) => checker(instance),
            None => instance.context_data().contains_key(name),
        }
    }
}

impl fmt::Debug for CheckerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.checkers.keys().collect();
        names.sort();
        f.debug_struct("CheckerRegistry")
            .field("checkers", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flowgate::workflow::WorkflowLoader;
    use serde_json::json;

    #[test]
    fn test_default_policy_is_presence() {
        let registry = CheckerRegistry::new();
        let mut instance = WorkflowInstance::new("w", "s");
        assert!(!registry.is_met("x", &instance));

        instance.insert_context("x", json!(false));
        assert!(registry.is_met("x", &instance));
    }

    #[test]
    fn test_registered_checker_overrides_presence() {
        let mut registry = CheckerRegistry::new();
        registry.register("x", Arc::new(|_: &WorkflowInstance| false));

        let mut instance = WorkflowInstance::new("w", "s");
        instance.insert_context("x", json!(true));
        assert!(!registry.is_met("x", &instance));
    }

    #[test]
    fn test_last_registration_wins() {
        let mut registry = CheckerRegistry::new();
        registry.register("gate", Arc::new(|_: &WorkflowInstance| false));
        registry.register("gate", Arc::new(|_: &WorkflowInstance| true));

        assert!(registry.is_met("gate", &WorkflowInstance::new("w", "s")));
        assert_eq!(format!("{:?}", registry), r#"CheckerRegistry { checkers: ["gate"] }"#);
    }

    #[test]
    fn test_workflow_checks_are_preloaded() {
        let wf = WorkflowLoader::parse_yaml(
            r#"
name: gated
checks:
  tests_pass: "tests_pass == true"
states:
  - id: only
"#,
        )
        .unwrap();
        let registry = CheckerRegistry::from_workflow(&wf);

        let mut instance = WorkflowInstance::new("gated", "only");
        instance.insert_context("tests_pass", json!(false));
        assert!(!registry.is_met("tests_pass", &instance));

        instance.insert_context("tests_pass", json!("true"));
        assert!(registry.is_met("tests_pass", &instance));
    }

    #[test]
    fn test_debug_lists_names() {
        let mut registry = CheckerRegistry::new();
        registry.register("b", Arc::new(|_: &WorkflowInstance| true));
        registry.register("a", Arc::new(|_: &WorkflowInstance| true));
        assert_eq!(
            format!("{:?}", registry),
            r#"CheckerRegistry { checkers: ["a", "b"] }"#
        );
    }
}
