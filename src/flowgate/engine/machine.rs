// SPDX-License-Identifier: MIT

//! State machine engine
//!
//! Binds one workflow to one instance. All operations are synchronous
//! in-memory computations; loading and saving the instance is the
//! caller's job. The engine is not safe for concurrent mutation of the
//! same instance: callers serialize access per instance id.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

use super::checkers::CheckerRegistry;
use super::render;
use crate::flowgate::error::{FlowgateError, Result};
use crate::flowgate::instance::WorkflowInstance;
use crate::flowgate::workflow::{State, Workflow};

/// Read-only snapshot of where an instance stands
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceSummary {
    pub id: String,
    pub workflow: String,
    pub current_state: String,
    pub current_state_id: String,
    pub available_actions: Vec<String>,
    pub context_data: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub history_length: usize,
}

pub struct StateMachine<'w> {
    workflow: &'w Workflow,
    instance: WorkflowInstance,
    checkers: CheckerRegistry,
}

impl<'w> StateMachine<'w> {
    /// Engine over a fresh instance positioned at the initial state
    pub fn new(workflow: &'w Workflow) -> Self {
        let instance = WorkflowInstance::new(workflow.name(), workflow.initial_state());
        log::debug!(
            "Created instance {} of workflow '{}'",
            instance.id(),
            workflow.name()
        );
        Self::with_instance(workflow, instance)
    }

    /// Engine over an existing instance
    pub fn with_instance(workflow: &'w Workflow, instance: WorkflowInstance) -> Self {
        if instance.workflow_name() != workflow.name() {
            log::warn!(
                "Instance {} is bound to workflow '{}' but engine was given '{}'",
                instance.id(),
                instance.workflow_name(),
                workflow.name()
            );
        }
        Self {
            workflow,
            instance,
            checkers: CheckerRegistry::from_workflow(workflow),
        }
    }

    pub fn workflow(&self) -> &'w Workflow {
        self.workflow
    }

    pub fn instance(&self) -> &WorkflowInstance {
        &self.instance
    }

    /// Hand the (possibly mutated) instance back for persistence
    pub fn into_instance(self) -> WorkflowInstance {
        self.instance
    }

    /// Set a context key without transitioning
    pub fn set_context(&mut self, key: impl Into<String>, value: Value) {
        self.instance.insert_context(key, value);
    }

    /// The state the instance currently occupies
    pub fn current_state(&self) -> Result<&'w State> {
        self.state(self.instance.current_state())
    }

    fn state(&self, id: &str) -> Result<&'w State> {
        self.workflow
            .get_state(id)
            .ok_or_else(|| FlowgateError::StateNotFound(id.to_string()))
    }

    /// Actions leaving the current state, in declaration order
    pub fn available_actions(&self) -> Result<Vec<String>> {
        Ok(self.current_state()?.transitions.keys().cloned().collect())
    }

    pub fn can_transition(&self, action: &str) -> Result<bool> {
        Ok(self.current_state()?.transitions.contains_key(action))
    }

    /// Install or replace a named prerequisite predicate
    pub fn register_prerequisite_checker<F>(&mut self, name: impl Into<String>, checker: F)
    where
        F: Fn(&WorkflowInstance) -> bool + Send + Sync + 'static,
    {
        self.checkers.register(name, Arc::new(checker));
    }

    /// Unmet prerequisites for entering `target_state_id`, in declaration order
    pub fn check_prerequisites(&self, target_state_id: &str) -> Result<Vec<String>> {
        let target = self.state(target_state_id)?;
        Ok(target
            .prerequisites
            .iter()
            .filter(|name| !self.checkers.is_met(name, &self.instance))
            .cloned()
            .collect())
    }

    /// Take `action`, merging `context_update` into the instance.
    ///
    /// Prerequisites are evaluated against the context as it was before
    /// this call; keys in `context_update` cannot satisfy them. On any
    /// error the instance is left untouched.
    pub fn transition(
        &mut self,
        action: &str,
        context_update: Option<Map<String, Value>>,
    ) -> Result<&'w State> {
        let current = self.current_state()?;
        let Some(target_id) = current.transitions.get(action) else {
            let available: Vec<String> = current.transitions.keys().cloned().collect();
            log::debug!(
                "Rejected action '{}' in state '{}' of instance {}",
                action,
                current.id,
                self.instance.id()
            );
            return Err(FlowgateError::TransitionNotAllowed {
                action: action.to_string(),
                state: current.id.clone(),
                available,
            });
        };

        let unmet = self.check_prerequisites(target_id)?;
        if !unmet.is_empty() {
            log::debug!(
                "Instance {} blocked from '{}': unmet {:?}",
                self.instance.id(),
                target_id,
                unmet
            );
            return Err(FlowgateError::PrerequisiteNotMet {
                target: target_id.clone(),
                unmet,
            });
        }

        let target = self.state(target_id)?;
        self.instance
            .record_transition(action, &target.id, context_update);

        log::info!(
            "Instance {}: {} --{}--> {}",
            self.instance.id(),
            current.id,
            action,
            target.id
        );
        Ok(target)
    }

    /// Text block describing the current state and what may happen next
    pub fn render_context(&self) -> Result<String> {
        render::render_context(self)
    }

    pub fn instance_summary(&self) -> Result<InstanceSummary> {
        let state = self.current_state()?;
        Ok(InstanceSummary {
            id: self.instance.id().to_string(),
            workflow: self.workflow.name().to_string(),
            current_state: state.name.clone(),
            current_state_id: state.id.clone(),
            available_actions: state.transitions.keys().cloned().collect(),
            context_data: self.instance.context_data().clone(),
            created_at: self.instance.created_at(),
            updated_at: self.instance.updated_at(),
            history_length: self.instance.history().len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flowgate::workflow::WorkflowLoader;
    use serde_json::json;

    fn test_workflow() -> Workflow {
        WorkflowLoader::parse_yaml(
            r#"
name: test_workflow
initial_state: start
states:
  - id: start
    name: Start
    required_context: "Starting state"
    transitions:
      go: middle
  - id: middle
    name: Middle
    required_context: "Middle state with {data}"
    prerequisites: [data]
    transitions:
      finish: end
  - id: end
    name: End
    required_context: "End state"
"#,
        )
        .unwrap()
    }

    fn update(value: Value) -> Option<Map<String, Value>> {
        value.as_object().cloned()
    }

    #[test]
    fn test_initialization() {
        let wf = test_workflow();
        let sm = StateMachine::new(&wf);

        assert_eq!(sm.current_state().unwrap().id, "start");
        assert_eq!(sm.instance().workflow_name(), "test_workflow");
        assert!(sm.instance().history().is_empty());
    }

    #[test]
    fn test_available_actions() {
        let wf = test_workflow();
        let sm = StateMachine::new(&wf);
        assert_eq!(sm.available_actions().unwrap(), vec!["go"]);
        assert!(sm.can_transition("go").unwrap());
        assert!(!sm.can_transition("finish").unwrap());
    }

    #[test]
    fn test_terminal_state_has_no_actions() {
        let wf = test_workflow();
        let mut sm = StateMachine::new(&wf);
        sm.set_context("data", json!("x"));
        sm.transition("go", None).unwrap();
        sm.transition("finish", None).unwrap();

        assert!(sm.available_actions().unwrap().is_empty());
        assert!(sm.current_state().unwrap().is_terminal());
    }

    #[test]
    fn test_invalid_action_rejected_with_available_list() {
        let wf = test_workflow();
        let mut sm = StateMachine::new(&wf);

        match sm.transition("bogus", None) {
            Err(FlowgateError::TransitionNotAllowed {
                action,
                state,
                available,
            }) => {
                assert_eq!(action, "bogus");
                assert_eq!(state, "start");
                assert_eq!(available, vec!["go"]);
            }
            other => panic!("Expected TransitionNotAllowed, got {:?}", other.map(|s| &s.id)),
        }
    }

    #[test]
    fn test_prerequisite_enforcement() {
        let wf = test_workflow();
        let mut sm = StateMachine::new(&wf);

        let err = sm.transition("go", None).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot transition to 'middle'. Unmet prerequisites: [data]"
        );

        sm.set_context("data", json!("v"));
        let state = sm.transition("go", None).unwrap();
        assert_eq!(state.id, "middle");
        assert_eq!(sm.current_state().unwrap().id, "middle");
    }

    #[test]
    fn test_update_in_same_call_cannot_satisfy_prerequisite() {
        let wf = test_workflow();
        let mut sm = StateMachine::new(&wf);

        let result = sm.transition("go", update(json!({"data": "v"})));
        assert!(matches!(result, Err(FlowgateError::PrerequisiteNotMet { .. })));
        assert!(!sm.instance().context_data().contains_key("data"));
    }

    #[test]
    fn test_failed_transitions_leave_instance_unchanged() {
        let wf = test_workflow();
        let mut sm = StateMachine::new(&wf);
        sm.set_context("other", json!(1));
        let before = sm.instance().clone();

        assert!(sm.transition("bogus", update(json!({"x": 1}))).is_err());
        assert_eq!(sm.instance(), &before);

        assert!(sm.transition("go", update(json!({"y": 2}))).is_err());
        assert_eq!(sm.instance(), &before);
    }

    #[test]
    fn test_presence_fallback_ignores_value() {
        let wf = test_workflow();
        let mut sm = StateMachine::new(&wf);
        sm.set_context("data", json!(false));
        assert!(sm.transition("go", None).is_ok());
    }

    #[test]
    fn test_registered_checker_takes_precedence() {
        let wf = test_workflow();
        let mut sm = StateMachine::new(&wf);
        sm.set_context("data", json!("present"));
        sm.register_prerequisite_checker("data", |i: &WorkflowInstance| {
            i.context_data().get("data") == Some(&json!("approved"))
        });

        assert_eq!(sm.check_prerequisites("middle").unwrap(), vec!["data"]);

        sm.register_prerequisite_checker("data", |_: &WorkflowInstance| true);
        assert!(sm.check_prerequisites("middle").unwrap().is_empty());
    }

    #[test]
    fn test_check_prerequisites_unknown_state() {
        let wf = test_workflow();
        let sm = StateMachine::new(&wf);
        assert!(matches!(
            sm.check_prerequisites("nowhere"),
            Err(FlowgateError::StateNotFound(id)) if id == "nowhere"
        ));
    }

    #[test]
    fn test_stale_instance_reports_state_not_found() {
        let wf = test_workflow();
        let mut stale = WorkflowInstance::new("test_workflow", "start");
        stale.record_transition("old", "removed_state", None);
        let sm = StateMachine::with_instance(&wf, stale);

        assert!(matches!(
            sm.current_state(),
            Err(FlowgateError::StateNotFound(id)) if id == "removed_state"
        ));
        assert!(sm.available_actions().is_err());
        assert!(sm.render_context().is_err());
    }

    #[test]
    fn test_history_records_each_transition() {
        let wf = test_workflow();
        let mut sm = StateMachine::new(&wf);
        sm.set_context("data", json!("v"));

        sm.transition("go", update(json!({"note": "first"}))).unwrap();
        sm.transition("finish", None).unwrap();

        let history = sm.instance().history();
        assert_eq!(history.len(), 2);
        assert_eq!(
            (history[0].from_state.as_str(), history[0].to_state.as_str(), history[0].action.as_str()),
            ("start", "middle", "go")
        );
        assert_eq!(history[0].metadata, update(json!({"note": "first"})).unwrap());
        assert_eq!(
            (history[1].from_state.as_str(), history[1].to_state.as_str(), history[1].action.as_str()),
            ("middle", "end", "finish")
        );
        assert!(history[1].metadata.is_empty());
    }

    #[test]
    fn test_context_update_merges_by_key() {
        let wf = test_workflow();
        let mut sm = StateMachine::new(&wf);
        sm.set_context("data", json!("v"));
        sm.set_context("keep", json!("k"));

        sm.transition("go", update(json!({"data": "w", "new": 1}))).unwrap();

        let ctx = sm.instance().context_data();
        assert_eq!(ctx["data"], json!("w"));
        assert_eq!(ctx["keep"], json!("k"));
        assert_eq!(ctx["new"], json!(1));
    }

    #[test]
    fn test_instance_summary() {
        let wf = test_workflow();
        let mut sm = StateMachine::new(&wf);
        sm.set_context("data", json!("v"));
        sm.transition("go", None).unwrap();

        let summary = sm.instance_summary().unwrap();
        assert_eq!(summary.id, sm.instance().id());
        assert_eq!(summary.workflow, "test_workflow");
        assert_eq!(summary.current_state, "Middle");
        assert_eq!(summary.current_state_id, "middle");
        assert_eq!(summary.available_actions, vec!["finish"]);
        assert_eq!(summary.context_data["data"], json!("v"));
        assert_eq!(summary.history_length, 1);
        assert_eq!(summary.updated_at, sm.instance().updated_at());
    }

    #[test]
    fn test_declared_check_used_at_construction() {
        let wf = WorkflowLoader::parse_yaml(
            r#"
name: ci
checks:
  green: "tests_pass == true and coverage >= 80"
states:
  - id: dev
    transitions:
      ship: prod
  - id: prod
    prerequisites: [green]
"#,
        )
        .unwrap();
        let mut sm = StateMachine::new(&wf);
        sm.set_context("tests_pass", json!(true));
        sm.set_context("coverage", json!(70));
        assert_eq!(sm.check_prerequisites("prod").unwrap(), vec!["green"]);

        sm.set_context("coverage", json!(85));
        assert_eq!(sm.transition("ship", None).unwrap().id, "prod");
    }
}
