// SPDX-License-Identifier: MIT

//! Context rendering: placeholder substitution and composition of the
//! text block handed to an agent.

use serde_json::{Map, Value};

use super::machine::StateMachine;
use crate::flowgate::error::Result;

/// Replace every `{key}` whose key is present in `context` with the
/// value's string form. Strings render without quotes; everything else
/// renders as JSON. Unknown placeholders are left as they are.
///
/// Single left-to-right pass: substituted text is never rescanned.
pub fn substitute_placeholders(template: &str, context: &Map<String, Value>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find(['{', '}']) {
            Some(close) if after.as_bytes()[close] == b'}' => {
                let key = &after[..close];
                match context.get(key) {
                    Some(value) => out.push_str(&value_text(value)),
                    None => {
                        out.push('{');
                        out.push_str(key);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub(crate) fn render_context(machine: &StateMachine<'_>) -> Result<String> {
    let workflow = machine.workflow();
    let instance = machine.instance();
    let state = machine.current_state()?;

    let mut sections: Vec<String> = Vec::new();

    if let Some(global) = workflow.global_context() {
        sections.push(global.to_string());
    }

    sections.push(substitute_placeholders(
        &state.required_context,
        instance.context_data(),
    ));

    sections.push(format!("Current workflow state: {}", state.name));

    if !state.transitions.is_empty() {
        let actions: Vec<&str> = state.transitions.keys().map(String::as_str).collect();
        sections.push(format!("Available actions: {}", actions.join(", ")));
    }

    for (action, target) in &state.transitions {
        let unmet = machine.check_prerequisites(target)?;
        if !unmet.is_empty() {
            sections.push(format!("To {}: requires {}", action, unmet.join(", ")));
        }
    }

    Ok(sections.join("\n"))
}
