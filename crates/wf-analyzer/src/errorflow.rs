//! Error-flow analysis (§4.6).
//!
//! Collects the union of every error tag a workflow's steps declare, maps
//! each tag back to the steps that can raise it, and cross-checks the
//! union against the workflow's own `declared_errors` (from `tags()` or
//! a literal array passed to `createWorkflow`'s `errors` option).

use std::collections::{BTreeMap, BTreeSet};

use wf_ir::{FlowNode, WorkflowNode};

#[derive(Clone, Debug, Default, serde::Serialize)]
pub(crate) struct ErrorFlow {
    pub(crate) per_step: BTreeMap<String, Vec<String>>,
    pub(crate) all_errors: Vec<String>,
    pub(crate) error_to_steps: BTreeMap<String, Vec<String>>,
    pub(crate) steps_without_errors: Vec<String>,
    /// Errors raised by some step but absent from the workflow's
    /// declared error set, if one was given.
    pub(crate) undeclared_errors: Vec<String>,
    /// Errors the workflow declares but that no step ever raises.
    pub(crate) unused_declared: Vec<String>,
    /// `true` iff `undeclared_errors` is empty.
    pub(crate) valid: bool,
    /// `true` iff every step (that emits at all) declares an `errors` key.
    pub(crate) all_steps_declare_errors: bool,
}

fn step_identity(step_id: &str, key: &Option<String>) -> String {
    key.clone().unwrap_or_else(|| step_id.to_string())
}

pub(crate) fn analyze(root: &WorkflowNode) -> ErrorFlow {
    let mut flow = ErrorFlow::default();
    let mut all_errors: BTreeSet<String> = BTreeSet::new();
    let mut error_to_steps: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for node in root.children.iter().flat_map(|n| n.walk()) {
        let (id, errors) = match node {
            FlowNode::Step {
                step_id, key, errors, ..
            } => (step_identity(step_id, key), errors),
            FlowNode::Loop {
                step_id_pattern,
                errors,
                ..
            } => (step_id_pattern.clone().unwrap_or_else(|| "loop".into()), errors),
            _ => continue,
        };

        match errors {
            Some(tags) if !tags.is_empty() => {
                flow.per_step.insert(id.clone(), tags.clone());
                for tag in tags {
                    all_errors.insert(tag.clone());
                    error_to_steps.entry(tag.clone()).or_default().insert(id.clone());
                }
            }
            Some(_) => {
                flow.per_step.insert(id.clone(), vec![]);
            }
            None => {
                flow.steps_without_errors.push(id);
            }
        }
    }

    flow.all_errors = all_errors.iter().cloned().collect();
    flow.error_to_steps = error_to_steps
        .into_iter()
        .map(|(k, v)| (k, v.into_iter().collect()))
        .collect();

    if let Some(declared) = &root.declared_errors {
        let declared_set: BTreeSet<&String> = declared.iter().collect();
        let all_errors_set: BTreeSet<&String> = flow.all_errors.iter().collect();

        flow.undeclared_errors = flow
            .all_errors
            .iter()
            .filter(|e| !declared_set.contains(e))
            .cloned()
            .collect();
        flow.unused_declared = declared
            .iter()
            .filter(|e| !all_errors_set.contains(e))
            .cloned()
            .collect();
    }

    flow.valid = flow.undeclared_errors.is_empty();
    flow.all_steps_declare_errors = flow.steps_without_errors.is_empty();

    flow
}

#[cfg(test)]
mod tests {
    use super::*;
    use wf_ir::{NodeId, Span};

    fn step(id: u32, step_id: &str, errors: Option<Vec<&str>>) -> FlowNode {
        FlowNode::Step {
            id: NodeId::new(id),
            step_id: step_id.into(),
            name: None,
            callee: "step".into(),
            key: None,
            dep_source: None,
            retry: None,
            timeout: None,
            errors: errors.map(|e| e.into_iter().map(String::from).collect()),
            out: None,
            reads: vec![],
            input_type: None,
            output_type: None,
            output_type_info: None,
            error_type_info: None,
            sleep_duration: None,
            location: Span::zero(),
        }
    }

    fn workflow(children: Vec<FlowNode>, declared_errors: Option<Vec<&str>>) -> WorkflowNode {
        WorkflowNode {
            workflow_name: "wf".into(),
            declared_errors: declared_errors.map(|e| e.into_iter().map(String::from).collect()),
            strict: false,
            dependencies: vec![],
            description: None,
            children,
        }
    }

    #[test]
    fn collects_error_union_and_reverse_map() {
        let root = workflow(
            vec![
                step(1, "a", Some(vec!["CARD_DECLINED"])),
                step(2, "b", Some(vec!["CARD_DECLINED", "TIMEOUT"])),
            ],
            None,
        );
        let flow = analyze(&root);
        assert_eq!(flow.all_errors, vec!["CARD_DECLINED".to_string(), "TIMEOUT".to_string()]);
        assert_eq!(flow.error_to_steps["CARD_DECLINED"], vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn flags_undeclared_errors_against_workflow_declaration() {
        let root = workflow(vec![step(1, "a", Some(vec!["CARD_DECLINED"]))], Some(vec!["TIMEOUT"]));
        let flow = analyze(&root);
        assert_eq!(flow.undeclared_errors, vec!["CARD_DECLINED".to_string()]);
        assert_eq!(flow.unused_declared, vec!["TIMEOUT".to_string()]);
        assert!(!flow.valid);
    }

    #[test]
    fn valid_when_every_raised_error_is_declared() {
        let root = workflow(
            vec![step(1, "a", Some(vec!["CARD_DECLINED"]))],
            Some(vec!["CARD_DECLINED"]),
        );
        let flow = analyze(&root);
        assert!(flow.undeclared_errors.is_empty());
        assert!(flow.unused_declared.is_empty());
        assert!(flow.valid);
    }

    #[test]
    fn all_steps_declare_errors_is_false_when_any_step_omits_it() {
        let root = workflow(
            vec![step(1, "a", Some(vec!["CARD_DECLINED"])), step(2, "b", None)],
            None,
        );
        let flow = analyze(&root);
        assert!(!flow.all_steps_declare_errors);
    }

    #[test]
    fn flags_steps_without_errors() {
        let root = workflow(vec![step(1, "a", None)], None);
        let flow = analyze(&root);
        assert_eq!(flow.steps_without_errors, vec!["a".to_string()]);
    }
}
