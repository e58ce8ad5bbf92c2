//! The strict-mode rule engine (§4.7).
//!
//! Grounded on zizmor's individual `Audit` implementations (e.g.
//! `audit/unpinned_uses.rs`): each rule is a standalone function walking
//! the tree looking for one specific shape, and the engine just runs
//! every rule and flattens the results. There's no `Audit` trait or
//! registration macro here because the rule set is fixed rather than
//! pluggable (§9) — see [`crate::registry`] for why.

use wf_ir::{FlowNode, LoopType, WorkflowNode};

use crate::config::Config;
use crate::diagnostic::{filter_suppressed, Diagnostic, Severity};

type Rule = (&'static str, fn(&WorkflowNode) -> Vec<Diagnostic>);

const RULES: &[Rule] = &[
    ("missing-step-id", missing_step_id),
    ("missing-errors", missing_errors),
    ("parallel-missing-errors", parallel_missing_errors),
    ("loop-missing-collect", loop_missing_collect),
];

/// Runs every strict-mode rule over `root`, honoring `config`'s
/// per-rule disable/severity overrides and inline `// wf-analyzer:
/// ignore[...]` comments in `source`.
///
/// A workflow only gets checked when it declared `strict: true`, unless
/// `config.force_strict()` overrides that (§4.7 "Strict mode").
pub(crate) fn run(root: &WorkflowNode, source: &str, config: &Config) -> Vec<Diagnostic> {
    if !root.strict && !config.force_strict() {
        return vec![];
    }

    let mut diagnostics = Vec::new();
    for (rule_id, rule) in RULES {
        if config.disables(rule_id) {
            continue;
        }
        let mut found = rule(root);
        if let Some(severity) = config.severity_override(rule_id) {
            for d in &mut found {
                d.severity = severity;
            }
        }
        diagnostics.extend(found);
    }

    filter_suppressed(source, diagnostics)
}

fn missing_step_id(root: &WorkflowNode) -> Vec<Diagnostic> {
    root.children
        .iter()
        .flat_map(|n| n.walk())
        .filter_map(|node| match node {
            FlowNode::Step {
                step_id, location, ..
            } if step_id == wf_ir::DYNAMIC => Some(
                Diagnostic::new(
                    "missing-step-id",
                    "step has a non-literal id; downstream tooling can't key on it",
                    *location,
                )
                .with_severity(Severity::Warning),
            ),
            _ => None,
        })
        .collect()
}

fn missing_errors(root: &WorkflowNode) -> Vec<Diagnostic> {
    root.children
        .iter()
        .flat_map(|n| n.walk())
        .filter_map(|node| match node {
            FlowNode::Step {
                step_id,
                errors: None,
                location,
                ..
            } => Some(Diagnostic::new(
                "missing-errors",
                format!("step '{step_id}' declares no error tags"),
                *location,
            )),
            _ => None,
        })
        .collect()
}

fn parallel_missing_errors(root: &WorkflowNode) -> Vec<Diagnostic> {
    root.children
        .iter()
        .flat_map(|n| n.walk())
        .filter_map(|node| match node {
            FlowNode::Parallel { children, location, .. } | FlowNode::Race { children, location, .. } => {
                let any_missing = children.iter().any(|c| {
                    matches!(c, FlowNode::Step { errors: None, .. })
                });
                any_missing.then(|| {
                    Diagnostic::new(
                        "parallel-missing-errors",
                        "one or more branches declare no error tags",
                        *location,
                    )
                })
            }
            _ => None,
        })
        .collect()
}

fn loop_missing_collect(root: &WorkflowNode) -> Vec<Diagnostic> {
    root.children
        .iter()
        .flat_map(|n| n.walk())
        .filter_map(|node| match node {
            FlowNode::Loop {
                loop_type: LoopType::StepForEach,
                out: Some(_),
                collect: None,
                location,
                ..
            } => Some(Diagnostic::new(
                "loop-missing-collect",
                "forEach loop produces `out` without a declared collect mode",
                *location,
            )),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wf_ir::Span;

    fn step_without_errors(id: u32) -> FlowNode {
        FlowNode::Step {
            id: wf_ir::NodeId::new(id),
            step_id: "a".into(),
            name: None,
            callee: "step".into(),
            key: None,
            dep_source: None,
            retry: None,
            timeout: None,
            errors: None,
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

    fn workflow(children: Vec<FlowNode>, strict: bool) -> WorkflowNode {
        WorkflowNode {
            workflow_name: "wf".into(),
            declared_errors: None,
            strict,
            dependencies: vec![],
            description: None,
            children,
        }
    }

    #[test]
    fn strict_false_skips_all_rules() {
        let root = workflow(vec![step_without_errors(1)], false);
        let diags = run(&root, "", &Config::default());
        assert!(diags.is_empty());
    }

    #[test]
    fn missing_errors_is_flagged_in_strict_mode() {
        let root = workflow(vec![step_without_errors(1)], true);
        let diags = run(&root, "", &Config::default());
        assert!(diags.iter().any(|d| d.rule_id == "missing-errors"));
    }

    #[test]
    fn inline_ignore_comment_suppresses_the_rule() {
        let root = workflow(vec![step_without_errors(1)], true);
        let source = "step('a', fn); // wf-analyzer: ignore[missing-errors]\n";
        let diags = run(&root, source, &Config::default());
        assert!(diags.is_empty());
    }
}
