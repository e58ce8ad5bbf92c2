//! Optional type enrichment (§4.4).
//!
//! Grounded on the teacher's optional-GitHub-client pattern (`state.rs`,
//! `audit/mod.rs`'s `online_only!` macro): every enrichment here degrades
//! silently to `None` rather than failing the walk when no checker is
//! available, matching §7 "Type enrichment failure (silent)".

use wf_ir::{Dep, DepSignature, FlowNode, OutputTypeInfo, ResultKind, ResultLike, TypeRef, WorkflowNode};
use wf_syntax::TypeChecker;

/// Walks `root` filling in type fields on every [`FlowNode::Step`], using
/// `checker` when present. A missing checker is a no-op, not an error.
///
/// Follows the three-step chain documented for the type enricher: classify
/// each dependency's return type at its own declaration span, store the
/// result on [`Dep::signature`], then have every step whose `depSource`
/// names that dependency inherit `okType`/`errorType` from it.
pub(crate) fn enrich(root: &mut WorkflowNode, checker: Option<&(dyn TypeChecker + Send + Sync)>) {
    let Some(checker) = checker else {
        return;
    };

    for dep in &mut root.dependencies {
        let Some(display) = checker.type_display_at(dep.location) else {
            continue;
        };
        dep.type_signature.get_or_insert_with(|| display.clone());

        let return_kind = classify(&display);
        let result_like = if return_kind == ResultKind::Plain {
            None
        } else {
            checker
                .generic_arguments_at(dep.location)
                .filter(|generics| generics.len() >= 2)
                .map(|generics| ResultLike {
                    ok_type: TypeRef::new(generics[0].clone()),
                    error_type: TypeRef::new(generics[1].clone()),
                })
        };

        dep.signature = Some(DepSignature {
            params: Vec::new(),
            return_type: TypeRef::new(display),
            return_kind,
            result_like,
        });
    }

    for child in &mut root.children {
        enrich_node(child, &root.dependencies);
    }
}

fn enrich_node(node: &mut FlowNode, deps: &[Dep]) {
    if let FlowNode::Step {
        dep_source,
        output_type_info,
        error_type_info,
        ..
    } = node
    {
        if let Some(result_like) = dep_source
            .as_deref()
            .and_then(|name| deps.iter().find(|d| d.name == name))
            .and_then(|dep| dep.signature.as_ref())
            .and_then(|sig| sig.result_like.as_ref())
        {
            output_type_info.get_or_insert_with(|| OutputTypeInfo {
                kind: ResultKind::Plain,
                display: result_like.ok_type.display.clone(),
            });
            error_type_info.get_or_insert_with(|| result_like.error_type.clone());
        }
    }

    for child in node_children_mut(node) {
        enrich_node(child, deps);
    }
}

/// Best-effort classification of a display string into a [`ResultKind`],
/// used when the checker only gives us textual output rather than a
/// structured decomposition.
fn classify(display: &str) -> ResultKind {
    if display.starts_with("AsyncResult<") {
        ResultKind::AsyncResult
    } else if display.starts_with("Promise<Result<") {
        ResultKind::PromiseResult
    } else if display.starts_with("Result<") {
        ResultKind::Result
    } else {
        ResultKind::Plain
    }
}

/// Same shape as [`FlowNode::children`], but mutable; the IR only exposes
/// a shared-reference walk since most consumers don't mutate.
fn node_children_mut(node: &mut FlowNode) -> Vec<&mut FlowNode> {
    match node {
        FlowNode::Sequence { children, .. }
        | FlowNode::Parallel { children, .. }
        | FlowNode::Race { children, .. } => children.iter_mut().collect(),
        FlowNode::Conditional {
            consequent,
            alternate,
            ..
        }
        | FlowNode::Decision {
            consequent,
            alternate,
            ..
        } => consequent
            .iter_mut()
            .chain(alternate.iter_mut().flatten())
            .collect(),
        FlowNode::Switch { cases, .. } => cases.iter_mut().flat_map(|c| c.body.iter_mut()).collect(),
        FlowNode::Loop { body, .. } => body.iter_mut().collect(),
        FlowNode::Step { .. }
        | FlowNode::SagaStep { .. }
        | FlowNode::Stream { .. }
        | FlowNode::WorkflowRef { .. }
        | FlowNode::Unknown { .. } => vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wf_ir::{Dep, Span};

    struct AlwaysString;
    impl TypeChecker for AlwaysString {
        fn type_display_at(&self, _span: Span) -> Option<String> {
            Some("Result<string, Error>".into())
        }
        fn generic_arguments_at(&self, _span: Span) -> Option<Vec<String>> {
            Some(vec!["string".into(), "Error".into()])
        }
    }

    fn step(dep_source: Option<&str>) -> FlowNode {
        FlowNode::Step {
            id: wf_ir::NodeId::new(1),
            step_id: "a".into(),
            name: None,
            callee: "step".into(),
            key: None,
            dep_source: dep_source.map(String::from),
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

    #[test]
    fn no_checker_leaves_fields_unset() {
        let mut root = WorkflowNode {
            workflow_name: "wf".into(),
            declared_errors: None,
            strict: false,
            dependencies: vec![Dep::new("db")],
            description: None,
            children: vec![step(Some("db"))],
        };
        enrich(&mut root, None);
        assert!(root.dependencies[0].type_signature.is_none());
        assert!(root.dependencies[0].signature.is_none());
    }

    #[test]
    fn dep_signature_classifies_result_like_return() {
        let mut root = WorkflowNode {
            workflow_name: "wf".into(),
            declared_errors: None,
            strict: false,
            dependencies: vec![Dep::new("db")],
            description: None,
            children: vec![],
        };
        let checker = AlwaysString;
        enrich(&mut root, Some(&checker));

        let signature = root.dependencies[0].signature.as_ref().expect("signature set");
        assert_eq!(signature.return_kind, ResultKind::Result);
        let result_like = signature.result_like.as_ref().expect("result-like");
        assert_eq!(result_like.ok_type.display, "string");
        assert_eq!(result_like.error_type.display, "Error");
    }

    #[test]
    fn step_inherits_ok_and_error_type_from_its_dep_source() {
        let mut root = WorkflowNode {
            workflow_name: "wf".into(),
            declared_errors: None,
            strict: false,
            dependencies: vec![Dep::new("db")],
            description: None,
            children: vec![step(Some("db"))],
        };
        let checker = AlwaysString;
        enrich(&mut root, Some(&checker));

        match &root.children[0] {
            FlowNode::Step {
                output_type_info,
                error_type_info,
                ..
            } => {
                let info = output_type_info.as_ref().expect("output type info set");
                assert_eq!(info.kind, ResultKind::Plain);
                assert_eq!(info.display, "string");
                assert_eq!(error_type_info.as_ref().unwrap().display, "Error");
            }
            _ => panic!("expected step"),
        }
    }

    #[test]
    fn step_without_matching_dep_source_stays_unenriched() {
        let mut root = WorkflowNode {
            workflow_name: "wf".into(),
            declared_errors: None,
            strict: false,
            dependencies: vec![Dep::new("db")],
            description: None,
            children: vec![step(None)],
        };
        let checker = AlwaysString;
        enrich(&mut root, Some(&checker));

        match &root.children[0] {
            FlowNode::Step { output_type_info, .. } => assert!(output_type_info.is_none()),
            _ => panic!("expected step"),
        }
    }
}
