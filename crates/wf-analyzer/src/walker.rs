//! The callback walker (§4.3): the hard part. Traverses a workflow
//! callback's body, recognizing every DSL construct in the call matrix and
//! emitting IR nodes.
//!
//! The walker decides a call's overload shape exactly once (by arity and
//! first-argument kind) before extracting fields from it — mixing
//! extractors across shapes is how the upstream project ended up with a
//! double-counted `parallelCount` (§9 "Polymorphic overloads").

use std::collections::HashMap;

use tree_sitter::Node;
use wf_ir::{
    CollectMode, ConditionalHelper, FlowNode, IdGen, LoopType, ParallelMode, Span, SwitchCase,
    Warning, DYNAMIC,
};
use wf_syntax::{Document, NodeExt as _};

use crate::discovery::{object_pairs, string_literal};

pub(crate) struct WalkCx<'a> {
    pub(crate) doc: &'a Document,
    pub(crate) step_param: String,
    pub(crate) known_workflows: &'a [String],
    pub(crate) tags: &'a HashMap<String, Vec<String>>,
    pub(crate) ids: &'a mut IdGen,
    pub(crate) warnings: &'a mut Vec<Warning>,
    pub(crate) stats: &'a mut wf_ir::Stats,
}

/// Options extracted from a step/saga/forEach call's options object
/// literal (§4.3 "Option extraction").
#[derive(Default)]
struct StepOptions {
    key: Option<String>,
    name: Option<String>,
    errors: Option<Vec<String>>,
    out: Option<String>,
    reads: Vec<String>,
    retry: Option<String>,
    timeout: Option<String>,
    dep: Option<String>,
    max_iterations: Option<u64>,
    step_id_pattern: Option<String>,
    collect: Option<CollectMode>,
}

/// Entry point: walks a workflow callback's body and returns its top-level
/// children in document order.
pub(crate) fn walk_callback(cx: &mut WalkCx, callback: Node<'_>) -> Vec<FlowNode> {
    let Some(body) = callback.body_child() else {
        cx.warnings.push(Warning {
            message: "workflow callback has no body".into(),
            location: Some(cx.doc.span(callback)),
        });
        return vec![];
    };

    if body.kind() == "statement_block" {
        walk_block(cx, body)
    } else {
        // Arrow function with an expression body, e.g. `step => step(...)`.
        walk_expression(cx, body)
    }
}

fn walk_block(cx: &mut WalkCx, block: Node<'_>) -> Vec<FlowNode> {
    let mut out = Vec::new();
    for stmt in block.named_children_vec() {
        out.extend(walk_statement(cx, stmt));
    }
    out
}

/// Collapses a list of nodes into exactly one, per the wrapping rule in
/// §4.3/§3 invariant 2: 0 children becomes an `unknown` placeholder
/// (sequences may never be empty), 1 child is unwrapped, 2+ are wrapped
/// into a `sequence`.
fn as_single_node(cx: &mut WalkCx, mut nodes: Vec<FlowNode>, at: Span) -> FlowNode {
    match nodes.len() {
        0 => FlowNode::Unknown {
            id: cx.ids.next_id(),
            reason: "branch produced no recognizable steps".into(),
            location: at,
        },
        1 => nodes.pop().unwrap(),
        _ => FlowNode::Sequence {
            id: cx.ids.next_id(),
            children: nodes,
        },
    }
}

fn walk_statement(cx: &mut WalkCx, stmt: Node<'_>) -> Vec<FlowNode> {
    match stmt.kind() {
        "expression_statement" => {
            let Some(expr) = stmt.named_children_vec().into_iter().next() else {
                return vec![];
            };
            walk_expression(cx, expr)
        }
        "return_statement" => match stmt.named_children_vec().into_iter().next() {
            Some(expr) => walk_expression(cx, expr),
            None => vec![],
        },
        "if_statement" => walk_if_statement(cx, stmt),
        "for_statement" => vec![walk_c_style_loop(cx, stmt)],
        "for_in_statement" => vec![walk_for_in_or_of(cx, stmt)],
        "while_statement" => vec![walk_while_loop(cx, stmt)],
        "switch_statement" => vec![walk_switch(cx, stmt)],
        "lexical_declaration" | "variable_declaration" => vec![],
        "statement_block" => walk_block(cx, stmt),
        _ => vec![],
    }
}

fn unwrap_expression(node: Node<'_>) -> Node<'_> {
    match node.kind() {
        "await_expression" | "parenthesized_expression" => node
            .named_children_vec()
            .into_iter()
            .next()
            .map(unwrap_expression)
            .unwrap_or(node),
        _ => node,
    }
}

fn walk_expression(cx: &mut WalkCx, expr: Node<'_>) -> Vec<FlowNode> {
    let expr = unwrap_expression(expr);
    if expr.kind() != "call_expression" {
        return vec![];
    }
    handle_call(cx, expr)
}

/// The callee's normalized dispatch key: `step`, `step.retry`, `saga.step`,
/// a free helper name, a known workflow name, or `None` for anything
/// scope-irrelevant (including calls on unrelated objects with
/// colliding method names — §8 property 6).
enum Dispatch {
    StepBase,
    StepMethod(String),
    SagaMethod(String),
    FreeHelper(String),
    WorkflowRef(String),
    Unrelated,
}

fn classify_callee(cx: &WalkCx, callee_text: &str) -> Dispatch {
    let step_prefix = format!("{}.", cx.step_param);
    if callee_text == cx.step_param {
        return Dispatch::StepBase;
    }
    if let Some(method) = callee_text.strip_prefix(&step_prefix) {
        return Dispatch::StepMethod(method.to_string());
    }
    if let Some(method) = callee_text.strip_prefix("saga.") {
        return Dispatch::SagaMethod(method.to_string());
    }
    if matches!(
        callee_text,
        "allAsync" | "allSettledAsync" | "anyAsync" | "when" | "unless" | "whenOr" | "unlessOr"
    ) {
        return Dispatch::FreeHelper(callee_text.to_string());
    }
    if cx.known_workflows.iter().any(|n| n == callee_text) {
        return Dispatch::WorkflowRef(callee_text.to_string());
    }
    Dispatch::Unrelated
}

fn handle_call(cx: &mut WalkCx, call: Node<'_>) -> Vec<FlowNode> {
    let Some(callee) = call.function_child() else {
        return vec![];
    };
    let callee_text = cx.doc.text(callee).to_string();
    let args = call
        .arguments_child()
        .map(|a| a.named_children_vec())
        .unwrap_or_default();

    match classify_callee(cx, &callee_text) {
        Dispatch::StepBase => vec![build_step(cx, call, &callee_text, &args)],
        Dispatch::StepMethod(method) => match method.as_str() {
            "retry" | "withTimeout" | "try" => vec![build_step(cx, call, &callee_text, &args)],
            "parallel" => handle_step_parallel(cx, call, &args),
            "race" => vec![handle_step_race(cx, call, &args)],
            "forEach" => vec![build_for_each(cx, call, &args)],
            "if" | "label" => vec![build_decision_from_call(cx, call, &args)],
            "branch" => vec![build_branch(cx, call, &args)],
            "dep" => {
                // `step.dep(name, fn)` only makes sense nested inside another
                // step call's `fn` argument; encountered bare, it's inert.
                vec![]
            }
            other => {
                cx.warnings.push(Warning {
                    message: format!("unrecognized step method `{other}`"),
                    location: Some(cx.doc.span(call)),
                });
                vec![FlowNode::Unknown {
                    id: cx.ids.next_id(),
                    reason: format!("unrecognized step method `{other}`"),
                    location: cx.doc.span(call),
                }]
            }
        },
        Dispatch::SagaMethod(method) if method == "step" || method == "tryStep" => {
            vec![build_saga_step(cx, call, &method, &args)]
        }
        Dispatch::SagaMethod(_) => vec![],
        Dispatch::FreeHelper(name) => handle_free_helper(cx, call, &name, &args),
        Dispatch::WorkflowRef(name) => {
            cx.stats.workflow_ref_count += 1;
            vec![FlowNode::WorkflowRef {
                id: cx.ids.next_id(),
                workflow_name: name,
                resolved: true,
                location: cx.doc.span(call),
            }]
        }
        Dispatch::Unrelated => vec![],
    }
}

// ---- step / step.retry / step.withTimeout / step.try -------------------

fn build_step(cx: &mut WalkCx, call: Node<'_>, callee_text: &str, args: &[Node<'_>]) -> FlowNode {
    cx.stats.total_steps += 1;

    // Overloads: (id, fn, opts?), (fn, opts?), (id, result, opts?).
    let first_is_literal_id = args
        .first()
        .map(|n| string_literal(cx.doc, *n).is_some())
        .unwrap_or(false);

    let (step_id, fn_arg, opts_arg) = if first_is_literal_id {
        (
            string_literal(cx.doc, args[0]).unwrap(),
            args.get(1).copied(),
            args.get(2).copied(),
        )
    } else {
        (DYNAMIC.to_string(), args.first().copied(), args.get(1).copied())
    };

    let opts = opts_arg
        .map(|o| extract_step_options(cx, o))
        .unwrap_or_default();

    let (dep_from_wrapper, real_fn) = fn_arg
        .map(|f| unwrap_dep_wrapper(cx, f))
        .unwrap_or((None, None));

    let dep_source = opts
        .dep
        .clone()
        .or(dep_from_wrapper)
        .or_else(|| real_fn.and_then(|f| detect_dep_source(cx.doc, f)));

    let mut reads = opts.reads;
    for key in collect_ctx_refs(cx.doc, fn_arg) {
        if !reads.contains(&key) {
            reads.push(key);
        }
    }

    FlowNode::Step {
        id: cx.ids.next_id(),
        step_id,
        name: opts.name,
        callee: callee_text.to_string(),
        key: opts.key,
        dep_source,
        retry: opts.retry,
        timeout: opts.timeout,
        errors: opts.errors,
        out: opts.out,
        reads,
        input_type: None,
        output_type: None,
        output_type_info: None,
        error_type_info: None,
        sleep_duration: None,
        location: cx.doc.span(call),
    }
}

/// Unwraps a `step.dep('name', realFn)` wrapper, if `node` is one.
fn unwrap_dep_wrapper<'tree>(
    cx: &WalkCx,
    node: Node<'tree>,
) -> (Option<String>, Option<Node<'tree>>) {
    if node.kind() != "call_expression" {
        return (None, Some(node));
    }
    let Some(callee) = node.function_child() else {
        return (None, Some(node));
    };
    let callee_text = cx.doc.text(callee);
    if callee_text != format!("{}.dep", cx.step_param) {
        return (None, Some(node));
    }
    let args = node
        .arguments_child()
        .map(|a| a.named_children_vec())
        .unwrap_or_default();
    let name = args.first().and_then(|n| string_literal(cx.doc, *n));
    let real_fn = args.get(1).copied();
    (name, real_fn)
}

fn detect_dep_source(doc: &Document, fn_node: Node<'_>) -> Option<String> {
    let body = match fn_node.kind() {
        "arrow_function" => fn_node.body_child()?,
        _ => return None,
    };
    let expr = unwrap_expression(body);
    if expr.kind() != "call_expression" {
        return None;
    }
    let callee = expr.function_child()?;
    let text = doc.text(callee);
    text.strip_prefix("deps.")
        .or_else(|| text.strip_prefix("ctx.deps."))
        .map(|s| s.split('.').next().unwrap_or(s).to_string())
}

/// Every `ctx.ref('K')` literal-argument occurrence reachable from `fn`,
/// unioned with the explicit `reads` option (handled by the caller).
fn collect_ctx_refs(doc: &Document, fn_node: Option<Node<'_>>) -> Vec<String> {
    let Some(fn_node) = fn_node else {
        return vec![];
    };
    let mut keys = Vec::new();
    for node in tree_sitter_iter::TreeIter::new_from_node(fn_node) {
        if node.kind() != "call_expression" {
            continue;
        }
        let Some(callee) = node.function_child() else {
            continue;
        };
        if doc.text(callee) != "ctx.ref" {
            continue;
        }
        let Some(args) = node.arguments_child() else {
            continue;
        };
        if let Some(first) = args.named_children_vec().into_iter().next() {
            if let Some(key) = string_literal(doc, first) {
                keys.push(key);
            }
        }
    }
    keys
}

fn extract_step_options(cx: &mut WalkCx, obj: Node<'_>) -> StepOptions {
    if obj.kind() != "object" {
        return StepOptions::default();
    }

    let mut opts = StepOptions::default();
    for (key, value) in object_pairs(cx.doc, obj) {
        match key.as_str() {
            "key" => opts.key = Some(string_literal(cx.doc, value).unwrap_or(DYNAMIC.to_string())),
            "name" => opts.name = string_literal(cx.doc, value),
            "errors" => {
                opts.errors = resolve_errors(cx, value);
            }
            "out" => opts.out = string_literal(cx.doc, value).or(Some(DYNAMIC.to_string())),
            "reads" => {
                if value.kind() == "array" {
                    opts.reads = value
                        .named_children_vec()
                        .into_iter()
                        .filter_map(|v| string_literal(cx.doc, v))
                        .collect();
                }
            }
            "retry" => opts.retry = Some(cx.doc.text(value).to_string()),
            "timeout" => opts.timeout = Some(cx.doc.text(value).to_string()),
            "dep" => opts.dep = string_literal(cx.doc, value),
            "maxIterations" => {
                opts.max_iterations = number_literal(cx.doc, value);
            }
            "stepIdPattern" => opts.step_id_pattern = string_literal(cx.doc, value),
            "collect" => {
                opts.collect = match string_literal(cx.doc, value).as_deref() {
                    Some("array") => Some(CollectMode::Array),
                    Some("last") => Some(CollectMode::Last),
                    _ => None,
                };
            }
            _ => {}
        }
    }
    opts
}

fn resolve_errors(cx: &WalkCx, value: Node<'_>) -> Option<Vec<String>> {
    match value.kind() {
        "array" => Some(
            value
                .named_children_vec()
                .into_iter()
                .filter_map(|v| string_literal(cx.doc, v))
                .collect(),
        ),
        "identifier" => cx.tags.get(cx.doc.text(value)).cloned(),
        _ => None,
    }
}

fn number_literal(doc: &Document, node: Node<'_>) -> Option<u64> {
    if node.kind() != "number" {
        return None;
    }
    doc.text(node).parse().ok()
}

// ---- step.parallel / step.race / allAsync / anyAsync --------------------

enum ParallelKind {
    All,
    AllSettled,
    Race,
}

fn handle_step_parallel(cx: &mut WalkCx, call: Node<'_>, args: &[Node<'_>]) -> Vec<FlowNode> {
    match args.len() {
        1 if args[0].kind() == "object" => {
            vec![handle_object_branches(cx, call, args, ParallelKind::All, None)]
        }
        2 if args[1].kind() == "object" => {
            let name = string_literal(cx.doc, args[0]);
            vec![handle_object_branches(
                cx,
                call,
                &args[1..],
                ParallelKind::All,
                name,
            )]
        }
        2 => {
            // `(name, () => allAsync(...))` composition: decide the shape
            // once, delegate entirely to the inner call so stats aren't
            // double-counted (§9).
            let name = string_literal(cx.doc, args[0]);
            let Some(body) = args[1].body_child() else {
                return vec![];
            };
            let inner = unwrap_expression(body);
            let mut produced = handle_call(cx, inner);
            if let Some(FlowNode::Parallel { name: slot, .. }) = produced.first_mut() {
                *slot = name;
            }
            produced
        }
        _ => vec![],
    }
}

/// `step.race`'s overloads mirror `step.parallel`'s object and
/// `(name, object)` forms, but not its `(name, thunk)` composition form.
fn handle_step_race(cx: &mut WalkCx, call: Node<'_>, args: &[Node<'_>]) -> FlowNode {
    match args.len() {
        1 if args[0].kind() == "object" => {
            handle_object_branches(cx, call, args, ParallelKind::Race, None)
        }
        2 if args[1].kind() == "object" => {
            let name = string_literal(cx.doc, args[0]);
            handle_object_branches(cx, call, &args[1..], ParallelKind::Race, name)
        }
        _ => empty_group(cx, ParallelKind::Race, None, cx.doc.span(call)),
    }
}

/// Builds a parallel (all/allSettled) or race node from an object literal
/// of named branches: `{ a: {fn, errors}, b: () => ... }`.
fn handle_object_branches(
    cx: &mut WalkCx,
    call: Node<'_>,
    args: &[Node<'_>],
    kind: ParallelKind,
    name: Option<String>,
) -> FlowNode {
    let location = cx.doc.span(call);
    let Some(obj) = args.first().copied() else {
        return empty_group(cx, kind, name, location);
    };

    let children: Vec<FlowNode> = object_pairs(cx.doc, obj)
        .into_iter()
        .map(|(key, value)| build_branch_step(cx, &key, value))
        .collect();

    match kind {
        ParallelKind::All | ParallelKind::AllSettled => {
            cx.stats.parallel_count += 1;
            FlowNode::Parallel {
                id: cx.ids.next_id(),
                mode: if matches!(kind, ParallelKind::AllSettled) {
                    ParallelMode::AllSettled
                } else {
                    ParallelMode::All
                },
                name,
                children,
                callee: format!("{}.parallel", cx.step_param),
                location,
            }
        }
        ParallelKind::Race => {
            cx.stats.race_count += 1;
            FlowNode::Race {
                id: cx.ids.next_id(),
                name,
                children,
                callee: format!("{}.race", cx.step_param),
                location,
            }
        }
    }
}

fn empty_group(
    cx: &mut WalkCx,
    kind: ParallelKind,
    name: Option<String>,
    location: Span,
) -> FlowNode {
    match kind {
        ParallelKind::Race => {
            cx.stats.race_count += 1;
            FlowNode::Race {
                id: cx.ids.next_id(),
                name,
                children: vec![],
                callee: format!("{}.race", cx.step_param),
                location,
            }
        }
        _ => {
            cx.stats.parallel_count += 1;
            FlowNode::Parallel {
                id: cx.ids.next_id(),
                mode: ParallelMode::All,
                name,
                children: vec![],
                callee: format!("{}.parallel", cx.step_param),
                location,
            }
        }
    }
}

/// A single named branch: the strict `{ fn, errors }` shape, or the
/// shorthand `() => ...` (flagged later by `parallel-missing-errors`).
fn build_branch_step(cx: &mut WalkCx, key: &str, value: Node<'_>) -> FlowNode {
    cx.stats.total_steps += 1;
    let location = cx.doc.span(value);

    if value.kind() == "object" {
        let mut errors = None;
        let mut fn_node = None;
        for (k, v) in object_pairs(cx.doc, value) {
            match k.as_str() {
                "errors" => errors = resolve_errors(cx, v),
                "fn" => fn_node = Some(v),
                _ => {}
            }
        }
        let dep_source = fn_node.and_then(|f| detect_dep_source(cx.doc, f));
        FlowNode::Step {
            id: cx.ids.next_id(),
            step_id: key.to_string(),
            name: Some(key.to_string()),
            callee: format!("{}.parallel", cx.step_param),
            key: None,
            dep_source,
            retry: None,
            timeout: None,
            errors,
            out: None,
            reads: collect_ctx_refs(cx.doc, fn_node),
            input_type: None,
            output_type: None,
            output_type_info: None,
            error_type_info: None,
            sleep_duration: None,
            location,
        }
    } else {
        // Shorthand form: a bare callback or a direct dep call.
        let dep_source = detect_dep_source(cx.doc, value);
        FlowNode::Step {
            id: cx.ids.next_id(),
            step_id: key.to_string(),
            name: Some(key.to_string()),
            callee: format!("{}.parallel", cx.step_param),
            key: None,
            dep_source,
            retry: None,
            timeout: None,
            errors: None,
            out: None,
            reads: collect_ctx_refs(cx.doc, Some(value)),
            input_type: None,
            output_type: None,
            output_type_info: None,
            error_type_info: None,
            sleep_duration: None,
            location,
        }
    }
}

fn handle_free_helper(
    cx: &mut WalkCx,
    call: Node<'_>,
    name: &str,
    args: &[Node<'_>],
) -> Vec<FlowNode> {
    match name {
        "allAsync" | "allSettledAsync" => {
            vec![build_array_group(
                cx,
                call,
                args,
                matches!(name, "allSettledAsync"),
            )]
        }
        "anyAsync" => vec![build_array_race(cx, call, args)],
        "when" | "unless" | "whenOr" | "unlessOr" => {
            vec![build_conditional_helper(cx, call, name, args)]
        }
        _ => vec![],
    }
}

fn build_array_group(
    cx: &mut WalkCx,
    call: Node<'_>,
    args: &[Node<'_>],
    settled: bool,
) -> FlowNode {
    cx.stats.parallel_count += 1;
    let children = array_branch_children(cx, args.first().copied());
    FlowNode::Parallel {
        id: cx.ids.next_id(),
        mode: if settled {
            ParallelMode::AllSettled
        } else {
            ParallelMode::All
        },
        name: None,
        children,
        callee: if settled {
            "allSettledAsync".into()
        } else {
            "allAsync".into()
        },
        location: cx.doc.span(call),
    }
}

fn build_array_race(cx: &mut WalkCx, call: Node<'_>, args: &[Node<'_>]) -> FlowNode {
    cx.stats.race_count += 1;
    let children = array_branch_children(cx, args.first().copied());
    FlowNode::Race {
        id: cx.ids.next_id(),
        name: None,
        children,
        callee: "anyAsync".into(),
        location: cx.doc.span(call),
    }
}

/// Array-literal branches for `allAsync`/`allSettledAsync`/`anyAsync`:
/// direct (unwrapped) call expressions become implicit step nodes; thunks
/// are walked and collapsed to a single node.
fn array_branch_children(cx: &mut WalkCx, array: Option<Node<'_>>) -> Vec<FlowNode> {
    let Some(array) = array else { return vec![] };
    if array.kind() != "array" {
        return vec![];
    }

    array
        .named_children_vec()
        .into_iter()
        .map(|el| match el.kind() {
            "arrow_function" | "function_expression" => {
                let Some(body) = el.body_child() else {
                    return FlowNode::Unknown {
                        id: cx.ids.next_id(),
                        reason: "thunk has no body".into(),
                        location: cx.doc.span(el),
                    };
                };
                let nodes = if body.kind() == "statement_block" {
                    walk_block(cx, body)
                } else {
                    walk_expression(cx, body)
                };
                as_single_node(cx, nodes, cx.doc.span(el))
            }
            "call_expression" => {
                cx.stats.total_steps += 1;
                let callee = el.function_child();
                let method = callee
                    .map(|c| cx.doc.text(c))
                    .and_then(|t| t.rsplit('.').next())
                    .unwrap_or("call")
                    .to_string();
                let dep_source = callee.and_then(|c| {
                    let text = cx.doc.text(c);
                    text.strip_prefix("deps.")
                        .or_else(|| text.strip_prefix("ctx.deps."))
                        .map(|s| s.to_string())
                });
                FlowNode::Step {
                    id: cx.ids.next_id(),
                    step_id: DYNAMIC.into(),
                    name: Some(method),
                    callee: callee.map(|c| cx.doc.text(c).to_string()).unwrap_or_default(),
                    key: None,
                    dep_source,
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
                    location: cx.doc.span(el),
                }
            }
            _ => FlowNode::Unknown {
                id: cx.ids.next_id(),
                reason: format!("unrecognized array branch of kind `{}`", el.kind()),
                location: cx.doc.span(el),
            },
        })
        .collect()
}

fn build_conditional_helper(
    cx: &mut WalkCx,
    call: Node<'_>,
    name: &str,
    args: &[Node<'_>],
) -> FlowNode {
    cx.stats.conditional_count += 1;
    let condition = args
        .first()
        .map(|n| cx.doc.text(*n).to_string())
        .unwrap_or_default();

    let consequent = match args.get(1) {
        Some(cb) => match cb.body_child() {
            Some(body) if body.kind() == "statement_block" => walk_block(cx, body),
            Some(body) => walk_expression(cx, body),
            None => vec![],
        },
        None => vec![],
    };

    let default_value = args.get(2).map(|n| cx.doc.text(*n).to_string());

    let helper = match name {
        "when" => ConditionalHelper::When,
        "unless" => ConditionalHelper::Unless,
        "whenOr" => ConditionalHelper::WhenOr,
        _ => ConditionalHelper::UnlessOr,
    };

    FlowNode::Conditional {
        id: cx.ids.next_id(),
        condition,
        helper,
        consequent,
        alternate: None,
        default_value,
        location: cx.doc.span(call),
    }
}

// ---- step.forEach ---------------------------------------------------

fn build_for_each(cx: &mut WalkCx, call: Node<'_>, args: &[Node<'_>]) -> FlowNode {
    cx.stats.loop_count += 1;
    let iter_source = args.get(1).map(|n| cx.doc.text(*n).to_string());
    let opts = args
        .get(2)
        .map(|o| extract_step_options(cx, *o))
        .unwrap_or_default();

    FlowNode::Loop {
        id: cx.ids.next_id(),
        loop_type: LoopType::StepForEach,
        iter_source,
        // Inner `step.item(...)` detection is a known partial area (§9
        // open questions); we don't synthesize a body today.
        body: vec![],
        bound_known: opts.max_iterations.is_some(),
        bound_count: None,
        max_iterations: opts.max_iterations,
        step_id_pattern: opts.step_id_pattern,
        out: opts.out,
        collect: opts.collect,
        errors: opts.errors,
        location: cx.doc.span(call),
    }
}

// ---- step.if / step.label / step.branch ------------------------------

fn build_decision_from_call(cx: &mut WalkCx, call: Node<'_>, args: &[Node<'_>]) -> FlowNode {
    // Reached when a `step.if`/`step.label` call appears outside of an
    // `if` statement's condition slot (e.g. assigned to a variable). We
    // still have no consequent/alternate to attach, so emit a decision
    // with an empty-but-valid consequent per invariant 5.
    let decision_id = args
        .first()
        .and_then(|n| string_literal(cx.doc, *n))
        .unwrap_or_else(|| DYNAMIC.to_string());
    let condition_label = args.get(1).and_then(|n| string_literal(cx.doc, *n));
    let condition = args
        .get(2)
        .map(|n| cx.doc.text(*n).to_string())
        .unwrap_or_default();

    FlowNode::Decision {
        id: cx.ids.next_id(),
        decision_id,
        condition,
        condition_label,
        consequent: vec![FlowNode::Unknown {
            id: cx.ids.next_id(),
            reason: "step.if used outside of an if-statement condition".into(),
            location: cx.doc.span(call),
        }],
        alternate: None,
        location: cx.doc.span(call),
    }
}

fn walk_if_statement(cx: &mut WalkCx, if_stmt: Node<'_>) -> Vec<FlowNode> {
    let Some(condition) = if_stmt.condition_child() else {
        return vec![];
    };
    let inner_condition = unwrap_expression(condition);

    let Some(consequence) = if_stmt.consequence_child() else {
        return vec![];
    };
    let consequent = if consequence.kind() == "statement_block" {
        walk_block(cx, consequence)
    } else {
        walk_statement(cx, consequence)
    };

    let alternate = if_stmt.alternative_child().map(|alt| {
        let alt = if alt.kind() == "else_clause" {
            alt.named_children_vec().into_iter().next().unwrap_or(alt)
        } else {
            alt
        };
        if alt.kind() == "statement_block" {
            walk_block(cx, alt)
        } else {
            walk_statement(cx, alt)
        }
    });

    if inner_condition.kind() == "call_expression" {
        let callee = inner_condition.function_child();
        let callee_text = callee.map(|c| cx.doc.text(c)).unwrap_or_default();
        let step_if = format!("{}.if", cx.step_param);
        let step_label = format!("{}.label", cx.step_param);
        if callee_text == step_if || callee_text == step_label {
            let args = inner_condition
                .arguments_child()
                .map(|a| a.named_children_vec())
                .unwrap_or_default();
            let decision_id = args
                .first()
                .and_then(|n| string_literal(cx.doc, *n))
                .unwrap_or_else(|| DYNAMIC.to_string());
            let condition_label = args.get(1).and_then(|n| string_literal(cx.doc, *n));
            let condition = args
                .get(2)
                .map(|n| cx.doc.text(*n).to_string())
                .unwrap_or_default();

            return vec![FlowNode::Decision {
                id: cx.ids.next_id(),
                decision_id,
                condition,
                condition_label,
                consequent,
                alternate,
                location: cx.doc.span(if_stmt),
            }];
        }
    }

    cx.stats.conditional_count += 1;
    vec![FlowNode::Conditional {
        id: cx.ids.next_id(),
        condition: cx.doc.text(inner_condition).to_string(),
        helper: ConditionalHelper::None,
        consequent,
        alternate,
        default_value: None,
        location: cx.doc.span(if_stmt),
    }]
}

fn build_branch(cx: &mut WalkCx, call: Node<'_>, args: &[Node<'_>]) -> FlowNode {
    let decision_id = args
        .first()
        .and_then(|n| string_literal(cx.doc, *n))
        .unwrap_or_else(|| DYNAMIC.to_string());

    let Some(opts) = args.get(1).copied() else {
        return FlowNode::Unknown {
            id: cx.ids.next_id(),
            reason: "step.branch missing options object".into(),
            location: cx.doc.span(call),
        };
    };

    let mut condition_label = None;
    let mut condition = String::new();
    let mut then_node = None;
    let mut else_node = None;
    let mut then_errors = None;
    let mut else_errors = None;
    let mut out = None;

    for (key, value) in object_pairs(cx.doc, opts) {
        match key.as_str() {
            "conditionLabel" => condition_label = string_literal(cx.doc, value),
            "condition" => condition = cx.doc.text(value).to_string(),
            "then" => then_node = Some(value),
            "else" => else_node = Some(value),
            "thenErrors" => then_errors = resolve_errors(cx, value),
            "elseErrors" => else_errors = resolve_errors(cx, value),
            "out" => out = string_literal(cx.doc, value).or(Some(DYNAMIC.to_string())),
            _ => {}
        }
    }

    let consequent = vec![synthesize_branch_step(
        cx,
        "then",
        then_node,
        then_errors,
        out.clone(),
    )];
    let alternate = else_node
        .map(|_| vec![synthesize_branch_step(cx, "else", else_node, else_errors, out)]);

    FlowNode::Decision {
        id: cx.ids.next_id(),
        decision_id,
        condition,
        condition_label,
        consequent,
        alternate,
        location: cx.doc.span(call),
    }
}

fn synthesize_branch_step(
    cx: &mut WalkCx,
    branch: &str,
    fn_node: Option<Node<'_>>,
    errors: Option<Vec<String>>,
    out: Option<String>,
) -> FlowNode {
    cx.stats.total_steps += 1;
    let location = fn_node
        .map(|n| cx.doc.span(n))
        .unwrap_or(Span::zero());
    let dep_source = fn_node.and_then(|f| detect_dep_source(cx.doc, f));

    FlowNode::Step {
        id: cx.ids.next_id(),
        step_id: branch.to_string(),
        name: Some(branch.to_string()),
        callee: format!("{}.branch", cx.step_param),
        key: None,
        dep_source,
        retry: None,
        timeout: None,
        errors,
        out,
        reads: collect_ctx_refs(cx.doc, fn_node),
        input_type: None,
        output_type: None,
        output_type_info: None,
        error_type_info: None,
        sleep_duration: None,
        location,
    }
}

// ---- saga.step / saga.tryStep ----------------------------------------

fn build_saga_step(cx: &mut WalkCx, call: Node<'_>, method: &str, args: &[Node<'_>]) -> FlowNode {
    let name = args.first().and_then(|n| string_literal(cx.doc, *n));
    let opts = args.get(2).copied();

    let mut has_compensation = false;
    let mut compensation_callee = None;
    let mut key = None;

    if let Some(opts) = opts {
        for (k, v) in object_pairs(cx.doc, opts) {
            match k.as_str() {
                "compensate" => {
                    has_compensation = true;
                    compensation_callee = Some(cx.doc.text(v).to_string());
                }
                "key" => key = string_literal(cx.doc, v),
                _ => {}
            }
        }
    }

    FlowNode::SagaStep {
        id: cx.ids.next_id(),
        name,
        callee: format!("saga.{method}"),
        has_compensation,
        compensation_callee,
        is_try_step: method == "tryStep",
        key,
        location: cx.doc.span(call),
    }
}

// ---- control flow: for / for-in / for-of / while / switch --------------

fn walk_c_style_loop(cx: &mut WalkCx, stmt: Node<'_>) -> FlowNode {
    cx.stats.loop_count += 1;
    let body = loop_body(cx, stmt);
    FlowNode::Loop {
        id: cx.ids.next_id(),
        loop_type: LoopType::For,
        iter_source: None,
        body,
        bound_known: false,
        bound_count: None,
        max_iterations: None,
        step_id_pattern: None,
        out: None,
        collect: None,
        errors: None,
        location: cx.doc.span(stmt),
    }
}

fn walk_for_in_or_of(cx: &mut WalkCx, stmt: Node<'_>) -> FlowNode {
    cx.stats.loop_count += 1;
    // The grammar merges `for...of` and `for...in` into one node kind;
    // distinguish by substring match on the raw source, per the open
    // question in §9 (a parser that distinguishes them natively is
    // preferred, but tree-sitter-typescript does not).
    let text = cx.doc.text(stmt);
    let loop_type = if text.splitn(2, ')').next().unwrap_or(text).contains(" of ") {
        LoopType::ForOf
    } else {
        LoopType::ForIn
    };

    let iter_source = stmt.right_child().map(|n| cx.doc.text(n).to_string());
    let body = loop_body(cx, stmt);

    FlowNode::Loop {
        id: cx.ids.next_id(),
        loop_type,
        iter_source,
        body,
        bound_known: false,
        bound_count: None,
        max_iterations: None,
        step_id_pattern: None,
        out: None,
        collect: None,
        errors: None,
        location: cx.doc.span(stmt),
    }
}

fn walk_while_loop(cx: &mut WalkCx, stmt: Node<'_>) -> FlowNode {
    cx.stats.loop_count += 1;
    let body = loop_body(cx, stmt);
    FlowNode::Loop {
        id: cx.ids.next_id(),
        loop_type: LoopType::While,
        iter_source: stmt.condition_child().map(|n| cx.doc.text(n).to_string()),
        body,
        bound_known: false,
        bound_count: None,
        max_iterations: None,
        step_id_pattern: None,
        out: None,
        collect: None,
        errors: None,
        location: cx.doc.span(stmt),
    }
}

fn loop_body(cx: &mut WalkCx, stmt: Node<'_>) -> Vec<FlowNode> {
    match stmt.body_child() {
        Some(body) if body.kind() == "statement_block" => walk_block(cx, body),
        Some(body) => walk_statement(cx, body),
        None => vec![],
    }
}

fn walk_switch(cx: &mut WalkCx, stmt: Node<'_>) -> FlowNode {
    let expression = stmt
        .condition_child()
        .or_else(|| stmt.value_child())
        .map(|n| cx.doc.text(n).to_string())
        .unwrap_or_default();

    let mut cases = Vec::new();
    for child in stmt.named_children_vec() {
        match child.kind() {
            "switch_case" => {
                let value = child.value_child().map(|v| cx.doc.text(v).to_string());
                let body = child
                    .named_children_vec()
                    .into_iter()
                    .filter(|n| n.kind() != "string" && *n != child.value_child().unwrap_or(child))
                    .flat_map(|n| walk_statement(cx, n))
                    .collect();
                cases.push(SwitchCase {
                    value,
                    is_default: false,
                    body,
                });
            }
            "switch_default" => {
                let body = child
                    .named_children_vec()
                    .into_iter()
                    .flat_map(|n| walk_statement(cx, n))
                    .collect();
                cases.push(SwitchCase {
                    value: None,
                    is_default: true,
                    body,
                });
            }
            _ => {}
        }
    }

    FlowNode::Switch {
        id: cx.ids.next_id(),
        expression,
        cases,
        location: cx.doc.span(stmt),
    }
}
