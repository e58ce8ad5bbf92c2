//! The Static Workflow Intermediate Representation (IR).
//!
//! This crate holds pure data: a closed algebraic sum of "flow nodes"
//! describing the constructs a workflow callback can use, plus the
//! handful of cross-cutting types (spans, dependencies, stats) that
//! every consumer of the IR needs. Nothing in this crate walks source
//! text or knows about tree-sitter; that's [`wf-syntax`] and the
//! callback walker in `wf-analyzer`.
//!
//! IR nodes are constructed once during a walk and never mutated
//! afterwards, except for the type fields the enricher fills in.

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod id;

pub use id::{IdGen, NodeId};

/// A `(line, column)` point within a source file.
///
/// Lines are 1-indexed, columns are 0-indexed, matching the parser
/// adapter's contract.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub line: usize,
    pub column: usize,
}

/// A concrete source location: a byte-offset span and the corresponding
/// line/column span.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub start_byte: usize,
    pub end_byte: usize,
    pub start_point: Point,
    pub end_point: Point,
}

impl Span {
    pub const fn zero() -> Self {
        Self {
            start_byte: 0,
            end_byte: 0,
            start_point: Point { line: 1, column: 0 },
            end_point: Point { line: 1, column: 0 },
        }
    }
}

/// A sentinel used wherever the source uses a non-literal value where a
/// literal was expected (a dynamic `stepId`, a computed option key, ...).
///
/// Downstream renderers treat this as "unknown": they suppress numeric
/// suffixes and don't annotate edges with it.
pub const DYNAMIC: &str = "<dynamic>";

/// Classification of a dependency's (or step's) return type, per the
/// Result-generic inference performed by the type enricher.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ResultKind {
    /// `AsyncResult<T, E>`.
    AsyncResult,
    /// `Result<T, E>`.
    Result,
    /// `Promise<Result<T, E>>`.
    PromiseResult,
    /// Anything else.
    Plain,
}

/// A display-string type reference, as extracted verbatim from the
/// checker. Opaque beyond its textual form: the analyzer never
/// interprets these further.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TypeRef {
    pub display: String,
}

impl TypeRef {
    pub fn new(display: impl Into<String>) -> Self {
        Self {
            display: display.into(),
        }
    }
}

/// The Result-like shape of a dependency's return type, with its `T`/`E`
/// arguments resolved to display strings (one alias level expanded).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ResultLike {
    pub ok_type: TypeRef,
    pub error_type: TypeRef,
}

/// A single positional/named parameter in a dependency's call signature.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ParamSignature {
    pub name: String,
    pub type_display: String,
}

/// A dependency's full call signature, as seen by the type checker.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DepSignature {
    pub params: Vec<ParamSignature>,
    pub return_type: TypeRef,
    pub return_kind: ResultKind,
    pub result_like: Option<ResultLike>,
}

/// A dependency declared in a workflow's `deps` object.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Dep {
    pub name: String,
    /// Raw type annotation text, if the parameter carrying this dep had one.
    pub type_signature: Option<String>,
    /// Populated by the type enricher when a checker is available.
    pub signature: Option<DepSignature>,
    /// Source span of this dep's declaration, queried by the type
    /// enricher instead of the consuming step's own span.
    pub location: Span,
}

impl Dep {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_signature: None,
            signature: None,
            location: Span::zero(),
        }
    }
}

/// The mode of a `parallel` node: whether it fails fast (`allAsync` /
/// object-form `step.parallel`) or collects settled results
/// (`allSettledAsync`).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ParallelMode {
    All,
    AllSettled,
}

/// The free helper (if any) that produced a [`FlowNode::Conditional`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ConditionalHelper {
    /// Produced by a bare `if` statement, not a helper call.
    None,
    When,
    Unless,
    WhenOr,
    UnlessOr,
}

/// How a `step.forEach` loop's `out` values are assembled.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum CollectMode {
    Array,
    Last,
}

/// The native iteration construct a [`FlowNode::Loop`] was lowered from.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum LoopType {
    For,
    ForOf,
    ForIn,
    While,
    StepForEach,
}

/// A single branch of a `switch` statement.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SwitchCase {
    /// Source text of the case's value expression; `None` for `default:`.
    pub value: Option<String>,
    pub is_default: bool,
    pub body: Vec<FlowNode>,
}

/// The type-level information the enricher attaches to a step's output.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct OutputTypeInfo {
    pub display: String,
    pub kind: ResultKind,
}

/// A single node in the flow tree. This is the closed sum described in
/// the IR's data model: every construct the callback walker recognizes
/// lowers to exactly one of these variants.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum FlowNode {
    Step {
        id: NodeId,
        /// The literal first-argument id, or [`DYNAMIC`] if non-literal.
        step_id: String,
        name: Option<String>,
        /// Textual form of the callee (`step`, `step.retry`, `step.try`, ...).
        callee: String,
        key: Option<String>,
        dep_source: Option<String>,
        retry: Option<String>,
        timeout: Option<String>,
        errors: Option<Vec<String>>,
        out: Option<String>,
        reads: Vec<String>,
        input_type: Option<String>,
        output_type: Option<String>,
        output_type_info: Option<OutputTypeInfo>,
        error_type_info: Option<TypeRef>,
        sleep_duration: Option<String>,
        location: Span,
    },
    SagaStep {
        id: NodeId,
        name: Option<String>,
        callee: String,
        has_compensation: bool,
        compensation_callee: Option<String>,
        is_try_step: bool,
        key: Option<String>,
        location: Span,
    },
    Stream {
        id: NodeId,
        stream_type: String,
        namespace: Option<String>,
        location: Span,
    },
    /// Two or more children in textual order. Never constructed with
    /// fewer than two children; a single child is returned unwrapped.
    Sequence { id: NodeId, children: Vec<FlowNode> },
    Parallel {
        id: NodeId,
        mode: ParallelMode,
        name: Option<String>,
        children: Vec<FlowNode>,
        callee: String,
        location: Span,
    },
    Race {
        id: NodeId,
        name: Option<String>,
        children: Vec<FlowNode>,
        callee: String,
        location: Span,
    },
    Conditional {
        id: NodeId,
        /// Source text of the predicate expression.
        condition: String,
        helper: ConditionalHelper,
        consequent: Vec<FlowNode>,
        alternate: Option<Vec<FlowNode>>,
        default_value: Option<String>,
        location: Span,
    },
    Decision {
        id: NodeId,
        decision_id: String,
        condition: String,
        condition_label: Option<String>,
        consequent: Vec<FlowNode>,
        alternate: Option<Vec<FlowNode>>,
        location: Span,
    },
    Switch {
        id: NodeId,
        expression: String,
        cases: Vec<SwitchCase>,
        location: Span,
    },
    Loop {
        id: NodeId,
        loop_type: LoopType,
        iter_source: Option<String>,
        body: Vec<FlowNode>,
        bound_known: bool,
        bound_count: Option<u64>,
        max_iterations: Option<u64>,
        step_id_pattern: Option<String>,
        out: Option<String>,
        collect: Option<CollectMode>,
        errors: Option<Vec<String>>,
        location: Span,
    },
    WorkflowRef {
        id: NodeId,
        workflow_name: String,
        resolved: bool,
        location: Span,
    },
    Unknown {
        id: NodeId,
        reason: String,
        location: Span,
    },
}

impl FlowNode {
    pub fn id(&self) -> NodeId {
        match self {
            FlowNode::Step { id, .. }
            | FlowNode::SagaStep { id, .. }
            | FlowNode::Stream { id, .. }
            | FlowNode::Sequence { id, .. }
            | FlowNode::Parallel { id, .. }
            | FlowNode::Race { id, .. }
            | FlowNode::Conditional { id, .. }
            | FlowNode::Decision { id, .. }
            | FlowNode::Switch { id, .. }
            | FlowNode::Loop { id, .. }
            | FlowNode::WorkflowRef { id, .. }
            | FlowNode::Unknown { id, .. } => *id,
        }
    }

    /// The step's literal id, for [`FlowNode::Step`] nodes that carry one.
    pub fn step_id(&self) -> Option<&str> {
        match self {
            FlowNode::Step { step_id, .. } => Some(step_id),
            _ => None,
        }
    }

    /// A depth-first iterator over this node and every descendant.
    pub fn walk(&self) -> Walk<'_> {
        Walk { stack: vec![self] }
    }

    /// This node's immediate children, in textual order.
    pub fn children(&self) -> Vec<&FlowNode> {
        match self {
            FlowNode::Sequence { children, .. }
            | FlowNode::Parallel { children, .. }
            | FlowNode::Race { children, .. } => children.iter().collect(),
            FlowNode::Conditional {
                consequent,
                alternate,
                ..
            } => consequent
                .iter()
                .chain(alternate.iter().flatten())
                .collect(),
            FlowNode::Decision {
                consequent,
                alternate,
                ..
            } => consequent
                .iter()
                .chain(alternate.iter().flatten())
                .collect(),
            FlowNode::Switch { cases, .. } => cases.iter().flat_map(|c| c.body.iter()).collect(),
            FlowNode::Loop { body, .. } => body.iter().collect(),
            FlowNode::Step { .. }
            | FlowNode::SagaStep { .. }
            | FlowNode::Stream { .. }
            | FlowNode::WorkflowRef { .. }
            | FlowNode::Unknown { .. } => vec![],
        }
    }
}

/// Depth-first, pre-order iterator over a [`FlowNode`] tree.
pub struct Walk<'a> {
    stack: Vec<&'a FlowNode>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a FlowNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        // Push in reverse so children are visited in textual order.
        for child in node.children().into_iter().rev() {
            self.stack.push(child);
        }
        Some(node)
    }
}

/// Aggregated per-workflow statistics (§4.3 "Stats").
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub total_steps: usize,
    pub conditional_count: usize,
    pub parallel_count: usize,
    pub race_count: usize,
    pub loop_count: usize,
    pub workflow_ref_count: usize,
    pub unknown_count: usize,
}

/// A warning recorded during the walk that doesn't abort analysis
/// (a missing callback, an unrecognized construct, ...).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Warning {
    pub message: String,
    pub location: Option<Span>,
}

/// Metadata attached to a single analysis result.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub file_path: String,
    /// Unix timestamp (seconds) of when this result was produced.
    pub analyzed_at: u64,
    pub warnings: Vec<Warning>,
    pub stats: Stats,
}

/// The root node of one discovered-and-walked workflow invocation.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub workflow_name: String,
    pub declared_errors: Option<Vec<String>>,
    pub strict: bool,
    pub dependencies: Vec<Dep>,
    pub description: Option<String>,
    pub children: Vec<FlowNode>,
}

/// One fully analyzed workflow invocation: its IR plus run metadata.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub root: WorkflowNode,
    pub metadata: Metadata,
    /// Cross-file workflow references discovered during the walk, keyed
    /// by the referenced workflow's name, valued by whether that name
    /// was resolvable within the same file (§6 "references").
    pub references: std::collections::BTreeMap<String, bool>,
}

impl fmt::Display for AnalysisResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{name} ({steps} steps)",
            name = self.root.workflow_name,
            steps = self.metadata.stats.total_steps
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: NodeId, step_id: &str) -> FlowNode {
        FlowNode::Step {
            id,
            step_id: step_id.into(),
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

    #[test]
    fn sequence_wrapping_invariant_is_enforced_by_construction_site() {
        // The IR itself doesn't forbid a one-child sequence; the walker
        // is responsible for never constructing one. This test documents
        // the expected shape rather than asserting an invariant the type
        // system can't express.
        let seq = FlowNode::Sequence {
            id: NodeId::new(1),
            children: vec![step(NodeId::new(2), "a"), step(NodeId::new(3), "b")],
        };
        assert_eq!(seq.children().len(), 2);
    }

    #[test]
    fn walk_is_pre_order_and_depth_first() {
        let inner = FlowNode::Sequence {
            id: NodeId::new(10),
            children: vec![step(NodeId::new(11), "a"), step(NodeId::new(12), "b")],
        };
        let outer = FlowNode::Sequence {
            id: NodeId::new(1),
            children: vec![inner, step(NodeId::new(13), "c")],
        };

        let ids: Vec<u32> = outer.walk().map(|n| n.id().value()).collect();
        assert_eq!(ids, vec![1, 10, 11, 12, 13]);
    }

    #[test]
    fn flow_node_serializes_with_tagged_type_field() {
        let node = step(NodeId::new(1), "a");
        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(value["type"], "step");
        assert_eq!(value["stepId"], "a");
    }
}
