//! Data-flow graph construction (§4.5).
//!
//! Edges go document order forward only, so the graph is a DAG by
//! construction (§5 "Cyclic graphs"); `toposort` here is a plain
//! Kahn's-algorithm walk rather than a full cycle-detecting sort, since
//! a cycle would mean a construction bug upstream, not a real input
//! shape.

use std::collections::{BTreeMap, BTreeSet};

use wf_ir::{FlowNode, WorkflowNode};

#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize)]
pub(crate) struct Edge {
    pub(crate) from: String,
    pub(crate) to: String,
    pub(crate) key: String,
    /// Display string of the producer's output type, when known.
    pub(crate) r#type: Option<String>,
}

/// A reader's declared/consumed type for a key that disagrees with the
/// type its producer actually writes.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize)]
pub(crate) struct TypeMismatch {
    pub(crate) key: String,
    pub(crate) producer: String,
    pub(crate) producer_type: String,
    pub(crate) consumer: String,
    pub(crate) consumer_type: String,
}

#[derive(Clone, Debug, Default, serde::Serialize)]
pub(crate) struct DataFlowGraph {
    pub(crate) produced_keys: BTreeMap<String, String>,
    pub(crate) undefined_reads: Vec<(String, String)>,
    /// Keys with two or more writers, each paired with the ids of every
    /// step that writes it, in document order.
    pub(crate) duplicate_writes: Vec<(String, Vec<String>)>,
    pub(crate) edges: Vec<Edge>,
    pub(crate) type_mismatches: Vec<TypeMismatch>,
    pub(crate) topological_order: Option<Vec<String>>,
}

/// Every step (or loop) that declares an `out` or consumes `reads`,
/// identified by its `key` if present, else its `step_id`.
pub(crate) fn node_key(node: &FlowNode) -> Option<String> {
    match node {
        FlowNode::Step { key, step_id, .. } => Some(key.clone().unwrap_or_else(|| step_id.clone())),
        FlowNode::Loop {
            step_id_pattern,
            out,
            ..
        } if out.is_some() => Some(step_id_pattern.clone().unwrap_or_else(|| "loop".into())),
        _ => None,
    }
}

/// The source location backing a data-flow node key, for attributing
/// validation issues back to a concrete span.
pub(crate) fn node_location(node: &FlowNode) -> Option<wf_ir::Span> {
    match node {
        FlowNode::Step { location, .. } | FlowNode::Loop { location, .. } => Some(*location),
        _ => None,
    }
}

fn node_produces(node: &FlowNode) -> Option<&str> {
    match node {
        FlowNode::Step { out, .. } => out.as_deref(),
        FlowNode::Loop { out, .. } => out.as_deref(),
        _ => None,
    }
}

fn node_reads(node: &FlowNode) -> Vec<&str> {
    match node {
        FlowNode::Step { reads, .. } => reads.iter().map(String::as_str).collect(),
        _ => vec![],
    }
}

/// Display string of a step's output type, preferring the enricher's
/// structured [`wf_ir::OutputTypeInfo`] over the raw `output_type` text.
fn node_output_type(node: &FlowNode) -> Option<&str> {
    match node {
        FlowNode::Step {
            output_type_info,
            output_type,
            ..
        } => output_type_info
            .as_ref()
            .map(|info| info.display.as_str())
            .or(output_type.as_deref()),
        _ => None,
    }
}

/// A reader's own declared input type, when the callback parameter that
/// receives the read value carries a type annotation.
fn node_input_type(node: &FlowNode) -> Option<&str> {
    match node {
        FlowNode::Step { input_type, .. } => input_type.as_deref(),
        _ => None,
    }
}

/// Builds the data-flow graph for one workflow's IR (§4.5).
pub(crate) fn build(root: &WorkflowNode) -> DataFlowGraph {
    let mut graph = DataFlowGraph::default();
    let mut writers: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut producer_types: BTreeMap<String, String> = BTreeMap::new();

    for node in root.children.iter().flat_map(|n| n.walk()) {
        let Some(key) = node_key(node) else { continue };
        if let Some(produced) = node_produces(node) {
            graph.produced_keys.insert(produced.to_string(), key.clone());
            writers.entry(produced.to_string()).or_default().push(key.clone());
            if let Some(output_type) = node_output_type(node) {
                producer_types.insert(produced.to_string(), output_type.to_string());
            }
        }
    }

    graph.duplicate_writes = writers
        .into_iter()
        .filter(|(_, steps)| steps.len() > 1)
        .collect();

    for node in root.children.iter().flat_map(|n| n.walk()) {
        let Some(consumer_key) = node_key(node) else { continue };
        let consumer_type = node_input_type(node);
        for read in node_reads(node) {
            match graph.produced_keys.get(read) {
                Some(producer_key) if producer_key != &consumer_key => {
                    let producer_type = producer_types.get(read).cloned();
                    if let (Some(p_type), Some(c_type)) = (&producer_type, consumer_type) {
                        if p_type != c_type {
                            graph.type_mismatches.push(TypeMismatch {
                                key: read.to_string(),
                                producer: producer_key.clone(),
                                producer_type: p_type.clone(),
                                consumer: consumer_key.clone(),
                                consumer_type: c_type.to_string(),
                            });
                        }
                    }
                    graph.edges.push(Edge {
                        from: producer_key.clone(),
                        to: consumer_key.clone(),
                        key: read.to_string(),
                        r#type: producer_type,
                    });
                }
                Some(_) => {}
                None => graph
                    .undefined_reads
                    .push((consumer_key.clone(), read.to_string())),
            }
        }
    }

    graph.topological_order = toposort(&graph);
    graph
}

fn toposort(graph: &DataFlowGraph) -> Option<Vec<String>> {
    let mut nodes: BTreeSet<String> = BTreeSet::new();
    for edge in &graph.edges {
        nodes.insert(edge.from.clone());
        nodes.insert(edge.to.clone());
    }

    let mut indegree: BTreeMap<String, usize> = nodes.iter().cloned().map(|n| (n, 0)).collect();
    for edge in &graph.edges {
        *indegree.get_mut(&edge.to).unwrap() += 1;
    }

    let mut queue: Vec<String> = indegree
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(n, _)| n.clone())
        .collect();
    queue.sort();

    let mut order = Vec::new();
    while let Some(n) = queue.pop() {
        order.push(n.clone());
        let mut newly_ready = Vec::new();
        for edge in graph.edges.iter().filter(|e| e.from == n) {
            let deg = indegree.get_mut(&edge.to).unwrap();
            *deg -= 1;
            if *deg == 0 {
                newly_ready.push(edge.to.clone());
            }
        }
        newly_ready.sort();
        queue.extend(newly_ready);
    }

    (order.len() == nodes.len()).then_some(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wf_ir::{NodeId, Span};

    fn step(id: u32, step_id: &str, out: Option<&str>, reads: Vec<&str>) -> FlowNode {
        FlowNode::Step {
            id: NodeId::new(id),
            step_id: step_id.into(),
            name: None,
            callee: "step".into(),
            key: None,
            dep_source: None,
            retry: None,
            timeout: None,
            errors: None,
            out: out.map(String::from),
            reads: reads.into_iter().map(String::from).collect(),
            input_type: None,
            output_type: None,
            output_type_info: None,
            error_type_info: None,
            sleep_duration: None,
            location: Span::zero(),
        }
    }

    fn step_with_types(
        id: u32,
        step_id: &str,
        out: Option<&str>,
        reads: Vec<&str>,
        output_type: Option<&str>,
        input_type: Option<&str>,
    ) -> FlowNode {
        let mut node = step(id, step_id, out, reads);
        if let FlowNode::Step {
            output_type: ot,
            input_type: it,
            ..
        } = &mut node
        {
            *ot = output_type.map(String::from);
            *it = input_type.map(String::from);
        }
        node
    }

    fn workflow(children: Vec<FlowNode>) -> WorkflowNode {
        WorkflowNode {
            workflow_name: "wf".into(),
            declared_errors: None,
            strict: false,
            dependencies: vec![],
            description: None,
            children,
        }
    }

    #[test]
    fn builds_an_edge_between_producer_and_consumer() {
        let root = workflow(vec![
            step(1, "a", Some("cart"), vec![]),
            step(2, "b", None, vec!["cart"]),
        ]);
        let graph = build(&root);
        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.edges[0].from, "a");
        assert_eq!(graph.edges[0].to, "b");
        assert_eq!(graph.topological_order, Some(vec!["a".into(), "b".into()]));
    }

    #[test]
    fn edge_carries_the_producers_output_type_when_known() {
        let root = workflow(vec![
            step_with_types(1, "a", Some("cart"), vec![], Some("Cart"), None),
            step_with_types(2, "b", None, vec!["cart"], None, None),
        ]);
        let graph = build(&root);
        assert_eq!(graph.edges[0].r#type.as_deref(), Some("Cart"));
    }

    #[test]
    fn flags_type_mismatch_between_producer_and_consumer() {
        let root = workflow(vec![
            step_with_types(1, "a", Some("cart"), vec![], Some("Cart"), None),
            step_with_types(2, "b", None, vec!["cart"], None, Some("Order")),
        ]);
        let graph = build(&root);
        assert_eq!(graph.type_mismatches.len(), 1);
        assert_eq!(graph.type_mismatches[0].producer_type, "Cart");
        assert_eq!(graph.type_mismatches[0].consumer_type, "Order");
    }

    #[test]
    fn flags_undefined_reads() {
        let root = workflow(vec![step(1, "b", None, vec!["missing"])]);
        let graph = build(&root);
        assert_eq!(graph.undefined_reads, vec![("b".to_string(), "missing".to_string())]);
    }

    #[test]
    fn flags_duplicate_writes_with_both_writer_ids() {
        let root = workflow(vec![
            step(1, "a", Some("cart"), vec![]),
            step(2, "b", Some("cart"), vec![]),
        ]);
        let graph = build(&root);
        assert_eq!(
            graph.duplicate_writes,
            vec![("cart".to_string(), vec!["a".to_string(), "b".to_string()])]
        );
    }
}
