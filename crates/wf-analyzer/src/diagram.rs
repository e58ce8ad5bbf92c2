//! Diagram DSL lowering (§4.8).
//!
//! The IR is recursively lowered into a flat state machine: every node
//! contributes one or more states and transitions per a fixed schema
//! (`parallel` → fork + join, `race` → fork + winner-join, `loop` →
//! entry + body + exit with a back-edge, `decision` → decision state +
//! labeled edges). Renderers (`output/mermaid.rs`, `output/html.rs`)
//! consume this structure rather than walking the IR themselves.

use serde::Serialize;
use wf_ir::{ConditionalHelper, FlowNode, LoopType, ParallelMode, WorkflowNode};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) enum StateType {
    Initial,
    Step,
    Decision,
    Join,
    Terminal,
}

#[derive(Clone, Debug, Serialize)]
pub(crate) struct State {
    pub(crate) id: String,
    pub(crate) label: String,
    #[serde(rename = "type")]
    pub(crate) kind: StateType,
}

#[derive(Clone, Debug, Serialize)]
pub(crate) struct Transition {
    pub(crate) from_state_id: String,
    pub(crate) to_state_id: String,
    pub(crate) event: Option<String>,
    pub(crate) condition_label: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub(crate) struct Diagram {
    pub(crate) workflow_name: String,
    pub(crate) states: Vec<State>,
    pub(crate) transitions: Vec<Transition>,
    pub(crate) initial_state_id: String,
    pub(crate) terminal_state_ids: Vec<String>,
}

struct Lowering {
    states: Vec<State>,
    transitions: Vec<Transition>,
    counter: u32,
}

impl Lowering {
    fn next_id(&mut self, prefix: &str) -> String {
        self.counter += 1;
        format!("{prefix}_{n}", n = self.counter)
    }

    fn push_state(&mut self, id: impl Into<String>, label: impl Into<String>, kind: StateType) {
        self.states.push(State {
            id: id.into(),
            label: label.into(),
            kind,
        });
    }

    fn push_transition(&mut self, from: impl Into<String>, to: impl Into<String>, condition_label: Option<String>) {
        self.transitions.push(Transition {
            from_state_id: from.into(),
            to_state_id: to.into(),
            event: None,
            condition_label,
        });
    }

    /// Lowers a sequence of sibling nodes, chaining each one's exit state
    /// into the next's entry state. `entry_label`, when given, labels only
    /// the edge from `entry` into the sequence's first node (the branch
    /// edge of a decision/conditional/switch). Returns the final exit
    /// state id.
    fn lower_sequence(&mut self, nodes: &[FlowNode], entry: &str, entry_label: Option<&str>) -> String {
        let mut prev = entry.to_string();
        let mut label = entry_label.map(String::from);
        for node in nodes {
            prev = self.lower_node(node, &prev, label.take());
        }
        prev
    }

    /// Lowers one node, wiring an edge from `entry` (labeled `label` when
    /// given), and returns this node's exit state id (the point the next
    /// sibling should attach to).
    fn lower_node(&mut self, node: &FlowNode, entry: &str, label: Option<String>) -> String {
        match node {
            FlowNode::Step {
                id, step_id, key, name, ..
            } => {
                let state_id = key
                    .clone()
                    .unwrap_or_else(|| format!("step_{}", key_or_id(step_id, id.value())));
                self.push_state(&state_id, name.clone().unwrap_or_else(|| step_id.clone()), StateType::Step);
                self.push_transition(entry, &state_id, label);
                state_id
            }
            FlowNode::SagaStep { id, name, .. } => {
                let state_id = format!("step_{}", id.value());
                self.push_state(&state_id, name.clone().unwrap_or_else(|| "saga step".into()), StateType::Step);
                self.push_transition(entry, &state_id, label);
                state_id
            }
            FlowNode::Stream { id, stream_type, .. } => {
                let state_id = format!("step_{}", id.value());
                self.push_state(&state_id, stream_type.clone(), StateType::Step);
                self.push_transition(entry, &state_id, label);
                state_id
            }
            FlowNode::Sequence { children, .. } => self.lower_sequence(children, entry, label.as_deref()),
            FlowNode::Parallel { id, mode, children, name, .. } => {
                let fork_id = self.next_id("parallel_fork");
                let fork_label = match mode {
                    ParallelMode::All => "parallel",
                    ParallelMode::AllSettled => "parallel (settled)",
                };
                self.push_state(&fork_id, name.clone().unwrap_or_else(|| fork_label.into()), StateType::Join);
                self.push_transition(entry, &fork_id, label);

                let join_id = format!("parallel_join_{}", id.value());
                for child in children {
                    let exit = self.lower_node(child, &fork_id, None);
                    self.push_transition(exit, &join_id, None);
                }
                self.push_state(&join_id, "join", StateType::Join);
                join_id
            }
            FlowNode::Race { id, children, name, .. } => {
                let fork_id = self.next_id("race_fork");
                self.push_state(&fork_id, name.clone().unwrap_or_else(|| "race".into()), StateType::Join);
                self.push_transition(entry, &fork_id, label);

                let join_id = format!("race_join_{}", id.value());
                for child in children {
                    let exit = self.lower_node(child, &fork_id, None);
                    self.push_transition(exit, &join_id, None);
                }
                self.push_state(&join_id, "winner", StateType::Join);
                join_id
            }
            FlowNode::Conditional {
                id,
                condition,
                helper,
                consequent,
                alternate,
                ..
            } => {
                let decision_id = format!("decision_{}", id.value());
                self.push_state(&decision_id, helper_label(*helper, condition), StateType::Decision);
                self.push_transition(entry, &decision_id, label);

                let (then_label, else_label) = branch_labels(*helper);

                let join_id = self.next_id("decision_join");
                let then_exit = self.lower_sequence(consequent, &decision_id, Some(then_label));
                self.push_transition(then_exit, &join_id, None);

                if let Some(alt) = alternate {
                    let else_exit = self.lower_sequence(alt, &decision_id, Some(else_label));
                    self.push_transition(else_exit, &join_id, None);
                } else {
                    self.push_transition(&decision_id, &join_id, Some(else_label.to_string()));
                }

                self.push_state(&join_id, "join", StateType::Join);
                join_id
            }
            FlowNode::Decision {
                decision_id,
                condition_label,
                consequent,
                alternate,
                ..
            } => {
                let state_id = decision_id.clone();
                self.push_state(
                    &state_id,
                    condition_label.clone().unwrap_or_else(|| decision_id.clone()),
                    StateType::Decision,
                );
                self.push_transition(entry, &state_id, label);

                let join_id = self.next_id("decision_join");
                let then_exit = self.lower_sequence(consequent, &state_id, Some("then"));
                self.push_transition(then_exit, &join_id, None);

                if let Some(alt) = alternate {
                    let else_exit = self.lower_sequence(alt, &state_id, Some("else"));
                    self.push_transition(else_exit, &join_id, None);
                } else {
                    self.push_transition(&state_id, &join_id, Some("else".to_string()));
                }

                self.push_state(&join_id, "join", StateType::Join);
                join_id
            }
            FlowNode::Switch { id, expression, cases, .. } => {
                let decision_id = format!("switch_{}", id.value());
                self.push_state(&decision_id, expression.clone(), StateType::Decision);
                self.push_transition(entry, &decision_id, label);

                let join_id = self.next_id("decision_join");
                for case in cases {
                    let case_label = case
                        .value
                        .clone()
                        .unwrap_or_else(|| if case.is_default { "default".into() } else { "case".into() });
                    let exit = self.lower_sequence(&case.body, &decision_id, Some(&case_label));
                    self.push_transition(exit, &join_id, None);
                }
                self.push_state(&join_id, "join", StateType::Join);
                join_id
            }
            FlowNode::Loop { id, body, loop_type, .. } => {
                let start_id = format!("loop_start_{}", id.value());
                self.push_state(&start_id, loop_label(*loop_type), StateType::Decision);
                self.push_transition(entry, &start_id, label);

                let body_exit = self.lower_sequence(body, &start_id, None);
                self.push_transition(body_exit, &start_id, None);

                let end_id = format!("loop_end_{}", id.value());
                self.push_state(&end_id, "loop end", StateType::Join);
                self.push_transition(&start_id, &end_id, None);
                end_id
            }
            FlowNode::WorkflowRef { id, workflow_name, .. } => {
                let state_id = format!("workflow_ref_{}", id.value());
                self.push_state(&state_id, workflow_name.clone(), StateType::Step);
                self.push_transition(entry, &state_id, label);
                state_id
            }
            FlowNode::Unknown { id, reason, .. } => {
                let state_id = format!("unknown_{}", id.value());
                self.push_state(&state_id, reason.clone(), StateType::Step);
                self.push_transition(entry, &state_id, label);
                state_id
            }
        }
    }
}

fn key_or_id(step_id: &str, id: u32) -> String {
    if step_id == wf_ir::DYNAMIC {
        id.to_string()
    } else {
        step_id.to_string()
    }
}

fn helper_label(helper: ConditionalHelper, condition: &str) -> String {
    match helper {
        ConditionalHelper::None => condition.to_string(),
        ConditionalHelper::When => format!("when({condition})"),
        ConditionalHelper::Unless => format!("unless({condition})"),
        ConditionalHelper::WhenOr => format!("whenOr({condition})"),
        ConditionalHelper::UnlessOr => format!("unlessOr({condition})"),
    }
}

/// The (consequent, alternate) edge labels for a conditional's branches.
/// `unlessOr` negates its condition, so its edges are swapped relative to
/// every other helper (§4.3 "for unlessOr, edge labels are swapped at
/// render time").
fn branch_labels(helper: ConditionalHelper) -> (&'static str, &'static str) {
    match helper {
        ConditionalHelper::UnlessOr => ("else", "then"),
        _ => ("then", "else"),
    }
}

fn loop_label(loop_type: LoopType) -> &'static str {
    match loop_type {
        LoopType::For => "for",
        LoopType::ForOf => "for...of",
        LoopType::ForIn => "for...in",
        LoopType::While => "while",
        LoopType::StepForEach => "step.forEach",
    }
}

/// Lowers a workflow's IR into the diagram DSL (§4.8).
pub(crate) fn lower(root: &WorkflowNode) -> Diagram {
    let mut lowering = Lowering {
        states: vec![],
        transitions: vec![],
        counter: 0,
    };

    let initial_id = "initial".to_string();
    lowering.push_state(&initial_id, "start", StateType::Initial);

    let exit = lowering.lower_sequence(&root.children, &initial_id, None);

    let terminal_id = "terminal".to_string();
    lowering.push_state(&terminal_id, "end", StateType::Terminal);
    lowering.push_transition(exit, &terminal_id, None);

    Diagram {
        workflow_name: root.workflow_name.clone(),
        states: lowering.states,
        transitions: lowering.transitions,
        initial_state_id: initial_id,
        terminal_state_ids: vec![terminal_id],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wf_ir::{NodeId, Span};

    fn step(id: u32, step_id: &str) -> FlowNode {
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
    fn lowers_a_single_step_between_initial_and_terminal() {
        let root = WorkflowNode {
            workflow_name: "wf".into(),
            declared_errors: None,
            strict: false,
            dependencies: vec![],
            description: None,
            children: vec![step(1, "a")],
        };
        let diagram = lower(&root);
        assert_eq!(diagram.states.len(), 3); // initial, step, terminal
        assert_eq!(diagram.transitions.len(), 2);
        assert_eq!(diagram.initial_state_id, "initial");
        assert_eq!(diagram.terminal_state_ids, vec!["terminal".to_string()]);
    }

    #[test]
    fn conditional_branches_carry_then_else_labels() {
        let root = WorkflowNode {
            workflow_name: "wf".into(),
            declared_errors: None,
            strict: false,
            dependencies: vec![],
            description: None,
            children: vec![FlowNode::Conditional {
                id: NodeId::new(1),
                condition: "cart.total > 0".into(),
                helper: ConditionalHelper::When,
                consequent: vec![step(2, "a")],
                alternate: Some(vec![step(3, "b")]),
                default_value: None,
                location: Span::zero(),
            }],
        };
        let diagram = lower(&root);
        let labels: Vec<_> = diagram
            .transitions
            .iter()
            .filter_map(|t| t.condition_label.as_deref())
            .collect();
        assert!(labels.contains(&"then"));
        assert!(labels.contains(&"else"));
    }

    #[test]
    fn unless_or_swaps_branch_labels() {
        let root = WorkflowNode {
            workflow_name: "wf".into(),
            declared_errors: None,
            strict: false,
            dependencies: vec![],
            description: None,
            children: vec![FlowNode::Conditional {
                id: NodeId::new(1),
                condition: "cart.total > 0".into(),
                helper: ConditionalHelper::UnlessOr,
                consequent: vec![step(2, "a")],
                alternate: None,
                default_value: None,
                location: Span::zero(),
            }],
        };
        let diagram = lower(&root);
        // consequent runs when the (negated) condition is false, so it's
        // labeled "else"; the implicit fallthrough edge is labeled "then".
        let consequent_edge = diagram
            .transitions
            .iter()
            .find(|t| t.to_state_id == "step_a")
            .expect("edge into consequent");
        assert_eq!(consequent_edge.condition_label.as_deref(), Some("else"));
    }

    #[test]
    fn parallel_lowers_to_fork_and_join() {
        let root = WorkflowNode {
            workflow_name: "wf".into(),
            declared_errors: None,
            strict: false,
            dependencies: vec![],
            description: None,
            children: vec![FlowNode::Parallel {
                id: NodeId::new(1),
                mode: ParallelMode::All,
                name: None,
                children: vec![step(2, "a"), step(3, "b")],
                callee: "step.parallel".into(),
                location: Span::zero(),
            }],
        };
        let diagram = lower(&root);
        assert!(diagram.states.iter().any(|s| s.id.starts_with("parallel_fork")));
        assert!(diagram.states.iter().any(|s| s.id.starts_with("parallel_join")));
    }
}
