//! Mermaid renderer (§4.8, §6 "Mermaid text").
//!
//! A two-pass renderer: nodes first, then edges, then class-def styles,
//! matching the spec's description of the canonical Mermaid shape. Label
//! text is HTML-escaped per §6 so Mermaid doesn't choke on `<>|#"{}[]`.

use std::fmt::Write as _;

use clap::ValueEnum;

use crate::diagram::{Diagram, StateType};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default, ValueEnum)]
pub(crate) enum Direction {
    #[default]
    #[value(name = "TB")]
    Tb,
    #[value(name = "LR")]
    Lr,
    #[value(name = "BT")]
    Bt,
    #[value(name = "RL")]
    Rl,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Direction::Tb => "TB",
            Direction::Lr => "LR",
            Direction::Bt => "BT",
            Direction::Rl => "RL",
        }
    }
}

/// Escapes characters that would otherwise break Mermaid's label parser
/// (§6: `<>`, `|`, `#`, quotes, brackets, braces; newlines become `\n`).
fn escape_label(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for ch in label.chars() {
        match ch {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '|' => out.push_str("&#124;"),
            '#' => out.push_str("&#35;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '[' => out.push_str("&#91;"),
            ']' => out.push_str("&#93;"),
            '{' => out.push_str("&#123;"),
            '}' => out.push_str("&#125;"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out
}

fn node_shape(id: &str, label: &str, kind: StateType) -> String {
    let label = escape_label(label);
    match kind {
        StateType::Initial | StateType::Terminal => format!("{id}(({label}))"),
        StateType::Decision => format!("{id}{{{label}}}"),
        StateType::Join => format!("{id}{{{{{label}}}}}"),
        StateType::Step => format!("{id}[{label}]"),
    }
}

/// Renders `diagram` as a `flowchart` definition.
pub(crate) fn render(diagram: &Diagram, direction: Direction) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "flowchart {dir}", dir = direction.as_str());

    for state in &diagram.states {
        let _ = writeln!(out, "    {}", node_shape(&state.id, &state.label, state.kind));
    }

    for transition in &diagram.transitions {
        match (&transition.event, &transition.condition_label) {
            (_, Some(label)) => {
                let _ = writeln!(
                    out,
                    "    {from} -->|{label}| {to}",
                    from = transition.from_state_id,
                    to = transition.to_state_id,
                    label = escape_label(label),
                );
            }
            (Some(event), None) => {
                let _ = writeln!(
                    out,
                    "    {from} -->|{event}| {to}",
                    from = transition.from_state_id,
                    to = transition.to_state_id,
                    event = escape_label(event),
                );
            }
            (None, None) => {
                let _ = writeln!(
                    out,
                    "    {from} --> {to}",
                    from = transition.from_state_id,
                    to = transition.to_state_id,
                );
            }
        }
    }

    out.push_str("    classDef initial fill:#2d6,stroke:#141;\n");
    out.push_str("    classDef terminal fill:#d62,stroke:#411;\n");
    out.push_str("    classDef decision fill:#fc5,stroke:#741;\n");
    out.push_str("    classDef join fill:#9cf,stroke:#146;\n");

    for (class, kind) in [
        ("initial", StateType::Initial),
        ("terminal", StateType::Terminal),
        ("decision", StateType::Decision),
        ("join", StateType::Join),
    ] {
        let ids: Vec<&str> = diagram
            .states
            .iter()
            .filter(|s| s.kind == kind)
            .map(|s| s.id.as_str())
            .collect();
        if !ids.is_empty() {
            let _ = writeln!(out, "    class {} {class}", ids.join(","));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagram::{State, Transition};

    #[test]
    fn escapes_angle_brackets_and_pipes() {
        assert_eq!(escape_label("a<b>c|d#e"), "a&lt;b&gt;c&#124;d&#35;e");
    }

    #[test]
    fn renders_header_with_direction() {
        let diagram = Diagram {
            workflow_name: "wf".into(),
            states: vec![State {
                id: "initial".into(),
                label: "start".into(),
                kind: StateType::Initial,
            }],
            transitions: vec![],
            initial_state_id: "initial".into(),
            terminal_state_ids: vec![],
        };
        let text = render(&diagram, Direction::Lr);
        assert!(text.starts_with("flowchart LR\n"));
    }

    #[test]
    fn renders_an_edge() {
        let diagram = Diagram {
            workflow_name: "wf".into(),
            states: vec![],
            transitions: vec![Transition {
                from_state_id: "a".into(),
                to_state_id: "b".into(),
                event: None,
                condition_label: None,
            }],
            initial_state_id: "a".into(),
            terminal_state_ids: vec!["b".into()],
        };
        let text = render(&diagram, Direction::Tb);
        assert!(text.contains("a --> b"));
    }
}
