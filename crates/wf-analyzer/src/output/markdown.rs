//! Markdown renderer: a human-readable summary of one analyzed workflow,
//! its diagnostics, and an embedded Mermaid fence — the shape a repo's
//! generated docs or a PR comment would want, grounded on the teacher's
//! `Finding::to_markdown`/`Diagnostic::to_markdown` one-liner convention.

use std::fmt::Write as _;

use wf_ir::AnalysisResult;

use crate::diagnostic::Diagnostic;
use crate::diagram::Diagram;
use crate::output::mermaid::{self, Direction};

pub(crate) fn render(result: &AnalysisResult, diagram: &Diagram, diagnostics: &[Diagnostic]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {}", result.root.workflow_name);

    if let Some(desc) = &result.root.description {
        let _ = writeln!(out, "\n{desc}");
    }

    let _ = writeln!(
        out,
        "\n**{steps}** steps, **{conditionals}** conditionals, **{parallels}** parallel groups, **{races}** races, **{loops}** loops",
        steps = result.metadata.stats.total_steps,
        conditionals = result.metadata.stats.conditional_count,
        parallels = result.metadata.stats.parallel_count,
        races = result.metadata.stats.race_count,
        loops = result.metadata.stats.loop_count,
    );

    if !diagnostics.is_empty() {
        let _ = writeln!(out, "\n## Diagnostics\n");
        for diag in diagnostics {
            let _ = writeln!(out, "{}", diag.to_markdown());
        }
    }

    let _ = writeln!(out, "\n## Diagram\n");
    let _ = writeln!(out, "```mermaid");
    out.push_str(&mermaid::render(diagram, Direction::default()));
    let _ = writeln!(out, "```");

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use wf_ir::{Metadata, Stats, WorkflowNode};

    #[test]
    fn includes_workflow_name_and_stats() {
        let result = AnalysisResult {
            root: WorkflowNode {
                workflow_name: "checkout".into(),
                declared_errors: None,
                strict: false,
                dependencies: vec![],
                description: Some("does the thing".into()),
                children: vec![],
            },
            metadata: Metadata {
                file_path: "wf.ts".into(),
                analyzed_at: 0,
                warnings: vec![],
                stats: Stats {
                    total_steps: 2,
                    ..Default::default()
                },
            },
            references: Default::default(),
        };
        let diagram = crate::diagram::lower(&result.root);
        let md = render(&result, &diagram, &[]);
        assert!(md.contains("# checkout"));
        assert!(md.contains("does the thing"));
        assert!(md.contains("**2** steps"));
        assert!(md.contains("```mermaid"));
    }
}
