//! Interactive HTML renderer (§6 "Interactive HTML").
//!
//! A single self-contained document: Mermaid loaded from a CDN, the
//! rendered flowchart, and a `WORKFLOW_DATA` JSON blob so a click handler
//! can look up the IR node behind whatever `mermaidId` was clicked. No
//! build step, no bundler — matching the teacher's SARIF/HTML outputs
//! that are emitted as one independent file.

use serde::Serialize;
use wf_ir::AnalysisResult;

use crate::diagram::Diagram;
use crate::output::mermaid::{self, Direction};

#[derive(Serialize)]
struct WorkflowData<'a> {
    result: &'a AnalysisResult,
    diagram: &'a Diagram,
}

/// Renders a standalone HTML document for a single analyzed workflow.
pub(crate) fn render(result: &AnalysisResult, diagram: &Diagram) -> anyhow::Result<String> {
    let mermaid_source = mermaid::render(diagram, Direction::Tb);
    let data = WorkflowData { result, diagram };
    let data_json = serde_json::to_string(&data)?;

    Ok(format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{title}</title>
<script type="module">
  import mermaid from "https://cdn.jsdelivr.net/npm/mermaid@11/dist/mermaid.esm.min.mjs";
  mermaid.initialize({{ startOnLoad: true, securityLevel: "loose" }});
  window.WORKFLOW_DATA = {data_json};
  window.addEventListener("click", (event) => {{
    const target = event.target.closest("[id]");
    if (!target) return;
    const node = document.getElementById("diagram-output");
    if (!node || !node.contains(target)) return;
    const id = target.id.replace(/^flowchart-/, "").replace(/-\d+$/, "");
    const match = window.WORKFLOW_DATA.diagram.states.find((s) => s.id === id);
    if (match) {{
      console.log("workflow node", id, match);
    }}
  }});
</script>
<style>
  body {{ font-family: system-ui, sans-serif; margin: 2rem; }}
  h1 {{ font-size: 1.25rem; }}
  #diagram-output {{ border: 1px solid #ccc; padding: 1rem; }}
</style>
</head>
<body>
<h1>{title}</h1>
<div id="diagram-output" class="mermaid">
{mermaid_source}</div>
</body>
</html>
"##,
        title = html_escape(&result.root.workflow_name),
    ))
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use wf_ir::{Metadata, WorkflowNode};

    #[test]
    fn embeds_workflow_data_and_mermaid_source() {
        let result = AnalysisResult {
            root: WorkflowNode {
                workflow_name: "checkout".into(),
                declared_errors: None,
                strict: false,
                dependencies: vec![],
                description: None,
                children: vec![],
            },
            metadata: Metadata::default(),
            references: Default::default(),
        };
        let diagram = crate::diagram::lower(&result.root);
        let html = render(&result, &diagram).unwrap();
        assert!(html.contains("WORKFLOW_DATA"));
        assert!(html.contains("flowchart TB"));
        assert!(html.contains("checkout"));
    }

    #[test]
    fn escapes_workflow_name_in_title() {
        assert_eq!(html_escape("a<b>&c"), "a&lt;b&gt;&amp;c");
    }
}
