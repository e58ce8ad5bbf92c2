//! JSON output format (§6 "JSON output").
//!
//! The IR is serialized straightforwardly; multi-workflow output wraps
//! each workflow's result together with the source file path, matching
//! the teacher's `output/json/v1.rs` wrap-then-serialize shape.

use std::io;

use serde::Serialize;
use wf_ir::AnalysisResult;

use crate::diagnostic::Diagnostic;
use crate::registry::AnalysisRegistry;

#[derive(Serialize)]
struct FileOutput<'a> {
    file: &'a str,
    result: &'a AnalysisResult,
    diagnostics: &'a [Diagnostic],
}

pub(crate) fn output(
    sink: impl io::Write,
    registry: &AnalysisRegistry,
    pretty: bool,
) -> anyhow::Result<()> {
    let payload: Vec<FileOutput> = registry
        .iter()
        .map(|entry| FileOutput {
            file: entry.key.presentation_path(),
            result: &entry.result,
            diagnostics: &entry.diagnostics,
        })
        .collect();

    if pretty {
        serde_json::to_writer_pretty(sink, &payload)?;
    } else {
        serde_json::to_writer(sink, &payload)?;
    }
    Ok(())
}
