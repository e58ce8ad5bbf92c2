//! "plain" (i.e. cargo-style) output, rendered with `annotate-snippets`
//! the same way the teacher's `output/plain.rs` renders findings.

use annotate_snippets::{AnnotationKind, Group, Level, Renderer, Snippet};
use anstream::println;
use owo_colors::OwoColorize;

use crate::diagnostic::{Diagnostic, Severity};
use crate::registry::AnalysisRegistry;

impl From<Severity> for Level<'_> {
    fn from(sev: Severity) -> Self {
        match sev {
            Severity::Warning => Level::WARNING,
            Severity::Error => Level::ERROR,
        }
    }
}

fn render_diagnostic(source: &str, path: &str, diag: &Diagnostic) {
    let title = Level::from(diag.severity)
        .primary_title(diag.message.as_str())
        .id(diag.rule_id);

    let span = diag.location.start_byte..diag.location.end_byte;

    let snippet = Snippet::source(source)
        .fold(true)
        .line_start(1)
        .path(path)
        .annotation(AnnotationKind::Primary.span(span).label(diag.rule_id));

    let mut group = Group::with_title(title).element(snippet);
    if let Some(fix) = &diag.autofix {
        group = group.element(Level::HELP.message(fix.as_str()));
    }

    let renderer = Renderer::styled();
    println!("{}", renderer.render(&[group]));
}

/// Renders every diagnostic in `registry` against the source of the file
/// it was found in, then a one-line summary (§6).
pub(crate) fn render(registry: &AnalysisRegistry) {
    for entry in registry.iter() {
        for diag in &entry.diagnostics {
            render_diagnostic(entry.source.as_str(), entry.key.presentation_path(), diag);
            println!();
        }
    }

    let total = registry.total_diagnostics();
    if total == 0 {
        println!("{}", "No strict-mode diagnostics to report.".green());
    } else {
        println!(
            "{total} diagnostic{s} across {nfiles} file{fs}",
            total = total.to_string().yellow(),
            s = if total == 1 { "" } else { "s" },
            nfiles = registry.iter().count(),
            fs = if registry.iter().count() == 1 { "" } else { "s" },
        );
    }
}
