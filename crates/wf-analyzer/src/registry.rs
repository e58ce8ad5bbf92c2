//! Aggregates analysis results and diagnostics across every discovered
//! input file, and derives the process exit code from them (§6).
//!
//! There's no pluggable-rule registry here the way zizmor's
//! `AuditRegistry` has one: the strict-mode rule set is fixed (§4.7), so
//! there's nothing to register at runtime. What zizmor's `FindingRegistry`
//! modeled as severity/confidence/persona filtering over a dynamic rule
//! set, we model as a flat accumulation of diagnostics plus a
//! warnings-as-errors toggle.

use std::process::ExitCode;

use wf_ir::AnalysisResult;

use crate::diagnostic::{Diagnostic, Severity};
use crate::registry::input::InputKey;

pub(crate) mod input;

pub(crate) struct AnalysisEntry {
    pub(crate) key: InputKey,
    pub(crate) source: String,
    pub(crate) result: AnalysisResult,
    pub(crate) diagnostics: Vec<Diagnostic>,
}

/// Every analyzed workflow from the current run, in discovery order.
#[derive(Default)]
pub(crate) struct AnalysisRegistry {
    entries: Vec<AnalysisEntry>,
}

impl AnalysisRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(
        &mut self,
        key: InputKey,
        source: String,
        result: AnalysisResult,
        diagnostics: Vec<Diagnostic>,
    ) {
        self.entries.push(AnalysisEntry {
            key,
            source,
            result,
            diagnostics,
        });
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &AnalysisEntry> {
        self.entries.iter()
    }

    pub(crate) fn total_diagnostics(&self) -> usize {
        self.entries.iter().map(|e| e.diagnostics.len()).sum()
    }

    /// §6: exit 0 on success, 1 if there were no workflows, a fatal
    /// error, or (with `warnings_as_errors`) any diagnostic at all.
    pub(crate) fn exit_code(&self, warnings_as_errors: bool) -> ExitCode {
        if self.is_empty() {
            return ExitCode::FAILURE;
        }

        let has_error = self.entries.iter().any(|e| {
            e.diagnostics.iter().any(|d| {
                matches!(d.severity, Severity::Error) || (warnings_as_errors && matches!(d.severity, Severity::Warning))
            })
        });

        if has_error {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        }
    }
}
