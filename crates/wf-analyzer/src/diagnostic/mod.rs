//! Strict-mode diagnostics (§4.7, §6).
//!
//! Grounded on zizmor's `Finding`/`Severity`/`Comment` (`finding/mod.rs`):
//! the same severity/location/autofix shape and the same inline-ignore
//! comment convention, reduced to what this analyzer actually needs.
//! There's no `Persona`/`Confidence`/symbolic-route machinery here: a
//! diagnostic's location is always a concrete [`wf_ir::Span`] already,
//! since tree-sitter gives byte-accurate spans directly (no YAML-query
//! indirection layer to resolve).

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use wf_ir::Span;

pub(crate) mod rules;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) enum Severity {
    #[default]
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// One strict-mode rule violation (§4.7).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct Diagnostic {
    pub(crate) rule_id: &'static str,
    pub(crate) message: String,
    pub(crate) severity: Severity,
    pub(crate) location: Span,
    pub(crate) autofix: Option<String>,
}

impl Diagnostic {
    pub(crate) fn new(rule_id: &'static str, message: impl Into<String>, location: Span) -> Self {
        Self {
            rule_id,
            message: message.into(),
            severity: Severity::Warning,
            location,
            autofix: None,
        }
    }

    pub(crate) fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub(crate) fn with_autofix(mut self, autofix: impl Into<String>) -> Self {
        self.autofix = Some(autofix.into());
        self
    }

    pub(crate) fn to_markdown(&self) -> String {
        format!(
            "- **{severity}** `{rule}` ({line}:{col}): {message}",
            severity = self.severity,
            rule = self.rule_id,
            line = self.location.start_point.line,
            col = self.location.start_point.column,
            message = self.message,
        )
    }
}

/// `// wf-analyzer: ignore[rule-id]`, matching one or more comma
/// separated rule ids with an optional trailing justification.
static IGNORE_EXPR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"//\s*wf-analyzer:\s*ignore\[(.+)\](?:\s+.*)?$").unwrap());

pub(crate) struct Comment<'a>(pub(crate) &'a str);

impl<'a> Comment<'a> {
    /// The rule ids this comment suppresses, if any.
    pub(crate) fn ignores(&self) -> Vec<&'a str> {
        match IGNORE_EXPR.captures(self.0) {
            Some(caps) => caps
                .get(1)
                .map(|m| m.as_str().split(',').map(str::trim).collect())
                .unwrap_or_default(),
            None => vec![],
        }
    }
}

/// Drops diagnostics whose line carries a matching `wf-analyzer: ignore`
/// comment (§4.7, "Suppression").
pub(crate) fn filter_suppressed(source: &str, diagnostics: Vec<Diagnostic>) -> Vec<Diagnostic> {
    let lines: Vec<&str> = source.lines().collect();

    diagnostics
        .into_iter()
        .filter(|d| {
            let line_idx = d.location.start_point.line.saturating_sub(1);
            let Some(line) = lines.get(line_idx) else {
                return true;
            };
            let ignored = Comment(line).ignores();
            ignored.is_empty() || !ignored.iter().any(|r| *r == d.rule_id || *r == "*")
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diag_at(rule_id: &'static str, line: usize) -> Diagnostic {
        Diagnostic::new(
            rule_id,
            "test",
            Span {
                start_byte: 0,
                end_byte: 0,
                start_point: wf_ir::Point { line, column: 0 },
                end_point: wf_ir::Point { line, column: 0 },
            },
        )
    }

    #[test]
    fn comment_ignores_single_rule() {
        let c = Comment("step('a', fn); // wf-analyzer: ignore[missing-errors]");
        assert_eq!(c.ignores(), vec!["missing-errors"]);
    }

    #[test]
    fn comment_ignores_multiple_rules_with_justification() {
        let c =
            Comment("// wf-analyzer: ignore[missing-errors, missing-step-id] deliberately untyped");
        assert_eq!(c.ignores(), vec!["missing-errors", "missing-step-id"]);
    }

    #[test]
    fn comment_without_ignore_expr_ignores_nothing() {
        let c = Comment("// just a plain comment");
        assert!(c.ignores().is_empty());
    }

    #[test]
    fn filter_suppressed_drops_matching_line() {
        let source = "step('a', fn); // wf-analyzer: ignore[missing-errors]\nstep('b', fn);\n";
        let diags = vec![diag_at("missing-errors", 1), diag_at("missing-errors", 2)];
        let kept = filter_suppressed(source, diags);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].location.start_point.line, 2);
    }
}
