//! Runtime state threaded through a single analysis run.
//!
//! Grounded on zizmor's `AuditState` (`state.rs`), which holds the one
//! piece of state every audit needs a handle to (an optional GitHub API
//! client) rather than threading it through every function signature.
//! Here the equivalent shared resource is an optional type checker
//! (§4.4, §4.1 "Checker coupling").

use wf_syntax::TypeChecker;

pub(crate) struct AnalyzerState {
    /// A bound semantic checker, if one was resolved from a `tsconfig`.
    /// `None` means the enricher runs in degraded mode: every type field
    /// in the IR stays `None` rather than being guessed at.
    pub(crate) checker: Option<Box<dyn TypeChecker + Send + Sync>>,
}

impl AnalyzerState {
    pub(crate) fn new(checker: Option<Box<dyn TypeChecker + Send + Sync>>) -> Self {
        Self { checker }
    }
}

impl Default for AnalyzerState {
    fn default() -> Self {
        Self { checker: None }
    }
}
