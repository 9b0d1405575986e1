//! Error and diagnostic types (§7).
//!
//! The compiler distinguishes three error kinds: structural source errors,
//! semantic errors, and internal inconsistencies. The first two are
//! accumulated as [`Diagnostic`] values and do not stop compilation; the
//! third ([`CoreError::Internal`]) denotes an invariant violation and aborts
//! the pass that discovered it.

use thiserror::Error;

/// A single accumulated diagnostic: a message plus free-form notes.
///
/// Mirrors §6's `(display-range, message, notes)` contract minus the
/// display-range, which belongs to the (out of scope) source-text layer;
/// callers that have a range available can carry it alongside the
/// `Diagnostic` in their own bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
    pub notes: Vec<String>,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>) -> Self {
        Diagnostic {
            message: message.into(),
            notes: Vec::new(),
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_notes(mut self, notes: impl IntoIterator<Item = String>) -> Self {
        self.notes.extend(notes);
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        for note in &self.notes {
            write!(f, "\n  note: {note}")?;
        }
        Ok(())
    }
}

/// Accumulates diagnostics across a compilation run without aborting it.
///
/// Per §7: "errors are accumulated; the compiler continues until a pass
/// would require assuming well-formed input."
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }

    pub fn report(&mut self, message: impl Into<String>) {
        self.push(Diagnostic::new(message));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }
}

/// Top-level compiler error.
///
/// `Structural` and `Semantic` correspond to §7 kinds 1-2 and are normally
/// folded into a [`Diagnostics`] sink by callers rather than propagated as
/// `Err`; they exist as an enum variant so a caller that wants fail-fast
/// behavior (e.g. a single-clause test) can still use `?`. `Internal`
/// corresponds to kind 3 and always aborts: compilation returns no
/// finalized output once one is raised (§7).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Unrecognized predicate kind, unsafe (non range-restricted) variable,
    /// missing column for a variable, or an unsupported negated predicate.
    #[error("structural error: {0}")]
    Structural(Diagnostic),

    /// Trivially unsatisfiable comparisons, conflicting summary/aggregate
    /// use of a variable, a message with both receives and transmits,
    /// differential-flag/declaration mismatches, or non-linearizable
    /// induction without `@divergent`.
    #[error("semantic error: {0}")]
    Semantic(Diagnostic),

    /// An invariant documented in §3/§5/§8 was violated. Always a compiler
    /// bug, never a user-facing condition; the offending view's id is
    /// carried so `Dfg::dump` can tag it.
    #[error("internal invariant violation on view {view_id}: {0}", view_id = .1)]
    Internal(Diagnostic, u32),
}

impl CoreError {
    pub fn structural(message: impl Into<String>) -> Self {
        CoreError::Structural(Diagnostic::new(message))
    }

    pub fn semantic(message: impl Into<String>) -> Self {
        CoreError::Semantic(Diagnostic::new(message))
    }

    pub fn internal(message: impl Into<String>, view_id: u32) -> Self {
        CoreError::Internal(Diagnostic::new(message), view_id)
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, CoreError::Internal(..))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_accumulate_without_aborting() {
        let mut diags = Diagnostics::new();
        diags.report("first");
        diags.push(Diagnostic::new("second").with_note("because x"));
        assert_eq!(diags.len(), 2);
        assert!(!diags.is_empty());
    }

    #[test]
    fn internal_error_carries_view_id() {
        let err = CoreError::internal("dangling input column", 7);
        assert!(err.is_internal());
        assert!(format!("{err}").contains('7'));
    }
}
