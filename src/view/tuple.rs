//! TUPLE: pure column rearrangement/forwarding (§3, §4.3).
//!
//! Carries no kind-specific fields: a tuple's behavior is fully described
//! by its shared `input_columns` (the forwarding order) on the view
//! header. Kept as a distinct unit struct rather than folded into
//! `ViewKind::Select` so canonicalization and CSE can match on `Tuple`
//! without a source-kind discriminant.

#[derive(Debug, Clone, Default)]
pub struct Tuple;
