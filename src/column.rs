//! Columns and their type tags (§3 COL).

use crate::arena::{Id, WeakRef};
use crate::view::View;

/// Compile-time type tag for a column's runtime value domain.
///
/// Carries no representation or validation logic — this crate is a
/// middle-end that never materializes a runtime `Value`; the tag exists
/// so canonicalization rules can tell, e.g., a constant `Int64` column
/// from a constant `Utf8` column without reaching into a back-end.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Bytes,
    Ascii,
    Utf8,
    Uuid,
    /// A host/back-end type this crate does not interpret, identified by
    /// name only (e.g. a functor's opaque state handle).
    Opaque(String),
}

/// One value position produced by exactly one view (§3 COL).
///
/// `logical_id` is the column-equivalence id: two columns with the same
/// `logical_id` at the same program point are equal at runtime. During
/// building this is a union-find class id (§9); the finalizer (§4.8)
/// relabels it into the stable per-scope numbering external consumers
/// see.
#[derive(Debug, Clone)]
pub struct Column {
    /// The view that produces this column. Never null — every `Column`
    /// is allocated alongside its owning view.
    pub owner: Id<View>,
    pub logical_id: u32,
    /// Position within the owning view's output tuple.
    pub index: usize,
    /// Source-language variable this column was built from, if any (head
    /// variables and builder-internal columns may have none).
    pub source_var: Option<String>,
    pub ty: Type,
    /// When set, marks this column as a reference to a constant: the
    /// value is known statically even though this column's own view need
    /// not be the constant-producing SELECT. Weak because the constant
    /// producer may be proxied or replaced without this reference
    /// needing to observe it strongly (§3).
    pub constant_of: Option<WeakRef<View>>,
}

impl Column {
    pub fn new(owner: Id<View>, logical_id: u32, index: usize, ty: Type) -> Self {
        Column {
            owner,
            logical_id,
            index,
            source_var: None,
            ty,
            constant_of: None,
        }
    }

    pub fn with_source_var(mut self, var: impl Into<String>) -> Self {
        self.source_var = Some(var.into());
        self
    }

    pub fn is_constant(&self) -> bool {
        self.constant_of.is_some()
    }
}

/// A reference from one view's input/attached column list to a column
/// produced by some (possibly the same) view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnRef {
    pub view: Id<View>,
    pub index: usize,
}

impl ColumnRef {
    pub fn new(view: Id<View>, index: usize) -> Self {
        ColumnRef { view, index }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use crate::view::{Tuple, View, ViewKind};

    #[test]
    fn column_ref_identifies_output_position() {
        let mut views: Arena<View> = Arena::new();
        let owner = views.alloc(View::new_for_test(ViewKind::Tuple(Tuple)));
        let col_ref = ColumnRef::new(owner, 2);
        assert_eq!(col_ref.index, 2);
    }
}
