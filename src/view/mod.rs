//! The view sum type and its shared header (§3, §9 "dynamic dispatch").
//!
//! Every view kind gets its own module with a small struct holding only
//! the fields specific to that kind; fields common to every view
//! (columns, conditions, liveness flags, group ids, cached hash/depth)
//! live once on [`ViewHeader`]. `View::kind` dispatches on a tagged
//! variant rather than a trait object, per §9 — `canonicalize` and
//! `equals` match on it directly instead of going through
//! `AsTuple`/`AsJoin`-style downcasts.

pub mod aggregate;
pub mod compare;
pub mod join;
pub mod kvindex;
pub mod map;
pub mod merge;
pub mod negate;
pub mod select;
pub mod tuple;

pub mod insert;

pub use aggregate::Aggregate;
pub use compare::{Compare, CompareOp};
pub use insert::{Insert, InsertTarget};
pub use join::{Join, JoinOutputSource};
pub use kvindex::{KvIndex, ValueColumn};
pub use map::{FunctorRange, FunctorRef, Map, ParamBinding};
pub use merge::Merge;
pub use negate::Negate;
pub use select::{Select, SelectSource};
pub use tuple::Tuple;

use crate::arena::{Id, UseList};
use crate::column::{Column, ColumnRef};
use crate::condition::Condition;

/// Identifies which slot of a user view an incoming use occupies, so
/// `Dfg::replace_all_uses_with` (§9) can patch it without the caller
/// needing kind-specific knowledge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UseSite {
    InputColumn(usize),
    AttachedColumn(usize),
    JoinedView(usize),
    MergedView(usize),
    NegatedView,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UseEdge {
    pub user: Id<View>,
    pub site: UseSite,
}

/// Fields shared by every view kind (§3 VIEW).
#[derive(Debug, Clone)]
pub struct ViewHeader {
    pub columns: Vec<Column>,
    pub input_columns: Vec<ColumnRef>,
    pub attached_columns: Vec<ColumnRef>,
    pub positive_conditions: Vec<Id<Condition>>,
    pub negative_conditions: Vec<Id<Condition>>,
    pub sets_condition: Option<Id<Condition>>,

    pub can_receive_deletions: bool,
    pub can_produce_deletions: bool,
    pub is_dead: bool,
    pub is_canonical: bool,
    pub is_unsat: bool,
    pub is_used_by_merge: bool,
    pub is_used_by_join: bool,
    pub is_used_by_negation: bool,

    /// Multiset of group ids transitively propagated down from owning
    /// JOIN/AGG nodes (§4.2); stored sorted so `group_ids_overlap` can do
    /// a linear merge instead of an allocation-heavy intersection.
    pub group_ids: Vec<u32>,

    cached_hash: Option<u64>,
    cached_depth: Option<u32>,

    /// Incoming uses of this view, keyed by who uses it and in which
    /// slot. Column-level consumers (`InputColumn`/`AttachedColumn`) and
    /// view-level consumers (`JoinedView`/`MergedView`/`NegatedView`)
    /// share one list so `ReplaceAllUsesWith` only has to walk one
    /// structure (§9).
    pub uses: UseList<UseEdge>,
}

impl ViewHeader {
    pub fn new() -> Self {
        ViewHeader {
            columns: Vec::new(),
            input_columns: Vec::new(),
            attached_columns: Vec::new(),
            positive_conditions: Vec::new(),
            negative_conditions: Vec::new(),
            sets_condition: None,
            can_receive_deletions: false,
            can_produce_deletions: false,
            is_dead: false,
            is_canonical: false,
            is_unsat: false,
            is_used_by_merge: false,
            is_used_by_join: false,
            is_used_by_negation: false,
            group_ids: Vec::new(),
            cached_hash: None,
            cached_depth: None,
            uses: UseList::new(),
        }
    }

    /// Invalidates cached hash/depth, per §5's `Update` propagation: any
    /// mutation that drops a strong reference must invalidate these on
    /// the affected node (callers are responsible for propagating to
    /// transitive users, which `Dfg::invalidate` does).
    pub fn invalidate(&mut self) {
        self.cached_hash = None;
        self.cached_depth = None;
    }

    pub fn cached_hash(&self) -> Option<u64> {
        self.cached_hash
    }

    pub fn set_cached_hash(&mut self, hash: u64) {
        self.cached_hash = Some(hash);
    }

    pub fn cached_depth(&self) -> Option<u32> {
        self.cached_depth
    }

    pub fn set_cached_depth(&mut self, depth: u32) {
        self.cached_depth = Some(depth);
    }

    pub fn is_live(&self) -> bool {
        !self.is_dead
    }

    pub fn arity(&self) -> usize {
        self.columns.len()
    }

    /// §4.2: two otherwise-identical SELs from different clause bodies
    /// must not be merged if their group-id multisets overlap.
    pub fn group_ids_overlap(&self, other: &ViewHeader) -> bool {
        self.group_ids.iter().any(|g| other.group_ids.contains(g))
    }

    pub fn add_group_id(&mut self, group_id: u32) {
        self.group_ids.push(group_id);
        self.group_ids.sort_unstable();
    }
}

impl Default for ViewHeader {
    fn default() -> Self {
        ViewHeader::new()
    }
}

/// The per-kind payload of a view (§3 "View kinds").
#[derive(Debug, Clone)]
pub enum ViewKind {
    Select(Select),
    Tuple(Tuple),
    Join(Join),
    Merge(Merge),
    Compare(Compare),
    Map(Map),
    Aggregate(Aggregate),
    KvIndex(KvIndex),
    Negate(Negate),
    Insert(Insert),
}

impl ViewKind {
    pub fn name(&self) -> &'static str {
        match self {
            ViewKind::Select(_) => "SELECT",
            ViewKind::Tuple(_) => "TUPLE",
            ViewKind::Join(_) => "JOIN",
            ViewKind::Merge(_) => "MERGE",
            ViewKind::Compare(_) => "COMPARE",
            ViewKind::Map(_) => "MAP",
            ViewKind::Aggregate(_) => "AGGREGATE",
            ViewKind::KvIndex(_) => "KVINDEX",
            ViewKind::Negate(_) => "NEGATE",
            ViewKind::Insert(_) => "INSERT",
        }
    }
}

#[derive(Debug, Clone)]
pub struct View {
    pub header: ViewHeader,
    pub kind: ViewKind,
}

impl View {
    pub fn new(kind: ViewKind) -> Self {
        View {
            header: ViewHeader::new(),
            kind,
        }
    }

    pub fn is_live(&self) -> bool {
        self.header.is_live()
    }

    pub fn mark_dead(&mut self) {
        self.header.is_dead = true;
    }

    pub fn as_join(&self) -> Option<&Join> {
        match &self.kind {
            ViewKind::Join(j) => Some(j),
            _ => None,
        }
    }

    pub fn as_join_mut(&mut self) -> Option<&mut Join> {
        match &mut self.kind {
            ViewKind::Join(j) => Some(j),
            _ => None,
        }
    }

    pub fn as_merge(&self) -> Option<&Merge> {
        match &self.kind {
            ViewKind::Merge(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_merge_mut(&mut self) -> Option<&mut Merge> {
        match &mut self.kind {
            ViewKind::Merge(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_negate(&self) -> Option<&Negate> {
        match &self.kind {
            ViewKind::Negate(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_select(&self) -> Option<&Select> {
        match &self.kind {
            ViewKind::Select(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_insert(&self) -> Option<&Insert> {
        match &self.kind {
            ViewKind::Insert(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&Tuple> {
        match &self.kind {
            ViewKind::Tuple(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_compare(&self) -> Option<&Compare> {
        match &self.kind {
            ViewKind::Compare(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_aggregate(&self) -> Option<&Aggregate> {
        match &self.kind {
            ViewKind::Aggregate(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_kvindex(&self) -> Option<&KvIndex> {
        match &self.kind {
            ViewKind::KvIndex(k) => Some(k),
            _ => None,
        }
    }

    /// Direct view-level references this view holds onto (§9: needed
    /// alongside column-level uses so `ReplaceAllUsesWith` can patch
    /// `merged_views`/`joined_views`/`negated_view` too).
    pub fn referenced_views(&self) -> Vec<Id<View>> {
        match &self.kind {
            ViewKind::Join(j) => j.joined_views.clone(),
            ViewKind::Merge(m) => m.merged_views.clone(),
            ViewKind::Negate(n) => vec![n.negated_view],
            _ => Vec::new(),
        }
    }

    /// Builds a bare view for unit tests in sibling modules that only
    /// need a valid `Id<View>` to hang a `ColumnRef`/`Condition` off of.
    pub fn new_for_test(kind: ViewKind) -> Self {
        View::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_ids_overlap_detects_shared_tags() {
        let mut a = ViewHeader::new();
        let mut b = ViewHeader::new();
        a.add_group_id(1);
        a.add_group_id(2);
        b.add_group_id(2);
        b.add_group_id(3);
        assert!(a.group_ids_overlap(&b));

        let mut c = ViewHeader::new();
        c.add_group_id(9);
        assert!(!a.group_ids_overlap(&c));
    }

    #[test]
    fn marking_dead_flips_is_live() {
        let mut view = View::new(ViewKind::Tuple(Tuple));
        assert!(view.is_live());
        view.mark_dead();
        assert!(!view.is_live());
    }
}
