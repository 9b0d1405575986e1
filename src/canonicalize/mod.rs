//! Canonicalizer (§4.3): per-view-kind rewrites that put each operator
//! into a unique normal form, propagate constants, drop unused columns,
//! and detect unsatisfiable paths. Run to fixpoint alongside CSE and
//! dead-flow elimination (§2 stage 4).

pub mod aggregate;
pub mod compare;
pub mod insert;
pub mod join;
pub mod kvindex;
pub mod merge;
pub mod negate;
pub mod tuple;

use crate::arena::Id;
use crate::column::{Column, ColumnRef};
use crate::dfg::Dfg;
use crate::relation::Constant;
use crate::view::{SelectSource, Tuple, UseSite, View, ViewKind};

/// Runs every live view's kind-specific canonicalization once per pass,
/// in depth order (predecessors first, §5), until a pass makes no change
/// or `max_iterations` passes have run. Returns the number of passes
/// actually run.
pub fn run_to_fixpoint(dfg: &mut Dfg, max_iterations: u32) -> u32 {
    let mut iterations = 0;
    loop {
        if iterations >= max_iterations {
            break;
        }
        iterations += 1;

        let mut ids: Vec<Id<View>> = dfg.views.ids().collect();
        ids.sort_by_key(|&id| dfg.depth(id));

        let mut changed = false;
        for id in ids {
            if canonicalize_view(dfg, id) {
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    iterations
}

/// One kind-dispatched canonicalization step on a single view (§4.3(a):
/// "check validity and liveness" is folded into the `is_live` guard
/// every per-kind function starts with).
pub fn canonicalize_view(dfg: &mut Dfg, id: Id<View>) -> bool {
    if !dfg.views[id].is_live() {
        return false;
    }
    match kind_tag(dfg, id) {
        KindTag::Select | KindTag::Map => false,
        KindTag::Tuple => tuple::canonicalize(dfg, id),
        KindTag::Join => join::canonicalize(dfg, id),
        KindTag::Merge => merge::canonicalize(dfg, id),
        KindTag::Compare => compare::canonicalize(dfg, id),
        KindTag::Aggregate => aggregate::canonicalize(dfg, id),
        KindTag::KvIndex => kvindex::canonicalize(dfg, id),
        KindTag::Negate => negate::canonicalize(dfg, id),
        KindTag::Insert => insert::canonicalize(dfg, id),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KindTag {
    Select,
    Tuple,
    Join,
    Merge,
    Compare,
    Map,
    Aggregate,
    KvIndex,
    Negate,
    Insert,
}

fn kind_tag(dfg: &Dfg, id: Id<View>) -> KindTag {
    match &dfg.views[id].kind {
        ViewKind::Select(_) => KindTag::Select,
        ViewKind::Tuple(_) => KindTag::Tuple,
        ViewKind::Join(_) => KindTag::Join,
        ViewKind::Merge(_) => KindTag::Merge,
        ViewKind::Compare(_) => KindTag::Compare,
        ViewKind::Map(_) => KindTag::Map,
        ViewKind::Aggregate(_) => KindTag::Aggregate,
        ViewKind::KvIndex(_) => KindTag::KvIndex,
        ViewKind::Negate(_) => KindTag::Negate,
        ViewKind::Insert(_) => KindTag::Insert,
    }
}

/// True if output column `index` of `view` is read by any recorded use
/// (§4.3(c): "marks the output unused if no consumer uses it").
pub(crate) fn is_output_used(dfg: &Dfg, view: Id<View>, index: usize) -> bool {
    dfg.views[view].header.uses.iter().any(|edge| match edge.site {
        UseSite::InputColumn(slot) => dfg.views[edge.user].header.input_columns.get(slot).map(|c| c.index) == Some(index),
        UseSite::AttachedColumn(slot) => {
            dfg.views[edge.user].header.attached_columns.get(slot).map(|c| c.index) == Some(index)
        }
        UseSite::JoinedView(_) | UseSite::MergedView(_) | UseSite::NegatedView => true,
    })
}

/// Resolves `col` to a known constant, either because it is itself a
/// column of a `SelectSource::Constant` SELECT, or because it carries a
/// `constant_of` weak reference to one (§3 COL).
pub(crate) fn constant_value(dfg: &Dfg, col: ColumnRef) -> Option<Constant> {
    let column = &dfg.views[col.view].header.columns[col.index];
    if let Some(const_ref) = &column.constant_of {
        if let Some(sel) = dfg.views[const_ref.id()].as_select() {
            if let SelectSource::Constant(vals) = &sel.source {
                return vals.first().cloned();
            }
        }
    }
    if let Some(sel) = dfg.views[col.view].as_select() {
        if let SelectSource::Constant(vals) = &sel.source {
            return vals.get(col.index).cloned();
        }
    }
    None
}

/// Marks `id` unsatisfiable (§4.3(b)). Idempotent; returns whether this
/// call actually flipped the flag, so callers can report "changed".
pub(crate) fn mark_unsat(dfg: &mut Dfg, id: Id<View>) -> bool {
    if dfg.views[id].header.is_unsat {
        return false;
    }
    dfg.views[id].header.is_unsat = true;
    dfg.invalidate(id);
    true
}

/// Builds a TUP forwarding exactly `sources`, in order, as its output
/// columns — used when a CMP or NEGATE degenerates to a pass-through of
/// columns it already carries (§4.3: "replace with a forwarding tuple").
pub(crate) fn forward_sources_as_tuple(dfg: &mut Dfg, sources: &[ColumnRef]) -> Id<View> {
    let tup = dfg.alloc_view(ViewKind::Tuple(Tuple));
    for (next_index, src) in sources.iter().enumerate() {
        dfg.link_input(tup, *src);
        let col = dfg.views[src.view].header.columns[src.index].clone();
        let mut new_col = Column::new(tup, col.logical_id, next_index, col.ty.clone());
        new_col.source_var = col.source_var.clone();
        dfg.views[tup].header.columns.push(new_col);
    }
    tup
}
