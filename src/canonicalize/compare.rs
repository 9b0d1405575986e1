//! COMPARE canonicalization (§4.3): resolves a CMP whose operands are
//! provably equal or provably constant, collapsing it to a forwarding
//! TUP (satisfied) or marking it unsatisfiable (contradicted). When
//! neither applies, tries to sink the CMP through a preceding MERGE or
//! NEGATE so the comparison runs closer to the data it constrains.

use std::collections::HashMap;

use crate::arena::Id;
use crate::column::{Column, ColumnRef};
use crate::dfg::Dfg;
use crate::relation::Constant;
use crate::view::{Compare, CompareOp, Merge, Negate, Tuple, View, ViewKind};

pub fn canonicalize(dfg: &mut Dfg, id: Id<View>) -> bool {
    let Some(cmp) = dfg.views[id].as_compare().cloned() else {
        return false;
    };
    let inputs = dfg.views[id].header.input_columns.clone();
    let (Some(a), Some(b)) = (inputs.first().copied(), inputs.get(1).copied()) else {
        return false;
    };

    let holds = if a.view == b.view && a.index == b.index {
        Some(matches!(cmp.op, CompareOp::Eq))
    } else {
        match (super::constant_value(dfg, a), super::constant_value(dfg, b)) {
            (Some(ca), Some(cb)) => eval(cmp.op, &ca, &cb),
            _ => None,
        }
    };

    match holds {
        Some(true) => {
            let attached = dfg.views[id].header.attached_columns.clone();
            let mut sources: Vec<ColumnRef> = if cmp.op.unifies_outputs() { vec![a] } else { vec![a, b] };
            sources.extend(attached);
            let tup = super::forward_sources_as_tuple(dfg, &sources);
            dfg.replace_all_uses_with(id, tup);
            true
        }
        Some(false) => super::mark_unsat(dfg, id),
        None => try_sink(dfg, id, &cmp, a, b),
    }
}

/// Statically evaluates `op` over two known constants, when the pair is
/// of comparable kinds. `None` means the comparison isn't decidable at
/// compile time from these two constants (mismatched kinds, or an
/// ordering test on a kind that has no natural order here).
fn eval(op: CompareOp, a: &Constant, b: &Constant) -> Option<bool> {
    match (a, b) {
        (Constant::Int(x), Constant::Int(y)) => Some(by_order(op, x, y)),
        (Constant::UInt(x), Constant::UInt(y)) => Some(by_order(op, x, y)),
        (Constant::Float(x), Constant::Float(y)) => Some(by_order(op, x, y)),
        (Constant::Str(x), Constant::Str(y)) => Some(by_order(op, x, y)),
        (Constant::Bool(x), Constant::Bool(y)) => by_equality(op, x, y),
        (Constant::Bytes(x), Constant::Bytes(y)) => by_equality(op, x, y),
        (Constant::Tag(x), Constant::Tag(y)) => by_equality(op, x, y),
        _ => None,
    }
}

fn by_order<T: PartialOrd>(op: CompareOp, x: &T, y: &T) -> bool {
    match op {
        CompareOp::Eq => x == y,
        CompareOp::Ne => x != y,
        CompareOp::Lt => x < y,
        CompareOp::Gt => x > y,
    }
}

fn by_equality<T: PartialEq>(op: CompareOp, x: &T, y: &T) -> Option<bool> {
    match op {
        CompareOp::Eq => Some(x == y),
        CompareOp::Ne => Some(x != y),
        CompareOp::Lt | CompareOp::Gt => None,
    }
}

/// Tries to sink `id` through its single predecessor (§4.3: "may be sunk
/// through a preceding MERGE ... or NEGATE"). Declines if the CMP sets a
/// condition of its own, or if the predecessor does (sinking would
/// duplicate the condition's setter) or is itself negated elsewhere.
fn try_sink(dfg: &mut Dfg, id: Id<View>, cmp: &Compare, lhs: ColumnRef, rhs: ColumnRef) -> bool {
    if dfg.views[id].header.sets_condition.is_some() {
        return false;
    }
    let pred = if lhs.view == rhs.view {
        Some(lhs.view)
    } else if super::constant_value(dfg, lhs).is_some() {
        Some(rhs.view)
    } else if super::constant_value(dfg, rhs).is_some() {
        Some(lhs.view)
    } else {
        None
    };
    let Some(pred) = pred else {
        return false;
    };
    if dfg.views[pred].header.sets_condition.is_some() || dfg.views[pred].header.is_used_by_negation {
        return false;
    }

    if let Some(merge) = dfg.views[pred].as_merge().cloned() {
        try_sink_through_merge(dfg, id, cmp, pred, &merge)
    } else if let Some(negate) = dfg.views[pred].as_negate().cloned() {
        try_sink_through_negate(dfg, id, cmp, pred, &negate)
    } else {
        false
    }
}

/// Sinks the CMP below a MERGE: duplicates the CMP above each merged
/// branch and lifts a fresh MERGE over the sunk copies, so the
/// comparison no longer has to wait for the union (§4.3).
fn try_sink_through_merge(dfg: &mut Dfg, id: Id<View>, cmp: &Compare, merge_id: Id<View>, merge: &Merge) -> bool {
    let lhs = dfg.views[id].header.input_columns[0];
    let rhs = dfg.views[id].header.input_columns[1];
    if lhs.view != merge_id && rhs.view != merge_id {
        return false;
    }
    let attached = dfg.views[id].header.attached_columns.clone();
    let out_columns = dfg.views[id].header.columns.clone();

    let lifted_merge = dfg.alloc_view(ViewKind::Merge(Merge::new(Vec::new())));
    for (index, col) in out_columns.iter().enumerate() {
        dfg.views[lifted_merge]
            .header
            .columns
            .push(Column::new(lifted_merge, col.logical_id, index, col.ty.clone()));
    }

    for branch in merge.merged_views.clone() {
        let resolve = |c: ColumnRef| if c.view == merge_id { ColumnRef::new(branch, c.index) } else { c };

        let sunk = dfg.alloc_view(ViewKind::Compare(Compare::new(cmp.op)));
        dfg.link_input(sunk, resolve(lhs));
        dfg.link_input(sunk, resolve(rhs));
        dfg.views[sunk]
            .header
            .columns
            .push(Column::new(sunk, out_columns[0].logical_id, 0, out_columns[0].ty.clone()));
        if !cmp.op.unifies_outputs() {
            dfg.views[sunk]
                .header
                .columns
                .push(Column::new(sunk, out_columns[1].logical_id, 1, out_columns[1].ty.clone()));
        }

        let base = dfg.views[sunk].header.columns.len();
        for (j, &att) in attached.iter().enumerate() {
            dfg.link_attached(sunk, resolve(att));
            let col = &out_columns[base + j];
            dfg.views[sunk]
                .header
                .columns
                .push(Column::new(sunk, col.logical_id, base + j, col.ty.clone()));
        }

        dfg.link_merged_view(lifted_merge, sunk);
    }

    dfg.replace_all_uses_with(id, lifted_merge);
    true
}

/// Resolves a column of `negate_id` back to whatever it forwards — NEGATE
/// outputs are a pure pass-through of its own `input_columns` then
/// `attached_columns` (§4.8), so a CMP reading a NEGATE output is really
/// reading straight through to the negate's own predecessor. Columns not
/// owned by `negate_id` (constants) pass through unchanged.
fn negate_column_source(dfg: &Dfg, negate_id: Id<View>, col: ColumnRef) -> ColumnRef {
    if col.view != negate_id {
        return col;
    }
    let header = &dfg.views[negate_id].header;
    let n = header.input_columns.len();
    if col.index < n {
        header.input_columns[col.index]
    } else {
        header.attached_columns[col.index - n]
    }
}

/// Sinks the CMP below a NEGATE: lowers the comparison onto the negate's
/// own predecessor columns, rebuilds the negate to draw its probe values
/// from that lowered comparison, and lifts a TUP that preserves the
/// original CMP's output shape (§4.3).
fn try_sink_through_negate(dfg: &mut Dfg, id: Id<View>, cmp: &Compare, negate_id: Id<View>, negate: &Negate) -> bool {
    let lhs = dfg.views[id].header.input_columns[0];
    let rhs = dfg.views[id].header.input_columns[1];
    if lhs.view != negate_id && rhs.view != negate_id {
        return false;
    }
    let attached = dfg.views[id].header.attached_columns.clone();
    let out_columns = dfg.views[id].header.columns.clone();
    let negate_arity = dfg.views[negate_id].header.columns.len();
    let num_negate_inputs = dfg.views[negate_id].header.input_columns.len();

    let lhs_idx = (lhs.view == negate_id).then_some(lhs.index);
    let rhs_idx = (rhs.view == negate_id).then_some(rhs.index);

    // Lower the comparison itself onto the negate's own predecessor, and
    // carry every other negate column along as an attached pass-through
    // so the lowered comparison has a single predecessor again.
    let lowered_cmp = dfg.alloc_view(ViewKind::Compare(Compare::new(cmp.op)));
    dfg.link_input(lowered_cmp, negate_column_source(dfg, negate_id, lhs));
    dfg.link_input(lowered_cmp, negate_column_source(dfg, negate_id, rhs));
    dfg.views[lowered_cmp]
        .header
        .columns
        .push(Column::new(lowered_cmp, out_columns[0].logical_id, 0, out_columns[0].ty.clone()));
    if !cmp.op.unifies_outputs() {
        dfg.views[lowered_cmp]
            .header
            .columns
            .push(Column::new(lowered_cmp, out_columns[1].logical_id, 1, out_columns[1].ty.clone()));
    }

    let mut attached_index = HashMap::new();
    for k in 0..negate_arity {
        if Some(k) == lhs_idx || Some(k) == rhs_idx {
            continue;
        }
        let source = negate_column_source(dfg, negate_id, ColumnRef::new(negate_id, k));
        let col = dfg.views[negate_id].header.columns[k].clone();
        let out_index = dfg.views[lowered_cmp].header.columns.len();
        attached_index.insert(k, out_index);
        dfg.link_attached(lowered_cmp, source);
        dfg.views[lowered_cmp]
            .header
            .columns
            .push(Column::new(lowered_cmp, col.logical_id, out_index, col.ty.clone()));
    }

    // Rebuild the negate, taking its probe columns from the lowered
    // comparison instead of directly from its old predecessor.
    let lifted_negate = dfg.alloc_view(ViewKind::Negate(Negate::new(negate.negated_view)));
    dfg.link_negated_view(lifted_negate, negate.negated_view);
    dfg.views[negate.negated_view].header.is_used_by_negation = true;

    for k in 0..negate_arity {
        let source = if Some(k) == lhs_idx {
            ColumnRef::new(lowered_cmp, 0)
        } else if Some(k) == rhs_idx {
            ColumnRef::new(lowered_cmp, if cmp.op.unifies_outputs() { 0 } else { 1 })
        } else {
            ColumnRef::new(lowered_cmp, attached_index[&k])
        };
        if k < num_negate_inputs {
            dfg.link_input(lifted_negate, source);
        } else {
            dfg.link_attached(lifted_negate, source);
        }
        let col = dfg.views[negate_id].header.columns[k].clone();
        dfg.views[lifted_negate]
            .header
            .columns
            .push(Column::new(lifted_negate, col.logical_id, k, col.ty.clone()));
    }

    // Finally, a TUP that preserves the original CMP's output shape,
    // reading everything back through the rebuilt negate.
    let lifted_tuple = dfg.alloc_view(ViewKind::Tuple(Tuple));
    let core: &[ColumnRef] = if cmp.op.unifies_outputs() { &[lhs] } else { &[lhs, rhs] };
    let mut next = 0;
    for &source in core.iter().chain(attached.iter()) {
        let resolved = if source.view == negate_id {
            ColumnRef::new(lifted_negate, source.index)
        } else {
            source
        };
        dfg.link_input(lifted_tuple, resolved);
        let col = &out_columns[next];
        dfg.views[lifted_tuple]
            .header
            .columns
            .push(Column::new(lifted_tuple, col.logical_id, next, col.ty.clone()));
        next += 1;
    }

    dfg.replace_all_uses_with(id, lifted_tuple);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::Column;
    use crate::dfg::Dfg;
    use crate::view::{Select, SelectSource, ViewKind};

    #[test]
    fn identical_column_equality_forwards_as_tuple() {
        let mut dfg = Dfg::new();
        let sel = dfg.alloc_view(ViewKind::Select(Select::new(SelectSource::Constant(vec![]))));
        dfg.views[sel].header.columns.push(Column::new(sel, 1, 0, crate::column::Type::Int64));
        let cmp = dfg.alloc_view(ViewKind::Compare(Compare::new(CompareOp::Eq)));
        dfg.link_input(cmp, ColumnRef::new(sel, 0));
        dfg.link_input(cmp, ColumnRef::new(sel, 0));
        dfg.views[cmp].header.columns.push(Column::new(cmp, 1, 0, crate::column::Type::Int64));

        assert!(canonicalize(&mut dfg, cmp));
        assert!(!dfg.views[cmp].is_live());
    }

    #[test]
    fn identical_column_inequality_is_unsat() {
        let mut dfg = Dfg::new();
        let sel = dfg.alloc_view(ViewKind::Select(Select::new(SelectSource::Constant(vec![]))));
        dfg.views[sel].header.columns.push(Column::new(sel, 1, 0, crate::column::Type::Int64));
        let cmp = dfg.alloc_view(ViewKind::Compare(Compare::new(CompareOp::Ne)));
        dfg.link_input(cmp, ColumnRef::new(sel, 0));
        dfg.link_input(cmp, ColumnRef::new(sel, 0));
        dfg.views[cmp].header.columns.push(Column::new(cmp, 1, 0, crate::column::Type::Int64));
        dfg.views[cmp].header.columns.push(Column::new(cmp, 2, 1, crate::column::Type::Int64));

        assert!(canonicalize(&mut dfg, cmp));
        assert!(dfg.views[cmp].header.is_unsat);
    }

    #[test]
    fn distinct_constants_are_unsat() {
        let mut dfg = Dfg::new();
        let a = dfg.alloc_view(ViewKind::Select(Select::new(SelectSource::Constant(vec![Constant::Int(1)]))));
        dfg.views[a].header.columns.push(Column::new(a, 10, 0, crate::column::Type::Int64));
        let b = dfg.alloc_view(ViewKind::Select(Select::new(SelectSource::Constant(vec![Constant::Int(2)]))));
        dfg.views[b].header.columns.push(Column::new(b, 11, 0, crate::column::Type::Int64));

        let cmp = dfg.alloc_view(ViewKind::Compare(Compare::new(CompareOp::Eq)));
        dfg.link_input(cmp, ColumnRef::new(a, 0));
        dfg.link_input(cmp, ColumnRef::new(b, 0));
        dfg.views[cmp].header.columns.push(Column::new(cmp, 10, 0, crate::column::Type::Int64));

        assert!(canonicalize(&mut dfg, cmp));
        assert!(dfg.views[cmp].header.is_unsat);
    }

    #[test]
    fn compare_sinks_through_merge_into_per_branch_compares() {
        let mut dfg = Dfg::new();
        let branch_a = dfg.alloc_view(ViewKind::Select(Select::new(SelectSource::Constant(vec![]))));
        dfg.views[branch_a].header.columns.push(Column::new(branch_a, 1, 0, crate::column::Type::Int64));
        dfg.views[branch_a].header.columns.push(Column::new(branch_a, 2, 1, crate::column::Type::Int64));
        let branch_b = dfg.alloc_view(ViewKind::Select(Select::new(SelectSource::Constant(vec![]))));
        dfg.views[branch_b].header.columns.push(Column::new(branch_b, 1, 0, crate::column::Type::Int64));
        dfg.views[branch_b].header.columns.push(Column::new(branch_b, 2, 1, crate::column::Type::Int64));

        let merge = dfg.alloc_view(ViewKind::Merge(Merge::new(Vec::new())));
        dfg.link_merged_view(merge, branch_a);
        dfg.link_merged_view(merge, branch_b);
        dfg.views[merge].header.columns.push(Column::new(merge, 100, 0, crate::column::Type::Int64));
        dfg.views[merge].header.columns.push(Column::new(merge, 101, 1, crate::column::Type::Int64));

        let cmp = dfg.alloc_view(ViewKind::Compare(Compare::new(CompareOp::Lt)));
        dfg.link_input(cmp, ColumnRef::new(merge, 0));
        dfg.link_input(cmp, ColumnRef::new(merge, 1));
        dfg.views[cmp].header.columns.push(Column::new(cmp, 100, 0, crate::column::Type::Int64));
        dfg.views[cmp].header.columns.push(Column::new(cmp, 101, 1, crate::column::Type::Int64));

        assert!(canonicalize(&mut dfg, cmp));
        assert!(!dfg.views[cmp].is_live());

        let lifted = dfg.views.ids().find(|&v| dfg.views[v].as_merge().is_some() && dfg.views[v].is_live()).unwrap();
        let sunk: Vec<_> = dfg.views[lifted].as_merge().unwrap().merged_views.clone();
        assert_eq!(sunk.len(), 2);
        for s in sunk {
            assert!(dfg.views[s].as_compare().is_some());
        }
    }

    #[test]
    fn compare_sinks_through_negate() {
        let mut dfg = Dfg::new();
        let target = dfg.alloc_view(ViewKind::Select(Select::new(SelectSource::Constant(vec![]))));

        let probe = dfg.alloc_view(ViewKind::Select(Select::new(SelectSource::Constant(vec![]))));
        dfg.views[probe].header.columns.push(Column::new(probe, 1, 0, crate::column::Type::Int64));
        dfg.views[probe].header.columns.push(Column::new(probe, 2, 1, crate::column::Type::Int64));

        let negate = dfg.alloc_view(ViewKind::Negate(Negate::new(target)));
        dfg.link_negated_view(negate, target);
        dfg.link_input(negate, ColumnRef::new(probe, 0));
        dfg.link_input(negate, ColumnRef::new(probe, 1));
        dfg.views[negate].header.columns.push(Column::new(negate, 1, 0, crate::column::Type::Int64));
        dfg.views[negate].header.columns.push(Column::new(negate, 2, 1, crate::column::Type::Int64));

        let cmp = dfg.alloc_view(ViewKind::Compare(Compare::new(CompareOp::Lt)));
        dfg.link_input(cmp, ColumnRef::new(negate, 0));
        dfg.link_input(cmp, ColumnRef::new(negate, 1));
        dfg.views[cmp].header.columns.push(Column::new(cmp, 1, 0, crate::column::Type::Int64));
        dfg.views[cmp].header.columns.push(Column::new(cmp, 2, 1, crate::column::Type::Int64));

        assert!(canonicalize(&mut dfg, cmp));
        assert!(!dfg.views[cmp].is_live());

        let lifted_tuple =
            dfg.views.ids().find(|&v| dfg.views[v].as_tuple().is_some() && dfg.views[v].is_live()).unwrap();
        let tuple_pred = dfg.views[lifted_tuple].header.input_columns[0].view;
        assert!(dfg.views[tuple_pred].as_negate().is_some());
        let new_negate_pred = dfg.views[tuple_pred].header.input_columns[0].view;
        assert!(dfg.views[new_negate_pred].as_compare().is_some());
    }
}
