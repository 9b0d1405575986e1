//! JOIN canonicalization (§4.3): degenerates a single-view join to a
//! TUPLE, narrows joined views that expose columns the join never reads,
//! and guards+drops a pivot once it is proven constant.

use std::collections::HashSet;

use crate::arena::Id;
use crate::column::{Column, ColumnRef};
use crate::dfg::Dfg;
use crate::relation::Constant;
use crate::view::{Compare, CompareOp, Join, JoinOutputSource, Select, SelectSource, Tuple, View, ViewKind};

pub fn canonicalize(dfg: &mut Dfg, id: Id<View>) -> bool {
    let Some(join) = dfg.views[id].as_join().cloned() else {
        return false;
    };

    if join.joined_views.len() <= 1 {
        return degenerate_single_view(dfg, id, &join);
    }

    if guard_constant_pivot(dfg, id, &join) {
        return true;
    }

    narrow_unused_joined_views(dfg, id, &join)
}

/// A JOIN left with one joined view (possible once dead-flow/CSE removes
/// its siblings) carries no further pivoting work to do; it is exactly a
/// column-forwarding TUPLE over that one view (§4.3).
fn degenerate_single_view(dfg: &mut Dfg, id: Id<View>, join: &Join) -> bool {
    if join.joined_views.is_empty() {
        return false;
    }
    let sources: Vec<ColumnRef> = join
        .out_to_in
        .iter()
        .map(|s| match s {
            JoinOutputSource::Pivot(refs) => refs[0],
            JoinOutputSource::NonPivot(cref) => *cref,
        })
        .collect();
    let tup = super::forward_sources_as_tuple(dfg, &sources);
    dfg.replace_all_uses_with(id, tup);
    true
}

/// If a pivot's value is provably constant (every joined view's operand
/// column resolves to the same known constant), the equi-join no longer
/// needs to compare that column across views at all: each view is
/// guarded independently with a CMP against the constant, the pivot is
/// dropped from the rebuilt JOIN, and a wrapper TUPLE republishes the
/// constant at the dropped output position (§4.3).
fn guard_constant_pivot(dfg: &mut Dfg, id: Id<View>, join: &Join) -> bool {
    for pivot_idx in 0..join.num_pivots {
        let JoinOutputSource::Pivot(refs) = &join.out_to_in[pivot_idx] else {
            continue;
        };
        let Some(constant) = refs.iter().find_map(|r| super::constant_value(dfg, *r)) else {
            continue;
        };
        rewrite_constant_pivot(dfg, id, join, pivot_idx, constant);
        return true;
    }
    false
}

fn rewrite_constant_pivot(dfg: &mut Dfg, id: Id<View>, join: &Join, pivot_idx: usize, constant: Constant) {
    let old_columns = dfg.views[id].header.columns.clone();
    let removed_logical_id = old_columns[pivot_idx].logical_id;

    let mut guarded_views = Vec::new();
    for &v in &join.joined_views {
        let guard_idx = dfg.views[v]
            .header
            .columns
            .iter()
            .position(|c| c.logical_id == removed_logical_id)
            .expect("pivot logical id must appear on every joined view");
        guarded_views.push(guard_view_on_constant(dfg, v, guard_idx, constant.clone()));
    }

    let remaining_pivot_ids: Vec<u32> = (0..join.num_pivots)
        .filter(|&i| i != pivot_idx)
        .map(|i| old_columns[i].logical_id)
        .collect();

    let new_join = rebuild_join(dfg, guarded_views, &remaining_pivot_ids);

    let const_ty = constant_type(&constant);
    let const_sel = dfg.alloc_view(ViewKind::Select(Select::new(SelectSource::Constant(vec![constant]))));
    let fresh_id = dfg.fresh_logical_id();
    dfg.views[const_sel].header.columns.push(Column::new(const_sel, fresh_id, 0, const_ty));

    let tup = dfg.alloc_view(ViewKind::Tuple(Tuple));
    for (out_index, old_col) in old_columns.iter().enumerate() {
        if out_index == pivot_idx {
            dfg.link_input(tup, ColumnRef::new(const_sel, 0));
            let mut col = Column::new(tup, old_col.logical_id, out_index, old_col.ty.clone());
            col.source_var = old_col.source_var.clone();
            col.constant_of = Some(crate::arena::WeakRef::new(const_sel));
            dfg.views[tup].header.columns.push(col);
        } else {
            let src_idx = dfg.views[new_join]
                .header
                .columns
                .iter()
                .position(|c| c.logical_id == old_col.logical_id)
                .expect("non-dropped column survives the rebuilt join");
            dfg.link_input(tup, ColumnRef::new(new_join, src_idx));
            let src = dfg.views[new_join].header.columns[src_idx].clone();
            let mut col = Column::new(tup, src.logical_id, out_index, src.ty.clone());
            col.source_var = src.source_var.clone();
            dfg.views[tup].header.columns.push(col);
        }
    }

    dfg.replace_all_uses_with(id, tup);
}

/// If some joined view exposes a column the JOIN never reads — not even
/// as a pivot operand — proxy that view with a narrower TUPLE exposing
/// only the columns actually used, and rebuild the JOIN over the
/// narrowed view (§4.3).
fn narrow_unused_joined_views(dfg: &mut Dfg, id: Id<View>, join: &Join) -> bool {
    for &v in &join.joined_views {
        let referenced = referenced_positions(join, v);
        let arity = dfg.views[v].header.columns.len();
        if !referenced.is_empty() && referenced.len() < arity {
            narrow_one_view(dfg, id, join, v, &referenced);
            return true;
        }
    }
    false
}

fn referenced_positions(join: &Join, target: Id<View>) -> HashSet<usize> {
    let mut positions = HashSet::new();
    for source in &join.out_to_in {
        match source {
            JoinOutputSource::Pivot(refs) => {
                for r in refs {
                    if r.view == target {
                        positions.insert(r.index);
                    }
                }
            }
            JoinOutputSource::NonPivot(cref) => {
                if cref.view == target {
                    positions.insert(cref.index);
                }
            }
        }
    }
    positions
}

fn narrow_one_view(dfg: &mut Dfg, id: Id<View>, join: &Join, target: Id<View>, referenced: &HashSet<usize>) {
    let mut keep: Vec<usize> = referenced.iter().copied().collect();
    keep.sort_unstable();
    let sources: Vec<ColumnRef> = keep.iter().map(|&i| ColumnRef::new(target, i)).collect();
    let proxy = super::forward_sources_as_tuple(dfg, &sources);

    let old_columns = dfg.views[id].header.columns.clone();
    let pivot_ids: Vec<u32> = old_columns.iter().take(join.num_pivots).map(|c| c.logical_id).collect();
    let new_joined_views: Vec<Id<View>> = join.joined_views.iter().map(|&v| if v == target { proxy } else { v }).collect();

    let new_join = rebuild_join(dfg, new_joined_views, &pivot_ids);

    let remap: Vec<usize> = old_columns
        .iter()
        .map(|c| {
            dfg.views[new_join]
                .header
                .columns
                .iter()
                .position(|nc| nc.logical_id == c.logical_id)
                .unwrap_or(0)
        })
        .collect();
    dfg.replace_all_uses_with_remap(id, new_join, &remap);
}

/// Builds a fresh JOIN over `joined_views` pivoting on `pivot_ids`,
/// mirroring `builder::join_order::apply_join`'s construction but taking
/// its inputs directly rather than popping them off a worklist — used by
/// canonicalization rules that need to rebuild a JOIN around rewritten
/// joined views (§4.3).
fn rebuild_join(dfg: &mut Dfg, joined_views: Vec<Id<View>>, pivot_ids: &[u32]) -> Id<View> {
    let group_id = dfg.fresh_group_id();
    let join = dfg.alloc_view(ViewKind::Join(Join::new(Vec::new(), group_id)));
    for &v in &joined_views {
        dfg.link_joined_view(join, v);
    }

    let mut out_to_in = Vec::new();
    for &pid in pivot_ids {
        let mut refs = Vec::new();
        for &v in &joined_views {
            if let Some((idx, _)) = dfg.views[v]
                .header
                .columns
                .iter()
                .enumerate()
                .find(|(_, c)| !c.is_constant() && c.logical_id == pid)
            {
                refs.push(ColumnRef::new(v, idx));
            }
        }
        out_to_in.push(JoinOutputSource::Pivot(refs));
    }
    let num_pivots = out_to_in.len();

    for &v in &joined_views {
        let arity = dfg.views[v].header.columns.len();
        for idx in 0..arity {
            let col = &dfg.views[v].header.columns[idx];
            if !col.is_constant() && pivot_ids.contains(&col.logical_id) {
                continue;
            }
            out_to_in.push(JoinOutputSource::NonPivot(ColumnRef::new(v, idx)));
        }
    }

    for (out_index, source) in out_to_in.iter().enumerate() {
        let (sample_view, sample_index) = match source {
            JoinOutputSource::Pivot(refs) => (refs[0].view, refs[0].index),
            JoinOutputSource::NonPivot(cref) => (cref.view, cref.index),
        };
        let src_col = dfg.views[sample_view].header.columns[sample_index].clone();
        let mut col = Column::new(join, src_col.logical_id, out_index, src_col.ty.clone());
        col.source_var = src_col.source_var.clone();
        dfg.views[join].header.columns.push(col);
    }
    dfg.views[join].as_join_mut().unwrap().out_to_in = out_to_in;
    dfg.views[join].as_join_mut().unwrap().num_pivots = num_pivots;
    dfg.views[join].header.add_group_id(group_id);
    join
}

fn guard_view_on_constant(dfg: &mut Dfg, view: Id<View>, guard_idx: usize, constant: Constant) -> Id<View> {
    let arity = dfg.views[view].header.columns.len();
    let const_ty = constant_type(&constant);
    let const_sel = dfg.alloc_view(ViewKind::Select(Select::new(SelectSource::Constant(vec![constant]))));
    let fresh_id = dfg.fresh_logical_id();
    dfg.views[const_sel].header.columns.push(Column::new(const_sel, fresh_id, 0, const_ty));

    let cmp = dfg.alloc_view(ViewKind::Compare(Compare::new(CompareOp::Eq)));
    dfg.link_input(cmp, ColumnRef::new(view, guard_idx));
    dfg.link_input(cmp, ColumnRef::new(const_sel, 0));

    let kept = dfg.views[view].header.columns[guard_idx].clone();
    let mut merged = Column::new(cmp, kept.logical_id, 0, kept.ty.clone());
    merged.source_var = kept.source_var.clone();
    merged.constant_of = Some(crate::arena::WeakRef::new(const_sel));
    dfg.views[cmp].header.columns.push(merged);

    let mut next_index = 1usize;
    for idx in 0..arity {
        if idx == guard_idx {
            continue;
        }
        dfg.link_attached(cmp, ColumnRef::new(view, idx));
        let src = dfg.views[view].header.columns[idx].clone();
        let mut col = Column::new(cmp, src.logical_id, next_index, src.ty.clone());
        col.source_var = src.source_var.clone();
        dfg.views[cmp].header.columns.push(col);
        next_index += 1;
    }
    cmp
}

fn constant_type(c: &Constant) -> crate::column::Type {
    match c {
        Constant::Int(_) => crate::column::Type::Int64,
        Constant::UInt(_) => crate::column::Type::UInt64,
        Constant::Float(_) => crate::column::Type::Float64,
        Constant::Bool(_) => crate::column::Type::Int8,
        Constant::Bytes(_) => crate::column::Type::Bytes,
        Constant::Str(_) => crate::column::Type::Utf8,
        Constant::Tag(_) => crate::column::Type::Opaque("tag".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::join_order::build_join_tree;
    use crate::view::{Select, SelectSource};

    fn select_with_column(dfg: &mut Dfg, logical_id: u32) -> Id<View> {
        let view = dfg.alloc_view(ViewKind::Select(Select::new(SelectSource::Constant(vec![]))));
        dfg.views[view].header.columns.push(Column::new(view, logical_id, 0, crate::column::Type::Int64));
        view
    }

    #[test]
    fn single_joined_view_degenerates_to_tuple() {
        let mut dfg = Dfg::new();
        let a = select_with_column(&mut dfg, 1);
        let b = select_with_column(&mut dfg, 1);
        let join = build_join_tree(&mut dfg, vec![a, b]);

        // Kill one joined view's use edge so only one remains (simulating
        // dead-flow having removed its sibling).
        if let ViewKind::Join(j) = &mut dfg.views[join].kind {
            j.joined_views.pop();
        }

        assert!(canonicalize(&mut dfg, join));
        assert!(!dfg.views[join].is_live());
    }

    #[test]
    fn cartesian_join_is_unaffected_with_no_constants() {
        let mut dfg = Dfg::new();
        let a = select_with_column(&mut dfg, 1);
        let b = select_with_column(&mut dfg, 2);
        let join = build_join_tree(&mut dfg, vec![a, b]);
        assert!(!canonicalize(&mut dfg, join));
    }
}
