//! Join-candidate worklist (§4.1 step 4): repeatedly picks a pivot set
//! shared by two or more pending views, joins them, and pushes the JOIN
//! back onto the work list until one view remains.

use std::collections::BTreeSet;

use crate::arena::Id;
use crate::column::ColumnRef;
use crate::dfg::Dfg;
use crate::view::{Join, JoinOutputSource, View, ViewKind};

/// The non-constant `logical_id`s a view currently exposes, in column
/// order. Constant columns are excluded from pivot search since I2
/// already exempts them from the same-producer rule, and unifying two
/// distinct constants on a shared var-id would be meaningless.
fn non_constant_var_ids(dfg: &Dfg, view: Id<View>) -> Vec<u32> {
    dfg.views[view]
        .header
        .columns
        .iter()
        .filter(|c| !c.is_constant())
        .map(|c| c.logical_id)
        .collect()
}

/// Finds the next join candidate starting from `worklist[0]` (§4.1 step
/// 4: "pick a column of the first view, scan other views for a column
/// with the same var-id"). Returns the worklist indices to join and the
/// pivot var-ids they share, expanded to every other pending view that
/// also exposes the whole pivot set.
fn find_join_candidate(dfg: &Dfg, worklist: &[Id<View>]) -> Option<(Vec<usize>, Vec<u32>)> {
    let first_ids = non_constant_var_ids(dfg, worklist[0]);

    for (other_idx, &other_view) in worklist.iter().enumerate().skip(1) {
        let other_ids = non_constant_var_ids(dfg, other_view);
        let shared: BTreeSet<u32> = first_ids.iter().filter(|id| other_ids.contains(id)).copied().collect();
        if shared.is_empty() {
            continue;
        }

        let mut members = vec![0usize, other_idx];
        let mut changed = true;
        while changed {
            changed = false;
            for (idx, &view) in worklist.iter().enumerate() {
                if members.contains(&idx) {
                    continue;
                }
                let ids = non_constant_var_ids(dfg, view);
                if shared.iter().all(|p| ids.contains(p)) {
                    members.push(idx);
                    changed = true;
                }
            }
        }
        members.sort_unstable();
        return Some((members, shared.into_iter().collect()));
    }
    None
}

/// Builds a JOIN over `worklist[members]` pivoting on `pivot_ids`,
/// removes those entries from the worklist and pushes the JOIN in their
/// place (§4.1 step 4, §4.2 group-id stamping).
fn apply_join(dfg: &mut Dfg, worklist: &mut Vec<Id<View>>, members: &[usize], pivot_ids: &[u32]) {
    let joined_views: Vec<Id<View>> = members.iter().map(|&i| worklist[i]).collect();
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
        let mut col = crate::column::Column::new(join, src_col.logical_id, out_index, src_col.ty.clone());
        col.source_var = src_col.source_var.clone();
        dfg.views[join].header.columns.push(col);
    }
    dfg.views[join].as_join_mut().unwrap().out_to_in = out_to_in;
    dfg.views[join].as_join_mut().unwrap().num_pivots = num_pivots;
    dfg.views[join].header.add_group_id(group_id);

    let mut sorted_members = members.to_vec();
    sorted_members.sort_unstable_by(|a, b| b.cmp(a));
    for idx in sorted_members {
        worklist.remove(idx);
    }
    worklist.push(join);
}

/// Runs the work list to completion (§4.1 step 4). Tries every rotation
/// of the pending list before falling back to a Cartesian join of the
/// first two views when no shared var-id exists anywhere (scenario 2:
/// `pairs(A,B) :- node(A), node(B).`).
pub fn build_join_tree(dfg: &mut Dfg, mut worklist: Vec<Id<View>>) -> Id<View> {
    while worklist.len() > 1 {
        if let Some((members, pivot_ids)) = find_join_candidate(dfg, &worklist) {
            apply_join(dfg, &mut worklist, &members, &pivot_ids);
            continue;
        }

        let mut rotated = false;
        for _ in 1..worklist.len() {
            worklist.rotate_left(1);
            if find_join_candidate(dfg, &worklist).is_some() {
                rotated = true;
                break;
            }
        }
        if rotated {
            continue;
        }

        apply_join(dfg, &mut worklist, &[0, 1], &[]);
    }
    worklist[0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::{Select, SelectSource};

    fn select_with_column(dfg: &mut Dfg, logical_id: u32) -> Id<View> {
        let view = dfg.alloc_view(ViewKind::Select(Select::new(SelectSource::Constant(vec![]))));
        let col = crate::column::Column::new(view, logical_id, 0, crate::column::Type::Int64);
        dfg.views[view].header.columns.push(col);
        view
    }

    #[test]
    fn shared_var_id_produces_one_pivot_join() {
        let mut dfg = Dfg::new();
        let a = select_with_column(&mut dfg, 7);
        let b = select_with_column(&mut dfg, 7);
        let result = build_join_tree(&mut dfg, vec![a, b]);
        let join = dfg.views[result].as_join().unwrap();
        assert_eq!(join.num_pivots, 1);
        assert!(!join.is_cartesian_product());
    }

    #[test]
    fn disjoint_var_ids_fall_back_to_cartesian_product() {
        let mut dfg = Dfg::new();
        let a = select_with_column(&mut dfg, 1);
        let b = select_with_column(&mut dfg, 2);
        let result = build_join_tree(&mut dfg, vec![a, b]);
        let join = dfg.views[result].as_join().unwrap();
        assert!(join.is_cartesian_product());
        assert_eq!(dfg.views[result].header.columns.len(), 2);
    }
}
