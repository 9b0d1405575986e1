//! MERGE canonicalization (§4.3): dedups identical merged views, flattens
//! nested unconditional merges, narrows columns no consumer reads, and
//! degenerates to a forwarding TUPLE once only one branch remains.

use crate::arena::Id;
use crate::column::{Column, ColumnRef};
use crate::dfg::Dfg;
use crate::view::{Merge, View, ViewKind};

pub fn canonicalize(dfg: &mut Dfg, id: Id<View>) -> bool {
    let Some(merge) = dfg.views[id].as_merge().cloned() else {
        return false;
    };

    if dedup_merged_views(dfg, id, &merge) {
        return true;
    }
    if flatten_nested_merge(dfg, id, &merge) {
        return true;
    }
    if degenerate_single_branch(dfg, id, &merge) {
        return true;
    }
    narrow_unused_outputs(dfg, id, &merge)
}

fn dedup_merged_views(dfg: &mut Dfg, id: Id<View>, merge: &Merge) -> bool {
    let mut seen = Vec::new();
    for &v in &merge.merged_views {
        if !seen.contains(&v) {
            seen.push(v);
        }
    }
    if seen.len() == merge.merged_views.len() {
        return false;
    }
    let new_merge = rebuild_merge(dfg, id, seen);
    dfg.replace_all_uses_with(id, new_merge);
    true
}

/// Splices the children of any nested MERGE that carries no gating
/// condition of its own directly into this merge's branch list, so the
/// union's depth doesn't grow with purely structural nesting.
fn flatten_nested_merge(dfg: &mut Dfg, id: Id<View>, merge: &Merge) -> bool {
    let mut expanded = Vec::new();
    let mut changed = false;
    for &v in &merge.merged_views {
        let nested = dfg.views[v].as_merge().cloned();
        let unconditional = dfg.views[v].header.sets_condition.is_none()
            && dfg.views[v].header.positive_conditions.is_empty()
            && dfg.views[v].header.negative_conditions.is_empty();
        match nested {
            Some(inner) if unconditional => {
                changed = true;
                expanded.extend(inner.merged_views);
            }
            _ => expanded.push(v),
        }
    }
    if !changed {
        return false;
    }
    let new_merge = rebuild_merge(dfg, id, expanded);
    dfg.replace_all_uses_with(id, new_merge);
    true
}

fn degenerate_single_branch(dfg: &mut Dfg, id: Id<View>, merge: &Merge) -> bool {
    if merge.merged_views.len() != 1 {
        return false;
    }
    let only = merge.merged_views[0];
    let arity = dfg.views[id].header.columns.len();
    let sources: Vec<ColumnRef> = (0..arity).map(|i| ColumnRef::new(only, i)).collect();
    let tup = super::forward_sources_as_tuple(dfg, &sources);
    dfg.replace_all_uses_with(id, tup);
    true
}

fn narrow_unused_outputs(dfg: &mut Dfg, id: Id<View>, merge: &Merge) -> bool {
    let arity = dfg.views[id].header.columns.len();
    let keep: Vec<usize> = (0..arity).filter(|&i| super::is_output_used(dfg, id, i)).collect();
    if keep.len() == arity || keep.is_empty() {
        return false;
    }

    let proxies: Vec<Id<View>> = merge
        .merged_views
        .iter()
        .map(|&v| {
            let sources: Vec<ColumnRef> = keep.iter().map(|&i| ColumnRef::new(v, i)).collect();
            super::forward_sources_as_tuple(dfg, &sources)
        })
        .collect();

    let old_columns = dfg.views[id].header.columns.clone();
    let new_merge = dfg.alloc_view(ViewKind::Merge(Merge::new(Vec::new())));
    for &p in &proxies {
        dfg.link_merged_view(new_merge, p);
    }
    let mut remap = vec![0usize; arity];
    for (new_index, &old_index) in keep.iter().enumerate() {
        let col = old_columns[old_index].clone();
        let mut new_col = Column::new(new_merge, col.logical_id, new_index, col.ty.clone());
        new_col.source_var = col.source_var.clone();
        dfg.views[new_merge].header.columns.push(new_col);
        remap[old_index] = new_index;
    }
    dfg.replace_all_uses_with_remap(id, new_merge, &remap);
    true
}

/// Rebuilds a MERGE over `merged_views`, preserving `id`'s current column
/// identities (logical id, type, source var) in the same order — used by
/// rewrites that change only which views are merged, not the arity.
fn rebuild_merge(dfg: &mut Dfg, id: Id<View>, merged_views: Vec<Id<View>>) -> Id<View> {
    let old_columns = dfg.views[id].header.columns.clone();
    let new_merge = dfg.alloc_view(ViewKind::Merge(Merge::new(Vec::new())));
    for &v in &merged_views {
        dfg.link_merged_view(new_merge, v);
    }
    for col in old_columns {
        let mut new_col = Column::new(new_merge, col.logical_id, col.index, col.ty.clone());
        new_col.source_var = col.source_var.clone();
        dfg.views[new_merge].header.columns.push(new_col);
    }
    new_merge
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::Column as Col;
    use crate::view::{Select, SelectSource};

    fn select_with_arity(dfg: &mut Dfg, arity: usize) -> Id<View> {
        let sel = dfg.alloc_view(ViewKind::Select(Select::new(SelectSource::Constant(vec![]))));
        for i in 0..arity {
            dfg.views[sel].header.columns.push(Col::new(sel, i as u32, i, crate::column::Type::Int64));
        }
        sel
    }

    fn build_merge(dfg: &mut Dfg, views: Vec<Id<View>>) -> Id<View> {
        let arity = dfg.views[views[0]].header.columns.len();
        let merge = dfg.alloc_view(ViewKind::Merge(Merge::new(Vec::new())));
        for &v in &views {
            dfg.link_merged_view(merge, v);
        }
        for i in 0..arity {
            dfg.views[merge].header.columns.push(Col::new(merge, i as u32, i, crate::column::Type::Int64));
        }
        merge
    }

    #[test]
    fn duplicate_branch_is_deduped() {
        let mut dfg = Dfg::new();
        let a = select_with_arity(&mut dfg, 1);
        let merge = build_merge(&mut dfg, vec![a, a]);
        assert!(canonicalize(&mut dfg, merge));
        assert!(!dfg.views[merge].is_live());
    }

    #[test]
    fn single_branch_degenerates_to_tuple() {
        let mut dfg = Dfg::new();
        let a = select_with_arity(&mut dfg, 1);
        let merge = build_merge(&mut dfg, vec![a]);
        assert!(canonicalize(&mut dfg, merge));
        assert!(!dfg.views[merge].is_live());
    }

    #[test]
    fn two_distinct_branches_unaffected() {
        let mut dfg = Dfg::new();
        let a = select_with_arity(&mut dfg, 1);
        let b = select_with_arity(&mut dfg, 1);
        let merge = build_merge(&mut dfg, vec![a, b]);
        assert!(!canonicalize(&mut dfg, merge));
    }
}
