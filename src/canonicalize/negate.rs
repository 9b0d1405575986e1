//! NEGATE canonicalization (§4.3): once the negated view is proven
//! unsatisfiable, the negation holds vacuously for every input tuple, so
//! it degenerates to a forwarding TUPLE over its own key and carried
//! columns. Otherwise folds duplicate columns (the universal per-view
//! rule in §4.3(c): "two inputs with the same source column merge
//! outputs"), applied separately within the key (`input_columns`) and
//! carried (`attached_columns`) regions so the existence check NEGATE
//! performs against its key arity is left untouched.

use crate::arena::Id;
use crate::column::{Column, ColumnRef};
use crate::dfg::Dfg;
use crate::view::{Negate, View, ViewKind};

pub fn canonicalize(dfg: &mut Dfg, id: Id<View>) -> bool {
    let Some(negate) = dfg.views[id].as_negate().cloned() else {
        return false;
    };
    if dfg.views[negate.negated_view].header.is_unsat {
        let mut sources: Vec<ColumnRef> = dfg.views[id].header.input_columns.clone();
        sources.extend(dfg.views[id].header.attached_columns.clone());
        let tup = super::forward_sources_as_tuple(dfg, &sources);
        dfg.replace_all_uses_with(id, tup);
        return true;
    }

    fold_duplicate_columns(dfg, id, &negate)
}

/// Deduplicates `list`, returning the deduplicated columns, a map from
/// each original index to its new index within the deduplicated list,
/// and the original indices that were kept (in their new order).
fn dedup(list: &[ColumnRef]) -> (Vec<ColumnRef>, Vec<usize>, Vec<usize>) {
    let mut deduped = Vec::new();
    let mut kept_old = Vec::new();
    let mut remap = vec![0; list.len()];
    for (old_idx, &col) in list.iter().enumerate() {
        if let Some(pos) = deduped.iter().position(|&d| d == col) {
            remap[old_idx] = pos;
        } else {
            remap[old_idx] = deduped.len();
            kept_old.push(old_idx);
            deduped.push(col);
        }
    }
    (deduped, remap, kept_old)
}

fn fold_duplicate_columns(dfg: &mut Dfg, id: Id<View>, negate: &Negate) -> bool {
    let inputs = dfg.views[id].header.input_columns.clone();
    let attached = dfg.views[id].header.attached_columns.clone();

    let (new_inputs, input_remap, kept_inputs) = dedup(&inputs);
    let (new_attached, attached_remap, kept_attached) = dedup(&attached);
    if new_inputs.len() == inputs.len() && new_attached.len() == attached.len() {
        return false;
    }

    let old_columns = dfg.views[id].header.columns.clone();
    let new_negate = dfg.alloc_view(ViewKind::Negate(Negate::new(negate.negated_view)));
    dfg.link_negated_view(new_negate, negate.negated_view);

    for &col in &new_inputs {
        dfg.link_input(new_negate, col);
    }
    for (new_index, &old_idx) in kept_inputs.iter().enumerate() {
        let col = &old_columns[old_idx];
        let mut new_col = Column::new(new_negate, col.logical_id, new_index, col.ty.clone());
        new_col.source_var = col.source_var.clone();
        dfg.views[new_negate].header.columns.push(new_col);
    }

    let attached_base = new_inputs.len();
    for &col in &new_attached {
        dfg.link_attached(new_negate, col);
    }
    for (new_index, &old_idx) in kept_attached.iter().enumerate() {
        let col = &old_columns[inputs.len() + old_idx];
        let mut new_col = Column::new(new_negate, col.logical_id, attached_base + new_index, col.ty.clone());
        new_col.source_var = col.source_var.clone();
        dfg.views[new_negate].header.columns.push(new_col);
    }

    let mut remap = Vec::with_capacity(old_columns.len());
    remap.extend(input_remap);
    remap.extend(attached_remap.into_iter().map(|i| attached_base + i));

    dfg.replace_all_uses_with_remap(id, new_negate, &remap);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::Column;
    use crate::view::{Negate, Select, SelectSource, ViewKind};

    #[test]
    fn negating_an_unsat_view_is_vacuously_true() {
        let mut dfg = Dfg::new();
        let carried = dfg.alloc_view(ViewKind::Select(Select::new(SelectSource::Constant(vec![]))));
        dfg.views[carried].header.columns.push(Column::new(carried, 1, 0, crate::column::Type::Int64));

        let neg_target = dfg.alloc_view(ViewKind::Select(Select::new(SelectSource::Constant(vec![]))));
        dfg.views[neg_target].header.is_unsat = true;

        let negate = dfg.alloc_view(ViewKind::Negate(Negate::new(neg_target)));
        dfg.link_negated_view(negate, neg_target);
        dfg.link_attached(negate, ColumnRef::new(carried, 0));
        dfg.views[negate].header.columns.push(Column::new(negate, 1, 0, crate::column::Type::Int64));

        assert!(canonicalize(&mut dfg, negate));
        assert!(!dfg.views[negate].is_live());
    }

    #[test]
    fn negating_a_satisfiable_view_is_unaffected() {
        let mut dfg = Dfg::new();
        let neg_target = dfg.alloc_view(ViewKind::Select(Select::new(SelectSource::Constant(vec![]))));
        let negate = dfg.alloc_view(ViewKind::Negate(Negate::new(neg_target)));
        dfg.link_negated_view(negate, neg_target);
        assert!(!canonicalize(&mut dfg, negate));
    }

    #[test]
    fn duplicate_input_column_is_folded() {
        let mut dfg = Dfg::new();
        let src = dfg.alloc_view(ViewKind::Select(Select::new(SelectSource::Constant(vec![]))));
        dfg.views[src].header.columns.push(Column::new(src, 1, 0, crate::column::Type::Int64));

        let neg_target = dfg.alloc_view(ViewKind::Select(Select::new(SelectSource::Constant(vec![]))));
        let negate = dfg.alloc_view(ViewKind::Negate(Negate::new(neg_target)));
        dfg.link_negated_view(negate, neg_target);
        dfg.link_input(negate, ColumnRef::new(src, 0));
        dfg.link_input(negate, ColumnRef::new(src, 0));
        dfg.views[negate].header.columns.push(Column::new(negate, 1, 0, crate::column::Type::Int64));
        dfg.views[negate].header.columns.push(Column::new(negate, 1, 1, crate::column::Type::Int64));

        let consumer = dfg.alloc_view(ViewKind::Tuple(crate::view::Tuple));
        dfg.link_input(consumer, ColumnRef::new(negate, 1));
        dfg.views[consumer].header.columns.push(Column::new(consumer, 1, 0, crate::column::Type::Int64));

        assert!(canonicalize(&mut dfg, negate));
        assert!(!dfg.views[negate].is_live());

        let new_negate = dfg.views[consumer].header.input_columns[0].view;
        assert_eq!(dfg.views[new_negate].header.input_columns.len(), 1);
        assert_eq!(dfg.views[consumer].header.input_columns[0].index, 0);
    }
}
