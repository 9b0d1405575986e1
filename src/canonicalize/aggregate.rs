//! AGGREGATE canonicalization (§4.3): canonicalizes group-by columns by
//! dropping ones already known constant and folding ones that repeat an
//! earlier group-by column's source — two GROUP-BY references to the
//! same value always partition identically, so the later one is
//! redundant output, not a distinct grouping key.

use crate::arena::Id;
use crate::column::{Column, ColumnRef};
use crate::dfg::Dfg;
use crate::view::{Aggregate, Tuple, View, ViewKind};

pub fn canonicalize(dfg: &mut Dfg, id: Id<View>) -> bool {
    let Some(agg) = dfg.views[id].as_aggregate().cloned() else {
        return false;
    };
    drop_constant_group_by(dfg, id, &agg) || fold_duplicate_group_by(dfg, id, &agg)
}

/// Two GROUP-BY columns reading the same source column partition
/// identically, so the later one is folded into the earlier one (§4.3
/// AGGREGATE: "canonicalize group-by columns (drop duplicates..)").
fn fold_duplicate_group_by(dfg: &mut Dfg, id: Id<View>, agg: &Aggregate) -> bool {
    let mut found = None;
    'outer: for (j, &col_j) in agg.group_by_columns.iter().enumerate() {
        for (i, &col_i) in agg.group_by_columns[..j].iter().enumerate() {
            if col_i == col_j {
                found = Some((i, j));
                break 'outer;
            }
        }
    }
    let Some((keep_pos, drop_pos)) = found else {
        return false;
    };

    let mut new_group_by = agg.group_by_columns.clone();
    new_group_by.remove(drop_pos);

    let new_agg = dfg.alloc_view(ViewKind::Aggregate(Aggregate {
        group_by_columns: Vec::new(),
        config_columns: agg.config_columns.clone(),
        aggregated_columns: Vec::new(),
        functor: agg.functor.clone(),
        group_id: agg.group_id,
    }));
    for &cref in &new_group_by {
        dfg.link_input(new_agg, cref);
    }
    for &cref in &agg.config_columns {
        dfg.link_attached(new_agg, cref);
    }
    for &cref in &agg.aggregated_columns {
        dfg.link_attached(new_agg, cref);
    }
    if let ViewKind::Aggregate(inner) = &mut dfg.views[new_agg].kind {
        inner.group_by_columns = new_group_by;
        inner.aggregated_columns = agg.aggregated_columns.clone();
    }
    dfg.views[new_agg].header.add_group_id(agg.group_id);

    let old_columns = dfg.views[id].header.columns.clone();
    let surviving: Vec<&Column> = old_columns
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != drop_pos)
        .map(|(_, c)| c)
        .collect();
    for (i, col) in surviving.into_iter().enumerate() {
        let mut new_col = Column::new(new_agg, col.logical_id, i, col.ty.clone());
        new_col.source_var = col.source_var.clone();
        dfg.views[new_agg].header.columns.push(new_col);
    }

    // `keep_pos < drop_pos` by construction, so it survives at the same
    // index in `new_agg`'s group-by prefix.
    let tup = dfg.alloc_view(ViewKind::Tuple(Tuple));
    let mut new_agg_cursor = 0usize;
    for (out_index, old_col) in old_columns.iter().enumerate() {
        if out_index == drop_pos {
            dfg.link_input(tup, ColumnRef::new(new_agg, keep_pos));
            let src = dfg.views[new_agg].header.columns[keep_pos].clone();
            let mut col = Column::new(tup, src.logical_id, out_index, src.ty.clone());
            col.source_var = old_col.source_var.clone();
            dfg.views[tup].header.columns.push(col);
        } else {
            dfg.link_input(tup, ColumnRef::new(new_agg, new_agg_cursor));
            let src = dfg.views[new_agg].header.columns[new_agg_cursor].clone();
            let mut col = Column::new(tup, src.logical_id, out_index, src.ty.clone());
            col.source_var = src.source_var.clone();
            dfg.views[tup].header.columns.push(col);
            new_agg_cursor += 1;
        }
    }

    dfg.replace_all_uses_with(id, tup);
    true
}

fn drop_constant_group_by(dfg: &mut Dfg, id: Id<View>, agg: &Aggregate) -> bool {
    let Some(drop_pos) = agg
        .group_by_columns
        .iter()
        .position(|&col_ref| super::constant_value(dfg, col_ref).is_some())
    else {
        return false;
    };

    let dropped_ref = agg.group_by_columns[drop_pos];
    let constant = super::constant_value(dfg, dropped_ref).expect("checked above");
    let const_col_ty = dfg.views[dropped_ref.view].header.columns[dropped_ref.index].ty.clone();

    let mut new_group_by = agg.group_by_columns.clone();
    new_group_by.remove(drop_pos);

    let new_agg = dfg.alloc_view(ViewKind::Aggregate(Aggregate {
        group_by_columns: Vec::new(),
        config_columns: agg.config_columns.clone(),
        aggregated_columns: Vec::new(),
        functor: agg.functor.clone(),
        group_id: agg.group_id,
    }));
    for &cref in &new_group_by {
        dfg.link_input(new_agg, cref);
    }
    for &cref in &agg.config_columns {
        dfg.link_attached(new_agg, cref);
    }
    for &cref in &agg.aggregated_columns {
        dfg.link_attached(new_agg, cref);
    }
    if let ViewKind::Aggregate(inner) = &mut dfg.views[new_agg].kind {
        inner.group_by_columns = new_group_by;
        inner.aggregated_columns = agg.aggregated_columns.clone();
    }
    dfg.views[new_agg].header.add_group_id(agg.group_id);

    let old_columns = dfg.views[id].header.columns.clone();
    let surviving: Vec<&Column> = old_columns
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != drop_pos)
        .map(|(_, c)| c)
        .collect();
    for (i, col) in surviving.into_iter().enumerate() {
        let mut new_col = Column::new(new_agg, col.logical_id, i, col.ty.clone());
        new_col.source_var = col.source_var.clone();
        dfg.views[new_agg].header.columns.push(new_col);
    }

    let const_sel = dfg.alloc_view(ViewKind::Select(crate::view::Select::new(
        crate::view::SelectSource::Constant(vec![constant]),
    )));
    let fresh_id = dfg.fresh_logical_id();
    dfg.views[const_sel].header.columns.push(Column::new(const_sel, fresh_id, 0, const_col_ty.clone()));

    let tup = dfg.alloc_view(ViewKind::Tuple(Tuple));
    let mut new_agg_cursor = 0usize;
    for (out_index, old_col) in old_columns.iter().enumerate() {
        if out_index == drop_pos {
            dfg.link_input(tup, ColumnRef::new(const_sel, 0));
            let mut col = Column::new(tup, old_col.logical_id, out_index, old_col.ty.clone());
            col.source_var = old_col.source_var.clone();
            col.constant_of = Some(crate::arena::WeakRef::new(const_sel));
            dfg.views[tup].header.columns.push(col);
        } else {
            dfg.link_input(tup, ColumnRef::new(new_agg, new_agg_cursor));
            let src = dfg.views[new_agg].header.columns[new_agg_cursor].clone();
            let mut col = Column::new(tup, src.logical_id, out_index, src.ty.clone());
            col.source_var = src.source_var.clone();
            dfg.views[tup].header.columns.push(col);
            new_agg_cursor += 1;
        }
    }

    dfg.replace_all_uses_with(id, tup);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::Column as Col;
    use crate::relation::Constant;
    use crate::view::{FunctorRef, Select, SelectSource};

    #[test]
    fn constant_group_by_column_is_dropped() {
        let mut dfg = Dfg::new();
        let konst = dfg.alloc_view(ViewKind::Select(Select::new(SelectSource::Constant(vec![Constant::Int(7)]))));
        dfg.views[konst].header.columns.push(Col::new(konst, 1, 0, crate::column::Type::Int64));
        let src = dfg.alloc_view(ViewKind::Select(Select::new(SelectSource::Constant(vec![]))));
        dfg.views[src].header.columns.push(Col::new(src, 2, 0, crate::column::Type::Int64));

        let agg = dfg.alloc_view(ViewKind::Aggregate(Aggregate::new(FunctorRef::new("count".into()), 1)));
        dfg.link_input(agg, ColumnRef::new(konst, 0));
        dfg.link_attached(agg, ColumnRef::new(src, 0));
        if let ViewKind::Aggregate(inner) = &mut dfg.views[agg].kind {
            inner.group_by_columns = vec![ColumnRef::new(konst, 0)];
            inner.aggregated_columns = vec![ColumnRef::new(src, 0)];
        }
        dfg.views[agg].header.columns.push(Col::new(agg, 1, 0, crate::column::Type::Int64));
        dfg.views[agg].header.columns.push(Col::new(agg, 3, 1, crate::column::Type::Int64));

        assert!(canonicalize(&mut dfg, agg));
        assert!(!dfg.views[agg].is_live());
    }

    #[test]
    fn duplicate_group_by_column_is_folded() {
        let mut dfg = Dfg::new();
        let src = dfg.alloc_view(ViewKind::Select(Select::new(SelectSource::Constant(vec![]))));
        dfg.views[src].header.columns.push(Col::new(src, 1, 0, crate::column::Type::Int64));
        let sum_src = dfg.alloc_view(ViewKind::Select(Select::new(SelectSource::Constant(vec![]))));
        dfg.views[sum_src].header.columns.push(Col::new(sum_src, 2, 0, crate::column::Type::Int64));

        let agg = dfg.alloc_view(ViewKind::Aggregate(Aggregate::new(FunctorRef::new("sum".into()), 1)));
        dfg.link_input(agg, ColumnRef::new(src, 0));
        dfg.link_input(agg, ColumnRef::new(src, 0));
        dfg.link_attached(agg, ColumnRef::new(sum_src, 0));
        if let ViewKind::Aggregate(inner) = &mut dfg.views[agg].kind {
            inner.group_by_columns = vec![ColumnRef::new(src, 0), ColumnRef::new(src, 0)];
            inner.aggregated_columns = vec![ColumnRef::new(sum_src, 0)];
        }
        dfg.views[agg].header.columns.push(Col::new(agg, 1, 0, crate::column::Type::Int64));
        dfg.views[agg].header.columns.push(Col::new(agg, 1, 1, crate::column::Type::Int64));
        dfg.views[agg].header.columns.push(Col::new(agg, 3, 2, crate::column::Type::Int64));

        assert!(canonicalize(&mut dfg, agg));
        assert!(!dfg.views[agg].is_live());

        let tup = dfg.views.ids().find(|&v| dfg.views[v].as_tuple().is_some() && dfg.views[v].is_live()).unwrap();
        let new_agg = dfg.views[tup].header.input_columns[0].view;
        assert_eq!(dfg.views[new_agg].as_aggregate().unwrap().group_by_columns.len(), 1);
    }
}
