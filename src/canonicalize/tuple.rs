//! TUPLE canonicalization (§4.3): drops unused outputs, and degenerates
//! to its predecessor when it is a pure pass-through of that
//! predecessor's own columns in that predecessor's own order.

use crate::arena::Id;
use crate::column::Column;
use crate::dfg::Dfg;
use crate::view::{Tuple, View, ViewKind};

pub fn canonicalize(dfg: &mut Dfg, id: Id<View>) -> bool {
    if let Some(pred) = forwards_one_predecessor_in_order(dfg, id) {
        dfg.replace_all_uses_with(id, pred);
        return true;
    }
    narrow_unused_outputs(dfg, id)
}

fn forwards_one_predecessor_in_order(dfg: &Dfg, id: Id<View>) -> Option<Id<View>> {
    let inputs = &dfg.views[id].header.input_columns;
    if inputs.is_empty() || !dfg.views[id].header.attached_columns.is_empty() {
        return None;
    }
    let pred = inputs[0].view;
    if dfg.views[pred].header.columns.len() != inputs.len() {
        return None;
    }
    for (idx, col) in inputs.iter().enumerate() {
        if col.view != pred || col.index != idx {
            return None;
        }
    }
    Some(pred)
}

fn narrow_unused_outputs(dfg: &mut Dfg, id: Id<View>) -> bool {
    let arity = dfg.views[id].header.columns.len();
    let keep: Vec<usize> = (0..arity).filter(|&i| super::is_output_used(dfg, id, i)).collect();
    if keep.len() == arity || keep.is_empty() {
        return false;
    }

    let inputs = dfg.views[id].header.input_columns.clone();
    let new_tup = dfg.alloc_view(ViewKind::Tuple(Tuple));
    let mut remap = vec![0usize; arity];
    for (new_index, &old_index) in keep.iter().enumerate() {
        let src = inputs[old_index];
        dfg.link_input(new_tup, src);
        let col = dfg.views[src.view].header.columns[src.index].clone();
        let mut new_col = Column::new(new_tup, col.logical_id, new_index, col.ty.clone());
        new_col.source_var = col.source_var.clone();
        dfg.views[new_tup].header.columns.push(new_col);
        remap[old_index] = new_index;
    }
    dfg.replace_all_uses_with_remap(id, new_tup, &remap);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnRef;
    use crate::view::{Select, SelectSource};

    fn select_with_arity(dfg: &mut Dfg, arity: usize) -> Id<View> {
        let sel = dfg.alloc_view(ViewKind::Select(Select::new(SelectSource::Constant(vec![]))));
        for i in 0..arity {
            dfg.views[sel]
                .header
                .columns
                .push(Column::new(sel, i as u32, i, crate::column::Type::Int64));
        }
        sel
    }

    #[test]
    fn tuple_forwarding_predecessor_in_order_collapses() {
        let mut dfg = Dfg::new();
        let sel = select_with_arity(&mut dfg, 2);
        let tup = dfg.alloc_view(ViewKind::Tuple(Tuple));
        for i in 0..2 {
            dfg.link_input(tup, ColumnRef::new(sel, i));
            dfg.views[tup].header.columns.push(Column::new(tup, i as u32, i, crate::column::Type::Int64));
        }
        assert!(canonicalize(&mut dfg, tup));
        assert!(!dfg.views[tup].is_live());
    }

    #[test]
    fn reordered_tuple_is_not_collapsed() {
        let mut dfg = Dfg::new();
        let sel = select_with_arity(&mut dfg, 2);
        let tup = dfg.alloc_view(ViewKind::Tuple(Tuple));
        dfg.link_input(tup, ColumnRef::new(sel, 1));
        dfg.link_input(tup, ColumnRef::new(sel, 0));
        dfg.views[tup].header.columns.push(Column::new(tup, 1, 0, crate::column::Type::Int64));
        dfg.views[tup].header.columns.push(Column::new(tup, 0, 1, crate::column::Type::Int64));
        assert!(!canonicalize(&mut dfg, tup));
        assert!(dfg.views[tup].is_live());
    }
}
