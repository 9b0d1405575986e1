//! Optional `SinkConditions` pass (§9 open question): pushes a view's own
//! tested conditions down onto a fresh duplicate of its predecessor
//! rather than the shared predecessor itself, so the gating check runs
//! as early as possible without perturbing the predecessor's other
//! consumers.
//!
//! Not part of the default pipeline (`CompilerConfig.enable_sink_conditions`
//! gates it) — preserved per the source's own note that it exists but is
//! never invoked from the main pipeline.

use crate::arena::Id;
use crate::column::ColumnRef;
use crate::dfg::Dfg;
use crate::view::{Tuple, View, ViewKind};

/// Sinks conditions once for every eligible live view. Returns the
/// number of views rewritten.
pub fn run(dfg: &mut Dfg) -> u32 {
    let mut rewritten = 0;
    let ids: Vec<Id<View>> = dfg.views.ids().collect();
    for id in ids {
        if sink_one(dfg, id) {
            rewritten += 1;
        }
    }
    rewritten
}

fn sink_one(dfg: &mut Dfg, id: Id<View>) -> bool {
    if !dfg.views[id].is_live() {
        return false;
    }
    if dfg.views[id].header.positive_conditions.is_empty() && dfg.views[id].header.negative_conditions.is_empty() {
        return false;
    }
    let Some(pred) = single_predecessor(dfg, id) else {
        return false;
    };

    let arity = dfg.views[pred].header.columns.len();
    let proxy = dfg.alloc_view(ViewKind::Tuple(Tuple));
    for i in 0..arity {
        dfg.link_input(proxy, ColumnRef::new(pred, i));
        let col = dfg.views[pred].header.columns[i].clone();
        let mut new_col = crate::column::Column::new(proxy, col.logical_id, i, col.ty.clone());
        new_col.source_var = col.source_var.clone();
        dfg.views[proxy].header.columns.push(new_col);
    }
    dfg.copy_tested_conditions(id, proxy);

    let inputs = dfg.views[id].header.input_columns.clone();
    let attached = dfg.views[id].header.attached_columns.clone();
    for (slot, cref) in inputs.iter().enumerate() {
        if cref.view == pred {
            dfg.views[id].header.input_columns[slot] = ColumnRef::new(proxy, cref.index);
        }
    }
    for (slot, cref) in attached.iter().enumerate() {
        if cref.view == pred {
            dfg.views[id].header.attached_columns[slot] = ColumnRef::new(proxy, cref.index);
        }
    }
    dfg.invalidate(id);
    true
}

/// The one predecessor every non-constant input/attached column of `id`
/// shares (§8 testable property), or `None` if there is more than one or
/// none at all.
fn single_predecessor(dfg: &Dfg, id: Id<View>) -> Option<Id<View>> {
    let view = &dfg.views[id];
    let mut preds = view.header.input_columns.iter().chain(view.header.attached_columns.iter()).map(|c| c.view);
    let first = preds.next()?;
    if preds.all(|p| p == first) {
        Some(first)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::Column;
    use crate::view::{Select, SelectSource};

    #[test]
    fn gated_view_gets_a_fresh_proxy_predecessor() {
        let mut dfg = Dfg::new();
        let sel = dfg.alloc_view(ViewKind::Select(Select::new(SelectSource::Constant(vec![]))));
        dfg.views[sel].header.columns.push(Column::new(sel, 1, 0, crate::column::Type::Int64));

        let tup = dfg.alloc_view(ViewKind::Tuple(Tuple));
        dfg.link_input(tup, ColumnRef::new(sel, 0));
        dfg.views[tup].header.columns.push(Column::new(tup, 1, 0, crate::column::Type::Int64));

        let cond = dfg.alloc_condition();
        dfg.views[tup].header.positive_conditions.push(cond);
        dfg.conditions[cond].add_positive_tester(tup);

        assert!(sink_one(&mut dfg, tup));
        let new_pred = dfg.views[tup].header.input_columns[0].view;
        assert_ne!(new_pred, sel);
        assert!(dfg.views[new_pred].header.positive_conditions.contains(&cond));
    }
}
