//! KVINDEX canonicalization (§4.3): degenerates to a forwarding TUPLE
//! once no consumer reads any of its value columns — the index structure
//! itself becomes pointless, only the key tuple matters downstream — and
//! propagates constants through key columns. Value columns stay opaque:
//! the merge functor may re-interpret a stored value across updates, so
//! a value column can never be folded to a compile-time constant the way
//! a key column can.

use crate::arena::{Id, WeakRef};
use crate::column::ColumnRef;
use crate::dfg::Dfg;
use crate::view::{SelectSource, View};

pub fn canonicalize(dfg: &mut Dfg, id: Id<View>) -> bool {
    let Some(kv) = dfg.views[id].as_kvindex().cloned() else {
        return false;
    };

    if degenerate_if_values_unused(dfg, id, &kv) {
        return true;
    }
    propagate_key_constants(dfg, id)
}

fn degenerate_if_values_unused(dfg: &mut Dfg, id: Id<View>, kv: &crate::view::KvIndex) -> bool {
    let key_arity = dfg.views[id].header.input_columns.len();
    let arity = dfg.views[id].header.columns.len();

    let any_value_used = (key_arity..arity).any(|i| super::is_output_used(dfg, id, i));
    if any_value_used || kv.values.is_empty() {
        return false;
    }

    let inputs = dfg.views[id].header.input_columns.clone();
    let tup = super::forward_sources_as_tuple(dfg, &inputs);
    dfg.replace_all_uses_with(id, tup);
    true
}

/// A constant key column partitions the index along exactly one value
/// regardless of what else feeds it, so its output is known statically
/// (§4.3 KVINDEX: "propagate constants through keys only").
fn propagate_key_constants(dfg: &mut Dfg, id: Id<View>) -> bool {
    let key_arity = dfg.views[id].header.input_columns.len();
    let mut changed = false;
    for i in 0..key_arity {
        if dfg.views[id].header.columns[i].constant_of.is_some() {
            continue;
        }
        let key_ref = dfg.views[id].header.input_columns[i];
        if let Some(source) = constant_source(dfg, key_ref) {
            dfg.views[id].header.columns[i].constant_of = Some(source);
            changed = true;
        }
    }
    if changed {
        dfg.invalidate(id);
    }
    changed
}

fn constant_source(dfg: &Dfg, col: ColumnRef) -> Option<WeakRef<View>> {
    let column = &dfg.views[col.view].header.columns[col.index];
    if let Some(existing) = &column.constant_of {
        return Some(*existing);
    }
    if let Some(sel) = dfg.views[col.view].as_select() {
        if let SelectSource::Constant(vals) = &sel.source {
            if vals.get(col.index).is_some() {
                return Some(WeakRef::new(col.view));
            }
        }
    }
    None
}
