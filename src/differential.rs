//! Differential-update classification (§4.7): a fixpoint pass computing
//! `can_receive_deletions`/`can_produce_deletions` on every live view.
//!
//! Grounded on the teacher's `boolean_specialization/mod.rs` — the
//! closest teacher analogue to "a fixpoint annotation pass selecting a
//! per-node flag" — repurposed here from semiring/provenance tagging to
//! differential-update flags.

use crate::arena::Id;
use crate::dfg::Dfg;
use crate::error::Diagnostics;
use crate::view::{View, ViewKind};

/// Runs the classification to a joint fixpoint, then checks declared
/// differential flags against the realized flow (§4.7 last paragraph).
pub fn classify(dfg: &mut Dfg, diagnostics: &mut Diagnostics) {
    reset(dfg);
    loop {
        let mut changed = false;
        for id in dfg.views.ids().collect::<Vec<_>>() {
            if !dfg.views[id].is_live() {
                continue;
            }
            if seed_can_produce(dfg, id) {
                changed = true;
            }
            if propagate_can_receive(dfg, id) {
                changed = true;
            }
            if apply_receive_implies_produce(dfg, id) {
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    check_declared_differential(dfg, diagnostics);
}

fn reset(dfg: &mut Dfg) {
    for id in dfg.views.ids().collect::<Vec<_>>() {
        dfg.views[id].header.can_receive_deletions = false;
        dfg.views[id].header.can_produce_deletions = false;
    }
}

/// §4.7 `can_produce_deletions` direct seeds: NEGATEs, KVINDEXes,
/// AGGREGATEs, impure MAPs, and any view tested by a condition.
fn seed_can_produce(dfg: &mut Dfg, id: Id<View>) -> bool {
    let should_set = matches!(
        dfg.views[id].kind,
        ViewKind::Negate(_) | ViewKind::KvIndex(_) | ViewKind::Aggregate(_)
    ) || matches!(&dfg.views[id].kind, ViewKind::Map(m) if m.is_impure)
        || !dfg.views[id].header.positive_conditions.is_empty()
        || !dfg.views[id].header.negative_conditions.is_empty();

    if should_set && !dfg.views[id].header.can_produce_deletions {
        dfg.views[id].header.can_produce_deletions = true;
        true
    } else {
        false
    }
}

/// §4.7 `can_receive_deletions`: reachable via retraction edges from (a)
/// SELECTs on differential messages, (b) conditional testers — already
/// folded into `can_produce_deletions` above, which this function also
/// treats as a receive source since a tester observes the condition's
/// retraction directly — and (c) any producer of deletions, propagated
/// forward along ordinary dataflow edges.
fn propagate_can_receive(dfg: &mut Dfg, id: Id<View>) -> bool {
    let mut should_set = is_differential_message_select(dfg, id)
        || !dfg.views[id].header.positive_conditions.is_empty()
        || !dfg.views[id].header.negative_conditions.is_empty();

    if !should_set {
        should_set = dfg.predecessors(id).iter().any(|&p| dfg.views[p].header.can_produce_deletions);
    }

    if should_set && !dfg.views[id].header.can_receive_deletions {
        dfg.views[id].header.can_receive_deletions = true;
        true
    } else {
        false
    }
}

fn is_differential_message_select(dfg: &Dfg, id: Id<View>) -> bool {
    let Some(sel) = dfg.views[id].as_select() else {
        return false;
    };
    match sel.source {
        crate::view::SelectSource::Io(io) => dfg.ios[io].declared_differential,
        _ => false,
    }
}

/// §8 testable property: `can_receive_deletions ⇒ can_produce_deletions`
/// after classification, except on IOs (the boundary where a retraction
/// may be observed without this crate needing to re-emit one itself).
fn apply_receive_implies_produce(dfg: &mut Dfg, id: Id<View>) -> bool {
    if !dfg.views[id].header.can_receive_deletions || dfg.views[id].header.can_produce_deletions {
        return false;
    }
    if is_io_boundary(dfg, id) {
        return false;
    }
    dfg.views[id].header.can_produce_deletions = true;
    true
}

fn is_io_boundary(dfg: &Dfg, id: Id<View>) -> bool {
    match &dfg.views[id].kind {
        ViewKind::Select(s) => s.is_external(),
        ViewKind::Insert(i) => matches!(i.target, crate::view::InsertTarget::Io(_)),
        _ => false,
    }
}

/// §4.7 last paragraph: a message declared non-differential whose INSERT
/// nonetheless ends up `can_produce_deletions` is a semantic mismatch.
fn check_declared_differential(dfg: &Dfg, diagnostics: &mut Diagnostics) {
    for id in dfg.views.ids() {
        if !dfg.views[id].is_live() {
            continue;
        }
        let Some(insert) = dfg.views[id].as_insert() else {
            continue;
        };
        let crate::view::InsertTarget::Io(io) = insert.target else {
            continue;
        };
        if dfg.ios[io].declared_differential {
            continue;
        }
        if dfg.views[id].header.can_produce_deletions {
            diagnostics.report(format!(
                "message `{}` is not declared @differential but its realized flow produces deletions",
                dfg.ios[io].name
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::Column;
    use crate::relation::{Io, IoDirection};
    use crate::view::{Insert, InsertTarget, Negate, Select, SelectSource, Tuple};

    #[test]
    fn negate_produces_deletions_and_its_consumer_receives_them() {
        let mut dfg = Dfg::new();
        let target = dfg.alloc_view(ViewKind::Select(Select::new(SelectSource::Constant(vec![]))));
        let carried = dfg.alloc_view(ViewKind::Select(Select::new(SelectSource::Constant(vec![]))));
        dfg.views[carried].header.columns.push(Column::new(carried, 1, 0, crate::column::Type::Int64));

        let negate = dfg.alloc_view(ViewKind::Negate(Negate::new(target)));
        dfg.link_negated_view(negate, target);
        dfg.link_attached(negate, crate::column::ColumnRef::new(carried, 0));
        dfg.views[negate].header.columns.push(Column::new(negate, 1, 0, crate::column::Type::Int64));

        let tup = dfg.alloc_view(ViewKind::Tuple(Tuple));
        dfg.link_input(tup, crate::column::ColumnRef::new(negate, 0));
        dfg.views[tup].header.columns.push(Column::new(tup, 1, 0, crate::column::Type::Int64));

        let mut diags = Diagnostics::new();
        classify(&mut dfg, &mut diags);

        assert!(dfg.views[negate].header.can_produce_deletions);
        assert!(dfg.views[tup].header.can_receive_deletions);
        assert!(dfg.views[tup].header.can_produce_deletions);
    }

    #[test]
    fn non_differential_message_with_deletions_is_diagnosed() {
        let mut dfg = Dfg::new();
        let target = dfg.alloc_view(ViewKind::Select(Select::new(SelectSource::Constant(vec![]))));
        let negate = dfg.alloc_view(ViewKind::Negate(Negate::new(target)));
        dfg.link_negated_view(negate, target);

        let io = dfg.ios.alloc(Io {
            name: "out".into(),
            arity: 0,
            direction: Some(IoDirection::Transmit),
            selects: Vec::new(),
            inserts: Vec::new(),
            declared_differential: false,
        });
        let ins = dfg.alloc_view(ViewKind::Insert(Insert::new(InsertTarget::Io(io))));
        dfg.link_input(ins, crate::column::ColumnRef::new(negate, 0));
        dfg.views[negate].header.columns.push(Column::new(negate, 1, 0, crate::column::Type::Int64));

        let mut diags = Diagnostics::new();
        classify(&mut dfg, &mut diags);
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn differential_io_select_seeds_can_receive() {
        let mut dfg = Dfg::new();
        let io = dfg.ios.alloc(Io {
            name: "in".into(),
            arity: 1,
            direction: Some(IoDirection::Receive),
            selects: Vec::new(),
            inserts: Vec::new(),
            declared_differential: true,
        });
        let sel = dfg.alloc_view(ViewKind::Select(Select::new(SelectSource::Io(io))));
        dfg.views[sel].header.columns.push(Column::new(sel, 1, 0, crate::column::Type::Int64));

        let mut diags = Diagnostics::new();
        classify(&mut dfg, &mut diags);

        assert!(dfg.views[sel].header.can_receive_deletions);
        // IOs are the stated exception: receive need not imply produce.
        assert!(!dfg.views[sel].header.can_produce_deletions);
    }
}
