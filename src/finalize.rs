//! Finalization (§4.8, §6): relabels column ids onto the stable per-scope
//! numbering external consumers see, computes predecessor/successor links,
//! and freezes the result into an immutable [`FinalizedDfg`].
//!
//! Grounded on the teacher's `sea_of_nodes`-style "freeze into a read-only
//! schedule" step: the mutable arena stays behind, and downstream
//! consumers only ever see the frozen snapshot this module builds.

use std::collections::HashMap;

use crate::arena::Id;
use crate::column::{ColumnRef, Type};
use crate::condition::Condition;
use crate::config::FixpointConfig;
use crate::dfg::Dfg;
use crate::relation::Constant;
use crate::view::{Join, JoinOutputSource, View, ViewKind};

/// One finalized column: its stable id, type, position, and constant
/// resolution if statically known (§6 "per column, its id, type, index,
/// and constant resolution").
#[derive(Debug, Clone)]
pub struct FinalizedColumn {
    pub id: u32,
    pub index: usize,
    pub ty: Type,
    pub constant: Option<Constant>,
}

/// One finalized view: its kind, columns, links to other views, and the
/// flags later passes computed (§6 "per view, its column list, input
/// columns, predecessors, successors, group/induction ids, differential
/// flags").
#[derive(Debug, Clone)]
pub struct FinalizedView {
    pub id: Id<View>,
    pub kind: &'static str,
    pub columns: Vec<FinalizedColumn>,
    pub input_columns: Vec<ColumnRef>,
    pub attached_columns: Vec<ColumnRef>,
    pub predecessors: Vec<Id<View>>,
    pub successors: Vec<Id<View>>,
    pub group_ids: Vec<u32>,
    pub merge_set: Option<u32>,
    pub induction_depth: Option<u32>,
    pub requires_storage: bool,
    pub can_receive_deletions: bool,
    pub can_produce_deletions: bool,
}

/// One finalized condition: its setter and tester view lists (§6 "per
/// condition, its setter and tester view lists").
#[derive(Debug, Clone)]
pub struct FinalizedCondition {
    pub id: Id<Condition>,
    pub setter: Option<Id<View>>,
    pub positive_testers: Vec<Id<View>>,
    pub negative_testers: Vec<Id<View>>,
}

/// The immutable output handed to back-ends (§6). Nothing here borrows
/// from the [`Dfg`] that produced it — the finalizer copies every field
/// it exposes, since the arena it was built from is dropped once
/// compilation returns.
#[derive(Debug, Clone, Default)]
pub struct FinalizedDfg {
    views: Vec<FinalizedView>,
    conditions: Vec<FinalizedCondition>,
}

impl FinalizedDfg {
    pub fn views(&self) -> impl Iterator<Item = &FinalizedView> {
        self.views.iter()
    }

    pub fn views_of_kind(&self, kind: &str) -> impl Iterator<Item = &FinalizedView> + '_ {
        self.views.iter().filter(move |v| v.kind == kind)
    }

    pub fn view(&self, id: Id<View>) -> Option<&FinalizedView> {
        self.views.iter().find(|v| v.id == id)
    }

    pub fn conditions(&self) -> impl Iterator<Item = &FinalizedCondition> {
        self.conditions.iter()
    }
}

/// Runs column-id finalization and freezes `dfg` into a [`FinalizedDfg`]
/// (§4.8, §6). Only live views are included; dead views (already swept by
/// the optimizer) carry no externally useful information.
pub fn finalize(dfg: &mut Dfg, config: &FixpointConfig) -> FinalizedDfg {
    finalize_column_ids(dfg, config.max_column_id_iterations);
    build_finalized_dfg(dfg)
}

/// §4.8: relabels `Column::logical_id` on every live view so that within a
/// scope, two columns share an id iff they are equal at runtime. Iterated
/// to fixpoint over views in depth order, since a cyclic induction graph
/// can require more than one pass before every inherited id has settled.
fn finalize_column_ids(dfg: &mut Dfg, max_iterations: usize) {
    let mut order: Vec<Id<View>> = dfg.views.ids().filter(|&id| dfg.views[id].is_live()).collect();
    order.sort_by_key(|&id| dfg.depth(id));

    let mut assigned: HashMap<(Id<View>, usize), u32> = HashMap::new();
    let mut next_id = 0u32;

    for _ in 0..max_iterations.max(1) {
        let mut changed = false;
        for &id in &order {
            changed |= finalize_view_columns(dfg, id, &mut assigned, &mut next_id);
        }
        if !changed {
            break;
        }
    }

    for ((view, index), id) in assigned {
        dfg.views[view].header.columns[index].logical_id = id;
    }
}

fn fresh(next_id: &mut u32) -> u32 {
    let id = *next_id;
    *next_id += 1;
    id
}

/// Assigns ids for every output column of `id` per its kind's §4.8 rule,
/// returning whether any entry changed from a previous iteration.
fn finalize_view_columns(dfg: &Dfg, id: Id<View>, assigned: &mut HashMap<(Id<View>, usize), u32>, next_id: &mut u32) -> bool {
    let view = &dfg.views[id];
    let arity = view.header.columns.len();
    let mut changed = false;

    let mut set = |assigned: &mut HashMap<(Id<View>, usize), u32>, index: usize, value: u32| {
        let slot = assigned.entry((id, index)).or_insert(value);
        if *slot != value {
            *slot = value;
            changed = true;
        }
    };

    match &view.kind {
        ViewKind::Select(_) | ViewKind::Merge(_) => {
            for index in 0..arity {
                if !assigned.contains_key(&(id, index)) {
                    let value = fresh(next_id);
                    set(assigned, index, value);
                }
            }
        }
        ViewKind::Tuple(_) | ViewKind::Insert(_) => {
            for index in 0..arity {
                let source = view.header.input_columns.get(index).copied();
                let value = source
                    .and_then(|c| assigned.get(&(c.view, c.index)).copied())
                    .unwrap_or_else(|| fresh(next_id));
                set(assigned, index, value);
            }
        }
        ViewKind::Join(join) => {
            finalize_join_columns(join, assigned, next_id, &mut set);
        }
        ViewKind::Compare(compare) => {
            if compare.op.unifies_outputs() {
                // Output 0 is the unified equality column; the rest are
                // the attached pass-through columns.
                let source = view.header.input_columns.first().copied();
                let value = source
                    .and_then(|c| assigned.get(&(c.view, c.index)).copied())
                    .unwrap_or_else(|| fresh(next_id));
                set(assigned, 0, value);
                finalize_attached_passthrough(view, 1, assigned, next_id, &mut set);
            } else {
                for (index, source) in view.header.input_columns.iter().enumerate().take(2) {
                    let value = assigned.get(&(source.view, source.index)).copied().unwrap_or_else(|| fresh(next_id));
                    set(assigned, index, value);
                }
                finalize_attached_passthrough(view, 2, assigned, next_id, &mut set);
            }
        }
        ViewKind::Map(map) => {
            for (index, binding) in map.bindings.iter().enumerate() {
                let value = match binding {
                    crate::view::ParamBinding::Bound => view
                        .header
                        .input_columns
                        .get(index)
                        .and_then(|c| assigned.get(&(c.view, c.index)).copied())
                        .unwrap_or_else(|| fresh(next_id)),
                    crate::view::ParamBinding::Free => *assigned.get(&(id, index)).unwrap_or(&u32::MAX),
                };
                let value = if value == u32::MAX { fresh(next_id) } else { value };
                set(assigned, index, value);
            }
            finalize_attached_passthrough(view, map.bindings.len(), assigned, next_id, &mut set);
        }
        ViewKind::Aggregate(agg) => {
            // Group-by outputs carry the same runtime value as their
            // source, so they inherit; the functor's own summary/reduced
            // outputs are genuinely new values, so they get fresh ids —
            // §4.8 does not name AGGREGATE explicitly, so this follows
            // the same "inherits iff forwarding, fresh iff producing" rule
            // it states for every other kind.
            let mut index = 0usize;
            for source in &agg.group_by_columns {
                let value = assigned.get(&(source.view, source.index)).copied().unwrap_or_else(|| fresh(next_id));
                set(assigned, index, value);
                index += 1;
            }
            for _ in &agg.aggregated_columns {
                if !assigned.contains_key(&(id, index)) {
                    let value = fresh(next_id);
                    set(assigned, index, value);
                }
                index += 1;
            }
        }
        ViewKind::KvIndex(kv) => {
            // Key columns (header input_columns) inherit; value columns
            // (one per `ValueColumn`, attached after the keys) invent.
            let num_keys = view.header.input_columns.len();
            for (index, source) in view.header.input_columns.iter().enumerate().take(num_keys) {
                let value = assigned.get(&(source.view, source.index)).copied().unwrap_or_else(|| fresh(next_id));
                set(assigned, index, value);
            }
            for offset in 0..kv.values.len() {
                let index = num_keys + offset;
                if index >= arity {
                    break;
                }
                if !assigned.contains_key(&(id, index)) {
                    let value = fresh(next_id);
                    set(assigned, index, value);
                }
            }
        }
        ViewKind::Negate(_) => {
            // A NEGATE's first columns are its key (`input_columns`)
            // probe values, carried through unchanged; the rest are the
            // surviving `attached_columns` context from the admitted view.
            for (index, source) in view.header.input_columns.iter().enumerate() {
                let value = assigned.get(&(source.view, source.index)).copied().unwrap_or_else(|| fresh(next_id));
                set(assigned, index, value);
            }
            finalize_attached_passthrough(view, view.header.input_columns.len(), assigned, next_id, &mut set);
        }
    }

    changed
}

fn finalize_join_columns(
    join: &Join,
    assigned: &mut HashMap<(Id<View>, usize), u32>,
    next_id: &mut u32,
    set: &mut impl FnMut(&mut HashMap<(Id<View>, usize), u32>, usize, u32),
) {
    for (index, source) in join.out_to_in.iter().enumerate() {
        match source {
            JoinOutputSource::Pivot(cols) => {
                let existing = cols.iter().find_map(|c| assigned.get(&(c.view, c.index)).copied());
                let value = existing.unwrap_or_else(|| fresh(next_id));
                set(assigned, index, value);
            }
            JoinOutputSource::NonPivot(source) => {
                let value = assigned.get(&(source.view, source.index)).copied().unwrap_or_else(|| fresh(next_id));
                set(assigned, index, value);
            }
        }
    }
}

fn finalize_attached_passthrough(
    view: &View,
    start_index: usize,
    assigned: &mut HashMap<(Id<View>, usize), u32>,
    next_id: &mut u32,
    set: &mut impl FnMut(&mut HashMap<(Id<View>, usize), u32>, usize, u32),
) {
    for (offset, source) in view.header.attached_columns.iter().enumerate() {
        let index = start_index + offset;
        if index >= view.header.columns.len() {
            break;
        }
        let value = assigned.get(&(source.view, source.index)).copied().unwrap_or_else(|| fresh(next_id));
        set(assigned, index, value);
    }
}

fn build_finalized_dfg(dfg: &mut Dfg) -> FinalizedDfg {
    let mut views = Vec::new();
    for id in dfg.views.ids().collect::<Vec<_>>() {
        if !dfg.views[id].is_live() {
            continue;
        }
        let predecessors = dfg.predecessors(id);
        let successors = dfg.successors(id);
        let view = &dfg.views[id];
        let columns = view
            .header
            .columns
            .iter()
            .map(|c| FinalizedColumn {
                id: c.logical_id,
                index: c.index,
                ty: c.ty.clone(),
                constant: constant_resolution(dfg, c.constant_of.as_ref().map(|w| w.id())),
            })
            .collect();

        let (merge_set, induction_depth, requires_storage) = match &view.kind {
            ViewKind::Merge(m) => (m.merge_set, if m.is_inductive { Some(m.induction_depth) } else { None }, m.requires_storage),
            _ => (None, None, false),
        };

        views.push(FinalizedView {
            id,
            kind: view.kind.name(),
            columns,
            input_columns: view.header.input_columns.clone(),
            attached_columns: view.header.attached_columns.clone(),
            predecessors,
            successors,
            group_ids: view.header.group_ids.clone(),
            merge_set,
            induction_depth,
            requires_storage,
            can_receive_deletions: view.header.can_receive_deletions,
            can_produce_deletions: view.header.can_produce_deletions,
        });
    }

    let mut conditions = Vec::new();
    for id in dfg.conditions.ids() {
        let cond = &dfg.conditions[id];
        conditions.push(FinalizedCondition {
            id,
            setter: cond.setter,
            positive_testers: cond.positive_testers.iter().map(|w| w.id()).collect(),
            negative_testers: cond.negative_testers.iter().map(|w| w.id()).collect(),
        });
    }

    FinalizedDfg { views, conditions }
}

fn constant_resolution(dfg: &Dfg, constant_producer: Option<Id<View>>) -> Option<Constant> {
    let producer = constant_producer?;
    if !dfg.views[producer].is_live() {
        return None;
    }
    match &dfg.views[producer].kind {
        ViewKind::Select(s) => match &s.source {
            crate::view::SelectSource::Constant(values) => values.first().cloned(),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::Column;
    use crate::config::FixpointConfig;
    use crate::view::{Select, SelectSource, Tuple, ViewKind};

    #[test]
    fn select_and_tuple_get_fresh_and_inherited_ids() {
        let mut dfg = Dfg::new();
        let sel = dfg.alloc_view(ViewKind::Select(Select::new(SelectSource::Constant(vec![Constant::Int(7)]))));
        dfg.views[sel].header.columns.push(Column::new(sel, 999, 0, Type::Int64));

        let tup = dfg.alloc_view(ViewKind::Tuple(Tuple));
        dfg.link_input(tup, ColumnRef::new(sel, 0));
        dfg.views[tup].header.columns.push(Column::new(tup, 999, 0, Type::Int64));

        let finalized = finalize(&mut dfg, &FixpointConfig::default());
        let sel_view = finalized.view(sel).unwrap();
        let tup_view = finalized.view(tup).unwrap();
        assert_eq!(sel_view.columns[0].id, tup_view.columns[0].id);
        assert_eq!(sel_view.columns[0].constant, Some(Constant::Int(7)));
    }

    #[test]
    fn compare_equality_unifies_into_one_output_id() {
        use crate::view::{Compare, CompareOp};

        let mut dfg = Dfg::new();
        let a = dfg.alloc_view(ViewKind::Select(Select::new(SelectSource::Constant(vec![]))));
        dfg.views[a].header.columns.push(Column::new(a, 1, 0, Type::Int64));
        let b = dfg.alloc_view(ViewKind::Select(Select::new(SelectSource::Constant(vec![]))));
        dfg.views[b].header.columns.push(Column::new(b, 2, 0, Type::Int64));

        let cmp = dfg.alloc_view(ViewKind::Compare(Compare::new(CompareOp::Eq)));
        dfg.link_input(cmp, ColumnRef::new(a, 0));
        dfg.link_input(cmp, ColumnRef::new(b, 0));
        dfg.views[cmp].header.columns.push(Column::new(cmp, 1, 0, Type::Int64));

        let finalized = finalize(&mut dfg, &FixpointConfig::default());
        let cmp_view = finalized.view(cmp).unwrap();
        assert_eq!(cmp_view.columns.len(), 1);
    }

    #[test]
    fn predecessors_and_successors_are_exposed() {
        let mut dfg = Dfg::new();
        let sel = dfg.alloc_view(ViewKind::Select(Select::new(SelectSource::Constant(vec![]))));
        dfg.views[sel].header.columns.push(Column::new(sel, 1, 0, Type::Int64));
        let tup = dfg.alloc_view(ViewKind::Tuple(Tuple));
        dfg.link_input(tup, ColumnRef::new(sel, 0));
        dfg.views[tup].header.columns.push(Column::new(tup, 1, 0, Type::Int64));

        let finalized = finalize(&mut dfg, &FixpointConfig::default());
        assert_eq!(finalized.view(tup).unwrap().predecessors, vec![sel]);
        assert_eq!(finalized.view(sel).unwrap().successors, vec![tup]);
    }
}
