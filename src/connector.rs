//! Connector (§2 stage 3): wires every relation/io's SELECTs to a MERGE
//! over its own INSERTs, once all clauses in the module have been built.
//!
//! A single producer still goes through a MERGE rather than being wired
//! directly — the later canonicalizer's MERGE-degenerate-to-TUPLE rule
//! (§4.3) collapses the trivial case, so this pass never needs a special
//! single-producer branch. A declaration with `Mutable { merge_functor }`
//! params additionally gets a KVINDEX wrapped around its MERGE, with key
//! columns carried as `input_columns` and mutable columns carried as
//! `attached_columns` paired with a `ValueColumn`.

use crate::arena::Id;
use crate::ast::{Declaration, Module, ParamMode};
use crate::column::{Column, ColumnRef};
use crate::dfg::Dfg;
use crate::relation::{Io, Relation};
use crate::view::{FunctorRef, KvIndex, Merge, ValueColumn, View, ViewKind};

/// Connects every relation and io currently in `dfg` to its producers.
/// Call once, after every clause in `module` has been built via
/// [`crate::builder::build_clause`].
pub fn connect(dfg: &mut Dfg, module: &Module) {
    for id in dfg.relations.ids().collect::<Vec<_>>() {
        connect_relation(dfg, module, id);
    }
    for id in dfg.ios.ids().collect::<Vec<_>>() {
        connect_io(dfg, module, id);
    }
}

/// What a relation/io's SELECTs get redirected onto: a plain view, or a
/// KVINDEX whose output columns sit at different positions than the
/// relation's declared arity order (so a remap is needed alongside it).
enum Source {
    Plain(Id<View>),
    KvIndexed(Id<View>, Vec<usize>),
}

fn connect_relation(dfg: &mut Dfg, module: &Module, id: Id<Relation>) {
    let inserts = dfg.relations[id].inserts.clone();
    let selects = dfg.relations[id].selects.clone();
    if inserts.is_empty() || selects.is_empty() {
        return;
    }
    let decl = module.declaration(&dfg.relations[id].name).cloned();
    let source = build_source(dfg, &inserts, decl.as_ref());
    for sel in selects {
        wire_select(dfg, sel, &source);
    }
}

fn connect_io(dfg: &mut Dfg, module: &Module, id: Id<Io>) {
    let inserts = dfg.ios[id].inserts.clone();
    let selects = dfg.ios[id].selects.clone();
    if inserts.is_empty() || selects.is_empty() {
        return;
    }
    let decl = module.declaration(&dfg.ios[id].name).cloned();
    let source = build_source(dfg, &inserts, decl.as_ref());
    for sel in selects {
        wire_select(dfg, sel, &source);
    }
}

/// Each insert's producer is its single non-constant predecessor (I2):
/// the view feeding its first input column. A zero-arity head has no
/// input columns at all, so its own INSERT views stand in as producers
/// for the (arity-0) MERGE built over them.
fn producers_of(dfg: &Dfg, inserts: &[Id<View>]) -> Vec<Id<View>> {
    let producers: Vec<Id<View>> = inserts
        .iter()
        .filter_map(|&ins| dfg.views[ins].header.input_columns.first().map(|c| c.view))
        .collect();
    if producers.is_empty() {
        inserts.to_vec()
    } else {
        producers
    }
}

fn build_merge(dfg: &mut Dfg, producers: &[Id<View>]) -> Id<View> {
    let merge = dfg.alloc_view(ViewKind::Merge(Merge::new(producers.to_vec())));
    for &p in producers {
        dfg.link_merged_view(merge, p);
    }
    let arity = producers.first().map(|&p| dfg.views[p].header.columns.len()).unwrap_or(0);
    let sample = producers.first().copied();
    for idx in 0..arity {
        let ty = sample.map(|s| dfg.views[s].header.columns[idx].ty.clone()).unwrap();
        let logical_id = dfg.fresh_logical_id();
        dfg.views[merge].header.columns.push(Column::new(merge, logical_id, idx, ty));
    }
    merge
}

fn build_source(dfg: &mut Dfg, inserts: &[Id<View>], decl: Option<&Declaration>) -> Source {
    let producers = producers_of(dfg, inserts);
    let merge = build_merge(dfg, &producers);

    let mutable_positions: Vec<usize> = decl
        .map(|d| {
            d.params
                .iter()
                .enumerate()
                .filter(|(_, p)| matches!(p.mode, ParamMode::Mutable { .. }))
                .map(|(i, _)| i)
                .collect()
        })
        .unwrap_or_default();

    if mutable_positions.is_empty() {
        return Source::Plain(merge);
    }

    let arity = dfg.views[merge].header.columns.len();
    let values: Vec<ValueColumn> = mutable_positions
        .iter()
        .map(|&pos| match &decl.expect("mutable params require a declaration").params[pos].mode {
            ParamMode::Mutable { merge_functor } => ValueColumn::new(FunctorRef::new(merge_functor.clone())),
            _ => unreachable!("position filtered to Mutable above"),
        })
        .collect();

    let kv = dfg.alloc_view(ViewKind::KvIndex(KvIndex::new(values)));
    let mut remap = vec![0usize; arity];
    let mut next_index = 0usize;

    for pos in 0..arity {
        if mutable_positions.contains(&pos) {
            continue;
        }
        dfg.link_input(kv, ColumnRef::new(merge, pos));
        let src = dfg.views[merge].header.columns[pos].clone();
        dfg.views[kv].header.columns.push(Column::new(kv, src.logical_id, next_index, src.ty.clone()));
        remap[pos] = next_index;
        next_index += 1;
    }
    for &pos in &mutable_positions {
        dfg.link_attached(kv, ColumnRef::new(merge, pos));
        let src = dfg.views[merge].header.columns[pos].clone();
        dfg.views[kv].header.columns.push(Column::new(kv, src.logical_id, next_index, src.ty.clone()));
        remap[pos] = next_index;
        next_index += 1;
    }

    Source::KvIndexed(kv, remap)
}

/// Redirects every consumer of `sel` onto `source`. `sel`'s own output
/// columns sit at the relation's declared arity positions (the
/// prefilter SELECT predates any CMP folds), so a `KvIndexed` remap
/// indexed by arity position applies to it directly.
fn wire_select(dfg: &mut Dfg, sel: Id<View>, source: &Source) {
    match source {
        Source::Plain(target) => dfg.replace_all_uses_with(sel, *target),
        Source::KvIndexed(target, remap) => dfg.replace_all_uses_with_remap(sel, *target, remap),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Atom, BodyPredicate, Declaration, Module, ParamMode, Rule, Term};
    use crate::builder::build_clause;

    #[test]
    fn single_producer_relation_gets_a_merge() {
        let mut dfg = Dfg::new();
        let module = Module::new("m");
        let rule = Rule::new(Atom::new("node", vec![Term::Constant(1)]), vec![]);
        build_clause(&mut dfg, &module, &rule).unwrap();

        let rel = dfg.relation_named("node", 1);
        let sel = dfg.relations[rel].selects[0];

        connect(&mut dfg, &module);

        assert!(!dfg.views[sel].is_live());
        assert!(dfg.views[sel].header.uses.is_empty());
    }

    #[test]
    fn two_producers_merge_into_one_view() {
        let mut dfg = Dfg::new();
        let module = Module::new("m");
        let rule_a = Rule::new(Atom::new("node", vec![Term::Constant(1)]), vec![]);
        let rule_b = Rule::new(Atom::new("node", vec![Term::Constant(2)]), vec![]);
        build_clause(&mut dfg, &module, &rule_a).unwrap();
        build_clause(&mut dfg, &module, &rule_b).unwrap();

        let rel = dfg.relation_named("node", 1);
        let ins_a = dfg.relations[rel].inserts[0];
        let ins_b = dfg.relations[rel].inserts[1];

        connect(&mut dfg, &module);

        let producer_a = dfg.views[ins_a].header.input_columns[0].view;
        let producer_b = dfg.views[ins_b].header.input_columns[0].view;
        let merge_a = dfg.views[producer_a].header.uses.iter().next().map(|e| e.user);
        let merge_b = dfg.views[producer_b].header.uses.iter().next().map(|e| e.user);
        assert_eq!(merge_a, merge_b);
        assert!(merge_a.is_some());
    }

    #[test]
    fn mutable_param_wraps_merge_in_kvindex() {
        let mut dfg = Dfg::new();
        let mut module = Module::new("m");
        let mut decl = Declaration::new("counter");
        decl.params.push(crate::ast::Param::new("key", ParamMode::Bound));
        decl.params.push(crate::ast::Param::new("count", ParamMode::Mutable { merge_functor: "sum".to_string() }));
        module.declarations.push(decl);

        let rule = Rule::new(
            Atom::new("counter", vec![Term::Variable("k".into()), Term::Variable("c".into())]),
            vec![BodyPredicate::Positive(Atom::new(
                "hit",
                vec![Term::Variable("k".into()), Term::Variable("c".into())],
            ))],
        );
        build_clause(&mut dfg, &module, &rule).unwrap();
        connect(&mut dfg, &module);

        let rel = dfg.relation_named("counter", 2);
        let sel = dfg.relations[rel].selects[0];
        assert!(!dfg.views[sel].is_live());

        let user = dfg.views.ids().find(|&id| matches!(dfg.views[id].kind, ViewKind::KvIndex(_)));
        assert!(user.is_some());
        let kv = user.unwrap();
        assert_eq!(dfg.views[kv].header.input_columns.len(), 1);
        assert_eq!(dfg.views[kv].header.attached_columns.len(), 1);
    }
}
