//! Per-atom pre-filtering: build the initial SELECT for one positive body
//! predicate, then fold in CMPs for repeated variables and constant
//! arguments so every output column carries a unique id (§4.1 steps 2-3).
//!
//! Each fold step produces a new CMP view whose single predecessor is the
//! previous step's view — never the original SELECT once a fold has
//! happened — which keeps I2 (single non-constant predecessor) intact
//! throughout the chain. Constant operands are exempt from I2 (§3: "all
//! *non-constant* input columns"), so a constant test's CMP can read its
//! non-constant side from the running chain and its constant side from a
//! freshly allocated one-row constant SELECT without violating anything.

use std::collections::HashMap;

use crate::arena::Id;
use crate::ast::{Atom, Declaration, Term};
use crate::builder::unionfind::UnionFind;
use crate::column::{Column, ColumnRef};
use crate::dfg::Dfg;
use crate::relation::Constant;
use crate::view::{Compare, CompareOp, Select, SelectSource, View, ViewKind};

/// Builds the SELECT for `atom` plus whatever CMP folds are needed, and
/// returns the final view together with a map from original argument
/// position to that view's current output-column index.
pub fn build_atom_view(
    dfg: &mut Dfg,
    atom: &Atom,
    uf: &mut UnionFind,
    class_ids: &mut HashMap<String, u32>,
    decl: Option<&Declaration>,
) -> (Id<View>, Vec<usize>) {
    let relation = dfg.relation_named(&atom.relation, atom.arity());
    let sel = dfg.alloc_view(ViewKind::Select(Select::new(SelectSource::Relation(relation))));
    dfg.relations[relation].selects.push(sel);

    let mut constants: Vec<(usize, Constant)> = Vec::new();
    let mut position_class: Vec<Option<u32>> = Vec::new();

    for (i, term) in atom.args.iter().enumerate() {
        let ty = decl
            .and_then(|d| d.params.get(i))
            .and_then(|p| p.ty.clone())
            .unwrap_or_else(|| crate::column::Type::Opaque("unresolved".to_string()));
        match term {
            Term::Variable(name) => {
                let root = uf.find(name);
                let class = *class_ids.entry(root).or_insert_with(|| dfg.fresh_logical_id());
                let col = Column::new(sel, class, i, ty).with_source_var(name.clone());
                dfg.views[sel].header.columns.push(col);
                position_class.push(Some(class));
            }
            Term::Placeholder => {
                let id = dfg.fresh_logical_id();
                dfg.views[sel].header.columns.push(Column::new(sel, id, i, ty));
                position_class.push(None);
            }
            Term::Constant(v) => {
                let id = dfg.fresh_logical_id();
                dfg.views[sel].header.columns.push(Column::new(sel, id, i, ty));
                constants.push((i, Constant::Int(*v)));
                position_class.push(None);
            }
            Term::FloatConstant(v) => {
                let id = dfg.fresh_logical_id();
                dfg.views[sel].header.columns.push(Column::new(sel, id, i, ty));
                constants.push((i, Constant::Float(*v)));
                position_class.push(None);
            }
            Term::StringConstant(s) => {
                let id = dfg.fresh_logical_id();
                dfg.views[sel].header.columns.push(Column::new(sel, id, i, ty));
                constants.push((i, Constant::Str(s.clone())));
                position_class.push(None);
            }
            // An aggregate/arithmetic/function-call term appearing directly
            // as an atom argument is rewritten one level up (§4.1 step 4's
            // "pending functor MAPs"/aggregate nested-scope handling)
            // before this function runs; if one reaches here it is treated
            // as an opaque free column so construction can still proceed.
            Term::Aggregate(..) | Term::Arithmetic(_) | Term::FunctionCall(..) => {
                let id = dfg.fresh_logical_id();
                dfg.views[sel].header.columns.push(Column::new(sel, id, i, ty));
                position_class.push(None);
            }
        }
    }

    let mut current = sel;
    let mut index_of: Vec<usize> = (0..atom.arity()).collect();
    let mut seen: HashMap<u32, usize> = HashMap::new();

    for (pos, class) in position_class.iter().enumerate() {
        if let Some(class) = class {
            if let Some(&first_pos) = seen.get(class) {
                let out_a = index_of[first_pos];
                let out_b = index_of[pos];
                if out_a != out_b {
                    let (new_view, remap) = fold_equal_columns(dfg, current, out_a, out_b);
                    current = new_view;
                    index_of = index_of.iter().map(|&i| remap[i]).collect();
                }
            } else {
                seen.insert(*class, pos);
            }
        }
    }

    for (pos, constant) in constants {
        let out = index_of[pos];
        let (new_view, remap) = fold_constant(dfg, current, out, constant);
        current = new_view;
        index_of = index_of.iter().map(|&i| remap[i]).collect();
    }

    (current, index_of)
}

/// Wraps `producer` in a CMP that equates its `out_a`/`out_b` output
/// columns, attaching every other output column unchanged. Returns the
/// new view and a map from `producer`'s old output indices to the new
/// view's output indices.
fn fold_equal_columns(dfg: &mut Dfg, producer: Id<View>, out_a: usize, out_b: usize) -> (Id<View>, Vec<usize>) {
    let arity = dfg.views[producer].header.columns.len();
    let cmp = dfg.alloc_view(ViewKind::Compare(Compare::new(CompareOp::Eq)));

    dfg.link_input(cmp, ColumnRef::new(producer, out_a));
    dfg.link_input(cmp, ColumnRef::new(producer, out_b));

    let kept_col = dfg.views[producer].header.columns[out_a].clone();
    let mut kept = Column::new(cmp, kept_col.logical_id, 0, kept_col.ty.clone());
    kept.source_var = kept_col.source_var.clone();
    dfg.views[cmp].header.columns.push(kept);

    let mut remap = vec![0usize; arity];
    remap[out_a] = 0;
    remap[out_b] = 0;

    let mut next_index = 1usize;
    for idx in 0..arity {
        if idx == out_a || idx == out_b {
            continue;
        }
        dfg.link_attached(cmp, ColumnRef::new(producer, idx));
        let src = dfg.views[producer].header.columns[idx].clone();
        let mut col = Column::new(cmp, src.logical_id, next_index, src.ty.clone());
        col.source_var = src.source_var.clone();
        dfg.views[cmp].header.columns.push(col);
        remap[idx] = next_index;
        next_index += 1;
    }

    (cmp, remap)
}

/// Wraps `producer` in a CMP that tests its `out` output column against a
/// fresh one-row constant SELECT. The constant operand is exempt from I2
/// (§3), so `producer` remains the CMP's single non-constant predecessor.
fn fold_constant(dfg: &mut Dfg, producer: Id<View>, out: usize, constant: Constant) -> (Id<View>, Vec<usize>) {
    let arity = dfg.views[producer].header.columns.len();
    let const_ty = match &constant {
        Constant::Int(_) => crate::column::Type::Int64,
        Constant::UInt(_) => crate::column::Type::UInt64,
        Constant::Float(_) => crate::column::Type::Float64,
        Constant::Bool(_) => crate::column::Type::Int8,
        Constant::Bytes(_) => crate::column::Type::Bytes,
        Constant::Str(_) => crate::column::Type::Utf8,
        Constant::Tag(_) => crate::column::Type::Opaque("tag".to_string()),
    };
    let const_sel = dfg.alloc_view(ViewKind::Select(Select::new(SelectSource::Constant(vec![constant]))));
    dfg.views[const_sel]
        .header
        .columns
        .push(Column::new(const_sel, dfg.fresh_logical_id(), 0, const_ty));

    let cmp = dfg.alloc_view(ViewKind::Compare(Compare::new(CompareOp::Eq)));
    dfg.link_input(cmp, ColumnRef::new(producer, out));
    dfg.link_input(cmp, ColumnRef::new(const_sel, 0));

    let kept_col = dfg.views[producer].header.columns[out].clone();
    let mut merged = Column::new(cmp, kept_col.logical_id, 0, kept_col.ty.clone());
    merged.source_var = kept_col.source_var.clone();
    merged.constant_of = Some(crate::arena::WeakRef::new(const_sel));
    dfg.views[cmp].header.columns.push(merged);

    let mut remap = vec![0usize; arity];
    remap[out] = 0;

    let mut next_index = 1usize;
    for idx in 0..arity {
        if idx == out {
            continue;
        }
        dfg.link_attached(cmp, ColumnRef::new(producer, idx));
        let src = dfg.views[producer].header.columns[idx].clone();
        let mut col = Column::new(cmp, src.logical_id, next_index, src.ty.clone());
        col.source_var = src.source_var.clone();
        dfg.views[cmp].header.columns.push(col);
        remap[idx] = next_index;
        next_index += 1;
    }

    (cmp, remap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_variable_collapses_to_one_output() {
        let mut dfg = Dfg::new();
        let mut uf = UnionFind::new();
        let mut class_ids = HashMap::new();
        let atom = Atom::new("edge", vec![Term::Variable("x".into()), Term::Variable("x".into())]);
        let (view, index_of) = build_atom_view(&mut dfg, &atom, &mut uf, &mut class_ids, None);
        assert_eq!(dfg.views[view].header.columns.len(), 1);
        assert_eq!(index_of[0], index_of[1]);
    }

    #[test]
    fn constant_argument_is_marked_constant() {
        let mut dfg = Dfg::new();
        let mut uf = UnionFind::new();
        let mut class_ids = HashMap::new();
        let atom = Atom::new("node", vec![Term::Constant(1)]);
        let (view, index_of) = build_atom_view(&mut dfg, &atom, &mut uf, &mut class_ids, None);
        let col = &dfg.views[view].header.columns[index_of[0]];
        assert!(col.is_constant());
    }
}
