//! Clause Builder (§4.1): turns one parsed clause into an INS view plus
//! all supporting views.

pub mod group_ids;
pub mod join_order;
pub mod prefilter;
pub mod unionfind;

use std::collections::HashMap;

use crate::arena::Id;
use crate::ast::{Atom, AggregateFunc, BodyPredicate, ComparisonOp, Declaration, Module, Rule, Term};
use crate::column::{Column, ColumnRef};
use crate::condition::Condition;
use crate::dfg::Dfg;
use crate::error::CoreError;
use crate::relation::Constant;
use crate::view::{
    Aggregate, Compare, CompareOp, FunctorRange, FunctorRef, Insert, InsertTarget, Map, Negate, ParamBinding, Select,
    SelectSource, Tuple, View, ViewKind,
};
use unionfind::UnionFind;

/// Everything the rest of the builder needs to resolve a variable back
/// to a live column: its union-find class and a running map from class
/// id to the current `(view, index)` that exposes it, refreshed every
/// time a fold produces a new view (§9 "Equality-class columns").
struct ClauseScope {
    uf: UnionFind,
    class_ids: HashMap<String, u32>,
}

impl ClauseScope {
    fn new() -> Self {
        ClauseScope {
            uf: UnionFind::new(),
            class_ids: HashMap::new(),
        }
    }

    /// Pre-scans the body for plain variable-to-variable equalities
    /// (`x = y`, not a function assignment) and unions their classes
    /// before any atom view is built, so every atom referencing either
    /// name ends up sharing one logical id (§4.1 step 3).
    fn seed_from_body(&mut self, body: &[BodyPredicate]) {
        for pred in body {
            if let BodyPredicate::Comparison(Term::Variable(a), ComparisonOp::Equal, Term::Variable(b)) = pred {
                self.uf.union(a, b);
            }
        }
    }
}

/// Builds the DFG subgraph for one clause, returning the INS view that
/// writes its head tuples (§4.1).
pub fn build_clause(dfg: &mut Dfg, module: &Module, rule: &Rule) -> Result<Id<View>, CoreError> {
    if !rule.is_safe() {
        return Err(CoreError::structural(format!(
            "variable not range-restricted in clause head `{}`",
            rule.head.relation
        )));
    }

    let mut scope = ClauseScope::new();
    scope.seed_from_body(&rule.body);

    let head_decl = module.declaration(&rule.head.relation);

    let mut pending: Vec<Id<View>> = Vec::new();
    for atom in rule.positive_body_atoms() {
        let decl = module.declaration(&atom.relation);
        let (view, _index_of) = prefilter::build_atom_view(dfg, atom, &mut scope.uf, &mut scope.class_ids, decl);
        pending.push(view);
    }

    if pending.is_empty() {
        let ins = build_constants_only_clause(dfg, rule, head_decl)?;
        group_ids::propagate_for_clause(dfg, ins);
        return Ok(ins);
    }

    let mut current = join_order::build_join_tree(dfg, pending);

    for pred in &rule.body {
        if let BodyPredicate::Comparison(left, op, right) = pred {
            if is_function_assignment(pred) {
                continue;
            }
            current = apply_comparison(dfg, current, left, op, right)?;
        }
    }

    for pred in &rule.body {
        if let BodyPredicate::Comparison(left, ComparisonOp::Equal, right) = pred {
            if let Some((func_name, args, out_var)) = function_assignment_shape(left, right) {
                current = apply_function_assignment(dfg, current, &scope, func_name, args, out_var, module)?;
            }
        }
    }

    for atom in rule.negated_body_atoms() {
        let decl = module.declaration(&atom.relation);
        let (neg_view, neg_index) = prefilter::build_atom_view(dfg, atom, &mut scope.uf, &mut scope.class_ids, decl);
        current = apply_negation(dfg, current, neg_view, atom, &neg_index);
    }

    let ins = finish_clause(dfg, current, rule, head_decl)?;
    group_ids::propagate_for_clause(dfg, ins);
    Ok(ins)
}

fn is_function_assignment(pred: &BodyPredicate) -> bool {
    matches!(pred, BodyPredicate::Comparison(..)) && pred_is_function_assignment(pred)
}

fn pred_is_function_assignment(pred: &BodyPredicate) -> bool {
    if let BodyPredicate::Comparison(left, op, right) = pred {
        matches!(op, ComparisonOp::Equal)
            && (matches!((left, right), (Term::Variable(_), Term::FunctionCall(..)))
                || matches!((left, right), (Term::FunctionCall(..), Term::Variable(_))))
    } else {
        false
    }
}

fn function_assignment_shape<'a>(left: &'a Term, right: &'a Term) -> Option<(&'a str, &'a [Term], &'a str)> {
    match (left, right) {
        (Term::Variable(v), Term::FunctionCall(name, args)) => Some((&name.0, args.as_slice(), v.as_str())),
        (Term::FunctionCall(name, args), Term::Variable(v)) => Some((&name.0, args.as_slice(), v.as_str())),
        _ => None,
    }
}

/// The union-find class already assigned to `var` by a positive-body
/// occurrence, if any; a function assignment's own output variable may
/// have none; the caller allocates a fresh class in that case.
fn class_of(scope: &ClauseScope, var: &str) -> Option<u32> {
    scope.class_ids.get(var).copied()
}

/// Wraps `current` in a CMP evaluating `left <op> right` against the
/// columns already bound on it, per §4.1 step 3/step 4 ("apply pending
/// functor MAPs ... realized as MAP followed by CMPs"). Handles the
/// three shapes the testable comparisons can take: var-var, var-const,
/// const-var.
fn apply_comparison(
    dfg: &mut Dfg,
    current: Id<View>,
    left: &Term,
    op: &ComparisonOp,
    right: &Term,
) -> Result<Id<View>, CoreError> {
    let Some(cmp_op) = op.as_compare_op() else {
        return Err(CoreError::structural(
            "comparison operator has no direct dataflow CMP counterpart",
        ));
    };

    match (left, right) {
        (Term::Variable(a), Term::Variable(b)) => {
            let out_a = resolve_var_column(dfg, current, a)?;
            let out_b = resolve_var_column(dfg, current, b)?;
            if out_a == out_b {
                return Ok(current);
            }
            Ok(apply_cmp(dfg, current, out_a, out_b, cmp_op))
        }
        (Term::Variable(a), t) if t.is_constant() => {
            let out_a = resolve_var_column(dfg, current, a)?;
            Ok(apply_cmp_constant(dfg, current, out_a, term_to_constant(t), cmp_op))
        }
        (t, Term::Variable(b)) if t.is_constant() => {
            let out_b = resolve_var_column(dfg, current, b)?;
            Ok(apply_cmp_constant(dfg, current, out_b, term_to_constant(t), cmp_op))
        }
        _ => Err(CoreError::structural("unrecognized comparison shape in clause body")),
    }
}

fn resolve_var_column(dfg: &Dfg, view: Id<View>, var: &str) -> Result<usize, CoreError> {
    dfg.views[view]
        .header
        .columns
        .iter()
        .position(|c| c.source_var.as_deref() == Some(var))
        .ok_or_else(|| CoreError::structural(format!("could not find column for variable `{var}`")))
}

fn term_to_constant(t: &Term) -> Constant {
    match t {
        Term::Constant(v) => Constant::Int(*v),
        Term::FloatConstant(v) => Constant::Float(*v),
        Term::StringConstant(s) => Constant::Str(s.clone()),
        _ => unreachable!("caller checked is_constant()"),
    }
}

/// General two-sided CMP wrapper, used by ordinary body comparisons
/// (distinct from `prefilter`'s repeated-variable folds, which always
/// use `=`). Equality still merges its two outputs into one per §3; the
/// ordering operators keep both sides as separate attached columns.
fn apply_cmp(dfg: &mut Dfg, producer: Id<View>, out_a: usize, out_b: usize, op: CompareOp) -> Id<View> {
    let arity = dfg.views[producer].header.columns.len();
    let cmp = dfg.alloc_view(ViewKind::Compare(Compare::new(op)));
    dfg.link_input(cmp, ColumnRef::new(producer, out_a));
    dfg.link_input(cmp, ColumnRef::new(producer, out_b));

    let unifies = op.unifies_outputs();
    let kept = dfg.views[producer].header.columns[out_a].clone();
    let mut kept_col = Column::new(cmp, kept.logical_id, 0, kept.ty.clone());
    kept_col.source_var = kept.source_var.clone();
    dfg.views[cmp].header.columns.push(kept_col);
    if !unifies {
        let other = dfg.views[producer].header.columns[out_b].clone();
        let mut other_col = Column::new(cmp, other.logical_id, 1, other.ty.clone());
        other_col.source_var = other.source_var.clone();
        dfg.views[cmp].header.columns.push(other_col);
    }

    let mut next_index = dfg.views[cmp].header.columns.len();
    for idx in 0..arity {
        if idx == out_a || idx == out_b {
            continue;
        }
        dfg.link_attached(cmp, ColumnRef::new(producer, idx));
        let src = dfg.views[producer].header.columns[idx].clone();
        let mut col = Column::new(cmp, src.logical_id, next_index, src.ty.clone());
        col.source_var = src.source_var.clone();
        dfg.views[cmp].header.columns.push(col);
        next_index += 1;
    }
    cmp
}

fn apply_cmp_constant(dfg: &mut Dfg, producer: Id<View>, out: usize, constant: Constant, op: CompareOp) -> Id<View> {
    let arity = dfg.views[producer].header.columns.len();
    let const_ty = constant_type(&constant);
    let const_sel = dfg.alloc_view(ViewKind::Select(Select::new(SelectSource::Constant(vec![constant]))));
    dfg.views[const_sel]
        .header
        .columns
        .push(Column::new(const_sel, dfg.fresh_logical_id(), 0, const_ty));

    let cmp = dfg.alloc_view(ViewKind::Compare(Compare::new(op)));
    dfg.link_input(cmp, ColumnRef::new(producer, out));
    dfg.link_input(cmp, ColumnRef::new(const_sel, 0));

    let unifies = op.unifies_outputs();
    let kept = dfg.views[producer].header.columns[out].clone();
    let mut merged = Column::new(cmp, kept.logical_id, 0, kept.ty.clone());
    merged.source_var = kept.source_var.clone();
    if unifies {
        merged.constant_of = Some(crate::arena::WeakRef::new(const_sel));
    }
    dfg.views[cmp].header.columns.push(merged);

    let mut next_index = dfg.views[cmp].header.columns.len();
    for idx in 0..arity {
        if idx == out {
            continue;
        }
        dfg.link_attached(cmp, ColumnRef::new(producer, idx));
        let src = dfg.views[producer].header.columns[idx].clone();
        let mut col = Column::new(cmp, src.logical_id, next_index, src.ty.clone());
        col.source_var = src.source_var.clone();
        dfg.views[cmp].header.columns.push(col);
        next_index += 1;
    }
    cmp
}

fn constant_type(c: &Constant) -> crate::column::Type {
    match c {
        Constant::Int(_) => crate::column::Type::Int64,
        Constant::UInt(_) => crate::column::Type::UInt64,
        Constant::Float(_) => crate::column::Type::Float64,
        Constant::Bool(_) => crate::column::Type::Int8,
        Constant::Bytes(_) => crate::column::Type::Bytes,
        Constant::Str(_) => crate::column::Type::Utf8,
        Constant::Tag(_) => crate::column::Type::Opaque("tag".to_string()),
    }
}

/// Realizes `var = f(args)` as a MAP whose bound parameters read `args`
/// off `current` and whose single free parameter produces `var` (§4.1
/// step 4: "a functor whose free output must match an existing column
/// is realized as a MAP followed by CMPs").
fn apply_function_assignment(
    dfg: &mut Dfg,
    current: Id<View>,
    scope: &ClauseScope,
    func_name: &str,
    args: &[Term],
    out_var: &str,
    module: &Module,
) -> Result<Id<View>, CoreError> {
    let functor_decl = module.declaration(func_name);
    let range = functor_decl
        .and_then(|d| d.functor.as_ref())
        .map(|f| FunctorRange::from(f.range))
        .unwrap_or(FunctorRange::ExactlyOne);
    let is_impure = functor_decl.and_then(|d| d.functor.as_ref()).map(|f| !f.pure).unwrap_or(false);

    let map = dfg.alloc_view(ViewKind::Map(Map::new(FunctorRef::new(func_name), Vec::new(), range)));

    let mut bindings = Vec::new();
    let mut next_index = 0usize;
    for arg in args {
        match arg {
            Term::Variable(v) => {
                let out = resolve_var_column(dfg, current, v)?;
                dfg.link_input(map, ColumnRef::new(current, out));
                let src = dfg.views[current].header.columns[out].clone();
                dfg.views[map]
                    .header
                    .columns
                    .push(Column::new(map, src.logical_id, next_index, src.ty.clone()));
                bindings.push(ParamBinding::Bound);
                next_index += 1;
            }
            _ => {
                return Err(CoreError::structural("unsupported functor argument shape"));
            }
        }
    }

    let out_logical_id = class_of(scope, out_var).unwrap_or_else(|| dfg.fresh_logical_id());
    let out_ty = functor_decl
        .and_then(|d| d.params.last())
        .and_then(|p| p.ty.clone())
        .unwrap_or_else(|| crate::column::Type::Opaque("functor-output".to_string()));
    let mut out_col = Column::new(map, out_logical_id, next_index, out_ty);
    out_col.source_var = Some(out_var.to_string());
    dfg.views[map].header.columns.push(out_col);
    bindings.push(ParamBinding::Free);
    next_index += 1;

    let arity = dfg.views[current].header.columns.len();
    for idx in 0..arity {
        let already_bound = args.iter().any(|a| matches!(a, Term::Variable(v) if resolve_var_column(dfg, current, v).ok() == Some(idx)));
        if already_bound {
            continue;
        }
        dfg.link_attached(map, ColumnRef::new(current, idx));
        let src = dfg.views[current].header.columns[idx].clone();
        dfg.views[map]
            .header
            .columns
            .push(Column::new(map, src.logical_id, next_index, src.ty.clone()));
        next_index += 1;
    }

    if let ViewKind::Map(m) = &mut dfg.views[map].kind {
        m.bindings = bindings;
        m.is_impure = is_impure;
    }

    Ok(map)
}

/// Wraps `current` in a NEGATE testing absence of a matching row in
/// `neg_view` (§3 NEG). The negate's `input_columns` are `current`'s key
/// columns reordered to line up positionally with `neg_view`'s output
/// (every negated-atom variable is already bound by the positive body,
/// per `Rule::is_safe`); everything else on `current` passes through as
/// `attached_columns`.
fn apply_negation(dfg: &mut Dfg, current: Id<View>, neg_view: Id<View>, atom: &Atom, neg_index: &[usize]) -> Id<View> {
    let negate = dfg.alloc_view(ViewKind::Negate(Negate::new(neg_view)));
    dfg.link_negated_view(negate, neg_view);

    let mut key_positions = Vec::new();
    for (arg_pos, term) in atom.args.iter().enumerate() {
        if let Term::Variable(v) = term {
            if let Ok(out) = resolve_var_column(dfg, current, v) {
                key_positions.push((neg_index[arg_pos], out));
            }
        }
    }
    key_positions.sort_by_key(|(neg_idx, _)| *neg_idx);
    key_positions.dedup_by_key(|(neg_idx, _)| *neg_idx);

    let mut next_index = 0usize;
    let mut used: Vec<usize> = Vec::new();
    for (_, out) in &key_positions {
        dfg.link_input(negate, ColumnRef::new(current, *out));
        let src = dfg.views[current].header.columns[*out].clone();
        dfg.views[negate]
            .header
            .columns
            .push(Column::new(negate, src.logical_id, next_index, src.ty.clone()));
        used.push(*out);
        next_index += 1;
    }

    let arity = dfg.views[current].header.columns.len();
    for idx in 0..arity {
        if used.contains(&idx) {
            continue;
        }
        dfg.link_attached(negate, ColumnRef::new(current, idx));
        let src = dfg.views[current].header.columns[idx].clone();
        dfg.views[negate]
            .header
            .columns
            .push(Column::new(negate, src.logical_id, next_index, src.ty.clone()));
        next_index += 1;
    }

    dfg.views[negate].header.can_receive_deletions = true;
    negate
}

/// Step 6/7: matches head variables against `current`'s columns, forwards
/// them through a TUP, and attaches the resulting INS to the head
/// relation/message, wiring zero-arg body tests onto its condition lists.
fn finish_clause(dfg: &mut Dfg, current: Id<View>, rule: &Rule, head_decl: Option<&Declaration>) -> Result<Id<View>, CoreError> {
    if let Some((agg_pos, func, agg_var)) = head_aggregate_term(rule) {
        return build_aggregate_clause(dfg, current, rule, head_decl, agg_pos, func, agg_var);
    }

    let mut missing = Vec::new();
    let mut tup_columns = Vec::new();
    for term in &rule.head.args {
        let Term::Variable(v) = term else {
            missing.push("non-variable head argument".to_string());
            continue;
        };
        match resolve_var_column(dfg, current, v) {
            Ok(out) => tup_columns.push(out),
            Err(_) => missing.push(v.clone()),
        }
    }
    if !missing.is_empty() {
        return Err(CoreError::structural(format!(
            "no dataflow produced for clause head: {}",
            missing.join(", ")
        )));
    }

    let tup = dfg.alloc_view(ViewKind::Tuple(Tuple));
    for (out_index, &src_index) in tup_columns.iter().enumerate() {
        dfg.link_input(tup, ColumnRef::new(current, src_index));
        let src = dfg.views[current].header.columns[src_index].clone();
        dfg.views[tup]
            .header
            .columns
            .push(Column::new(tup, src.logical_id, out_index, src.ty.clone()));
    }

    let is_message = head_decl.map(|d| d.is_message()).unwrap_or(false);
    let target = if is_message {
        InsertTarget::Io(dfg.io_named(&rule.head.relation, rule.head.arity()))
    } else {
        InsertTarget::Relation(dfg.relation_named(&rule.head.relation, rule.head.arity()))
    };
    let ins = dfg.alloc_view(ViewKind::Insert(Insert::new(target)));
    for idx in 0..tup_columns.len() {
        dfg.link_input(ins, ColumnRef::new(tup, idx));
    }
    match target {
        InsertTarget::Relation(r) => dfg.relations[r].inserts.push(ins),
        InsertTarget::Io(i) => dfg.ios[i].inserts.push(ins),
    }

    if rule.head.arity() == 0 {
        let cond = dfg.alloc_condition();
        dfg.conditions[cond].setter = Some(ins);
        dfg.views[ins].header.sets_condition = Some(cond);
    }

    Ok(ins)
}

/// A clause head carries at most one `Term::Aggregate` argument; every
/// other argument is a plain group-by variable (§4.1 step 4, "aggregates
/// built bottom-up inside a nested scope").
fn head_aggregate_term(rule: &Rule) -> Option<(usize, &AggregateFunc, &str)> {
    rule.head.args.iter().enumerate().find_map(|(i, t)| match t {
        Term::Aggregate(func, var) => Some((i, func, var.as_str())),
        _ => None,
    })
}

fn aggregate_func_name(func: &AggregateFunc) -> String {
    match func {
        AggregateFunc::Count => "count".to_string(),
        AggregateFunc::Sum => "sum".to_string(),
        AggregateFunc::Min => "min".to_string(),
        AggregateFunc::Max => "max".to_string(),
        AggregateFunc::Avg => "avg".to_string(),
        AggregateFunc::Custom(name) => name.clone(),
    }
}

/// Builds an AGGREGATE view summarizing `current` grouped by every
/// non-aggregate head variable, then forwards `(group-by..., summary)`
/// through a TUP into the head relation/message's INS, in the head's own
/// argument order.
fn build_aggregate_clause(
    dfg: &mut Dfg,
    current: Id<View>,
    rule: &Rule,
    head_decl: Option<&Declaration>,
    agg_pos: usize,
    func: &AggregateFunc,
    agg_var: &str,
) -> Result<Id<View>, CoreError> {
    let group_id = dfg.fresh_group_id();
    let agg = dfg.alloc_view(ViewKind::Aggregate(Aggregate::new(FunctorRef::new(aggregate_func_name(func)), group_id)));

    let mut group_by_out: Vec<usize> = Vec::new();
    for (i, term) in rule.head.args.iter().enumerate() {
        if i == agg_pos {
            continue;
        }
        let Term::Variable(v) = term else {
            return Err(CoreError::structural(
                "aggregate clause head may only mix group-by variables with one aggregate term",
            ));
        };
        let out = resolve_var_column(dfg, current, v)?;
        dfg.link_input(agg, ColumnRef::new(current, out));
        let src = dfg.views[current].header.columns[out].clone();
        let next_index = dfg.views[agg].header.columns.len();
        let mut col = Column::new(agg, src.logical_id, next_index, src.ty.clone());
        col.source_var = src.source_var.clone();
        dfg.views[agg].header.columns.push(col);
        if let ViewKind::Aggregate(a) = &mut dfg.views[agg].kind {
            a.group_by_columns.push(ColumnRef::new(current, out));
        }
        group_by_out.push(next_index);
    }

    let agg_out = resolve_var_column(dfg, current, agg_var)?;
    dfg.link_input(agg, ColumnRef::new(current, agg_out));
    let agg_src = dfg.views[current].header.columns[agg_out].clone();
    let result_index = dfg.views[agg].header.columns.len();
    let result_id = dfg.fresh_logical_id();
    dfg.views[agg]
        .header
        .columns
        .push(Column::new(agg, result_id, result_index, agg_src.ty.clone()));
    if let ViewKind::Aggregate(a) = &mut dfg.views[agg].kind {
        a.aggregated_columns.push(ColumnRef::new(current, agg_out));
    }
    dfg.views[agg].header.add_group_id(group_id);

    let tup = dfg.alloc_view(ViewKind::Tuple(Tuple));
    let mut group_by_iter = group_by_out.into_iter();
    for (tup_index, i) in (0..rule.head.args.len()).enumerate() {
        let src_index = if i == agg_pos {
            result_index
        } else {
            group_by_iter.next().expect("one group-by source per non-aggregate head arg")
        };
        dfg.link_input(tup, ColumnRef::new(agg, src_index));
        let src = dfg.views[agg].header.columns[src_index].clone();
        dfg.views[tup]
            .header
            .columns
            .push(Column::new(tup, src.logical_id, tup_index, src.ty.clone()));
    }

    let is_message = head_decl.map(|d| d.is_message()).unwrap_or(false);
    let target = if is_message {
        InsertTarget::Io(dfg.io_named(&rule.head.relation, rule.head.arity()))
    } else {
        InsertTarget::Relation(dfg.relation_named(&rule.head.relation, rule.head.arity()))
    };
    let ins = dfg.alloc_view(ViewKind::Insert(Insert::new(target)));
    for idx in 0..rule.head.args.len() {
        dfg.link_input(ins, ColumnRef::new(tup, idx));
    }
    match target {
        InsertTarget::Relation(r) => dfg.relations[r].inserts.push(ins),
        InsertTarget::Io(i) => dfg.ios[i].inserts.push(ins),
    }

    Ok(ins)
}

/// `foo(1,2,3).` — a clause whose body is empty: the head is built
/// directly from constant SELECTs joined as a Cartesian product of one
/// (scenario 1, §8).
fn build_constants_only_clause(dfg: &mut Dfg, rule: &Rule, head_decl: Option<&Declaration>) -> Result<Id<View>, CoreError> {
    let mut values = Vec::new();
    for term in &rule.head.args {
        match term {
            Term::Constant(v) => values.push(Constant::Int(*v)),
            Term::FloatConstant(v) => values.push(Constant::Float(*v)),
            Term::StringConstant(s) => values.push(Constant::Str(s.clone())),
            _ => {
                return Err(CoreError::structural("constants-only clause head must be all literals"));
            }
        }
    }

    let sel = dfg.alloc_view(ViewKind::Select(Select::new(SelectSource::Constant(values.clone()))));
    for (i, v) in values.iter().enumerate() {
        let mut col = Column::new(sel, dfg.fresh_logical_id(), i, constant_type(v));
        col.constant_of = Some(crate::arena::WeakRef::new(sel));
        dfg.views[sel].header.columns.push(col);
    }

    let is_message = head_decl.map(|d| d.is_message()).unwrap_or(false);
    let target = if is_message {
        InsertTarget::Io(dfg.io_named(&rule.head.relation, rule.head.arity()))
    } else {
        InsertTarget::Relation(dfg.relation_named(&rule.head.relation, rule.head.arity()))
    };
    let ins = dfg.alloc_view(ViewKind::Insert(Insert::new(target)));
    for idx in 0..values.len() {
        dfg.link_input(ins, ColumnRef::new(sel, idx));
    }
    match target {
        InsertTarget::Relation(r) => {
            dfg.relations[r].selects.push(sel);
            dfg.relations[r].inserts.push(ins);
        }
        InsertTarget::Io(i) => {
            dfg.ios[i].selects.push(sel);
            dfg.ios[i].inserts.push(ins);
        }
    }
    Ok(ins)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::RuleBuilder;

    #[test]
    fn constants_only_clause_builds_single_insert() {
        let mut dfg = Dfg::new();
        let module = Module::new("m");
        let rule = Rule::new(Atom::new("foo", vec![Term::Constant(1), Term::Constant(2), Term::Constant(3)]), vec![]);
        let ins = build_clause(&mut dfg, &module, &rule).unwrap();
        assert!(matches!(dfg.views[ins].kind, ViewKind::Insert(_)));
        assert_eq!(dfg.views[ins].header.input_columns.len(), 3);
    }

    #[test]
    fn cartesian_pairs_clause_builds_zero_pivot_join() {
        let mut dfg = Dfg::new();
        let module = Module::new("m");
        let rule = RuleBuilder::new("pairs")
            .head_vars(["a", "b"])
            .body_atom("node", ["a"])
            .body_atom("node", ["b"])
            .build();
        let ins = build_clause(&mut dfg, &module, &rule).unwrap();
        assert_eq!(dfg.views[ins].header.input_columns.len(), 2);
    }

    #[test]
    fn duplicate_head_variable_forwards_same_column_twice() {
        let mut dfg = Dfg::new();
        let module = Module::new("m");
        let rule = RuleBuilder::new("eq_pair").head_vars(["a", "a"]).body_atom("node", ["a"]).build();
        let ins = build_clause(&mut dfg, &module, &rule).unwrap();
        let tup = dfg.views[ins].header.input_columns[0].view;
        assert_eq!(dfg.views[tup].header.columns.len(), 2);
    }

    #[test]
    fn unsafe_negation_is_rejected() {
        let mut dfg = Dfg::new();
        let module = Module::new("m");
        let rule = RuleBuilder::new("q").head_vars(["a"]).negated_atom("p", ["a", "unbound"]).build();
        assert!(build_clause(&mut dfg, &module, &rule).is_err());
    }

    #[test]
    fn aggregate_head_term_builds_aggregate_view() {
        let mut dfg = Dfg::new();
        let module = Module::new("m");
        let rule = Rule::new(
            Atom::new("total_weight", vec![Term::Aggregate(crate::ast::AggregateFunc::Sum, "w".into())]),
            vec![crate::ast::BodyPredicate::Positive(Atom::new(
                "weight",
                vec![Term::Variable("n".into()), Term::Variable("w".into())],
            ))],
        );
        let ins = build_clause(&mut dfg, &module, &rule).unwrap();
        assert!(matches!(dfg.views[ins].kind, ViewKind::Insert(_)));
        let tup = dfg.views[ins].header.input_columns[0].view;
        let agg = dfg.views[tup].header.input_columns[0].view;
        assert!(dfg.views[agg].as_aggregate().is_some());
    }

    #[test]
    fn aggregate_with_group_by_keeps_group_variable_separate() {
        let mut dfg = Dfg::new();
        let module = Module::new("m");
        let rule = Rule::new(
            Atom::new(
                "weight_by_node",
                vec![Term::Variable("n".into()), Term::Aggregate(crate::ast::AggregateFunc::Sum, "w".into())],
            ),
            vec![crate::ast::BodyPredicate::Positive(Atom::new(
                "weight",
                vec![Term::Variable("n".into()), Term::Variable("w".into())],
            ))],
        );
        let ins = build_clause(&mut dfg, &module, &rule).unwrap();
        let tup = dfg.views[ins].header.input_columns[0].view;
        assert_eq!(dfg.views[tup].header.columns.len(), 2);
        let agg = dfg.views[tup].header.input_columns[0].view;
        let agg_view = dfg.views[agg].as_aggregate().unwrap();
        assert_eq!(agg_view.group_by_columns.len(), 1);
        assert_eq!(agg_view.aggregated_columns.len(), 1);
    }
}
