//! End-to-end scenarios driving the crate through `compile_module` only
//! (§8 "Concrete end-to-end scenarios seeding the test suite").

use datalog_dataflow_core::ast::builders::RuleBuilder;
use datalog_dataflow_core::ast::{AggregateFunc, Atom, BodyPredicate, Module, Rule, Term};
use datalog_dataflow_core::compile_module;
use datalog_dataflow_core::CompilerConfig;

fn config() -> CompilerConfig {
    CompilerConfig::default()
}

/// 1. `foo(1,2,3).` — single all-constants clause.
#[test]
fn all_constants_clause_yields_one_insert_no_join() {
    let mut module = Module::new("m");
    module.clauses.push(Rule::new(
        Atom::new("foo", vec![Term::Constant(1), Term::Constant(2), Term::Constant(3)]),
        vec![],
    ));

    let output = compile_module(&module, &config()).unwrap();
    assert!(output.diagnostics.is_empty());
    assert_eq!(output.dfg.views_of_kind("INSERT").count(), 1);
    assert_eq!(output.dfg.views_of_kind("JOIN").count(), 0);

    let insert = output.dfg.views_of_kind("INSERT").next().unwrap();
    assert_eq!(insert.input_columns.len(), 3);
}

/// 2. `pairs(A,B) :- node(A), node(B).` — two SELs on `node` with disjoint
/// group ids; a zero-pivot (Cartesian) JOIN produces both columns.
#[test]
fn disjoint_group_ids_survive_cse_as_cartesian_join() {
    let mut module = Module::new("m");
    module.clauses.push(
        RuleBuilder::new("pairs")
            .head_vars(["a", "b"])
            .body_atom("node", ["a"])
            .body_atom("node", ["b"])
            .build(),
    );

    let output = compile_module(&module, &config()).unwrap();
    assert!(output.diagnostics.is_empty());
    assert_eq!(output.dfg.views_of_kind("SELECT").count(), 2);
    assert_eq!(output.dfg.views_of_kind("JOIN").count(), 1);
    let join = output.dfg.views_of_kind("JOIN").next().unwrap();
    assert_eq!(join.columns.len(), 2);
}

/// 3. `eq_pair(A,A) :- node(A).` — head forwards the same column twice,
/// with no spurious unification into a single column.
#[test]
fn duplicate_head_variable_is_forwarded_not_unified() {
    let mut module = Module::new("m");
    module
        .clauses
        .push(RuleBuilder::new("eq_pair").head_vars(["a", "a"]).body_atom("node", ["a"]).build());

    let output = compile_module(&module, &config()).unwrap();
    assert!(output.diagnostics.is_empty());
    let insert = output.dfg.views_of_kind("INSERT").next().unwrap();
    assert_eq!(insert.input_columns.len(), 2);
}

/// 4. `reach(A,B) :- edge(A,B). reach(A,C) :- reach(A,B), edge(B,C).` —
/// the MERGE over both branches is classified inductive.
#[test]
fn recursive_rule_produces_inductive_merge() {
    let mut module = Module::new("m");
    module.clauses.push(
        RuleBuilder::new("reach")
            .head_vars(["a", "b"])
            .body_atom("edge", ["a", "b"])
            .build(),
    );
    module.clauses.push(
        RuleBuilder::new("reach")
            .head_vars(["a", "c"])
            .body_atom("reach", ["a", "b"])
            .body_atom("edge", ["b", "c"])
            .build(),
    );

    let output = compile_module(&module, &config()).unwrap();
    assert!(output.diagnostics.is_empty());
    let merges: Vec<_> = output.dfg.views_of_kind("MERGE").collect();
    assert_eq!(merges.len(), 1);
    assert!(merges[0].induction_depth.is_some(), "recursive merge should be classified inductive");
}

/// 5. `q(A) :- p(A), !q(A).` — the NEGATE on `q` is self-referential; the
/// consumer must be flagged able to receive deletions.
#[test]
fn self_negation_flags_can_receive_deletions() {
    let mut module = Module::new("m");
    module.clauses.push(
        RuleBuilder::new("q")
            .head_vars(["a"])
            .body_atom("p", ["a"])
            .negated_atom("q", ["a"])
            .build(),
    );

    let output = compile_module(&module, &config()).unwrap();
    assert_eq!(output.dfg.views_of_kind("NEGATE").count(), 1);
    let insert = output.dfg.views_of_kind("INSERT").next().unwrap();
    assert!(insert.can_receive_deletions);
}

/// 6. `sum_weights(S) :- node(N), weight(N,W), sum(W, S).` — the AGGREGATE
/// over `weight` must not get an outer JOIN lifted above it that mixes
/// `node`'s group-by column into the summarized columns.
#[test]
fn aggregate_keeps_group_by_column_separate_from_summarized_column() {
    let mut module = Module::new("m");
    module.clauses.push(Rule::new(
        Atom::new("sum_weights", vec![Term::Variable("n".into()), Term::Aggregate(AggregateFunc::Sum, "w".into())]),
        vec![
            BodyPredicate::Positive(Atom::new("node", vec![Term::Variable("n".into())])),
            BodyPredicate::Positive(Atom::new(
                "weight",
                vec![Term::Variable("n".into()), Term::Variable("w".into())],
            )),
        ],
    ));

    let output = compile_module(&module, &config()).unwrap();
    assert!(output.diagnostics.is_empty());
    let agg = output.dfg.views_of_kind("AGGREGATE").next().unwrap();
    assert_eq!(agg.columns.len(), 2, "one group-by column, one summarized column");
}

/// Round-trip law (§8): running the pipeline twice over the same module is
/// idempotent in the observable shape of the finalized DFG.
#[test]
fn compiling_twice_yields_structurally_equal_view_counts() {
    let mut module = Module::new("m");
    module.clauses.push(
        RuleBuilder::new("pairs")
            .head_vars(["a", "b"])
            .body_atom("node", ["a"])
            .body_atom("node", ["b"])
            .build(),
    );

    let first = compile_module(&module, &config()).unwrap();
    let second = compile_module(&module, &config()).unwrap();
    assert_eq!(first.dfg.views().count(), second.dfg.views().count());
    assert_eq!(
        first.dfg.views_of_kind("JOIN").count(),
        second.dfg.views_of_kind("JOIN").count()
    );
}
