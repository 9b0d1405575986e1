//! # Input AST Types
//!
//! The input contract the builder (§4.1) consumes: a parsed module's
//! clauses and declarations. Nothing in this module renders, parses, or
//! type-checks source text — it is a plain value type handed to
//! [`crate::pipeline::compile_module`] by an external front-end.
//!
//! ## Builders
//!
//! For programmatic construction of AST nodes (mainly for tests), see the
//! [`builders`] module, which provides fluent APIs like `AtomBuilder` and
//! `RuleBuilder`.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::column::Type;
use crate::view::FunctorRange;

pub mod builders;

// ============================================================================
// Terms, atoms, rules
// ============================================================================

/// Aggregation function a `count<x>`/`sum<y>`-style term invokes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AggregateFunc {
    Count,
    Sum,
    Min,
    Max,
    Avg,
    /// Any other host-provided reduction, identified by name.
    Custom(String),
}

impl AggregateFunc {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "count" => Some(AggregateFunc::Count),
            "sum" => Some(AggregateFunc::Sum),
            "min" => Some(AggregateFunc::Min),
            "max" => Some(AggregateFunc::Max),
            "avg" => Some(AggregateFunc::Avg),
            "" => None,
            other => Some(AggregateFunc::Custom(other.to_string())),
        }
    }
}

/// Arithmetic operators for assignment expressions (`Y = X + 1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl ArithOp {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "+" => Some(ArithOp::Add),
            "-" => Some(ArithOp::Sub),
            "*" => Some(ArithOp::Mul),
            "/" => Some(ArithOp::Div),
            "%" => Some(ArithOp::Mod),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Mod => "%",
        }
    }
}

/// Arithmetic expression tree, e.g. `d + 1` or `x * y + z`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArithExpr {
    Variable(String),
    Constant(i64),
    Binary {
        op: ArithOp,
        left: Box<ArithExpr>,
        right: Box<ArithExpr>,
    },
}

impl ArithExpr {
    pub fn variables(&self) -> HashSet<String> {
        let mut vars = HashSet::new();
        self.collect_variables(&mut vars);
        vars
    }

    fn collect_variables(&self, vars: &mut HashSet<String>) {
        match self {
            ArithExpr::Variable(name) => {
                vars.insert(name.clone());
            }
            ArithExpr::Constant(_) => {}
            ArithExpr::Binary { left, right, .. } => {
                left.collect_variables(vars);
                right.collect_variables(vars);
            }
        }
    }

    pub fn is_simple(&self) -> bool {
        matches!(self, ArithExpr::Variable(_) | ArithExpr::Constant(_))
    }
}

/// Identifies a host functor by declaration name. Arity and binding
/// pattern come from the matching `Declaration`; this crate never
/// interprets functor bodies (§1 Non-goals).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctorName(pub String);

impl FunctorName {
    pub fn new(name: impl Into<String>) -> Self {
        FunctorName(name.into())
    }
}

/// A variable, constant, or compound expression appearing as an atom
/// argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Term {
    Variable(String),
    Constant(i64),
    FloatConstant(f64),
    StringConstant(String),
    /// `_` in source: a fresh, unconstrained variable.
    Placeholder,
    /// `count<x>`, `sum<y>`, ... — function plus the variable it reduces.
    Aggregate(AggregateFunc, String),
    Arithmetic(ArithExpr),
    /// `f(x, y)` — a functor call; realized by the builder as a MAP.
    FunctionCall(FunctorName, Vec<Term>),
}

impl Term {
    pub fn is_variable(&self) -> bool {
        matches!(self, Term::Variable(_))
    }

    pub fn is_constant(&self) -> bool {
        matches!(
            self,
            Term::Constant(_) | Term::FloatConstant(_) | Term::StringConstant(_)
        )
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, Term::Aggregate(_, _))
    }

    pub fn is_function_call(&self) -> bool {
        matches!(self, Term::FunctionCall(_, _))
    }

    pub fn as_variable(&self) -> Option<&str> {
        if let Term::Variable(name) = self {
            Some(name)
        } else {
            None
        }
    }

    pub fn as_function_call(&self) -> Option<(&FunctorName, &[Term])> {
        if let Term::FunctionCall(func, args) = self {
            Some((func, args))
        } else {
            None
        }
    }

    /// All variables referenced by this term, recursing through
    /// arithmetic and function-call arguments.
    pub fn variables(&self) -> HashSet<String> {
        match self {
            Term::Variable(name) => HashSet::from([name.clone()]),
            Term::Aggregate(_, var) => {
                if var.is_empty() {
                    HashSet::new()
                } else {
                    HashSet::from([var.clone()])
                }
            }
            Term::Arithmetic(expr) => expr.variables(),
            Term::FunctionCall(_, args) => args.iter().flat_map(Term::variables).collect(),
            Term::Constant(_) | Term::FloatConstant(_) | Term::StringConstant(_) | Term::Placeholder => {
                HashSet::new()
            }
        }
    }
}

/// An atom like `edge(x, y)` or `reach(x)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    pub relation: String,
    pub args: Vec<Term>,
}

impl Atom {
    pub fn new(relation: impl Into<String>, args: Vec<Term>) -> Self {
        Atom {
            relation: relation.into(),
            args,
        }
    }

    pub fn variables(&self) -> HashSet<String> {
        let mut vars = HashSet::new();
        for term in &self.args {
            vars.extend(term.variables());
        }
        vars
    }

    pub fn has_aggregates(&self) -> bool {
        self.args.iter().any(Term::is_aggregate)
    }

    pub fn arity(&self) -> usize {
        self.args.len()
    }
}

/// Comparison operators for filter predicates in rule bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOp {
    Equal,
    NotEqual,
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
}

impl ComparisonOp {
    /// Only `=`/`!=` have a direct `view::CompareOp` counterpart; ordered
    /// comparisons below `<`/`>` are not modeled by the DFG's `CMP` view
    /// kind per §3 and must be realized as an (impure-free) functor call
    /// by a front-end that wants them, or mapped down to `Lt`/`Gt` by
    /// De Morgan rewriting before reaching the builder.
    pub fn as_compare_op(&self) -> Option<crate::view::CompareOp> {
        match self {
            ComparisonOp::Equal => Some(crate::view::CompareOp::Eq),
            ComparisonOp::NotEqual => Some(crate::view::CompareOp::Ne),
            ComparisonOp::LessThan => Some(crate::view::CompareOp::Lt),
            ComparisonOp::GreaterThan => Some(crate::view::CompareOp::Gt),
            ComparisonOp::LessOrEqual | ComparisonOp::GreaterOrEqual => None,
        }
    }
}

/// A body predicate: a positive atom, a negated atom, or a comparison
/// between two terms (§4.1: "positive/negated predicates, assignments,
/// comparisons").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BodyPredicate {
    Positive(Atom),
    Negated(Atom),
    Comparison(Term, ComparisonOp, Term),
}

impl BodyPredicate {
    pub fn atom(&self) -> Option<&Atom> {
        match self {
            BodyPredicate::Positive(atom) | BodyPredicate::Negated(atom) => Some(atom),
            BodyPredicate::Comparison(..) => None,
        }
    }

    pub fn is_positive(&self) -> bool {
        matches!(self, BodyPredicate::Positive(_))
    }

    pub fn is_negated(&self) -> bool {
        matches!(self, BodyPredicate::Negated(_))
    }

    pub fn variables(&self) -> HashSet<String> {
        match self {
            BodyPredicate::Positive(atom) | BodyPredicate::Negated(atom) => atom.variables(),
            BodyPredicate::Comparison(left, _, right) => {
                let mut vars = left.variables();
                vars.extend(right.variables());
                vars
            }
        }
    }

    /// True for `Y = f(X)`/`f(X) = Y` shaped comparisons that bind a
    /// variable to a function-call result rather than testing equality of
    /// two already-bound values (§4.1 step 2-3: these become MAPs, not
    /// CMPs).
    pub fn is_function_assignment(&self) -> bool {
        matches!(
            self,
            BodyPredicate::Comparison(Term::Variable(_), ComparisonOp::Equal, Term::FunctionCall(..))
                | BodyPredicate::Comparison(Term::FunctionCall(..), ComparisonOp::Equal, Term::Variable(_))
        )
    }
}

/// One Horn-clause rule: `head :- body1, ..., bodyN`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub head: Atom,
    pub body: Vec<BodyPredicate>,
}

impl Rule {
    pub fn new(head: Atom, body: Vec<BodyPredicate>) -> Self {
        Rule { head, body }
    }

    pub fn new_simple(head: Atom, body: Vec<Atom>) -> Self {
        Rule {
            head,
            body: body.into_iter().map(BodyPredicate::Positive).collect(),
        }
    }

    /// A rule is safe (range-restricted) iff every head variable and
    /// every variable in a negated atom is bound by a positive body atom
    /// or a function assignment (§7 kind 1: "variable not
    /// range-restricted" is a structural error otherwise).
    pub fn is_safe(&self) -> bool {
        let head_vars = self.head.variables();
        let safe_vars = self.positive_body_variables();

        if !head_vars.is_subset(&safe_vars) {
            return false;
        }

        for pred in &self.body {
            if let BodyPredicate::Negated(atom) = pred {
                if !atom.variables().is_subset(&safe_vars) {
                    return false;
                }
            }
        }

        true
    }

    /// Variables bound by positive body atoms plus variables bound by
    /// function-call assignments (`Y = f(X)`), since both count as
    /// "safe" sources of a value for range-restriction purposes.
    pub fn positive_body_variables(&self) -> HashSet<String> {
        let mut vars: HashSet<String> = self
            .body
            .iter()
            .filter(|pred| pred.is_positive())
            .flat_map(BodyPredicate::variables)
            .collect();

        for pred in &self.body {
            if let BodyPredicate::Comparison(left, ComparisonOp::Equal, right) = pred {
                if let (Term::Variable(v), Term::FunctionCall(..)) = (left, right) {
                    vars.insert(v.clone());
                }
                if let (Term::FunctionCall(..), Term::Variable(v)) = (left, right) {
                    vars.insert(v.clone());
                }
            }
        }

        vars
    }

    pub fn variables(&self) -> HashSet<String> {
        let mut vars = self.head.variables();
        for pred in &self.body {
            vars.extend(pred.variables());
        }
        vars
    }

    /// True if the head relation also appears in the body (a necessary,
    /// not sufficient, condition for the clause to contribute to an
    /// inductive merge — §4.6 determines that precisely on the built DFG).
    pub fn is_recursive(&self) -> bool {
        self.body
            .iter()
            .any(|pred| pred.atom().map(|a| a.relation == self.head.relation).unwrap_or(false))
    }

    pub fn positive_body_atoms(&self) -> Vec<&Atom> {
        self.body
            .iter()
            .filter_map(|pred| match pred {
                BodyPredicate::Positive(atom) => Some(atom),
                _ => None,
            })
            .collect()
    }

    pub fn negated_body_atoms(&self) -> Vec<&Atom> {
        self.body
            .iter()
            .filter_map(|pred| match pred {
                BodyPredicate::Negated(atom) => Some(atom),
                _ => None,
            })
            .collect()
    }
}

// ============================================================================
// Declarations (§6)
// ============================================================================

/// Per-parameter binding mode (§6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamMode {
    Bound,
    Free,
    Aggregate,
    Summary,
    /// Requires a merge functor combining old and new values on update
    /// (realized on the DFG as a KVINDEX value column, §3).
    Mutable { merge_functor: String },
}

/// One declared parameter of a relation, message, or functor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub mode: ParamMode,
    /// Source-level type annotation, if declared. This crate performs no
    /// type inference (§1 Non-goals); the annotation is carried through
    /// unchanged and used only to tag the columns the builder creates for
    /// this parameter.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ty: Option<Type>,
}

impl Param {
    pub fn new(name: impl Into<String>, mode: ParamMode) -> Self {
        Param {
            name: name.into(),
            mode,
            ty: None,
        }
    }

    pub fn with_type(mut self, ty: Type) -> Self {
        self.ty = Some(ty);
        self
    }
}

/// Message-specific attributes (§6: "message (differential optional)").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageAttrs {
    pub differential: bool,
}

/// Functor-specific attributes (§6: "functor (pure/impure; range ...;
/// filter-only iff all parameters are bound)").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctorAttrs {
    pub pure: bool,
    pub range: FunctorRangeDecl,
}

/// Serializable mirror of [`crate::view::FunctorRange`] (the view-layer
/// type has no serde impls, since it is never part of an external
/// contract once the DFG exists).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunctorRangeDecl {
    ExactlyOne,
    ZeroOrOne,
    ZeroOrMore,
    OneOrMore,
}

impl From<FunctorRangeDecl> for FunctorRange {
    fn from(decl: FunctorRangeDecl) -> Self {
        match decl {
            FunctorRangeDecl::ExactlyOne => FunctorRange::ExactlyOne,
            FunctorRangeDecl::ZeroOrOne => FunctorRange::ZeroOrOne,
            FunctorRangeDecl::ZeroOrMore => FunctorRange::ZeroOrMore,
            FunctorRangeDecl::OneOrMore => FunctorRange::OneOrMore,
        }
    }
}

/// A declaration of a relation, message, or functor and the attributes
/// attached to it (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Declaration {
    pub name: String,
    pub params: Vec<Param>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<MessageAttrs>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub functor: Option<FunctorAttrs>,
    #[serde(default)]
    pub export: bool,
    #[serde(default)]
    pub query: bool,
    #[serde(default)]
    pub local: bool,
    /// `@divergent`: suppresses non-linearizable-induction diagnostics.
    #[serde(default)]
    pub divergent: bool,
    /// `@differential`: required on messages that produce retractions.
    #[serde(default)]
    pub differential: bool,
    /// `@highlight`: colors a clause for the formatter; carried through
    /// but never consulted by this crate (it is a presentation concern).
    #[serde(default)]
    pub highlight: bool,
}

impl Declaration {
    pub fn new(name: impl Into<String>) -> Self {
        Declaration {
            name: name.into(),
            params: Vec::new(),
            message: None,
            functor: None,
            export: false,
            query: false,
            local: false,
            divergent: false,
            differential: false,
            highlight: false,
        }
    }

    pub fn is_message(&self) -> bool {
        self.message.is_some()
    }

    pub fn is_functor(&self) -> bool {
        self.functor.is_some()
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn param_mode(&self, name: &str) -> Option<&ParamMode> {
        self.params.iter().find(|p| p.name == name).map(|p| &p.mode)
    }
}

/// A fully parsed module: clauses, declarations, and the names of
/// modules it imports/includes (§6). The import graph itself — which
/// modules import which — lives one level up, as a collection of
/// `Module`s keyed by name; flattening that graph into one compilation
/// unit is a front-end concern external to this crate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub clauses: Vec<Rule>,
    pub declarations: Vec<Declaration>,
    pub imports: Vec<String>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Module {
            name: name.into(),
            clauses: Vec::new(),
            declarations: Vec::new(),
            imports: Vec::new(),
        }
    }

    pub fn declaration(&self, name: &str) -> Option<&Declaration> {
        self.declarations.iter().find(|d| d.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_func_parse() {
        assert_eq!(AggregateFunc::parse("count"), Some(AggregateFunc::Count));
        assert_eq!(
            AggregateFunc::parse("top_k"),
            Some(AggregateFunc::Custom("top_k".to_string()))
        );
    }

    #[test]
    fn term_is_variable() {
        assert!(Term::Variable("x".to_string()).is_variable());
        assert!(!Term::Constant(42).is_variable());
    }

    #[test]
    fn atom_creation() {
        let atom = Atom::new("edge", vec![Term::Variable("x".into()), Term::Variable("y".into())]);
        assert_eq!(atom.relation, "edge");
        assert_eq!(atom.arity(), 2);
    }

    #[test]
    fn rule_safety_and_recursion() {
        let rule = Rule::new_simple(
            Atom::new("reach", vec![Term::Variable("x".into()), Term::Variable("y".into())]),
            vec![
                Atom::new("reach", vec![Term::Variable("x".into()), Term::Variable("b".into())]),
                Atom::new("edge", vec![Term::Variable("b".into()), Term::Variable("y".into())]),
            ],
        );
        assert!(rule.is_safe());
        assert!(rule.is_recursive());
    }

    #[test]
    fn rule_rejects_unrestricted_negation() {
        let rule = Rule::new(
            Atom::new("q", vec![Term::Variable("a".into())]),
            vec![BodyPredicate::Negated(Atom::new(
                "p",
                vec![Term::Variable("a".into()), Term::Variable("unbound".into())],
            ))],
        );
        assert!(!rule.is_safe());
    }

    #[test]
    fn function_assignment_counts_as_safe_binding() {
        let rule = Rule::new(
            Atom::new("out", vec![Term::Variable("y".into())]),
            vec![
                BodyPredicate::Positive(Atom::new("src", vec![Term::Variable("x".into())])),
                BodyPredicate::Comparison(
                    Term::Variable("y".into()),
                    ComparisonOp::Equal,
                    Term::FunctionCall(FunctorName::new("double"), vec![Term::Variable("x".into())]),
                ),
            ],
        );
        assert!(rule.is_safe());
    }

    #[test]
    fn declaration_tracks_mutable_merge_functor() {
        let mut decl = Declaration::new("counter");
        decl.params.push(Param::new(
            "n",
            ParamMode::Mutable {
                merge_functor: "sum".to_string(),
            },
        ));
        assert_eq!(decl.arity(), 1);
        assert!(matches!(decl.param_mode("n"), Some(ParamMode::Mutable { .. })));
    }
}
