//! Builder Patterns for AST Construction
//!
//! Provides fluent APIs for constructing AST nodes, particularly useful for
//! tests.
//!
//! ## Example
//!
//! ```rust
//! use datalog_dataflow_core::ast::builders::{AtomBuilder, RuleBuilder};
//!
//! // Build an atom: path(x, y)
//! let atom = AtomBuilder::new("path")
//!     .var("x")
//!     .var("y")
//!     .build();
//!
//! // Build a rule: path(x, y) :- edge(x, y).
//! let rule = RuleBuilder::new("path")
//!     .head_vars(["x", "y"])
//!     .body_atom("edge", ["x", "y"])
//!     .build();
//!
//! // Build a recursive rule: path(x, z) :- path(x, y), edge(y, z).
//! let recursive = RuleBuilder::new("path")
//!     .head_vars(["x", "z"])
//!     .body_atom("path", ["x", "y"])
//!     .body_atom("edge", ["y", "z"])
//!     .build();
//! ```

use super::{
    Atom, BodyPredicate, ComparisonOp, Declaration, FunctorAttrs, FunctorRangeDecl, MessageAttrs,
    Param, ParamMode, Rule, Term,
};

/// Builder for constructing `Atom` instances.
#[derive(Debug, Clone)]
pub struct AtomBuilder {
    relation: String,
    args: Vec<Term>,
}

impl AtomBuilder {
    pub fn new(relation: impl Into<String>) -> Self {
        AtomBuilder {
            relation: relation.into(),
            args: Vec::new(),
        }
    }

    pub fn var(mut self, name: impl Into<String>) -> Self {
        self.args.push(Term::Variable(name.into()));
        self
    }

    pub fn vars<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self.args.push(Term::Variable(name.into()));
        }
        self
    }

    pub fn constant(mut self, value: i64) -> Self {
        self.args.push(Term::Constant(value));
        self
    }

    pub fn term(mut self, term: Term) -> Self {
        self.args.push(term);
        self
    }

    pub fn build(self) -> Atom {
        Atom::new(self.relation, self.args)
    }
}

/// Builder for constructing `Rule` instances.
#[derive(Debug, Clone)]
pub struct RuleBuilder {
    head_relation: String,
    head_args: Vec<Term>,
    body: Vec<BodyPredicate>,
}

impl RuleBuilder {
    pub fn new(head_relation: impl Into<String>) -> Self {
        RuleBuilder {
            head_relation: head_relation.into(),
            head_args: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn head_vars<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.head_args = names.into_iter().map(|n| Term::Variable(n.into())).collect();
        self
    }

    pub fn body_atom<I, S>(mut self, relation: impl Into<String>, vars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.body.push(BodyPredicate::Positive(
            AtomBuilder::new(relation).vars(vars).build(),
        ));
        self
    }

    pub fn negated_atom<I, S>(mut self, relation: impl Into<String>, vars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.body.push(BodyPredicate::Negated(
            AtomBuilder::new(relation).vars(vars).build(),
        ));
        self
    }

    pub fn comparison(mut self, left: Term, op: ComparisonOp, right: Term) -> Self {
        self.body.push(BodyPredicate::Comparison(left, op, right));
        self
    }

    pub fn build(self) -> Rule {
        Rule::new(Atom::new(self.head_relation, self.head_args), self.body)
    }
}

/// Builder for constructing `Declaration` instances.
#[derive(Debug, Clone)]
pub struct DeclarationBuilder {
    decl: Declaration,
}

impl DeclarationBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        DeclarationBuilder {
            decl: Declaration::new(name),
        }
    }

    pub fn bound_param(mut self, name: impl Into<String>) -> Self {
        self.decl.params.push(Param::new(name, ParamMode::Bound));
        self
    }

    pub fn free_param(mut self, name: impl Into<String>) -> Self {
        self.decl.params.push(Param::new(name, ParamMode::Free));
        self
    }

    pub fn mutable_param(mut self, name: impl Into<String>, merge_functor: impl Into<String>) -> Self {
        self.decl.params.push(Param::new(
            name,
            ParamMode::Mutable {
                merge_functor: merge_functor.into(),
            },
        ));
        self
    }

    pub fn as_message(mut self, differential: bool) -> Self {
        self.decl.message = Some(MessageAttrs { differential });
        self
    }

    pub fn as_functor(mut self, pure: bool, range: FunctorRangeDecl) -> Self {
        self.decl.functor = Some(FunctorAttrs { pure, range });
        self
    }

    pub fn exported(mut self) -> Self {
        self.decl.export = true;
        self
    }

    pub fn query(mut self) -> Self {
        self.decl.query = true;
        self
    }

    pub fn local(mut self) -> Self {
        self.decl.local = true;
        self
    }

    pub fn divergent(mut self) -> Self {
        self.decl.divergent = true;
        self
    }

    pub fn differential(mut self) -> Self {
        self.decl.differential = true;
        self
    }

    pub fn build(self) -> Declaration {
        self.decl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atom_builder_builds_expected_shape() {
        let atom = AtomBuilder::new("edge").var("x").var("y").build();
        assert_eq!(atom.relation, "edge");
        assert_eq!(atom.args, vec![Term::Variable("x".into()), Term::Variable("y".into())]);
    }

    #[test]
    fn rule_builder_builds_recursive_rule() {
        let rule = RuleBuilder::new("path")
            .head_vars(["x", "z"])
            .body_atom("path", ["x", "y"])
            .body_atom("edge", ["y", "z"])
            .build();
        assert!(rule.is_recursive());
        assert!(rule.is_safe());
    }

    #[test]
    fn declaration_builder_marks_mutable_message() {
        let decl = DeclarationBuilder::new("counter")
            .mutable_param("n", "sum")
            .as_message(true)
            .differential()
            .build();
        assert!(decl.is_message());
        assert!(decl.differential);
        assert_eq!(decl.arity(), 1);
    }
}
