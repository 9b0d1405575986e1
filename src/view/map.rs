//! MAP: applies a host functor with a binding pattern (§3, §6).

/// How many tuples a functor application produces per input binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctorRange {
    ExactlyOne,
    ZeroOrOne,
    ZeroOrMore,
    OneOrMore,
}

impl FunctorRange {
    /// A functor whose range admits producing zero tuples for an input
    /// can filter, same as a `Compare`; one whose range admits more than
    /// one cannot be treated as a pure forwarding map by canonicalization.
    pub fn may_produce_none(self) -> bool {
        matches!(self, FunctorRange::ZeroOrOne | FunctorRange::ZeroOrMore)
    }

    pub fn may_produce_many(self) -> bool {
        matches!(self, FunctorRange::ZeroOrMore | FunctorRange::OneOrMore)
    }
}

/// Identifies the host functor a MAP or AGGREGATE invokes. Arity is
/// tracked separately via the view's column counts; this crate treats
/// functors as opaque callables named by the source declaration, never
/// inlining or specializing their behavior (that belongs to the excluded
/// runtime/codegen layers).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctorRef {
    pub name: String,
}

impl FunctorRef {
    pub fn new(name: impl Into<String>) -> Self {
        FunctorRef { name: name.into() }
    }
}

/// Whether one functor parameter is a `bound` input or a `free` output
/// (§6 parameter modes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamBinding {
    Bound,
    Free,
}

#[derive(Debug, Clone)]
pub struct Map {
    pub functor: FunctorRef,
    /// One entry per functor parameter, in declaration order.
    pub bindings: Vec<ParamBinding>,
    pub range: FunctorRange,
    /// Impure functors may produce deletions (§4.7); pure ones never do.
    pub is_impure: bool,
}

impl Map {
    pub fn new(functor: FunctorRef, bindings: Vec<ParamBinding>, range: FunctorRange) -> Self {
        Map {
            functor,
            bindings,
            range,
            is_impure: false,
        }
    }

    /// Filter-only iff every parameter is bound (§6): no free outputs
    /// means the functor can only admit or reject, not produce new
    /// columns.
    pub fn is_filter_only(&self) -> bool {
        self.bindings
            .iter()
            .all(|b| matches!(b, ParamBinding::Bound))
    }
}
