//! COMPARE: binary relational operator on two input columns (§3, §4.3).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Gt,
}

impl CompareOp {
    /// Equality is the only operator that unifies its two output columns
    /// into one (§3: "Equality merges its two output columns into one").
    pub fn unifies_outputs(self) -> bool {
        matches!(self, CompareOp::Eq)
    }

    pub fn negated(self) -> CompareOp {
        match self {
            CompareOp::Eq => CompareOp::Ne,
            CompareOp::Ne => CompareOp::Eq,
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Gt => CompareOp::Lt,
        }
    }
}

/// The left and right operands live in the view header's `input_columns`
/// (index 0 and 1); any further pass-through context lives in
/// `attached_columns`. This struct carries only the operator tag.
#[derive(Debug, Clone)]
pub struct Compare {
    pub op: CompareOp,
}

impl Compare {
    pub fn new(op: CompareOp) -> Self {
        Compare { op }
    }
}
