//! SELECT: entry points reading from a relation, a stream, or an IO (§3).

use crate::arena::Id;
use crate::relation::{Constant, Io, Relation};

/// What a SELECT reads from.
#[derive(Debug, Clone)]
pub enum SelectSource {
    /// An internal table.
    Relation(Id<Relation>),
    /// An external published/consumed message.
    Io(Id<Io>),
    /// An all-constants row stream (e.g. the single row of `foo(1,2,3).`).
    /// Scenario 1 in §8 is the canonical user of this variant.
    Constant(Vec<Constant>),
}

#[derive(Debug, Clone)]
pub struct Select {
    pub source: SelectSource,
}

impl Select {
    pub fn new(source: SelectSource) -> Self {
        Select { source }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.source, SelectSource::Constant(_))
    }

    pub fn is_external(&self) -> bool {
        matches!(self.source, SelectSource::Io(_))
    }
}
