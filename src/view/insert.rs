//! INSERT: sink node writing into a relation or transmitting a message (§3).
//!
//! Carries no output columns: its `input_columns` on the shared header
//! supply the tuple being written, in relation/message column order.

use crate::arena::Id;
use crate::relation::{Io, Relation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertTarget {
    Relation(Id<Relation>),
    Io(Id<Io>),
}

#[derive(Debug, Clone)]
pub struct Insert {
    pub target: InsertTarget,
}

impl Insert {
    pub fn new(target: InsertTarget) -> Self {
        Insert { target }
    }
}
