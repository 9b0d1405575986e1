//! NEGATE: admits a tuple iff absent from the negated view (§3).

use crate::arena::Id;
use crate::view::View;

#[derive(Debug, Clone)]
pub struct Negate {
    pub negated_view: Id<View>,
    /// A `never` hint lets the back-end skip monotone re-checks when the
    /// negated view is known never to retract (§3).
    pub never_hint: bool,
}

impl Negate {
    pub fn new(negated_view: Id<View>) -> Self {
        Negate {
            negated_view,
            never_hint: false,
        }
    }
}
