//! Reference-counted boolean conditions (§3 COND, §9 Condition lifecycle).

use crate::arena::{Id, WeakRef};
use crate::view::View;

/// A reference-counted gate controlling whether a view's tuples are
/// admitted or produced.
///
/// Setter views increment the count when they produce a tuple and
/// decrement it when they retract one; testers gate their output on the
/// count being nonzero (positive test) or zero (negative test). The
/// setter/tester lists here are the condition-object half of the
/// symmetric bookkeeping described in §9; the view-object half lives on
/// each `View`'s `sets_condition`/`positive_conditions`/
/// `negative_conditions` fields. `Dfg`'s helpers (`transfer_set_condition`,
/// `drop_tested_conditions`, `copy_tested_conditions`) keep both halves in
/// sync — never mutate one side without the other.
#[derive(Debug, Clone)]
pub struct Condition {
    /// The single view that strong-owns (sets) this condition, if any.
    /// `None` only transiently, between allocation and the setter being
    /// wired up by the builder.
    pub setter: Option<Id<View>>,
    /// Views that test this condition positively (admit iff count != 0).
    pub positive_testers: Vec<WeakRef<View>>,
    /// Views that test this condition negatively (admit iff count == 0).
    pub negative_testers: Vec<WeakRef<View>>,
}

impl Condition {
    pub fn new() -> Self {
        Condition {
            setter: None,
            positive_testers: Vec::new(),
            negative_testers: Vec::new(),
        }
    }

    pub fn has_testers(&self) -> bool {
        !self.positive_testers.is_empty() || !self.negative_testers.is_empty()
    }

    pub fn add_positive_tester(&mut self, view: Id<View>) {
        self.positive_testers.push(WeakRef::new(view));
    }

    pub fn add_negative_tester(&mut self, view: Id<View>) {
        self.negative_testers.push(WeakRef::new(view));
    }

    pub fn remove_tester(&mut self, view: Id<View>) {
        self.positive_testers.retain(|w| w.id() != view);
        self.negative_testers.retain(|w| w.id() != view);
    }
}

impl Default for Condition {
    fn default() -> Self {
        Condition::new()
    }
}
