//! Group-id propagation (§4.2): stamps every JOIN/AGGREGATE's own
//! group-id onto each view built downstream of it within the same
//! clause, so the CSE pass never merges two structurally-identical
//! SELECT chains that originated from different clause bodies.
//!
//! JOIN and AGGREGATE views already carry their own group-id at
//! construction time (`Dfg::fresh_group_id`); this pass is the missing
//! second half, carrying that id forward onto every view reachable from
//! the join/aggregate without leaving the clause that built it.

use std::collections::HashSet;

use crate::arena::Id;
use crate::dfg::Dfg;
use crate::view::View;

/// Call once per clause, after its INS view (`root`) is fully wired up.
pub fn propagate_for_clause(dfg: &mut Dfg, root: Id<View>) {
    let clause_views = clause_view_set(dfg, root);

    let mut sources: Vec<(Id<View>, u32)> = Vec::new();
    for &id in &clause_views {
        if let Some(join) = dfg.views[id].as_join() {
            sources.push((id, join.group_id));
        } else if let Some(agg) = dfg.views[id].as_aggregate() {
            sources.push((id, agg.group_id));
        }
    }

    for (source, group_id) in sources {
        let mut seen: HashSet<Id<View>> = HashSet::new();
        let mut stack = vec![source];
        while let Some(cur) = stack.pop() {
            if !seen.insert(cur) {
                continue;
            }
            for succ in dfg.successors(cur) {
                if !clause_views.contains(&succ) {
                    continue;
                }
                dfg.views[succ].header.add_group_id(group_id);
                stack.push(succ);
            }
        }
    }
}

/// Every view reachable backward from `root` via input/attached columns
/// and join/merge/negate references — exactly the views one call to
/// `build_clause` allocated, since atom SELECTs are never shared across
/// clauses.
fn clause_view_set(dfg: &Dfg, root: Id<View>) -> HashSet<Id<View>> {
    let mut seen = HashSet::new();
    let mut stack = vec![root];
    while let Some(cur) = stack.pop() {
        if !seen.insert(cur) {
            continue;
        }
        for pred in dfg.predecessors(cur) {
            stack.push(pred);
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Atom, BodyPredicate, Module, Rule, Term};
    use crate::builder::build_clause;

    #[test]
    fn cartesian_join_stamps_group_id_on_head_and_branches() {
        let mut dfg = Dfg::new();
        let module = Module::new("m");
        let rule = Rule::new(
            Atom::new("pairs", vec![Term::Variable("a".into()), Term::Variable("b".into())]),
            vec![
                BodyPredicate::Positive(Atom::new("node", vec![Term::Variable("a".into())])),
                BodyPredicate::Positive(Atom::new("node", vec![Term::Variable("b".into())])),
            ],
        );
        let ins = build_clause(&mut dfg, &module, &rule).unwrap();
        assert!(!dfg.views[ins].header.group_ids.is_empty());

        let tup = dfg.views[ins].header.input_columns[0].view;
        assert!(!dfg.views[tup].header.group_ids.is_empty());
    }
}
