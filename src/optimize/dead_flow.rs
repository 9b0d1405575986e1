//! Dead-flow elimination (§4.5): liveness is forward reachability from
//! views whose data genuinely originates somewhere (an external receive,
//! or an all-constants SELECT). JOINs are conjunctive — live only if
//! every joined view is live; MERGEs are disjunctive — live as soon as
//! one merged view is live. A SELECT on a relation/io that has no direct
//! root status of its own still becomes live once some INSERT on that
//! same relation/io is live, since it will then actually see data.
//!
//! A cyclic TUP/MERGE pair with no connection to any root at all (a pure
//! self-union producing nothing from outside) needs no special case: it
//! is simply never reached by the sweep below. But a trivial cycle that
//! sits on a MERGE *alongside* another live branch is not caught by
//! reachability — the MERGE's own forward edge reaches the cyclic TUP
//! regardless, even though the TUP only ever feeds back into that same
//! MERGE and so contributes no tuple the live branch doesn't already
//! produce. `remove_trivial_cycles` below is §4.5's `IsTrivialCycle`
//! rule, handling exactly that case.

use std::collections::HashSet;

use crate::arena::Id;
use crate::dfg::Dfg;
use crate::view::{UseSite, View, ViewKind};

/// Runs dead-flow elimination once to fixpoint: liveness sweep, then the
/// condition-kill cascade, repeated until neither changes anything.
pub fn run(dfg: &mut Dfg) {
    loop {
        let live = compute_live_set(dfg);
        let mut changed = false;
        for id in dfg.views.ids().collect::<Vec<_>>() {
            if !live.contains(&id) && dfg.views[id].is_live() {
                dfg.views[id].mark_dead();
                dfg.invalidate(id);
                changed = true;
            }
        }
        update_use_flags(dfg, &live);
        if drop_dead_condition_setters(dfg) {
            changed = true;
        }
        if remove_trivial_cycles(dfg) {
            changed = true;
        }
        if !changed {
            break;
        }
    }
}

/// §4.5 `IsTrivialCycle`: a TUP whose only consumer is a MERGE, and which
/// is itself reachable from that same MERGE, is a pure self-loop — it
/// produces nothing a live sibling branch of the MERGE doesn't already
/// contribute. Drops the TUP from the MERGE's branch list (forwarding
/// any condition it sets up onto the MERGE) rather than waiting on
/// reachability, which can never catch this case while the MERGE has
/// another live branch keeping it reachable.
fn remove_trivial_cycles(dfg: &mut Dfg) -> bool {
    let mut changed = false;
    for id in dfg.views.ids().collect::<Vec<_>>() {
        if !dfg.views[id].is_live() || dfg.views[id].as_tuple().is_none() {
            continue;
        }
        if dfg.views[id].header.uses.len() != 1 {
            continue;
        }
        let Some(edge) = dfg.views[id].header.uses.iter().next().copied() else {
            continue;
        };
        let UseSite::MergedView(_) = edge.site else {
            continue;
        };
        let merge_id = edge.user;
        if dfg.views[merge_id].as_merge().is_none() || !dfg.views[merge_id].is_live() {
            continue;
        }
        if !is_reachable(dfg, merge_id, id) {
            continue;
        }

        dfg.transfer_set_condition(id, merge_id);
        drop_merge_branch(dfg, merge_id, id);
        dfg.views[id].mark_dead();
        dfg.invalidate(merge_id);
        changed = true;
    }
    changed
}

fn is_reachable(dfg: &Dfg, from: Id<View>, to: Id<View>) -> bool {
    let mut seen = HashSet::new();
    let mut stack = vec![from];
    while let Some(current) = stack.pop() {
        if current == to {
            return true;
        }
        if !seen.insert(current) {
            continue;
        }
        stack.extend(dfg.predecessors(current));
    }
    false
}

/// Removes `branch` from `merge`'s branch list, fixing up the
/// `MergedView(slot)` use edges of every branch after it (their slot
/// shifts down by one) so `Dfg::replace_all_uses_with`'s slot lookups
/// stay correct for the survivors.
fn drop_merge_branch(dfg: &mut Dfg, merge_id: Id<View>, branch: Id<View>) {
    let Some(pos) = dfg.views[merge_id].as_merge().and_then(|m| m.merged_views.iter().position(|&v| v == branch))
    else {
        return;
    };
    if let Some(m) = dfg.views[merge_id].as_merge_mut() {
        m.merged_views.remove(pos);
    }
    let remaining: Vec<Id<View>> = dfg.views[merge_id].as_merge().unwrap().merged_views.clone();
    for (new_slot, &v) in remaining.iter().enumerate().skip(pos) {
        let old_slot = new_slot + 1;
        for edge in dfg.views[v].header.uses.iter_mut() {
            if edge.user == merge_id && edge.site == UseSite::MergedView(old_slot) {
                edge.site = UseSite::MergedView(new_slot);
            }
        }
    }
    dfg.views[branch]
        .header
        .uses
        .retain(|e| !(e.user == merge_id && matches!(e.site, UseSite::MergedView(_))));
}

fn compute_live_set(dfg: &Dfg) -> HashSet<Id<View>> {
    let mut live: HashSet<Id<View>> = HashSet::new();
    let mut worklist: Vec<Id<View>> = Vec::new();

    for id in dfg.views.ids() {
        if !dfg.views[id].is_live() {
            continue;
        }
        if let Some(sel) = dfg.views[id].as_select() {
            if sel.is_external() || sel.is_constant() {
                live.insert(id);
                worklist.push(id);
            }
        }
    }

    loop {
        while let Some(id) = worklist.pop() {
            for succ in dfg.successors(id) {
                if live.contains(&succ) || !dfg.views[succ].is_live() {
                    continue;
                }
                if should_activate(dfg, succ, &live) {
                    live.insert(succ);
                    worklist.push(succ);
                }
            }
        }

        let mut pulled_in = false;
        for rel in dfg.relations.ids() {
            let has_live_insert = dfg.relations[rel].inserts.iter().any(|&ins| live.contains(&ins));
            if !has_live_insert {
                continue;
            }
            for &sel in &dfg.relations[rel].selects {
                if dfg.views[sel].is_live() && live.insert(sel) {
                    worklist.push(sel);
                    pulled_in = true;
                }
            }
        }
        for io in dfg.ios.ids() {
            let has_live_insert = dfg.ios[io].inserts.iter().any(|&ins| live.contains(&ins));
            if !has_live_insert {
                continue;
            }
            for &sel in &dfg.ios[io].selects {
                if dfg.views[sel].is_live() && live.insert(sel) {
                    worklist.push(sel);
                    pulled_in = true;
                }
            }
        }

        if !pulled_in {
            break;
        }
    }

    live
}

/// Whether `succ` should be activated now that one of its predecessors
/// just became live. JOIN requires every joined view already live;
/// everything else (including MERGE, where any one branch suffices) only
/// needs the triggering predecessor.
fn should_activate(dfg: &Dfg, succ: Id<View>, live: &HashSet<Id<View>>) -> bool {
    match &dfg.views[succ].kind {
        ViewKind::Join(j) => j.joined_views.iter().all(|v| live.contains(v)),
        _ => true,
    }
}

fn update_use_flags(dfg: &mut Dfg, live: &HashSet<Id<View>>) {
    for id in dfg.views.ids().collect::<Vec<_>>() {
        if !live.contains(&id) {
            continue;
        }
        match dfg.views[id].kind.clone() {
            ViewKind::Join(j) => {
                for v in j.joined_views {
                    dfg.views[v].header.is_used_by_join = true;
                }
            }
            ViewKind::Merge(m) => {
                for v in m.merged_views {
                    dfg.views[v].header.is_used_by_merge = true;
                }
            }
            ViewKind::Negate(n) => {
                dfg.views[n.negated_view].header.is_used_by_negation = true;
            }
            _ => {}
        }
    }
}

/// §4.5 second paragraph: once a condition's setter view has died, its
/// negative testers no longer need to wait on it (vacuously satisfied,
/// so the gate is simply dropped) and its positive testers can never
/// fire (marked unsatisfiable). Returns whether anything changed, so the
/// caller can keep cascading.
fn drop_dead_condition_setters(dfg: &mut Dfg) -> bool {
    let mut changed = false;
    for cid in dfg.conditions.ids().collect::<Vec<_>>() {
        let setter = dfg.conditions[cid].setter;
        let setter_dead = setter.map(|s| !dfg.views[s].is_live()).unwrap_or(false);
        if !setter_dead {
            continue;
        }
        if !dfg.conditions[cid].has_testers() {
            continue;
        }

        let negative_testers: Vec<Id<View>> = dfg.conditions[cid].negative_testers.iter().map(|w| w.id()).collect();
        let positive_testers: Vec<Id<View>> = dfg.conditions[cid].positive_testers.iter().map(|w| w.id()).collect();

        for v in negative_testers {
            if let Some(pos) = dfg.views[v].header.negative_conditions.iter().position(|&c| c == cid) {
                dfg.views[v].header.negative_conditions.remove(pos);
                dfg.invalidate(v);
                changed = true;
            }
        }
        for v in positive_testers {
            if crate::canonicalize::mark_unsat(dfg, v) {
                changed = true;
            }
        }

        dfg.conditions[cid].positive_testers.clear();
        dfg.conditions[cid].negative_testers.clear();
    }
    changed
}
