//! Induction analysis (§4.6): classifies every live MERGE as inductive or
//! not, groups mutually-inductive merges into merge sets via a disjoint-set
//! forest, injects UNION nodes at sites where an inductive path would
//! otherwise leave the induction uninterrupted, and validates that every
//! merge set is linearizable (has at least one non-inductive predecessor
//! and successor) before handing the graph to differential classification
//! and the finalizer.
//!
//! Grounded on the teacher's `recursion.rs` (`DependencyGraph`,
//! `is_recursive_rule`) generalized from source-level relation-dependency
//! SCCs to DFG-level self-reachability of MERGE nodes.

use std::collections::{HashMap, HashSet};

use crate::arena::Id;
use crate::ast::Module;
use crate::column::ColumnRef;
use crate::config::InductionConfig;
use crate::dfg::Dfg;
use crate::error::{CoreResult, Diagnostics};
use crate::view::{Merge, UseEdge, UseSite, View, ViewKind};

/// Runs induction classification to fixpoint. Injections can invalidate
/// a classification already computed (§4.6 step 4: "this may invalidate
/// the classification; restart the whole analysis if injections were
/// made"), so the whole pipeline below is retried until a round performs
/// no injection.
pub fn classify(dfg: &mut Dfg, module: &Module, config: &InductionConfig, diagnostics: &mut Diagnostics) -> CoreResult<()> {
    loop {
        reset(dfg);
        let merges = live_merges(dfg);
        mark_inductive(dfg, &merges);

        let mut forest = UnionFind::new(&merges);
        union_inductive_successors(dfg, &merges, &mut forest);
        mark_requires_storage(dfg, &merges, &forest);

        if inject_exit_sites(dfg, &merges, &forest) {
            continue;
        }

        assign_merge_sets_and_depths(dfg, &merges, &forest);
        validate_linearizable(dfg, module, &merges, &forest, config, diagnostics);
        break;
    }
    Ok(())
}

fn reset(dfg: &mut Dfg) {
    for id in dfg.views.ids().collect::<Vec<_>>() {
        if let ViewKind::Merge(m) = &mut dfg.views[id].kind {
            m.is_inductive = false;
            m.merge_set = None;
            m.induction_depth = 0;
            m.requires_storage = false;
        }
    }
}

fn live_merges(dfg: &Dfg) -> Vec<Id<View>> {
    dfg.views
        .ids()
        .filter(|&id| dfg.views[id].is_live() && dfg.views[id].as_merge().is_some())
        .collect()
}

/// §4.6 step 1: a merge is inductive iff it is reachable from itself by
/// transitive dataflow.
fn mark_inductive(dfg: &mut Dfg, merges: &[Id<View>]) {
    for &m in merges {
        if reachable_forward(dfg, m).contains(&m) {
            if let ViewKind::Merge(merge) = &mut dfg.views[m].kind {
                merge.is_inductive = true;
            }
        }
    }
}

fn is_inductive(dfg: &Dfg, id: Id<View>) -> bool {
    dfg.views[id].as_merge().map(|m| m.is_inductive).unwrap_or(false)
}

/// §4.6 step 2-3: the strongly-connected component containing an
/// inductive merge is exactly the set of nodes lying on some path from
/// the merge back to itself. Any other inductive merge inside that SCC
/// necessarily shares the same fixpoint loop, so they are unioned.
fn union_inductive_successors(dfg: &Dfg, merges: &[Id<View>], forest: &mut UnionFind) {
    for &m in merges {
        if !is_inductive(dfg, m) {
            continue;
        }
        for &other in merges {
            if other == m || !is_inductive(dfg, other) {
                continue;
            }
            if cycle_region(dfg, m).contains(&other) {
                forest.union(m, other);
            }
        }
    }
}

/// §4.6 step 3 (second half): a merge that reaches itself along a path
/// touching no *other* inductive merge needs its own storage rather than
/// streaming through a sibling's.
fn mark_requires_storage(dfg: &mut Dfg, merges: &[Id<View>], forest: &UnionFind) {
    for &m in merges {
        if !is_inductive(dfg, m) {
            continue;
        }
        let region = cycle_region(dfg, m);
        let passes_through_sibling = merges.iter().any(|&other| {
            other != m && is_inductive(dfg, other) && forest.find(other) == forest.find(m) && region.contains(&other)
        });
        if !passes_through_sibling {
            if let ViewKind::Merge(merge) = &mut dfg.views[m].kind {
                merge.requires_storage = true;
            }
        }
    }
}

/// The set of views lying on some path from `m` forward back to `m`
/// (the SCC containing `m`), including `m` itself.
fn cycle_region(dfg: &Dfg, m: Id<View>) -> HashSet<Id<View>> {
    let forward = reachable_forward(dfg, m);
    let backward = reachable_backward(dfg, m);
    forward.intersection(&backward).copied().chain(std::iter::once(m)).collect()
}

fn reachable_forward(dfg: &Dfg, start: Id<View>) -> HashSet<Id<View>> {
    bfs(start, |id| dfg.successors(id))
}

fn reachable_backward(dfg: &Dfg, start: Id<View>) -> HashSet<Id<View>> {
    bfs(start, |id| dfg.predecessors(id))
}

fn bfs(start: Id<View>, mut neighbors: impl FnMut(Id<View>) -> Vec<Id<View>>) -> HashSet<Id<View>> {
    let mut seen = HashSet::new();
    let mut stack = vec![start];
    while let Some(cur) = stack.pop() {
        for next in neighbors(cur) {
            if seen.insert(next) {
                stack.push(next);
            }
        }
    }
    seen
}

/// §4.6 step 4: for every view inside a merge set's induction region,
/// any direct consumer outside the region (and not already a MERGE
/// belonging to the same set) is an injection site — a fresh UNION is
/// spliced onto that specific edge so every exit crosses a member of the
/// set. Returns whether any injection was made.
fn inject_exit_sites(dfg: &mut Dfg, merges: &[Id<View>], forest: &UnionFind) -> bool {
    let mut regions: HashMap<Id<View>, HashSet<Id<View>>> = HashMap::new();
    for &m in merges {
        if !is_inductive(dfg, m) {
            continue;
        }
        let root = forest.find(m);
        regions.entry(root).or_default().extend(cycle_region(dfg, m));
    }

    let mut injected = false;
    for (root, region) in regions {
        for &u in &region {
            if inject_for_node(dfg, u, &region, root, forest) {
                injected = true;
            }
        }
    }
    injected
}

fn inject_for_node(dfg: &mut Dfg, u: Id<View>, region: &HashSet<Id<View>>, set_root: Id<View>, forest: &UnionFind) -> bool {
    if !dfg.views[u].is_live() {
        return false;
    }
    let exits: Vec<UseEdge> = dfg.views[u]
        .header
        .uses
        .iter()
        .copied()
        .filter(|edge| {
            if region.contains(&edge.user) {
                return false;
            }
            // Already exits through a union belonging to the same set —
            // nothing to inject.
            if dfg.views[edge.user].as_merge().is_some() && is_inductive(dfg, edge.user) && forest.find(edge.user) == set_root {
                return false;
            }
            true
        })
        .collect();

    if exits.is_empty() {
        return false;
    }

    let injected = inject_union_over(dfg, u);
    redirect_edges(dfg, u, injected, &exits);
    true
}

/// Builds a single-branch MERGE over `u` with the same column shape,
/// tagged as an injection so a later finalizer pass can recognize it.
fn inject_union_over(dfg: &mut Dfg, u: Id<View>) -> Id<View> {
    let mut merge = Merge::new(vec![]);
    merge.is_injected = true;
    let id = dfg.alloc_view(ViewKind::Merge(merge));
    dfg.link_merged_view(id, u);
    let cols = dfg.views[u].header.columns.clone();
    for col in cols {
        let mut new_col = crate::column::Column::new(id, col.logical_id, col.index, col.ty.clone());
        new_col.source_var = col.source_var.clone();
        dfg.views[id].header.columns.push(new_col);
    }
    id
}

fn redirect_edges(dfg: &mut Dfg, from: Id<View>, to: Id<View>, edges: &[UseEdge]) {
    dfg.views[from].header.uses.retain(|e| !edges.contains(e));
    for edge in edges {
        dfg.views[to].header.uses.insert(*edge);
        match edge.site {
            UseSite::InputColumn(slot) => {
                if let Some(cur) = dfg.views[edge.user].header.input_columns.get_mut(slot) {
                    *cur = ColumnRef::new(to, cur.index);
                }
            }
            UseSite::AttachedColumn(slot) => {
                if let Some(cur) = dfg.views[edge.user].header.attached_columns.get_mut(slot) {
                    *cur = ColumnRef::new(to, cur.index);
                }
            }
            UseSite::JoinedView(slot) => {
                if let Some(j) = dfg.views[edge.user].as_join_mut() {
                    if let Some(cur) = j.joined_views.get_mut(slot) {
                        *cur = to;
                    }
                }
            }
            UseSite::MergedView(slot) => {
                if let Some(m) = dfg.views[edge.user].as_merge_mut() {
                    if let Some(cur) = m.merged_views.get_mut(slot) {
                        *cur = to;
                    }
                }
            }
            UseSite::NegatedView => {
                if let ViewKind::Negate(n) = &mut dfg.views[edge.user].kind {
                    n.negated_view = to;
                }
            }
        }
        dfg.invalidate(edge.user);
    }
}

/// §4.6 step 5: assign every merge set a group id and a within-set depth
/// so the back-end can schedule nested inductions.
fn assign_merge_sets_and_depths(dfg: &mut Dfg, merges: &[Id<View>], forest: &UnionFind) {
    let mut next_group_id: HashMap<Id<View>, u32> = HashMap::new();
    let mut next_depth: HashMap<Id<View>, u32> = HashMap::new();

    for &m in merges {
        if !is_inductive(dfg, m) {
            continue;
        }
        let root = forest.find(m);
        let group_id = *next_group_id.entry(root).or_insert_with(|| dfg.fresh_group_id());
        let depth = next_depth.entry(root).or_insert(0);
        let this_depth = *depth;
        *depth += 1;

        if let ViewKind::Merge(merge) = &mut dfg.views[m].kind {
            merge.merge_set = Some(group_id);
            merge.induction_depth = this_depth;
        }
    }
}

/// §4.6 step 6: a merge set is linearizable only if it has at least one
/// non-inductive predecessor (a base case feeding it from outside the
/// cycle) and one non-inductive successor (an escape for results to
/// reach the rest of the program). Violations are diagnosed unless the
/// owning declaration carries `@divergent`.
fn validate_linearizable(
    dfg: &Dfg,
    module: &Module,
    merges: &[Id<View>],
    forest: &UnionFind,
    config: &InductionConfig,
    diagnostics: &mut Diagnostics,
) {
    let mut sets: HashMap<Id<View>, Vec<Id<View>>> = HashMap::new();
    for &m in merges {
        if is_inductive(dfg, m) {
            sets.entry(forest.find(m)).or_default().push(m);
        }
    }

    for (_, members) in sets {
        let region: HashSet<Id<View>> = members.iter().flat_map(|&m| cycle_region(dfg, m)).collect();

        let has_noninductive_predecessor = members.iter().any(|&m| {
            dfg.predecessors(m).iter().any(|p| !region.contains(p))
        });
        let has_noninductive_successor = members.iter().any(|&m| {
            dfg.successors(m).iter().any(|s| !region.contains(s))
        });

        if has_noninductive_predecessor && has_noninductive_successor {
            continue;
        }

        let divergent = members.iter().any(|&m| owning_declaration_is_divergent(dfg, module, m));
        if divergent {
            continue;
        }

        let message = format!(
            "merge set rooted at view {} is non-linearizable: missing {}",
            dfg.tag(members[0]),
            match (has_noninductive_predecessor, has_noninductive_successor) {
                (false, false) => "a non-inductive predecessor and successor",
                (false, true) => "a non-inductive predecessor",
                (true, false) => "a non-inductive successor",
                (true, true) => unreachable!(),
            }
        );

        if config.divergent_is_error {
            diagnostics.report(format!("semantic error: {message}"));
        } else {
            diagnostics.report(message);
        }
    }
}

/// Best-effort lookup of whether any relation this merge ultimately
/// feeds is declared `@divergent`. Walks forward to the nearest INSERT
/// views and checks their target's declaration.
fn owning_declaration_is_divergent(dfg: &Dfg, module: &Module, m: Id<View>) -> bool {
    for succ in reachable_forward(dfg, m) {
        if let Some(insert) = dfg.views[succ].as_insert() {
            let name = match insert.target {
                crate::view::InsertTarget::Relation(r) => dfg.relations[r].name.clone(),
                crate::view::InsertTarget::Io(io) => dfg.ios[io].name.clone(),
            };
            if module.declaration(&name).map(|d| d.divergent).unwrap_or(false) {
                return true;
            }
        }
    }
    false
}

/// A disjoint-set forest over merge-view ids, restricted to the merges
/// passed to [`UnionFind::new`] (§4.6 step 3).
struct UnionFind {
    parent: HashMap<Id<View>, Id<View>>,
}

impl UnionFind {
    fn new(ids: &[Id<View>]) -> Self {
        UnionFind {
            parent: ids.iter().map(|&id| (id, id)).collect(),
        }
    }

    fn find(&self, id: Id<View>) -> Id<View> {
        let mut cur = id;
        while let Some(&p) = self.parent.get(&cur) {
            if p == cur {
                return cur;
            }
            cur = p;
        }
        id
    }

    fn union(&mut self, a: Id<View>, b: Id<View>) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent.insert(ra, rb);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::RuleBuilder;
    use crate::ast::Module;
    use crate::builder::build_clause;
    use crate::config::InductionConfig;
    use crate::connector::connect;
    use crate::error::Diagnostics;

    fn build_reach_module() -> (Dfg, Module) {
        let mut dfg = Dfg::new();
        let module = Module::new("m");
        let base = RuleBuilder::new("reach").head_vars(["a", "b"]).body_atom("edge", ["a", "b"]).build();
        let rec = RuleBuilder::new("reach")
            .head_vars(["a", "c"])
            .body_atom("reach", ["a", "b"])
            .body_atom("edge", ["b", "c"])
            .build();
        build_clause(&mut dfg, &module, &base).unwrap();
        build_clause(&mut dfg, &module, &rec).unwrap();
        connect(&mut dfg, &module);
        crate::optimize::run(&mut dfg, &crate::config::FixpointConfig::default());
        (dfg, module)
    }

    #[test]
    fn recursive_relation_produces_an_inductive_merge() {
        let (mut dfg, module) = build_reach_module();
        let mut diags = Diagnostics::new();
        classify(&mut dfg, &module, &InductionConfig::default(), &mut diags).unwrap();

        let merges: Vec<Id<View>> = dfg.views.ids().filter(|&id| dfg.views[id].is_live() && dfg.views[id].as_merge().is_some()).collect();
        assert!(merges.iter().any(|&m| dfg.views[m].as_merge().unwrap().is_inductive));
        let inductive = merges.iter().find(|&&m| dfg.views[m].as_merge().unwrap().is_inductive).unwrap();
        assert!(dfg.views[*inductive].as_merge().unwrap().merge_set.is_some());
    }

    #[test]
    fn non_recursive_relation_has_no_inductive_merge() {
        let mut dfg = Dfg::new();
        let module = Module::new("m");
        let a = RuleBuilder::new("pairs").head_vars(["x", "y"]).body_atom("node", ["x"]).body_atom("node", ["y"]).build();
        build_clause(&mut dfg, &module, &a).unwrap();
        connect(&mut dfg, &module);
        crate::optimize::run(&mut dfg, &crate::config::FixpointConfig::default());

        let mut diags = Diagnostics::new();
        classify(&mut dfg, &module, &InductionConfig::default(), &mut diags).unwrap();

        let any_inductive = dfg
            .views
            .ids()
            .filter_map(|id| dfg.views[id].as_merge())
            .any(|m| m.is_inductive);
        assert!(!any_inductive);
    }

    #[test]
    fn divergent_declaration_suppresses_the_linearizability_diagnostic() {
        let (mut dfg, mut module) = build_reach_module();
        module.declarations.push(
            crate::ast::builders::DeclarationBuilder::new("reach").divergent().build(),
        );
        let mut diags = Diagnostics::new();
        classify(&mut dfg, &module, &InductionConfig::default(), &mut diags).unwrap();
        assert!(diags.is_empty());
    }
}
