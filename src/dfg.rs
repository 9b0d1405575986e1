//! The compilation context: owning arenas for every node kind, plus the
//! cross-cutting operations (`ReplaceAllUsesWith`, structural hash/equality,
//! condition lifecycle, depth) that every later pass shares (§5, §9).
//!
//! §9 "Global mutable state": the original has a few module-level mutable
//! configuration stores; here they become this one explicit value threaded
//! through every pass instead.

use std::collections::HashMap;

use crate::arena::{Arena, Id, VisitedPairs, WeakRef};
use crate::column::{Column, ColumnRef};
use crate::condition::Condition;
use crate::relation::{Io, Relation};
use crate::view::{UseEdge, UseSite, View, ViewKind};

/// Owns every arena-allocated node kind for one compilation run. Nothing
/// outlives a `Dfg`; back-ends receive an immutable `FinalizedDfg` view
/// (§6) built from one at the end of the pipeline.
#[derive(Debug)]
pub struct Dfg {
    pub views: Arena<View>,
    pub relations: Arena<Relation>,
    pub ios: Arena<Io>,
    pub conditions: Arena<Condition>,
    relations_by_name: HashMap<String, Id<Relation>>,
    ios_by_name: HashMap<String, Id<Io>>,
    next_group_id: u32,
    next_logical_id: u32,
}

impl Dfg {
    pub fn new() -> Self {
        Dfg {
            views: Arena::new(),
            relations: Arena::new(),
            ios: Arena::new(),
            conditions: Arena::new(),
            relations_by_name: HashMap::new(),
            ios_by_name: HashMap::new(),
            next_group_id: 0,
            next_logical_id: 0,
        }
    }

    /// A fresh column-equivalence id (§3 COL `logical_id`), used by the
    /// builder for raw per-position columns before union-find folding
    /// establishes which of them are equal, and by the finalizer (§4.8)
    /// when a view kind must invent a new id for an output.
    pub fn fresh_logical_id(&mut self) -> u32 {
        let id = self.next_logical_id;
        self.next_logical_id += 1;
        id
    }

    pub fn alloc_view(&mut self, kind: ViewKind) -> Id<View> {
        self.views.alloc(View::new(kind))
    }

    pub fn relation_named(&mut self, name: &str, arity: usize) -> Id<Relation> {
        if let Some(id) = self.relations_by_name.get(name) {
            return *id;
        }
        let id = self.relations.alloc(Relation::new(name, arity));
        self.relations_by_name.insert(name.to_string(), id);
        id
    }

    pub fn io_named(&mut self, name: &str, arity: usize) -> Id<Io> {
        if let Some(id) = self.ios_by_name.get(name) {
            return *id;
        }
        let id = self.ios.alloc(Io::new(name, arity));
        self.ios_by_name.insert(name.to_string(), id);
        id
    }

    pub fn alloc_condition(&mut self) -> Id<Condition> {
        self.conditions.alloc(Condition::new())
    }

    /// Fresh group id, transitively stamped onto every column reachable
    /// from a new JOIN/AGG's outputs (§4.2).
    pub fn fresh_group_id(&mut self) -> u32 {
        let id = self.next_group_id;
        self.next_group_id += 1;
        id
    }

    // ------------------------------------------------------------------
    // Column linking — keeps a view's input/attached column list and the
    // producer's use list in sync, which is the only path that should
    // ever populate either (§9).
    // ------------------------------------------------------------------

    pub fn link_input(&mut self, consumer: Id<View>, producer: ColumnRef) {
        let slot = self.views[consumer].header.input_columns.len();
        self.views[consumer].header.input_columns.push(producer);
        self.views[producer.view].header.uses.insert(UseEdge {
            user: consumer,
            site: UseSite::InputColumn(slot),
        });
    }

    pub fn link_attached(&mut self, consumer: Id<View>, producer: ColumnRef) {
        let slot = self.views[consumer].header.attached_columns.len();
        self.views[consumer].header.attached_columns.push(producer);
        self.views[producer.view].header.uses.insert(UseEdge {
            user: consumer,
            site: UseSite::AttachedColumn(slot),
        });
    }

    pub fn link_joined_view(&mut self, join: Id<View>, joined: Id<View>) {
        let slot = self.views[join].as_join().map(|j| j.joined_views.len()).unwrap_or(0);
        if let Some(j) = self.views[join].as_join_mut() {
            j.joined_views.push(joined);
        }
        self.views[joined].header.uses.insert(UseEdge {
            user: join,
            site: UseSite::JoinedView(slot),
        });
    }

    pub fn link_merged_view(&mut self, merge: Id<View>, merged: Id<View>) {
        let slot = self.views[merge].as_merge().map(|m| m.merged_views.len()).unwrap_or(0);
        if let Some(m) = self.views[merge].as_merge_mut() {
            m.merged_views.push(merged);
        }
        self.views[merged].header.uses.insert(UseEdge {
            user: merge,
            site: UseSite::MergedView(slot),
        });
    }

    pub fn link_negated_view(&mut self, negate: Id<View>, negated: Id<View>) {
        self.views[negated].header.uses.insert(UseEdge {
            user: negate,
            site: UseSite::NegatedView,
        });
    }

    // ------------------------------------------------------------------
    // Invalidation and replacement (§5, §9)
    // ------------------------------------------------------------------

    /// Invalidates cached hash/depth on `id` and transitively on every
    /// view that uses it, per §5's `Update` propagation rule.
    pub fn invalidate(&mut self, id: Id<View>) {
        let mut stack = vec![id];
        let mut seen = std::collections::HashSet::new();
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            self.views[current].header.invalidate();
            let users: Vec<Id<View>> = self.views[current].header.uses.iter().map(|e| e.user).collect();
            stack.extend(users);
        }
    }

    /// Substitutes every use of `old` by the corresponding slot of `new`,
    /// including condition and group-id transfer, and marks `old` dead
    /// (§9). Walks `old`'s use list once — O(uses).
    ///
    /// Assumes `new`'s output columns occupy the *same* positions as
    /// `old`'s (the common case: a view being proxied by a same-arity
    /// rewrite of itself, or a TUPLE that forwards a predecessor in that
    /// predecessor's own column order). When a canonicalization rule
    /// narrows or reorders columns, use [`Dfg::replace_all_uses_with_remap`]
    /// instead so references to since-dropped positions resolve correctly.
    pub fn replace_all_uses_with(&mut self, old: Id<View>, new: Id<View>) {
        self.replace_all_uses_with_impl(old, new, &|idx, new_len| idx.min(new_len.saturating_sub(1)));
    }

    /// Like [`Dfg::replace_all_uses_with`], but for a `new` whose output
    /// columns are a narrowed and/or reordered subset of `old`'s:
    /// `remap[old_index]` gives the corresponding slot on `new` explicitly,
    /// rather than relying on the positional clamp the common case uses.
    /// Every `old_index` actually referenced by a live consumer must have
    /// an entry (canonicalization rules that drop a column only do so once
    /// they've proven no consumer references it, per §4.3(c); a `remap`
    /// missing such a referenced index is a bug in the caller, not a
    /// recoverable condition, so this panics rather than clamping).
    pub fn replace_all_uses_with_remap(&mut self, old: Id<View>, new: Id<View>, remap: &[usize]) {
        self.replace_all_uses_with_impl(old, new, &|idx, _| {
            remap
                .get(idx)
                .copied()
                .unwrap_or_else(|| panic!("replace_all_uses_with_remap: no entry for referenced column {idx}"))
        });
    }

    fn replace_all_uses_with_impl(&mut self, old: Id<View>, new: Id<View>, remap_index: &dyn Fn(usize, usize) -> usize) {
        if old == new {
            return;
        }
        let new_len = self.views[new].header.columns.len();
        let edges = self.views[old].header.uses.drain();
        for edge in &edges {
            match edge.site {
                UseSite::InputColumn(slot) => {
                    if let Some(cur) = self.views[edge.user].header.input_columns.get_mut(slot) {
                        let out_index = remap_index(cur.index, new_len);
                        *cur = ColumnRef::new(new, out_index);
                    }
                }
                UseSite::AttachedColumn(slot) => {
                    if let Some(cur) = self.views[edge.user].header.attached_columns.get_mut(slot) {
                        let out_index = remap_index(cur.index, new_len);
                        *cur = ColumnRef::new(new, out_index);
                    }
                }
                UseSite::JoinedView(slot) => {
                    if let Some(j) = self.views[edge.user].as_join_mut() {
                        if let Some(cur) = j.joined_views.get_mut(slot) {
                            *cur = new;
                        }
                    }
                }
                UseSite::MergedView(slot) => {
                    if let Some(m) = self.views[edge.user].as_merge_mut() {
                        if let Some(cur) = m.merged_views.get_mut(slot) {
                            *cur = new;
                        }
                    }
                }
                UseSite::NegatedView => {
                    if let crate::view::ViewKind::Negate(n) = &mut self.views[edge.user].kind {
                        n.negated_view = new;
                    }
                }
            }
            self.views[new].header.uses.insert(*edge);
        }

        self.transfer_set_condition(old, new);
        let group_ids = self.views[old].header.group_ids.clone();
        for g in group_ids {
            self.views[new].header.add_group_id(g);
        }

        self.views[old].mark_dead();
        self.invalidate(new);
    }

    // ------------------------------------------------------------------
    // Condition lifecycle (§9)
    // ------------------------------------------------------------------

    /// Moves the condition `old` sets (if any) onto `new`, keeping the
    /// condition's own `setter` field consistent.
    pub fn transfer_set_condition(&mut self, old: Id<View>, new: Id<View>) {
        let Some(cond_id) = self.views[old].header.sets_condition.take() else {
            return;
        };
        self.conditions[cond_id].setter = Some(new);
        self.views[new].header.sets_condition = Some(cond_id);
    }

    /// Removes `view` from every condition it tests, and from the view's
    /// own tester lists. Used when a view is proven unsatisfiable or dead
    /// and its tests no longer apply.
    pub fn drop_tested_conditions(&mut self, view: Id<View>) {
        let positive = std::mem::take(&mut self.views[view].header.positive_conditions);
        let negative = std::mem::take(&mut self.views[view].header.negative_conditions);
        for cond_id in positive.into_iter().chain(negative.into_iter()) {
            self.conditions[cond_id].remove_tester(view);
        }
    }

    /// Copies `from`'s tested conditions onto `to` (both halves of the
    /// bookkeeping), used when a canonicalization rule folds one view's
    /// behavior into another (e.g. TUPLE replacement).
    pub fn copy_tested_conditions(&mut self, from: Id<View>, to: Id<View>) {
        let positive = self.views[from].header.positive_conditions.clone();
        let negative = self.views[from].header.negative_conditions.clone();
        for cond_id in &positive {
            self.conditions[*cond_id].add_positive_tester(to);
        }
        for cond_id in &negative {
            self.conditions[*cond_id].add_negative_tester(to);
        }
        self.views[to].header.positive_conditions.extend(positive);
        self.views[to].header.negative_conditions.extend(negative);
    }

    // ------------------------------------------------------------------
    // Depth (§5: "iteration order over views is depth order")
    // ------------------------------------------------------------------

    pub fn depth(&mut self, id: Id<View>) -> u32 {
        if let Some(d) = self.views[id].header.cached_depth() {
            return d;
        }
        let mut visiting = std::collections::HashSet::new();
        let depth = self.compute_depth(id, &mut visiting);
        self.views[id].header.set_cached_depth(depth);
        depth
    }

    fn compute_depth(&mut self, id: Id<View>, visiting: &mut std::collections::HashSet<Id<View>>) -> u32 {
        if let Some(d) = self.views[id].header.cached_depth() {
            return d;
        }
        // Cyclic graphs (§9, inductions): treat a re-entrant node as
        // depth zero for the purpose of this walk so the recursion
        // terminates; the finalizer recomputes stable depths once merge
        // sets are identified (§4.6, §4.8).
        if !visiting.insert(id) {
            return 0;
        }
        let preds = self.predecessors(id);
        let depth = preds
            .into_iter()
            .map(|p| self.compute_depth(p, visiting))
            .max()
            .map(|m| m + 1)
            .unwrap_or(0);
        visiting.remove(&id);
        depth
    }

    /// All views this view directly reads from: the producers of its
    /// input/attached columns plus any directly referenced views
    /// (joined/merged/negated).
    pub fn predecessors(&self, id: Id<View>) -> Vec<Id<View>> {
        let view = &self.views[id];
        let mut preds: Vec<Id<View>> = view
            .header
            .input_columns
            .iter()
            .chain(view.header.attached_columns.iter())
            .map(|c| c.view)
            .collect();
        preds.extend(view.referenced_views());
        preds.sort_unstable();
        preds.dedup();
        preds
    }

    /// All views that directly read from this view.
    pub fn successors(&self, id: Id<View>) -> Vec<Id<View>> {
        let mut succs: Vec<Id<View>> = self.views[id].header.uses.iter().map(|e| e.user).collect();
        succs.sort_unstable();
        succs.dedup();
        succs
    }

    // ------------------------------------------------------------------
    // Structural hash / equality (§4.4, §9 visited-pairs)
    // ------------------------------------------------------------------

    /// A cheap, shallow hash used to bucket views before the expensive
    /// structural equality check (§4.4 `HashInit`). Two structurally
    /// equal views always hash equal; the converse need not hold.
    pub fn shallow_hash(&self, id: Id<View>) -> u64 {
        use std::hash::{Hash, Hasher};
        let view = &self.views[id];
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        view.kind.name().hash(&mut hasher);
        view.header.columns.len().hash(&mut hasher);
        view.header.input_columns.len().hash(&mut hasher);
        view.header.attached_columns.len().hash(&mut hasher);
        match &view.kind {
            ViewKind::Select(s) => format!("{:?}", s.source).hash(&mut hasher),
            ViewKind::Join(j) => j.num_pivots.hash(&mut hasher),
            ViewKind::Merge(m) => m.merged_views.len().hash(&mut hasher),
            ViewKind::Compare(c) => std::mem::discriminant(&c.op).hash(&mut hasher),
            ViewKind::Map(m) => m.functor.name.hash(&mut hasher),
            ViewKind::Aggregate(a) => a.functor.name.hash(&mut hasher),
            ViewKind::KvIndex(k) => k.values.len().hash(&mut hasher),
            ViewKind::Negate(_) | ViewKind::Insert(_) | ViewKind::Tuple(_) => {}
        }
        hasher.finish()
    }

    /// Structural equality tolerant of cycles via `visited`, required
    /// identical kind, arity, condition lists, non-overlapping
    /// `group_ids`, and per-kind structural matches (§4.4).
    pub fn structural_eq(&self, a: Id<View>, b: Id<View>, visited: &mut VisitedPairs<View>) -> bool {
        if a == b {
            return true;
        }
        if visited.enter(a, b) {
            return true;
        }
        let va = &self.views[a];
        let vb = &self.views[b];
        if va.header.columns.len() != vb.header.columns.len() {
            return false;
        }
        if va.header.positive_conditions != vb.header.positive_conditions
            || va.header.negative_conditions != vb.header.negative_conditions
        {
            return false;
        }
        if va.header.group_ids_overlap(&vb.header) {
            return false;
        }
        if !self.column_refs_eq(&va.header.input_columns, &vb.header.input_columns, visited) {
            return false;
        }
        if !self.column_refs_eq(&va.header.attached_columns, &vb.header.attached_columns, visited) {
            return false;
        }
        match (&va.kind, &vb.kind) {
            (ViewKind::Select(x), ViewKind::Select(y)) => format!("{:?}", x.source) == format!("{:?}", y.source),
            (ViewKind::Tuple(_), ViewKind::Tuple(_)) => true,
            (ViewKind::Compare(x), ViewKind::Compare(y)) => x.op == y.op,
            (ViewKind::Join(x), ViewKind::Join(y)) => {
                x.num_pivots == y.num_pivots
                    && x.joined_views.len() == y.joined_views.len()
                    && x.joined_views
                        .iter()
                        .zip(&y.joined_views)
                        .all(|(p, q)| self.structural_eq(*p, *q, visited))
            }
            (ViewKind::Merge(x), ViewKind::Merge(y)) => {
                x.merged_views.len() == y.merged_views.len()
                    && x.merged_views
                        .iter()
                        .zip(&y.merged_views)
                        .all(|(p, q)| self.structural_eq(*p, *q, visited))
            }
            (ViewKind::Map(x), ViewKind::Map(y)) => x.functor == y.functor && x.bindings == y.bindings,
            (ViewKind::Aggregate(x), ViewKind::Aggregate(y)) => {
                x.functor == y.functor
                    && self.column_refs_eq(&x.group_by_columns, &y.group_by_columns, visited)
                    && self.column_refs_eq(&x.aggregated_columns, &y.aggregated_columns, visited)
            }
            (ViewKind::KvIndex(x), ViewKind::KvIndex(y)) => x.values.len() == y.values.len(),
            (ViewKind::Negate(x), ViewKind::Negate(y)) => self.structural_eq(x.negated_view, y.negated_view, visited),
            (ViewKind::Insert(x), ViewKind::Insert(y)) => x.target == y.target,
            _ => false,
        }
    }

    fn column_refs_eq(&self, a: &[ColumnRef], b: &[ColumnRef], visited: &mut VisitedPairs<View>) -> bool {
        a.len() == b.len()
            && a.iter()
                .zip(b)
                .all(|(x, y)| x.index == y.index && self.structural_eq(x.view, y.view, visited))
    }

    // ------------------------------------------------------------------
    // Diagnostics support
    // ------------------------------------------------------------------

    /// Renders a short per-view-kind tag used by test assertions and by
    /// `CoreError::Internal`'s message when a view fails an invariant
    /// check (§7: "mark the offending view with a tag the dumper can
    /// render").
    pub fn tag(&self, id: Id<View>) -> String {
        format!("{}#{}", self.views[id].kind.name(), id.raw())
    }

    /// A readable multi-line dump of every live view, for tests and for
    /// diagnosing internal invariant violations. Not used by any back-end
    /// (§6 back-ends consume `FinalizedDfg`, not this text form).
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for (id, view) in self.views.iter() {
            if view.header.is_dead {
                continue;
            }
            out.push_str(&format!(
                "{} arity={} inputs={:?} attached={:?}\n",
                self.tag(id),
                view.header.arity(),
                view.header.input_columns,
                view.header.attached_columns,
            ));
        }
        out
    }
}

impl Default for Dfg {
    fn default() -> Self {
        Dfg::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::{SelectSource, Tuple};

    fn push_column(dfg: &mut Dfg, view: Id<View>, logical_id: u32) {
        let index = dfg.views[view].header.columns.len();
        let col = Column::new(view, logical_id, index, crate::column::Type::Int64);
        dfg.views[view].header.columns.push(col);
    }

    #[test]
    fn replace_all_uses_with_redirects_consumers_and_kills_old() {
        let mut dfg = Dfg::new();
        let sel = dfg.alloc_view(ViewKind::Select(crate::view::Select::new(SelectSource::Constant(vec![]))));
        push_column(&mut dfg, sel, 0);

        let tup_a = dfg.alloc_view(ViewKind::Tuple(Tuple));
        dfg.link_input(tup_a, ColumnRef::new(sel, 0));
        push_column(&mut dfg, tup_a, 0);

        let tup_b = dfg.alloc_view(ViewKind::Tuple(Tuple));
        push_column(&mut dfg, tup_b, 0);

        let consumer = dfg.alloc_view(ViewKind::Tuple(Tuple));
        dfg.link_input(consumer, ColumnRef::new(tup_a, 0));

        dfg.replace_all_uses_with(tup_a, tup_b);

        assert!(!dfg.views[tup_a].is_live());
        assert_eq!(dfg.views[consumer].header.input_columns[0].view, tup_b);
    }

    #[test]
    fn depth_is_one_more_than_max_predecessor_depth() {
        let mut dfg = Dfg::new();
        let sel = dfg.alloc_view(ViewKind::Select(crate::view::Select::new(SelectSource::Constant(vec![]))));
        push_column(&mut dfg, sel, 0);
        let tup = dfg.alloc_view(ViewKind::Tuple(Tuple));
        dfg.link_input(tup, ColumnRef::new(sel, 0));

        assert_eq!(dfg.depth(sel), 0);
        assert_eq!(dfg.depth(tup), 1);
    }

    #[test]
    fn structural_eq_tolerates_cycles() {
        let mut dfg = Dfg::new();
        let merge = dfg.alloc_view(ViewKind::Merge(crate::view::Merge::new(vec![])));
        dfg.link_merged_view(merge, merge);
        let mut visited = VisitedPairs::new();
        assert!(dfg.structural_eq(merge, merge, &mut visited));
    }
}
