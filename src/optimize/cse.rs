//! Common-subexpression elimination (§4.4): buckets live views by a
//! shallow hash, then merges structurally-equal pairs within a bucket —
//! the lower-depth (older) view survives, the newer is replaced.

use std::collections::HashMap;

use crate::arena::{Id, VisitedPairs};
use crate::dfg::Dfg;
use crate::view::View;

/// Runs one CSE sweep to fixpoint. Returns the number of merges
/// performed across every sweep.
pub fn run_to_fixpoint(dfg: &mut Dfg, max_iterations: u32) -> u32 {
    let mut total_merges = 0;
    let mut iterations = 0;
    loop {
        if iterations >= max_iterations {
            break;
        }
        iterations += 1;
        let merges = sweep(dfg);
        total_merges += merges;
        if merges == 0 {
            break;
        }
    }
    total_merges
}

fn sweep(dfg: &mut Dfg) -> u32 {
    let mut ids: Vec<Id<View>> = dfg.views.ids().filter(|&id| dfg.views[id].is_live()).collect();
    ids.sort_by_key(|&id| dfg.depth(id));

    let mut buckets: HashMap<u64, Vec<Id<View>>> = HashMap::new();
    for &id in &ids {
        buckets.entry(dfg.shallow_hash(id)).or_default().push(id);
    }

    let mut merged = 0;
    for bucket in buckets.into_values() {
        if bucket.len() < 2 {
            continue;
        }
        let mut survivors: Vec<Id<View>> = Vec::new();
        for candidate in bucket {
            if !dfg.views[candidate].is_live() {
                continue;
            }
            let mut matched = None;
            for &survivor in &survivors {
                if !dfg.views[survivor].is_live() {
                    continue;
                }
                let mut visited = VisitedPairs::new();
                if dfg.structural_eq(survivor, candidate, &mut visited) {
                    matched = Some(survivor);
                    break;
                }
            }
            match matched {
                Some(survivor) => {
                    dfg.replace_all_uses_with(candidate, survivor);
                    merged += 1;
                }
                None => survivors.push(candidate),
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::Column;
    use crate::view::{Select, SelectSource, ViewKind};

    #[test]
    fn identical_constant_selects_with_no_group_ids_merge() {
        let mut dfg = Dfg::new();
        let a = dfg.alloc_view(ViewKind::Select(Select::new(SelectSource::Constant(vec![crate::relation::Constant::Int(1)]))));
        dfg.views[a].header.columns.push(Column::new(a, 1, 0, crate::column::Type::Int64));
        let b = dfg.alloc_view(ViewKind::Select(Select::new(SelectSource::Constant(vec![crate::relation::Constant::Int(1)]))));
        dfg.views[b].header.columns.push(Column::new(b, 2, 0, crate::column::Type::Int64));

        let merges = run_to_fixpoint(&mut dfg, 8);
        assert_eq!(merges, 1);
        assert!(dfg.views[a].is_live());
        assert!(!dfg.views[b].is_live());
    }

    #[test]
    fn selects_sharing_a_group_id_do_not_merge() {
        let mut dfg = Dfg::new();
        let a = dfg.alloc_view(ViewKind::Select(Select::new(SelectSource::Constant(vec![crate::relation::Constant::Int(1)]))));
        dfg.views[a].header.columns.push(Column::new(a, 1, 0, crate::column::Type::Int64));
        let b = dfg.alloc_view(ViewKind::Select(Select::new(SelectSource::Constant(vec![crate::relation::Constant::Int(1)]))));
        dfg.views[b].header.columns.push(Column::new(b, 2, 0, crate::column::Type::Int64));

        let group = dfg.fresh_group_id();
        dfg.views[a].header.add_group_id(group);
        dfg.views[b].header.add_group_id(group);

        let merges = run_to_fixpoint(&mut dfg, 8);
        assert_eq!(merges, 0);
        assert!(dfg.views[a].is_live());
        assert!(dfg.views[b].is_live());
    }
}
