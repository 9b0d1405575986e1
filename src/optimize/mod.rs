//! Optimizer (§2 stage 4): runs canonicalization, CSE, and dead-flow
//! elimination to a joint fixpoint, then sweeps liveness once more so
//! later passes (induction, differential classification, finalization)
//! see a graph where every remaining view is actually reachable.

pub mod cse;
pub mod dead_flow;
pub mod sink_conditions;

use crate::config::FixpointConfig;
use crate::dfg::Dfg;

/// Runs the optimizer to fixpoint, alternating canonicalization and CSE
/// (§4.4: "CSE is run to fixpoint against canonicalization") and sweeping
/// dead flow after each round, until a full round makes no change.
pub fn run(dfg: &mut Dfg, config: &FixpointConfig) {
    loop {
        let canon_iterations = crate::canonicalize::run_to_fixpoint(dfg, config.max_canonicalize_iterations);
        let merges = cse::run_to_fixpoint(dfg, config.max_cse_iterations);
        dead_flow::run(dfg);

        if canon_iterations <= 1 && merges == 0 {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{Column, ColumnRef};
    use crate::view::{Select, SelectSource, Tuple, View, ViewKind};

    #[test]
    fn redundant_pass_through_tuples_collapse_under_the_joint_fixpoint() {
        let mut dfg = Dfg::new();
        let sel = dfg.alloc_view(ViewKind::Select(Select::new(SelectSource::Constant(vec![]))));
        dfg.views[sel].header.columns.push(Column::new(sel, 1, 0, crate::column::Type::Int64));

        let tup_a = dfg.alloc_view(ViewKind::Tuple(Tuple));
        dfg.link_input(tup_a, ColumnRef::new(sel, 0));
        dfg.views[tup_a].header.columns.push(Column::new(tup_a, 1, 0, crate::column::Type::Int64));

        let tup_b = dfg.alloc_view(ViewKind::Tuple(Tuple));
        dfg.link_input(tup_b, ColumnRef::new(tup_a, 0));
        dfg.views[tup_b].header.columns.push(Column::new(tup_b, 1, 0, crate::column::Type::Int64));

        run(&mut dfg, &FixpointConfig::default());

        assert!(!dfg.views[tup_a].is_live());
        assert!(!dfg.views[tup_b].is_live());
    }
}
