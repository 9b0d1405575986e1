//! INSERT canonicalization (§4.3): an insert whose predecessor is
//! unsatisfiable can never fire, so it becomes dead.

use crate::arena::Id;
use crate::dfg::Dfg;
use crate::view::View;

pub fn canonicalize(dfg: &mut Dfg, id: Id<View>) -> bool {
    let Some(pred) = dfg.views[id].header.input_columns.first().map(|c| c.view) else {
        return false;
    };
    if !dfg.views[pred].header.is_unsat || dfg.views[id].header.is_dead {
        return false;
    }
    dfg.views[id].mark_dead();
    dfg.invalidate(id);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{Column, ColumnRef};
    use crate::relation::Relation;
    use crate::view::{Insert, InsertTarget, Select, SelectSource, ViewKind};

    #[test]
    fn insert_after_unsat_predecessor_is_dead() {
        let mut dfg = Dfg::new();
        let pred = dfg.alloc_view(ViewKind::Select(Select::new(SelectSource::Constant(vec![]))));
        dfg.views[pred].header.columns.push(Column::new(pred, 1, 0, crate::column::Type::Int64));
        dfg.views[pred].header.is_unsat = true;

        let rel = dfg.relations.alloc(Relation::new("r".to_string(), 1));
        let ins = dfg.alloc_view(ViewKind::Insert(Insert::new(InsertTarget::Relation(rel))));
        dfg.link_input(ins, ColumnRef::new(pred, 0));

        assert!(canonicalize(&mut dfg, ins));
        assert!(!dfg.views[ins].is_live());
    }

    #[test]
    fn insert_after_satisfiable_predecessor_is_kept() {
        let mut dfg = Dfg::new();
        let pred = dfg.alloc_view(ViewKind::Select(Select::new(SelectSource::Constant(vec![]))));
        dfg.views[pred].header.columns.push(Column::new(pred, 1, 0, crate::column::Type::Int64));

        let rel = dfg.relations.alloc(Relation::new("r".to_string(), 1));
        let ins = dfg.alloc_view(ViewKind::Insert(Insert::new(InsertTarget::Relation(rel))));
        dfg.link_input(ins, ColumnRef::new(pred, 0));

        assert!(!canonicalize(&mut dfg, ins));
    }
}
