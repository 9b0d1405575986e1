//! AGGREGATE: partitions by group-by columns, reduces aggregated columns (§3).

use crate::column::ColumnRef;
use crate::view::map::FunctorRef;

#[derive(Debug, Clone)]
pub struct Aggregate {
    pub group_by_columns: Vec<ColumnRef>,
    pub config_columns: Vec<ColumnRef>,
    pub aggregated_columns: Vec<ColumnRef>,
    pub functor: FunctorRef,
    pub group_id: u32,
}

impl Aggregate {
    pub fn new(functor: FunctorRef, group_id: u32) -> Self {
        Aggregate {
            group_by_columns: Vec::new(),
            config_columns: Vec::new(),
            aggregated_columns: Vec::new(),
            functor,
            group_id,
        }
    }
}
