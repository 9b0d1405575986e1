//! JOIN: equi-join over pivot columns spanning joined views (§3, §4.1-§4.3).

use crate::arena::Id;
use crate::column::ColumnRef;
use crate::view::View;

/// How one output column of a JOIN is produced from its joined views.
///
/// Pivot outputs map to one input column per joined view (they must all
/// agree at runtime, which is exactly what the equi-join enforces);
/// non-pivot outputs map to exactly one input column from exactly one
/// joined view.
#[derive(Debug, Clone)]
pub enum JoinOutputSource {
    Pivot(Vec<ColumnRef>),
    NonPivot(ColumnRef),
}

#[derive(Debug, Clone)]
pub struct Join {
    pub joined_views: Vec<Id<View>>,
    pub num_pivots: usize,
    /// One entry per output column, in output order; pivot entries occupy
    /// the first `num_pivots` slots.
    pub out_to_in: Vec<JoinOutputSource>,
    pub group_id: u32,
}

impl Join {
    pub fn new(joined_views: Vec<Id<View>>, group_id: u32) -> Self {
        Join {
            joined_views,
            num_pivots: 0,
            out_to_in: Vec::new(),
            group_id,
        }
    }

    /// Cartesian product iff there are no pivot columns (§3).
    pub fn is_cartesian_product(&self) -> bool {
        self.num_pivots == 0
    }

    pub fn pivot_outputs(&self) -> impl Iterator<Item = &Vec<ColumnRef>> {
        self.out_to_in.iter().filter_map(|s| match s {
            JoinOutputSource::Pivot(cols) => Some(cols),
            JoinOutputSource::NonPivot(_) => None,
        })
    }
}
