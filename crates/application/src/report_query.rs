//! Compilation of normalized filters into parameter-bound query plans.

mod compile;
mod plan;

pub use compile::compile;
pub use plan::{
    AggregatePredicate, DomainConstraint, QueryPlan, ReportSelection, RowPredicate, SortDirection,
    SortField,
};
