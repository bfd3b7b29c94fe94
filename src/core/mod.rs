// Turning parsed parameters into a query: the storage seam, the assembler
// and the sea-query implementation behind it.

pub mod assembler;
pub mod builder;
pub mod find_query;
pub mod query;

// Re-export commonly used items
pub use assembler::{AssemblyContext, Plan, plan};
pub use builder::FindQueryBuilder;
pub use find_query::FindQuery;
pub use query::{
    Clause, ColumnRef, CountTarget, ExistsClause, JoinClause, OrderTarget, QueryBuilder,
    ThroughJoin,
};
