//! Vocabulary shared by the assembler and the query builders it drives.

use sea_orm::Order;

use crate::filtering::Predicate;
use crate::filtering::eager::RelationExpression;

/// A column addressed through a table name or alias.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

/// Correlated subquery over the rows of a to-many relation.
#[derive(Debug, Clone, PartialEq)]
pub struct ExistsClause {
    /// Related table, scanned under `alias`
    pub table: String,
    pub alias: String,
    /// Optional join table between owner and related rows
    pub through: Option<ThroughJoin>,
    /// Correlation with the owning row: `inner = outer`
    pub correlation: (ColumnRef, ColumnRef),
    pub condition: Box<Clause>,
}

/// Inner join of a join table inside an [`ExistsClause`].
#[derive(Debug, Clone, PartialEq)]
pub struct ThroughJoin {
    pub table: String,
    pub alias: String,
    /// `through_column = related_column`
    pub on: (ColumnRef, ColumnRef),
}

/// Where-clause tree. Top-level clauses are AND-ed by the builder.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Test { column: ColumnRef, predicate: Predicate },
    Exists(ExistsClause),
    Any(Vec<Clause>),
}

/// Left join of a to-one relation under a stable alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinClause {
    pub table: String,
    pub alias: String,
    /// `alias.related_column = root.owner_column`
    pub on: (ColumnRef, ColumnRef),
}

/// What an order clause sorts by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderTarget {
    Column(ColumnRef),
    /// A selected alias, used for columns of joined relations
    Alias(String),
}

/// Aggregate result shape replacing row selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountTarget {
    Rows,
    Column(ColumnRef),
}

/// Primitive operations the assembler needs from a query builder.
///
/// Implementations only record what they are told; all validation has
/// happened before the first call.
pub trait QueryBuilder {
    fn add_where(&mut self, clause: Clause);
    fn add_join(&mut self, join: JoinClause);
    fn add_select(&mut self, column: ColumnRef, alias: Option<String>);
    /// Select every column of the root entity explicitly
    fn select_root(&mut self);
    fn add_order(&mut self, target: OrderTarget, direction: Order);
    fn add_group(&mut self, column: ColumnRef);
    /// Inclusive index range; the total count must accompany the rows.
    fn set_range(&mut self, start: u64, end: u64);
    fn set_eager(&mut self, expression: RelationExpression);
    fn set_joined_eager(&mut self, expression: RelationExpression);
    fn set_count(&mut self, target: CountTarget);
}
