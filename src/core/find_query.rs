//! Sea-Query backed [`QueryBuilder`] and its execution.

use sea_orm::{
    ConnectionTrait, DatabaseBackend, FromQueryResult, JsonValue, Order, Value,
    sea_query::{
        Alias, Asterisk, BinOper, Condition, Expr, Func, JoinType, Query, SelectStatement,
        SimpleExpr,
    },
};

use super::query::{
    Clause, ColumnRef, CountTarget, ExistsClause, JoinClause, OrderTarget, QueryBuilder,
};
use crate::errors::FindError;
use crate::filtering::eager::RelationExpression;
use crate::filtering::filters::{Operator, Predicate};
use crate::filtering::pagination::{content_range, range_limit};
use crate::models::FindResult;
use axum::http::HeaderMap;

/// A query over one root table, rendered to a `SelectStatement` on demand.
#[derive(Debug, Clone)]
pub struct FindQuery {
    root: String,
    count: Option<CountTarget>,
    joins: Vec<JoinClause>,
    select_root: bool,
    selects: Vec<(ColumnRef, Option<String>)>,
    clauses: Vec<Clause>,
    conditions: Vec<Condition>,
    groups: Vec<ColumnRef>,
    orders: Vec<(OrderTarget, Order)>,
    range: Option<(u64, u64)>,
    eager: Option<RelationExpression>,
    joined_eager: Option<RelationExpression>,
}

#[derive(FromQueryResult)]
struct TotalRow {
    total: i64,
}

impl FindQuery {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            count: None,
            joins: Vec::new(),
            select_root: false,
            selects: Vec::new(),
            clauses: Vec::new(),
            conditions: Vec::new(),
            groups: Vec::new(),
            orders: Vec::new(),
            range: None,
            eager: None,
            joined_eager: None,
        }
    }

    /// AND an application condition (tenant scoping, soft deletes, ...)
    /// with whatever the request adds.
    #[must_use]
    pub fn and_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Inclusive index range, if the request asked for one
    #[must_use]
    pub fn range(&self) -> Option<(u64, u64)> {
        self.range
    }

    /// Relation expression for the caller's eager loader
    #[must_use]
    pub fn eager(&self) -> Option<&RelationExpression> {
        self.eager.as_ref()
    }

    /// Relation expression for the caller's joined loader
    #[must_use]
    pub fn joined_eager(&self) -> Option<&RelationExpression> {
        self.joined_eager.as_ref()
    }

    #[must_use]
    pub fn is_count(&self) -> bool {
        self.count.is_some()
    }

    /// The statement returning the requested rows. Pattern filters render
    /// differently per backend, so the statement is tied to `backend`.
    #[must_use]
    pub fn statement(&self, backend: DatabaseBackend) -> SelectStatement {
        self.render(backend, true)
    }

    /// `SELECT COUNT(*)` over the statement without ordering or range.
    #[must_use]
    pub fn total_statement(&self, backend: DatabaseBackend) -> SelectStatement {
        Query::select()
            .expr_as(Expr::col(Asterisk).count(), Alias::new("total"))
            .from_subquery(self.render(backend, false), Alias::new("ranged"))
            .to_owned()
    }

    /// SQL with inlined values, for logging and tests.
    #[must_use]
    pub fn to_sql(&self, backend: DatabaseBackend) -> String {
        backend.build(&self.statement(backend)).to_string()
    }

    /// Run the query. A ranged query also counts the unranged rows.
    ///
    /// # Errors
    ///
    /// Database errors from either statement.
    pub async fn execute<C: ConnectionTrait>(&self, db: &C) -> Result<FindResult, FindError> {
        let backend = db.get_database_backend();
        let results = JsonValue::find_by_statement(backend.build(&self.statement(backend)))
            .all(db)
            .await?;

        let total = match self.range {
            None => None,
            Some(_) => {
                let row = TotalRow::find_by_statement(backend.build(&self.total_statement(backend)))
                    .one(db)
                    .await?;
                Some(row.map_or(0, |row| u64::try_from(row.total).unwrap_or(0)))
            }
        };

        tracing::debug!(
            root = %self.root,
            rows = results.len(),
            total = ?total,
            "executed find query"
        );
        Ok(FindResult { results, total })
    }

    /// `Content-Range` header for a ranged result.
    #[must_use]
    pub fn content_range(&self, result: &FindResult, resource_name: &str) -> Option<HeaderMap> {
        let (start, end) = self.range?;
        let total = result.total?;
        Some(content_range(start, end, total, resource_name))
    }

    fn render(&self, backend: DatabaseBackend, ranged: bool) -> SelectStatement {
        let mut select = Query::select();
        select.from(Alias::new(&self.root));

        match &self.count {
            Some(CountTarget::Rows) => {
                select.expr_as(Expr::col(Asterisk).count(), Alias::new("count"));
            }
            Some(CountTarget::Column(column)) => {
                select.expr_as(col(column).count(), Alias::new("count"));
            }
            None => {
                if self.select_root || self.selects.is_empty() {
                    select.column((Alias::new(&self.root), Asterisk));
                }
            }
        }
        for (column, alias) in &self.selects {
            match alias {
                Some(alias) => select.expr_as(col(column), Alias::new(alias)),
                None => select.column(column_ref(column)),
            };
        }

        for join in &self.joins {
            select.join_as(
                JoinType::LeftJoin,
                Alias::new(&join.table),
                Alias::new(&join.alias),
                col(&join.on.0).equals(column_ref(&join.on.1)),
            );
        }

        let mut condition = Condition::all();
        for extra in &self.conditions {
            condition = condition.add(extra.clone());
        }
        for clause in &self.clauses {
            condition = condition.add(clause_condition(clause, backend));
        }
        if !condition.is_empty() {
            select.cond_where(condition);
        }

        for column in &self.groups {
            select.group_by_col(column_ref(column));
        }

        if ranged {
            for (target, direction) in &self.orders {
                match target {
                    OrderTarget::Column(column) => select.order_by(column_ref(column), direction.clone()),
                    OrderTarget::Alias(alias) => select.order_by(Alias::new(alias), direction.clone()),
                };
            }
            if let Some((start, end)) = self.range {
                select.offset(start).limit(range_limit(start, end));
            }
        }
        select
    }
}

impl QueryBuilder for FindQuery {
    fn add_where(&mut self, clause: Clause) {
        self.clauses.push(clause);
    }

    fn add_join(&mut self, join: JoinClause) {
        if !self.joins.iter().any(|existing| existing.alias == join.alias) {
            self.joins.push(join);
        }
    }

    fn add_select(&mut self, column: ColumnRef, alias: Option<String>) {
        self.selects.push((column, alias));
    }

    fn select_root(&mut self) {
        self.select_root = true;
    }

    fn add_order(&mut self, target: OrderTarget, direction: Order) {
        self.orders.push((target, direction));
    }

    fn add_group(&mut self, column: ColumnRef) {
        self.groups.push(column);
    }

    fn set_range(&mut self, start: u64, end: u64) {
        self.range = Some((start, end));
    }

    fn set_eager(&mut self, expression: RelationExpression) {
        self.eager = Some(expression);
    }

    fn set_joined_eager(&mut self, expression: RelationExpression) {
        self.joined_eager = Some(expression);
    }

    fn set_count(&mut self, target: CountTarget) {
        self.count = Some(target);
    }
}

fn column_ref(column: &ColumnRef) -> (Alias, Alias) {
    (Alias::new(&column.table), Alias::new(&column.column))
}

fn col(column: &ColumnRef) -> Expr {
    Expr::col(column_ref(column))
}

fn clause_condition(clause: &Clause, backend: DatabaseBackend) -> Condition {
    match clause {
        Clause::Test { column, predicate } => {
            Condition::all().add(predicate_expr(column, predicate, backend))
        }
        Clause::Exists(exists) => Condition::all().add(Expr::exists(exists_subquery(exists, backend))),
        Clause::Any(branches) => branches
            .iter()
            .fold(Condition::any(), |any, branch| any.add(clause_condition(branch, backend))),
    }
}

fn exists_subquery(exists: &ExistsClause, backend: DatabaseBackend) -> SelectStatement {
    let mut select = Query::select();
    select
        .expr(Expr::val(1))
        .from_as(Alias::new(&exists.table), Alias::new(&exists.alias));
    if let Some(through) = &exists.through {
        select.join_as(
            JoinType::InnerJoin,
            Alias::new(&through.table),
            Alias::new(&through.alias),
            col(&through.on.0).equals(column_ref(&through.on.1)),
        );
    }
    select
        .and_where(col(&exists.correlation.0).equals(column_ref(&exists.correlation.1)))
        .cond_where(clause_condition(&exists.condition, backend));
    select
}

/// Render a predicate against a qualified column.
fn predicate_expr(column: &ColumnRef, predicate: &Predicate, backend: DatabaseBackend) -> SimpleExpr {
    let target = col(column);
    let operand = || {
        predicate
            .operands
            .first()
            .cloned()
            .map_or(SimpleExpr::Keyword(sea_orm::sea_query::Keyword::Null), SimpleExpr::Value)
    };
    match &predicate.operator {
        Operator::Eq => target.eq(operand()),
        Operator::Neq => target.ne(operand()),
        Operator::Lt => target.lt(operand()),
        Operator::Lte => target.lte(operand()),
        Operator::Gt => target.gt(operand()),
        Operator::Gte => target.gte(operand()),
        Operator::In => target.is_in(predicate.operands.iter().cloned()),
        Operator::Like => case_sensitive_like(target, predicate.operands.first(), backend),
        Operator::LikeLower => SimpleExpr::Binary(
            Box::new(SimpleExpr::FunctionCall(Func::lower(target))),
            BinOper::Like,
            Box::new(operand()),
        ),
        Operator::IsNull => target.is_null(),
        Operator::NotNull => target.is_not_null(),
        Operator::Raw(template) => Expr::cust_with_exprs(
            template.as_str(),
            std::iter::once(SimpleExpr::from(target))
                .chain(predicate.operands.iter().cloned().map(SimpleExpr::Value)),
        ),
    }
}

/// `LIKE` that honours case on every backend. SQLite's `LIKE` folds ASCII
/// case, so the pattern is rewritten for `GLOB` there. MySQL compares
/// binary. Postgres `LIKE` is already case-sensitive.
fn case_sensitive_like(target: Expr, pattern: Option<&Value>, backend: DatabaseBackend) -> SimpleExpr {
    let pattern = pattern.cloned().unwrap_or(Value::String(None));
    match (backend, &pattern) {
        (DatabaseBackend::Sqlite, Value::String(Some(text))) => Expr::cust_with_exprs(
            "? GLOB ?",
            [target.into(), SimpleExpr::Value(Value::from(like_to_glob(text)))],
        ),
        (DatabaseBackend::MySql, _) => {
            Expr::cust_with_exprs("? LIKE BINARY ?", [target.into(), SimpleExpr::Value(pattern)])
        }
        _ => SimpleExpr::Binary(
            Box::new(target.into()),
            BinOper::Like,
            Box::new(SimpleExpr::Value(pattern)),
        ),
    }
}

/// Rewrite a `LIKE` pattern as an equivalent `GLOB` pattern.
fn like_to_glob(pattern: &str) -> String {
    let mut glob = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        match c {
            '%' => glob.push('*'),
            '_' => glob.push('?'),
            '*' => glob.push_str("[*]"),
            '?' => glob.push_str("[?]"),
            '[' => glob.push_str("[[]"),
            c => glob.push(c),
        }
    }
    glob
}
