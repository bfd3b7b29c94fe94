//! Assembles parsed parameters into query builder calls.
//!
//! Assembly runs in two phases. [`plan`] validates everything and records
//! the calls to make; [`Plan::apply`] makes them and cannot fail, so a
//! rejected build never leaves a half-built query behind.

use sea_orm::Order;

use super::query::{
    Clause, ColumnRef, CountTarget, ExistsClause, JoinClause, OrderTarget, QueryBuilder,
    ThroughJoin,
};
use crate::errors::FindError;
use crate::filtering::eager::RelationExpression;
use crate::filtering::pagination::parse_range;
use crate::filtering::parser::{Directive, FilterParameter, QueryParameter};
use crate::filtering::reference::{PropertyRef, relation_alias};
use crate::schema::{Cardinality, Relation, Schema};

/// Context the assembler needs beyond the parameters.
pub struct AssemblyContext<'a> {
    pub schema: &'a Schema,
    pub root: &'a str,
    pub allowed_eager: Option<&'a RelationExpression>,
}

/// Validated builder calls, in application order.
#[derive(Debug, Default)]
pub struct Plan {
    count: Option<CountTarget>,
    joins: Vec<JoinClause>,
    select_root: bool,
    clauses: Vec<Clause>,
    selects: Vec<(ColumnRef, Option<String>)>,
    groups: Vec<ColumnRef>,
    orders: Vec<(OrderTarget, Order)>,
    range: Option<(u64, u64)>,
    eager: Option<RelationExpression>,
    joined_eager: Option<RelationExpression>,
}

impl Plan {
    #[must_use]
    pub fn joins(&self) -> &[JoinClause] {
        &self.joins
    }

    #[must_use]
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn apply<B: QueryBuilder + ?Sized>(self, builder: &mut B) {
        if let Some(count) = self.count {
            builder.set_count(count);
        }
        for join in self.joins {
            builder.add_join(join);
        }
        if self.select_root {
            builder.select_root();
        }
        for clause in self.clauses {
            builder.add_where(clause);
        }
        for (column, alias) in self.selects {
            builder.add_select(column, alias);
        }
        for column in self.groups {
            builder.add_group(column);
        }
        for (target, direction) in self.orders {
            builder.add_order(target, direction);
        }
        if let Some((start, end)) = self.range {
            builder.set_range(start, end);
        }
        if let Some(expression) = self.eager {
            builder.set_eager(expression);
        }
        if let Some(expression) = self.joined_eager {
            builder.set_joined_eager(expression);
        }
    }
}

/// Validate `parameters` and record the builder calls they need.
///
/// # Errors
///
/// Unsupported-ordering, invalid-range, unknown-reference or permission
/// errors; the first one found aborts the whole plan.
pub fn plan(parameters: &[QueryParameter], context: &AssemblyContext<'_>) -> Result<Plan, FindError> {
    let mut plan = Plan::default();
    let mut range_start = None;
    let mut range_end = None;
    let mut eager = None;
    let mut joined_eager = None;

    for parameter in parameters {
        if let QueryParameter::Directive(directive) = parameter {
            match directive {
                Directive::Count(reference) => {
                    plan.count = Some(match reference {
                        None => CountTarget::Rows,
                        Some(reference) => CountTarget::Column(reference.column_ref()),
                    });
                }
                Directive::RangeStart(value) => range_start = Some(value.as_str()),
                Directive::RangeEnd(value) => range_end = Some(value.as_str()),
                Directive::Eager(expression) => eager = Some(expression),
                Directive::Join(expression) => joined_eager = Some(expression),
                Directive::OrderAsc(_) | Directive::OrderDesc(_) | Directive::GroupBy(_) => {}
            }
        }
    }

    plan.joins = to_one_joins(parameters, context.root);
    plan.select_root = !plan.joins.is_empty();

    for parameter in parameters {
        if let QueryParameter::Filter(filter) = parameter {
            plan.clauses.push(filter_clause(filter, context.root)?);
        }
    }

    for parameter in parameters {
        if let QueryParameter::Directive(Directive::GroupBy(references)) = parameter {
            for reference in references {
                plan.selects.push((reference.column_ref(), None));
                plan.groups.push(reference.column_ref());
            }
        }
    }

    for parameter in parameters {
        let (reference, direction) = match parameter {
            QueryParameter::Directive(Directive::OrderAsc(reference)) => (reference, Order::Asc),
            QueryParameter::Directive(Directive::OrderDesc(reference)) => (reference, Order::Desc),
            _ => continue,
        };
        match reference.relation().map(|relation| &relation.cardinality) {
            None => plan
                .orders
                .push((OrderTarget::Column(reference.column_ref()), direction)),
            Some(Cardinality::OneToOne) => {
                let alias = order_alias(reference);
                plan.selects.push((reference.column_ref(), Some(alias.clone())));
                plan.orders.push((OrderTarget::Alias(alias), direction));
            }
            Some(Cardinality::ToMany { .. }) => {
                return Err(FindError::unsupported_ordering(reference.raw_path()));
            }
        }
    }

    plan.range = parse_range(range_start, range_end)?;

    if let Some(expression) = eager {
        plan.eager = Some(check_eager(expression, context)?);
    }
    if let Some(expression) = joined_eager {
        plan.joined_eager = Some(check_eager(expression, context)?);
    }

    tracing::debug!(
        root = context.root,
        joins = plan.joins.len(),
        filters = plan.clauses.len(),
        orders = plan.orders.len(),
        ranged = plan.range.is_some(),
        "assembled find query"
    );
    Ok(plan)
}

/// Alias a to-one ordering column is selected under: `parent_age`.
fn order_alias(reference: &PropertyRef) -> String {
    match reference.relation() {
        Some(relation) => format!("{}_{}", relation.name, reference.property()),
        None => reference.property().to_string(),
    }
}

/// One left join per distinct to-one relation used by a filter or an order.
fn to_one_joins(parameters: &[QueryParameter], root: &str) -> Vec<JoinClause> {
    let mut joins: Vec<JoinClause> = Vec::new();
    let references = parameters.iter().flat_map(|parameter| match parameter {
        QueryParameter::Filter(filter) => filter.references.iter().collect::<Vec<_>>(),
        QueryParameter::Directive(Directive::OrderAsc(reference) | Directive::OrderDesc(reference)) => {
            vec![reference]
        }
        QueryParameter::Directive(_) => Vec::new(),
    });

    for reference in references {
        let Some(relation) = reference.relation() else {
            continue;
        };
        if relation.cardinality != Cardinality::OneToOne {
            continue;
        }
        let alias = relation_alias(root, &relation.name);
        if joins.iter().any(|join| join.alias == alias) {
            continue;
        }
        joins.push(JoinClause {
            table: relation.related.clone(),
            on: (
                ColumnRef::new(&alias, &relation.join.related_column),
                ColumnRef::new(root, &relation.join.owner_column),
            ),
            alias,
        });
    }
    joins
}

/// Clause for one filter parameter: its branches OR-ed together.
fn filter_clause(filter: &FilterParameter, root: &str) -> Result<Clause, FindError> {
    let mut branches = Vec::with_capacity(filter.references.len());
    for reference in &filter.references {
        let predicate = (filter.filter)(reference, &filter.value)?;
        let test = Clause::Test {
            column: reference.column_ref(),
            predicate,
        };
        branches.push(match reference.relation() {
            Some(relation) if relation.is_to_many() => exists_clause(relation, root, test),
            _ => test,
        });
    }

    if branches.len() == 1 {
        Ok(branches.remove(0))
    } else {
        Ok(Clause::Any(branches))
    }
}

/// Correlated EXISTS over the related rows of a to-many relation.
fn exists_clause(relation: &Relation, root: &str, condition: Clause) -> Clause {
    let alias = relation_alias(root, &relation.name);
    let owner = ColumnRef::new(root, &relation.join.owner_column);

    let (through, correlation) = match &relation.cardinality {
        Cardinality::ToMany {
            through: Some(through),
        } => {
            let through_alias = format!("{alias}_through");
            let join = ThroughJoin {
                table: through.table.clone(),
                on: (
                    ColumnRef::new(&through_alias, &through.related_key),
                    ColumnRef::new(&alias, &relation.join.related_column),
                ),
                alias: through_alias.clone(),
            };
            (Some(join), (ColumnRef::new(&through_alias, &through.owner_key), owner))
        }
        Cardinality::ToMany { through: None } | Cardinality::OneToOne => (
            None,
            (ColumnRef::new(&alias, &relation.join.related_column), owner),
        ),
    };

    Clause::Exists(ExistsClause {
        table: relation.related.clone(),
        alias,
        through,
        correlation,
        condition: Box::new(condition),
    })
}

fn check_eager(
    expression: &RelationExpression,
    context: &AssemblyContext<'_>,
) -> Result<RelationExpression, FindError> {
    expression.validate(context.schema, context.root)?;
    if let Some(allowed) = context.allowed_eager {
        if !expression.is_subset_of(allowed) {
            return Err(FindError::permission(format!(
                "relation expression \"{expression}\" is not allowed"
            )));
        }
    }
    Ok(expression.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpecialParameters;
    use crate::errors::ErrorKind;
    use crate::filtering::filters::{FilterRegistry, Operator};
    use crate::filtering::parser::ParameterParser;
    use crate::filtering::reference::ReferenceResolver;
    use crate::schema::{EntitySchema, JoinSpec, Through};
    use std::sync::Arc;

    fn schema() -> Schema {
        Schema::new()
            .entity(
                EntitySchema::new("persons")
                    .property("id", "id")
                    .property("firstName", "first_name")
                    .property("lastName", "last_name")
                    .property("age", "age")
                    .relation(Relation::one_to_one("parent", "persons", "parent_id", "id"))
                    .relation(Relation::to_many("children", "persons", "id", "parent_id"))
                    .relation(Relation::many_to_many(
                        "movies",
                        "movies",
                        JoinSpec {
                            owner_column: "id".to_string(),
                            related_column: "id".to_string(),
                        },
                        Through {
                            table: "persons_movies".to_string(),
                            owner_key: "person_id".to_string(),
                            related_key: "movie_id".to_string(),
                        },
                    )),
            )
            .entity(EntitySchema::new("movies").property("name", "name"))
    }

    fn plan_for(pairs: &[(&str, &str)], allowed_eager: Option<&str>) -> Result<Plan, FindError> {
        let schema = Arc::new(schema());
        let resolver = ReferenceResolver::new(Arc::clone(&schema), "persons");
        let filters = FilterRegistry::new();
        let special = SpecialParameters::default();
        let parser = ParameterParser {
            resolver: &resolver,
            filters: &filters,
            special: &special,
        };
        let parameters = pairs
            .iter()
            .map(|(key, value)| parser.parse(key, value))
            .collect::<Result<Vec<_>, _>>()?;
        let allowed = allowed_eager.map(|raw| RelationExpression::parse(raw).unwrap());
        plan(
            &parameters,
            &AssemblyContext {
                schema: &schema,
                root: "persons",
                allowed_eager: allowed.as_ref(),
            },
        )
    }

    /// Records builder calls by name.
    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
    }

    impl QueryBuilder for Recorder {
        fn add_where(&mut self, _: Clause) {
            self.calls.push("where".into());
        }
        fn add_join(&mut self, join: JoinClause) {
            self.calls.push(format!("join {}", join.alias));
        }
        fn add_select(&mut self, column: ColumnRef, alias: Option<String>) {
            self.calls.push(format!("select {}.{} {alias:?}", column.table, column.column));
        }
        fn select_root(&mut self) {
            self.calls.push("select root".into());
        }
        fn add_order(&mut self, target: OrderTarget, direction: Order) {
            self.calls.push(format!("order {target:?} {direction:?}"));
        }
        fn add_group(&mut self, column: ColumnRef) {
            self.calls.push(format!("group {}", column.column));
        }
        fn set_range(&mut self, start: u64, end: u64) {
            self.calls.push(format!("range {start}-{end}"));
        }
        fn set_eager(&mut self, expression: RelationExpression) {
            self.calls.push(format!("eager {expression}"));
        }
        fn set_joined_eager(&mut self, expression: RelationExpression) {
            self.calls.push(format!("join eager {expression}"));
        }
        fn set_count(&mut self, target: CountTarget) {
            self.calls.push(format!("count {target:?}"));
        }
    }

    #[test]
    fn test_root_filter_applies_directly() {
        let plan = plan_for(&[("age:gt", "30")], None).unwrap();
        assert!(plan.joins().is_empty());
        match &plan.clauses()[0] {
            Clause::Test { column, predicate } => {
                assert_eq!(column, &ColumnRef::new("persons", "age"));
                assert_eq!(predicate.operator, Operator::Gt);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_one_join_per_to_one_relation() {
        let plan = plan_for(
            &[("parent.age:gt", "60"), ("parent.firstName", "Jennifer"), ("orderBy", "parent.age")],
            None,
        )
        .unwrap();
        assert_eq!(plan.joins().len(), 1);
        let join = &plan.joins()[0];
        assert_eq!(join.alias, "persons_parent");
        assert_eq!(join.on.0, ColumnRef::new("persons_parent", "id"));
        assert_eq!(join.on.1, ColumnRef::new("persons", "parent_id"));
        assert!(plan.select_root);
    }

    #[test]
    fn test_to_many_filter_uses_exists() {
        let plan = plan_for(&[("children.age:lt", "10")], None).unwrap();
        assert!(plan.joins().is_empty(), "to-many relations are never joined");
        match &plan.clauses()[0] {
            Clause::Exists(exists) => {
                assert_eq!(exists.table, "persons");
                assert_eq!(exists.alias, "persons_children");
                assert_eq!(exists.correlation.0, ColumnRef::new("persons_children", "parent_id"));
                assert_eq!(exists.correlation.1, ColumnRef::new("persons", "id"));
                assert!(exists.through.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_many_to_many_exists_joins_through_table() {
        let plan = plan_for(&[("movies.name", "Heat")], None).unwrap();
        match &plan.clauses()[0] {
            Clause::Exists(exists) => {
                let through = exists.through.as_ref().unwrap();
                assert_eq!(through.table, "persons_movies");
                assert_eq!(through.on.0, ColumnRef::new("persons_movies_through", "movie_id"));
                assert_eq!(through.on.1, ColumnRef::new("persons_movies", "id"));
                assert_eq!(exists.correlation.0, ColumnRef::new("persons_movies_through", "person_id"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_or_branches_form_one_group() {
        let plan = plan_for(&[("firstName|children.firstName:like", "J%"), ("age:gt", "1")], None).unwrap();
        assert_eq!(plan.clauses().len(), 2);
        match &plan.clauses()[0] {
            Clause::Any(branches) => {
                assert_eq!(branches.len(), 2);
                assert!(matches!(branches[0], Clause::Test { .. }));
                assert!(matches!(branches[1], Clause::Exists(_)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_ordering_through_to_many_is_rejected() {
        let err = plan_for(&[("orderBy", "children.age")], None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedOrdering);
    }

    #[test]
    fn test_ordering_through_to_one_selects_alias() {
        let mut recorder = Recorder::default();
        plan_for(&[("orderByDesc", "parent.age")], None)
            .unwrap()
            .apply(&mut recorder);
        assert_eq!(
            recorder.calls,
            vec![
                "join persons_parent".to_string(),
                "select root".to_string(),
                "select persons_parent.age Some(\"parent_age\")".to_string(),
                "order Alias(\"parent_age\") Desc".to_string(),
            ]
        );
    }

    #[test]
    fn test_application_order() {
        let mut recorder = Recorder::default();
        plan_for(
            &[
                ("eager", "children"),
                ("rangeEnd", "4"),
                ("groupBy", "lastName"),
                ("count", "*"),
                ("rangeStart", "2"),
                ("lastName:neq", "x"),
            ],
            None,
        )
        .unwrap()
        .apply(&mut recorder);
        assert_eq!(
            recorder.calls,
            vec![
                "count Rows".to_string(),
                "where".to_string(),
                "select persons.last_name None".to_string(),
                "group last_name".to_string(),
                "range 2-4".to_string(),
                "eager children".to_string(),
            ]
        );
    }

    #[test]
    fn test_range_errors_abort() {
        let err = plan_for(&[("age", "1"), ("rangeStart", "X"), ("rangeEnd", "4")], None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRange);
        let err = plan_for(&[("rangeEnd", "4")], None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRange);
    }

    #[test]
    fn test_eager_restrictions() {
        assert!(plan_for(&[("eager", "children.movies")], Some("[parent, children.*]")).is_ok());

        let err = plan_for(&[("eager", "movies")], Some("[parent, children]")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permission);

        let err = plan_for(&[("join", "movies")], Some("parent")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permission);

        let err = plan_for(&[("eager", "siblings")], None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownReference);
    }
}
