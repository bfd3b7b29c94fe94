use std::fmt;
use std::sync::Arc;

use super::assembler::{self, AssemblyContext};
use super::find_query::FindQuery;
use super::query::QueryBuilder;
use crate::config::{FindConfig, SpecialParameter, SpecialParameters};
use crate::errors::FindError;
use crate::filtering::eager::RelationExpression;
use crate::filtering::filters::{FilterRegistry, Predicate};
use crate::filtering::parser::{ParameterParser, QueryParameter};
use crate::filtering::reference::{PropertyRef, ReferenceResolver};
use crate::filtering::whitelist::Whitelist;
use crate::models::QueryParams;
use crate::schema::Schema;

/// Builds find queries for one root entity.
///
/// Configure it once with the consuming setters, then share it (for example
/// in a `static` or axum state) and call [`build`](Self::build) from any
/// number of requests. Building never mutates the configuration; the only
/// shared mutable state is the resolver's memo of resolved paths.
///
/// ```rust,ignore
/// let persons = FindQueryBuilder::new(schema, "persons")?
///     .allow(["firstName", "lastName", "parent.age", "pets.name"])
///     .allow_eager("[pets, children]")?
///     .register_filter("startsWith", |_, value| {
///         Ok(Predicate::unary(Operator::Like, &format!("{value}%")))
///     });
///
/// let query = persons.build(&QueryParams::from_query_string("lastName=Aniston&orderBy=firstName"))?;
/// let result = query.execute(&db).await?;
/// ```
pub struct FindQueryBuilder {
    resolver: ReferenceResolver,
    filters: FilterRegistry,
    special: SpecialParameters,
    whitelist: Whitelist,
    allowed_eager: Option<RelationExpression>,
}

impl FindQueryBuilder {
    /// Builder for queries rooted at table `root`.
    ///
    /// # Errors
    ///
    /// Unknown-reference error when `root` is not in `schema`.
    pub fn new(schema: impl Into<Arc<Schema>>, root: &str) -> Result<Self, FindError> {
        let schema = schema.into();
        schema.require(root)?;
        Ok(Self {
            resolver: ReferenceResolver::new(schema, root),
            filters: FilterRegistry::new(),
            special: SpecialParameters::default(),
            whitelist: Whitelist::AllowAll,
            allowed_eager: None,
        })
    }

    /// Restrict property paths to `paths`.
    #[must_use]
    pub fn allow<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.whitelist = Whitelist::only(paths);
        self
    }

    #[must_use]
    pub fn allow_all(mut self) -> Self {
        self.whitelist = Whitelist::AllowAll;
        self
    }

    /// Restrict `eager` and `join` to sub-expressions of `expression`.
    ///
    /// # Errors
    ///
    /// Syntax error for a malformed expression, unknown-reference error for
    /// relations missing from the schema.
    pub fn allow_eager(mut self, expression: &str) -> Result<Self, FindError> {
        let expression = RelationExpression::parse(expression)?;
        expression.validate(self.resolver.schema(), self.resolver.root())?;
        self.allowed_eager = Some(expression);
        Ok(self)
    }

    /// Register or replace a filter.
    #[must_use]
    pub fn register_filter<F>(mut self, name: impl Into<String>, filter: F) -> Self
    where
        F: Fn(&PropertyRef, &str) -> Result<Predicate, FindError> + Send + Sync + 'static,
    {
        self.filters.register(name, filter);
        self
    }

    /// Accept `name` as the key of `parameter` instead of its default.
    ///
    /// # Errors
    ///
    /// Configuration error when another directive already uses `name`.
    pub fn special_parameter(
        mut self,
        parameter: SpecialParameter,
        name: impl Into<String>,
    ) -> Result<Self, FindError> {
        self.special.rename(parameter, name)?;
        Ok(self)
    }

    /// Apply a deserialized configuration.
    ///
    /// # Errors
    ///
    /// Configuration error when two directives share a name, and errors from
    /// [`allow_eager`](Self::allow_eager).
    pub fn with_config(mut self, config: FindConfig) -> Result<Self, FindError> {
        config.special_parameters.validate()?;
        self.special = config.special_parameters;
        self.whitelist = match config.allowed {
            Some(paths) => Whitelist::only(paths),
            None => Whitelist::AllowAll,
        };
        match config.allowed_eager {
            Some(expression) => self.allow_eager(&expression),
            None => Ok(self),
        }
    }

    #[must_use]
    pub fn root(&self) -> &str {
        self.resolver.root()
    }

    #[must_use]
    pub fn special_parameters(&self) -> &SpecialParameters {
        &self.special
    }

    #[must_use]
    pub fn whitelist(&self) -> &Whitelist {
        &self.whitelist
    }

    /// Parse every key and value. A key with several values yields one
    /// parameter per value.
    ///
    /// # Errors
    ///
    /// The first syntax, unknown-reference or unknown-filter error.
    pub fn parse(&self, params: &QueryParams) -> Result<Vec<QueryParameter>, FindError> {
        let parser = ParameterParser {
            resolver: &self.resolver,
            filters: &self.filters,
            special: &self.special,
        };
        params
            .iter()
            .map(|(key, value)| parser.parse(key, value))
            .collect()
    }

    /// Build a fresh query from `params`.
    ///
    /// # Errors
    ///
    /// Any input error; see [`ErrorKind`](crate::ErrorKind).
    pub fn build(&self, params: &QueryParams) -> Result<FindQuery, FindError> {
        let mut query = FindQuery::new(self.root());
        self.build_into(params, &mut query)?;
        Ok(query)
    }

    /// Extend an existing query with `params`. On error `builder` is left
    /// untouched.
    ///
    /// # Errors
    ///
    /// Any input error; see [`ErrorKind`](crate::ErrorKind).
    pub fn build_into<B: QueryBuilder + ?Sized>(
        &self,
        params: &QueryParams,
        builder: &mut B,
    ) -> Result<(), FindError> {
        let parameters = self.parse(params)?;
        self.whitelist.check(&parameters)?;
        let plan = assembler::plan(
            &parameters,
            &AssemblyContext {
                schema: self.resolver.schema(),
                root: self.resolver.root(),
                allowed_eager: self.allowed_eager.as_ref(),
            },
        )?;
        plan.apply(builder);
        Ok(())
    }
}

impl fmt::Debug for FindQueryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FindQueryBuilder")
            .field("root", &self.resolver.root())
            .field("filters", &self.filters)
            .field("special", &self.special)
            .field("whitelist", &self.whitelist)
            .field("allowed_eager", &self.allowed_eager)
            .finish_non_exhaustive()
    }
}
