//! Turns one raw `key=value` pair into a typed [`QueryParameter`].
//!
//! Keys registered as special parameters become directives. Every other key
//! is a filter following `<path>('|'<path>)*(':'<filter>)?`:
//!
//! ```text
//! firstName=Jennifer                 eq on a root property
//! age:gt=30                          named filter
//! parent.age:lt=60                   property through a relation
//! firstName|lastName:likeLower=%jen% OR over several properties
//! ```

use std::fmt;
use std::sync::Arc;

use super::eager::RelationExpression;
use super::filters::{DEFAULT_FILTER, FilterFn, FilterRegistry};
use super::reference::{PropertyRef, ReferenceResolver};
use crate::config::{SpecialParameter, SpecialParameters};
use crate::errors::FindError;

/// A directive: a key with a fixed meaning rather than a filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    OrderAsc(Arc<PropertyRef>),
    OrderDesc(Arc<PropertyRef>),
    RangeStart(String),
    RangeEnd(String),
    GroupBy(Vec<Arc<PropertyRef>>),
    /// `None` counts rows
    Count(Option<Arc<PropertyRef>>),
    Eager(RelationExpression),
    Join(RelationExpression),
}

/// A filter over one or more OR-combined property references.
#[derive(Clone)]
pub struct FilterParameter {
    pub key: String,
    pub references: Vec<Arc<PropertyRef>>,
    pub filter_name: String,
    pub filter: FilterFn,
    pub value: String,
}

impl fmt::Debug for FilterParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterParameter")
            .field("key", &self.key)
            .field("references", &self.references)
            .field("filter_name", &self.filter_name)
            .field("value", &self.value)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub enum QueryParameter {
    Directive(Directive),
    Filter(FilterParameter),
}

impl QueryParameter {
    /// Every property reference this parameter uses
    #[must_use]
    pub fn references(&self) -> Vec<&Arc<PropertyRef>> {
        match self {
            Self::Filter(filter) => filter.references.iter().collect(),
            Self::Directive(Directive::OrderAsc(reference) | Directive::OrderDesc(reference)) => {
                vec![reference]
            }
            Self::Directive(Directive::GroupBy(references)) => references.iter().collect(),
            Self::Directive(Directive::Count(reference)) => reference.iter().collect(),
            Self::Directive(_) => Vec::new(),
        }
    }
}

/// Parses keys against one resolver, filter registry and set of names.
pub struct ParameterParser<'a> {
    pub resolver: &'a ReferenceResolver,
    pub filters: &'a FilterRegistry,
    pub special: &'a SpecialParameters,
}

impl ParameterParser<'_> {
    /// Parse a single key/value pair.
    ///
    /// # Errors
    ///
    /// Syntax, unknown-reference or unknown-filter errors naming the key.
    pub fn parse(&self, raw_key: &str, value: &str) -> Result<QueryParameter, FindError> {
        let key = raw_key.trim();
        match self.special.lookup(key) {
            Some(parameter) => self.directive(parameter, value).map(QueryParameter::Directive),
            None => self.filter(key, value).map(QueryParameter::Filter),
        }
    }

    fn directive(&self, parameter: SpecialParameter, value: &str) -> Result<Directive, FindError> {
        let value = value.trim();
        Ok(match parameter {
            SpecialParameter::OrderBy | SpecialParameter::OrderByAsc => {
                Directive::OrderAsc(self.single_reference(value)?)
            }
            SpecialParameter::OrderByDesc => Directive::OrderDesc(self.single_reference(value)?),
            SpecialParameter::RangeStart => Directive::RangeStart(value.to_string()),
            SpecialParameter::RangeEnd => Directive::RangeEnd(value.to_string()),
            SpecialParameter::GroupBy => Directive::GroupBy(
                value
                    .split(',')
                    .map(|path| self.root_reference(path.trim(), "group by"))
                    .collect::<Result<_, _>>()?,
            ),
            SpecialParameter::Count => match value {
                "" | "*" => Directive::Count(None),
                path => Directive::Count(Some(self.root_reference(path, "count")?)),
            },
            SpecialParameter::Eager => Directive::Eager(RelationExpression::parse(value)?),
            SpecialParameter::Join => Directive::Join(RelationExpression::parse(value)?),
        })
    }

    fn single_reference(&self, path: &str) -> Result<Arc<PropertyRef>, FindError> {
        if path.contains(['|', ':']) {
            return Err(FindError::syntax(format!(
                "ordering accepts a single property, got \"{path}\""
            )));
        }
        self.resolver.resolve(path)
    }

    fn root_reference(&self, path: &str, usage: &str) -> Result<Arc<PropertyRef>, FindError> {
        let reference = self.single_reference(path)?;
        if reference.relation().is_some() {
            return Err(FindError::unknown_reference(format!(
                "cannot {usage} \"{path}\": only properties of \"{}\" are accepted",
                self.resolver.root()
            )));
        }
        Ok(reference)
    }

    fn filter(&self, key: &str, value: &str) -> Result<FilterParameter, FindError> {
        let parts: Vec<&str> = key.split(':').collect();
        let (paths, filter_name) = match parts.as_slice() {
            [paths] => (*paths, DEFAULT_FILTER),
            [paths, filter_name] => (*paths, *filter_name),
            _ => {
                return Err(FindError::syntax(format!(
                    "invalid key \"{key}\": at most one ':' is allowed"
                )));
            }
        };
        if paths.is_empty() {
            return Err(FindError::syntax(format!(
                "invalid key \"{key}\": missing property reference"
            )));
        }
        if filter_name.is_empty() {
            return Err(FindError::syntax(format!(
                "invalid key \"{key}\": missing filter name after ':'"
            )));
        }

        let filter = Arc::clone(self.filters.lookup(filter_name)?);

        let mut references: Vec<Arc<PropertyRef>> = Vec::new();
        for path in paths.split('|') {
            if path.is_empty() {
                return Err(FindError::syntax(format!(
                    "invalid key \"{key}\": empty property reference"
                )));
            }
            let reference = self.resolver.resolve(path)?;
            if !references.iter().any(|seen| seen.raw_path() == reference.raw_path()) {
                references.push(reference);
            }
        }

        Ok(FilterParameter {
            key: key.to_string(),
            references,
            filter_name: filter_name.to_string(),
            filter,
            value: value.to_string(),
        })
    }
}
