//! Filter registry: filter names mapped to predicate-producing functions.
//!
//! | name        | predicate                                   |
//! |-------------|---------------------------------------------|
//! | `eq`        | `col = value` (default when no name given)  |
//! | `neq`       | `col <> value`                              |
//! | `lt`/`lte`  | `col < value`, `col <= value`               |
//! | `gt`/`gte`  | `col > value`, `col >= value`               |
//! | `like`      | `col LIKE value` (case-sensitive pattern)   |
//! | `likeLower` | `LOWER(col) LIKE lower(value)`              |
//! | `in`        | `col IN (v1, v2, ...)`, value split on `,`  |
//! | `isNull`    | `col IS NULL`, value ignored                |
//! | `notNull`   | `col IS NOT NULL`, value ignored            |
//!
//! Comparison and `in` operands are converted to the property's
//! [`PropertyType`] first, so `age:gt=30` binds the integer `30` and
//! `age:gt=old` fails before any SQL runs. Pattern operands stay strings.

use sea_orm::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::reference::PropertyRef;
use crate::errors::FindError;
use crate::schema::PropertyType;

/// Filter used when a key names no filter.
pub const DEFAULT_FILTER: &str = "eq";

/// Closed set of operators the assembler knows how to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    Like,
    LikeLower,
    IsNull,
    NotNull,
    /// Raw SQL template. The first `?` is the column, the following ones the
    /// operands in order.
    Raw(String),
}

/// A single test against one column.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub operator: Operator,
    pub operands: Vec<Value>,
}

impl Predicate {
    #[must_use]
    pub fn new(operator: Operator, operands: Vec<Value>) -> Self {
        Self { operator, operands }
    }

    /// Predicate with a single string operand
    #[must_use]
    pub fn unary(operator: Operator, value: &str) -> Self {
        Self::new(operator, vec![Value::from(value.to_string())])
    }

    #[must_use]
    pub fn raw(template: impl Into<String>, operands: Vec<Value>) -> Self {
        Self::new(Operator::Raw(template.into()), operands)
    }
}

/// Function turning a property reference and raw value into a predicate.
pub type FilterFn = Arc<dyn Fn(&PropertyRef, &str) -> Result<Predicate, FindError> + Send + Sync>;

/// Filters by name. Starts with the built-in set.
#[derive(Clone)]
pub struct FilterRegistry {
    filters: HashMap<String, FilterFn>,
}

impl FilterRegistry {
    /// Registry holding only the built-in filters
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self {
            filters: HashMap::new(),
        };
        for (name, operator) in [
            ("eq", Operator::Eq),
            ("neq", Operator::Neq),
            ("lt", Operator::Lt),
            ("lte", Operator::Lte),
            ("gt", Operator::Gt),
            ("gte", Operator::Gte),
        ] {
            registry.register(name, move |reference, value| {
                Ok(Predicate::new(operator.clone(), vec![typed_value(reference, value)?]))
            });
        }
        registry.register("like", |_, value| Ok(Predicate::unary(Operator::Like, value)));
        registry.register("likeLower", |_, value| {
            Ok(Predicate::unary(Operator::LikeLower, &value.to_lowercase()))
        });
        registry.register("in", in_list);
        registry.register("isNull", |_, _| Ok(Predicate::new(Operator::IsNull, Vec::new())));
        registry.register("notNull", |_, _| Ok(Predicate::new(Operator::NotNull, Vec::new())));
        registry
    }

    /// Store `filter` under `name`, replacing any previous filter.
    pub fn register<F>(&mut self, name: impl Into<String>, filter: F)
    where
        F: Fn(&PropertyRef, &str) -> Result<Predicate, FindError> + Send + Sync + 'static,
    {
        self.filters.insert(name.into(), Arc::new(filter));
    }

    /// Look up a filter by its case-sensitive name.
    ///
    /// # Errors
    ///
    /// Unknown-filter error when nothing is registered under `name`.
    pub fn lookup(&self, name: &str) -> Result<&FilterFn, FindError> {
        self.filters
            .get(name)
            .ok_or_else(|| FindError::unknown_filter(name))
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.filters.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("FilterRegistry").field("filters", &names).finish()
    }
}

/// Convert a raw value to the type of `reference`'s property.
///
/// # Errors
///
/// Invalid-value error when `raw` does not parse as that type.
pub fn typed_value(reference: &PropertyRef, raw: &str) -> Result<Value, FindError> {
    let kind = reference.property_type();
    let invalid = || FindError::invalid_value(reference.raw_path(), raw, kind.as_str());
    let trimmed = raw.trim();
    Ok(match kind {
        PropertyType::Text => Value::from(raw.to_string()),
        PropertyType::Integer => Value::from(trimmed.parse::<i64>().map_err(|_| invalid())?),
        PropertyType::Float => {
            let number = trimmed.parse::<f64>().map_err(|_| invalid())?;
            if !number.is_finite() {
                return Err(invalid());
            }
            Value::from(number)
        }
        PropertyType::Boolean => Value::from(match trimmed {
            "true" | "1" => true,
            "false" | "0" => false,
            _ => return Err(invalid()),
        }),
    })
}

fn in_list(reference: &PropertyRef, value: &str) -> Result<Predicate, FindError> {
    let values = value
        .split(',')
        .map(|item| typed_value(reference, item.trim()))
        .collect::<Result<_, _>>()?;
    Ok(Predicate::new(Operator::In, values))
}
