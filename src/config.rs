//! Builder configuration loaded from documents.
//!
//! ```json
//! {
//!   "specialParameters": { "eager": "withRelated", "rangeStart": "from" },
//!   "allowed": ["firstName", "parent.age"],
//!   "allowedEager": "[parent, children.pets]"
//! }
//! ```

use serde::Deserialize;

use crate::errors::FindError;

/// Logical meaning of a directive key. The external key can be renamed, the
/// meaning cannot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SpecialParameter {
    Eager,
    Join,
    OrderBy,
    OrderByAsc,
    OrderByDesc,
    RangeStart,
    RangeEnd,
    GroupBy,
    Count,
}

impl SpecialParameter {
    pub const ALL: [SpecialParameter; 9] = [
        Self::Eager,
        Self::Join,
        Self::OrderBy,
        Self::OrderByAsc,
        Self::OrderByDesc,
        Self::RangeStart,
        Self::RangeEnd,
        Self::GroupBy,
        Self::Count,
    ];
}

/// External key of every directive.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SpecialParameters {
    pub eager: String,
    pub join: String,
    pub order_by: String,
    pub order_by_asc: String,
    pub order_by_desc: String,
    pub range_start: String,
    pub range_end: String,
    pub group_by: String,
    pub count: String,
}

impl Default for SpecialParameters {
    fn default() -> Self {
        Self {
            eager: "eager".to_string(),
            join: "join".to_string(),
            order_by: "orderBy".to_string(),
            order_by_asc: "orderByAsc".to_string(),
            order_by_desc: "orderByDesc".to_string(),
            range_start: "rangeStart".to_string(),
            range_end: "rangeEnd".to_string(),
            group_by: "groupBy".to_string(),
            count: "count".to_string(),
        }
    }
}

impl SpecialParameters {
    #[must_use]
    pub fn name(&self, parameter: SpecialParameter) -> &str {
        match parameter {
            SpecialParameter::Eager => &self.eager,
            SpecialParameter::Join => &self.join,
            SpecialParameter::OrderBy => &self.order_by,
            SpecialParameter::OrderByAsc => &self.order_by_asc,
            SpecialParameter::OrderByDesc => &self.order_by_desc,
            SpecialParameter::RangeStart => &self.range_start,
            SpecialParameter::RangeEnd => &self.range_end,
            SpecialParameter::GroupBy => &self.group_by,
            SpecialParameter::Count => &self.count,
        }
    }

    /// Accept `name` as the key of `parameter`.
    ///
    /// # Errors
    ///
    /// Configuration error when `name` is empty or already the key of
    /// another directive. The names are left unchanged.
    pub fn rename(&mut self, parameter: SpecialParameter, name: impl Into<String>) -> Result<(), FindError> {
        let name = name.into();
        if name.is_empty() {
            return Err(FindError::configuration(format!(
                "{parameter:?} cannot use an empty parameter name"
            )));
        }
        if let Some(other) = self.lookup(&name).filter(|&other| other != parameter) {
            return Err(FindError::configuration(format!(
                "parameter name \"{name}\" is already used by {other:?}"
            )));
        }
        let slot = match parameter {
            SpecialParameter::Eager => &mut self.eager,
            SpecialParameter::Join => &mut self.join,
            SpecialParameter::OrderBy => &mut self.order_by,
            SpecialParameter::OrderByAsc => &mut self.order_by_asc,
            SpecialParameter::OrderByDesc => &mut self.order_by_desc,
            SpecialParameter::RangeStart => &mut self.range_start,
            SpecialParameter::RangeEnd => &mut self.range_end,
            SpecialParameter::GroupBy => &mut self.group_by,
            SpecialParameter::Count => &mut self.count,
        };
        *slot = name;
        Ok(())
    }

    /// Check that every directive has its own non-empty key. Needed for
    /// names that did not go through [`rename`](Self::rename), such as a
    /// deserialized [`FindConfig`].
    ///
    /// # Errors
    ///
    /// Configuration error naming the first empty or shared key.
    pub fn validate(&self) -> Result<(), FindError> {
        for (index, &parameter) in SpecialParameter::ALL.iter().enumerate() {
            let name = self.name(parameter);
            if name.is_empty() {
                return Err(FindError::configuration(format!(
                    "{parameter:?} cannot use an empty parameter name"
                )));
            }
            if let Some(other) = SpecialParameter::ALL[index + 1..]
                .iter()
                .find(|&&other| self.name(other) == name)
            {
                return Err(FindError::configuration(format!(
                    "parameter name \"{name}\" is used by both {parameter:?} and {other:?}"
                )));
            }
        }
        Ok(())
    }

    /// Directive registered under `key`. Keys are unique once
    /// [`validate`](Self::validate) passes.
    #[must_use]
    pub fn lookup(&self, key: &str) -> Option<SpecialParameter> {
        SpecialParameter::ALL
            .into_iter()
            .find(|&parameter| self.name(parameter) == key)
    }
}

/// Serializable subset of the builder configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FindConfig {
    pub special_parameters: SpecialParameters,
    /// Allowed property paths; absent means allow all
    pub allowed: Option<Vec<String>>,
    pub allowed_eager: Option<String>,
}
