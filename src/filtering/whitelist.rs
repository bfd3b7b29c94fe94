//! Whitelist of property paths a caller may use.

use std::collections::HashSet;

use super::parser::QueryParameter;
use crate::errors::FindError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Whitelist {
    #[default]
    AllowAll,
    Only(HashSet<String>),
}

impl Whitelist {
    pub fn only<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Only(paths.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub fn permits(&self, path: &str) -> bool {
        match self {
            Self::AllowAll => true,
            Self::Only(allowed) => allowed.contains(path),
        }
    }

    /// Check every property reference of every parameter.
    ///
    /// # Errors
    ///
    /// Permission error naming the first path outside the whitelist.
    pub fn check(&self, parameters: &[QueryParameter]) -> Result<(), FindError> {
        if matches!(self, Self::AllowAll) {
            return Ok(());
        }
        for reference in parameters.iter().flat_map(QueryParameter::references) {
            if !self.permits(reference.raw_path()) {
                return Err(FindError::permission(format!(
                    "property reference \"{}\" is not allowed",
                    reference.raw_path()
                )));
            }
        }
        Ok(())
    }
}
