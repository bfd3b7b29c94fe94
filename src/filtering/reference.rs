//! Property references: dotted paths resolved against the schema.
//!
//! `firstName` names a property of the root entity, `parent.age` a property
//! of the entity reached through the `parent` relation. Only one relation hop
//! is supported; longer chains would change join aliasing and whitelist
//! semantics and are rejected.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::query::ColumnRef;
use crate::errors::FindError;
use crate::schema::{PropertyType, Relation, Schema};

/// Maximum number of relations a path may cross.
pub const MAX_RELATION_DEPTH: usize = 1;

/// Alias of a relation within one query rooted at `root`.
///
/// Joins of to-one relations and subqueries of to-many relations both use it,
/// so every reference through the same relation shares one join.
#[must_use]
pub fn relation_alias(root: &str, relation: &str) -> String {
    format!("{root}_{relation}")
}

/// Whether `segment` is a valid path segment: an identifier token.
pub(crate) fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' || first == '$' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        }
        _ => false,
    }
}

/// A schema-validated path from the root entity to a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyRef {
    raw_path: String,
    root: String,
    relations: Vec<Relation>,
    terminal: String,
    property: String,
    column: String,
    property_type: PropertyType,
}

impl PropertyRef {
    /// The path exactly as it appeared in the request
    #[must_use]
    pub fn raw_path(&self) -> &str {
        &self.raw_path
    }

    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    #[must_use]
    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    /// The relation crossed, if any
    #[must_use]
    pub fn relation(&self) -> Option<&Relation> {
        self.relations.last()
    }

    /// Table of the entity owning the property
    #[must_use]
    pub fn terminal_entity(&self) -> &str {
        &self.terminal
    }

    #[must_use]
    pub fn property(&self) -> &str {
        &self.property
    }

    #[must_use]
    pub fn column(&self) -> &str {
        &self.column
    }

    #[must_use]
    pub fn property_type(&self) -> PropertyType {
        self.property_type
    }

    /// Fully qualified column. Paths through a relation are qualified with
    /// the relation alias: the join alias for to-one relations, the subquery
    /// alias for to-many relations.
    #[must_use]
    pub fn column_ref(&self) -> ColumnRef {
        match self.relation() {
            None => ColumnRef::new(&self.root, &self.column),
            Some(relation) => ColumnRef::new(relation_alias(&self.root, &relation.name), &self.column),
        }
    }
}

/// Resolves and memoizes property paths for one root entity.
#[derive(Debug)]
pub struct ReferenceResolver {
    schema: Arc<Schema>,
    root: String,
    cache: RwLock<HashMap<String, Arc<PropertyRef>>>,
}

impl ReferenceResolver {
    pub fn new(schema: Arc<Schema>, root: impl Into<String>) -> Self {
        Self {
            schema,
            root: root.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Resolve `path`, reusing a previous resolution of the same string.
    ///
    /// # Errors
    ///
    /// Syntax error for empty paths, empty segments and non-identifier
    /// segments; unknown-reference error for unknown relations or
    /// properties, and for paths crossing more than [`MAX_RELATION_DEPTH`]
    /// relations.
    pub fn resolve(&self, path: &str) -> Result<Arc<PropertyRef>, FindError> {
        if let Some(hit) = self.cache.read().get(path) {
            tracing::trace!(path, "property reference cache hit");
            return Ok(Arc::clone(hit));
        }

        let resolved = Arc::new(self.resolve_uncached(path)?);
        tracing::trace!(path, column = %resolved.column, "property reference resolved");

        let mut cache = self.cache.write();
        Ok(Arc::clone(cache.entry(path.to_string()).or_insert(resolved)))
    }

    /// Number of memoized paths
    #[must_use]
    pub fn cached(&self) -> usize {
        self.cache.read().len()
    }

    fn resolve_uncached(&self, path: &str) -> Result<PropertyRef, FindError> {
        if path.is_empty() {
            return Err(FindError::syntax("empty property reference"));
        }

        let segments: Vec<&str> = path.split('.').collect();
        if let Some(bad) = segments.iter().find(|segment| !is_identifier(segment)) {
            return Err(if bad.is_empty() {
                FindError::syntax(format!("empty segment in property reference \"{path}\""))
            } else {
                FindError::syntax(format!("invalid segment \"{bad}\" in property reference \"{path}\""))
            });
        }
        if segments.len() > MAX_RELATION_DEPTH + 1 {
            return Err(FindError::unknown_reference(format!(
                "property reference \"{path}\" crosses more than {MAX_RELATION_DEPTH} relation"
            )));
        }

        let (property, relation_names) = segments
            .split_last()
            .ok_or_else(|| FindError::syntax("empty property reference"))?;

        let mut entity = self.schema.require(&self.root)?;
        let mut relations = Vec::with_capacity(relation_names.len());
        for name in relation_names {
            let relation = entity.get_relation(name).ok_or_else(|| {
                FindError::unknown_reference(format!(
                    "unknown relation \"{name}\" in property reference \"{path}\""
                ))
            })?;
            entity = self.schema.require(&relation.related)?;
            relations.push(relation.clone());
        }

        let column = entity.column(property).ok_or_else(|| {
            FindError::unknown_reference(format!(
                "unknown property \"{property}\" in property reference \"{path}\""
            ))
        })?;

        Ok(PropertyRef {
            raw_path: path.to_string(),
            root: self.root.clone(),
            relations,
            terminal: entity.table().to_string(),
            property: (*property).to_string(),
            column: column.to_string(),
            property_type: entity.property_type(property).unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::schema::EntitySchema;

    fn resolver() -> ReferenceResolver {
        let schema = Schema::new()
            .entity(
                EntitySchema::new("persons")
                    .property("id", "id")
                    .property("firstName", "first_name")
                    .property("age", "age")
                    .relation(Relation::one_to_one("parent", "persons", "parent_id", "id"))
                    .relation(Relation::to_many("pets", "animals", "id", "owner_id")),
            )
            .entity(
                EntitySchema::new("animals")
                    .property("name", "name")
                    .relation(Relation::one_to_one("owner", "persons", "owner_id", "id")),
            );
        ReferenceResolver::new(Arc::new(schema), "persons")
    }

    #[test]
    fn test_root_property() {
        let reference = resolver().resolve("firstName").unwrap();
        assert_eq!(reference.column(), "first_name");
        assert!(reference.relation().is_none());
        assert_eq!(reference.column_ref(), ColumnRef::new("persons", "first_name"));
    }

    #[test]
    fn test_to_one_property_uses_join_alias() {
        let reference = resolver().resolve("parent.age").unwrap();
        assert_eq!(reference.terminal_entity(), "persons");
        assert_eq!(reference.relation().unwrap().name, "parent");
        assert_eq!(reference.column_ref(), ColumnRef::new("persons_parent", "age"));
    }

    #[test]
    fn test_to_many_property() {
        let reference = resolver().resolve("pets.name").unwrap();
        assert_eq!(reference.terminal_entity(), "animals");
        assert!(reference.relation().unwrap().is_to_many());
        assert_eq!(reference.column_ref(), ColumnRef::new("persons_pets", "name"));
    }

    #[test]
    fn test_unknown_references() {
        let resolver = resolver();
        for path in ["lastName", "first_name", "sibling.age", "pets.age"] {
            let err = resolver.resolve(path).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::UnknownReference, "{path}");
        }
    }

    #[test]
    fn test_depth_is_limited() {
        let err = resolver().resolve("pets.owner.age").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownReference);
    }

    #[test]
    fn test_malformed_paths() {
        let resolver = resolver();
        for path in ["", "a..b", "a.", ".a", "first name", "1st"] {
            let err = resolver.resolve(path).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Syntax, "{path:?}");
        }
    }

    #[test]
    fn test_resolutions_are_cached() {
        let resolver = resolver();
        let first = resolver.resolve("parent.age").unwrap();
        let second = resolver.resolve("parent.age").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(resolver.cached(), 1);

        assert!(resolver.resolve("nope").is_err());
        assert_eq!(resolver.cached(), 1);
    }

    #[test]
    fn test_identifier_tokens() {
        assert!(is_identifier("firstName"));
        assert!(is_identifier("_private"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("a-b"));
        assert!(!is_identifier("9lives"));
    }

    #[test]
    fn test_reference_carries_terminal_property_type() {
        let schema = Schema::new()
            .entity(
                EntitySchema::new("persons")
                    .typed_property("age", "age", PropertyType::Integer)
                    .relation(Relation::to_many("pets", "animals", "id", "owner_id")),
            )
            .entity(EntitySchema::new("animals").typed_property("weight", "weight", PropertyType::Float));
        let resolver = ReferenceResolver::new(Arc::new(schema), "persons");

        assert_eq!(resolver.resolve("age").unwrap().property_type(), PropertyType::Integer);
        assert_eq!(resolver.resolve("pets.weight").unwrap().property_type(), PropertyType::Float);
    }
}
