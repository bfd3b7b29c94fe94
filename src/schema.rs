//! Entity schema consumed by the resolver and the assembler.
//!
//! A [`Schema`] holds every [`EntitySchema`] by table name, so relations only
//! name their related entity and may be cyclic (a person's `parent` is a
//! person).

use heck::ToLowerCamelCase;
use sea_orm::{ColumnTrait, ColumnType, EntityTrait, IdenStatic, Iterable};
use std::collections::{BTreeMap, HashMap};

use crate::errors::FindError;

/// Columns joining two entities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinSpec {
    /// Column on the owning entity (e.g. `parent_id`)
    pub owner_column: String,
    /// Column on the related entity (e.g. `id`)
    pub related_column: String,
}

/// Join table of a many-to-many relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Through {
    pub table: String,
    /// Join table column matching `JoinSpec::owner_column`
    pub owner_key: String,
    /// Join table column matching `JoinSpec::related_column`
    pub related_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cardinality {
    OneToOne,
    ToMany { through: Option<Through> },
}

/// Relation descriptor: how one entity reaches another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub name: String,
    pub cardinality: Cardinality,
    /// Table name of the related entity
    pub related: String,
    pub join: JoinSpec,
}

impl Relation {
    /// Belongs-to or has-one relation: at most one related row.
    pub fn one_to_one(
        name: impl Into<String>,
        related: impl Into<String>,
        owner_column: impl Into<String>,
        related_column: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            cardinality: Cardinality::OneToOne,
            related: related.into(),
            join: JoinSpec {
                owner_column: owner_column.into(),
                related_column: related_column.into(),
            },
        }
    }

    /// Has-many relation: the related table holds the foreign key.
    pub fn to_many(
        name: impl Into<String>,
        related: impl Into<String>,
        owner_column: impl Into<String>,
        related_column: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            cardinality: Cardinality::ToMany { through: None },
            related: related.into(),
            join: JoinSpec {
                owner_column: owner_column.into(),
                related_column: related_column.into(),
            },
        }
    }

    /// Many-to-many relation through a join table.
    pub fn many_to_many(
        name: impl Into<String>,
        related: impl Into<String>,
        join: JoinSpec,
        through: Through,
    ) -> Self {
        Self {
            name: name.into(),
            cardinality: Cardinality::ToMany {
                through: Some(through),
            },
            related: related.into(),
            join,
        }
    }

    #[must_use]
    pub fn is_to_many(&self) -> bool {
        matches!(self.cardinality, Cardinality::ToMany { .. })
    }
}

/// Type filter values are converted to before they are bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PropertyType {
    /// Bound as a string; also used for dates, UUIDs and anything unlisted
    #[default]
    Text,
    Integer,
    Float,
    Boolean,
}

impl PropertyType {
    #[must_use]
    pub fn from_column_type(column_type: &ColumnType) -> Self {
        match column_type {
            ColumnType::TinyInteger
            | ColumnType::SmallInteger
            | ColumnType::Integer
            | ColumnType::BigInteger
            | ColumnType::TinyUnsigned
            | ColumnType::SmallUnsigned
            | ColumnType::Unsigned
            | ColumnType::BigUnsigned => Self::Integer,
            ColumnType::Float | ColumnType::Double | ColumnType::Decimal(_) => Self::Float,
            ColumnType::Boolean => Self::Boolean,
            _ => Self::Text,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Float => "number",
            Self::Boolean => "boolean",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Property {
    column: String,
    kind: PropertyType,
}

/// Property names, column names and relations of one entity.
#[derive(Debug, Clone, Default)]
pub struct EntitySchema {
    table: String,
    properties: BTreeMap<String, Property>,
    relations: BTreeMap<String, Relation>,
}

impl EntitySchema {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    /// Derive the property map from a Sea-ORM entity. Each column is exposed
    /// under its lowerCamelCase name, so `first_name` becomes `firstName`,
    /// and typed after its column definition.
    #[must_use]
    pub fn from_entity<E: EntityTrait>() -> Self {
        let entity = E::default();
        let mut schema = Self::new(entity.table_name());
        for column in E::Column::iter() {
            let column_name = column.as_str();
            let kind = PropertyType::from_column_type(column.def().get_column_type());
            schema = schema.typed_property(column_name.to_lower_camel_case(), column_name, kind);
        }
        schema
    }

    /// Add a text property.
    #[must_use]
    pub fn property(self, name: impl Into<String>, column: impl Into<String>) -> Self {
        self.typed_property(name, column, PropertyType::Text)
    }

    #[must_use]
    pub fn typed_property(
        mut self,
        name: impl Into<String>,
        column: impl Into<String>,
        kind: PropertyType,
    ) -> Self {
        self.properties.insert(
            name.into(),
            Property {
                column: column.into(),
                kind,
            },
        );
        self
    }

    /// Add a relation. A relation with the same name is replaced.
    #[must_use]
    pub fn relation(mut self, relation: Relation) -> Self {
        self.relations.insert(relation.name.clone(), relation);
        self
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Column mapped to `property`, if any
    #[must_use]
    pub fn column(&self, property: &str) -> Option<&str> {
        self.properties
            .get(property)
            .map(|property| property.column.as_str())
    }

    #[must_use]
    pub fn property_type(&self, property: &str) -> Option<PropertyType> {
        self.properties.get(property).map(|property| property.kind)
    }

    #[must_use]
    pub fn get_relation(&self, name: &str) -> Option<&Relation> {
        self.relations.get(name)
    }

    pub fn relations(&self) -> impl Iterator<Item = &Relation> {
        self.relations.values()
    }
}

/// All entities reachable from a query root.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    entities: HashMap<String, EntitySchema>,
}

impl Schema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn entity(mut self, entity: EntitySchema) -> Self {
        self.entities.insert(entity.table.clone(), entity);
        self
    }

    #[must_use]
    pub fn get(&self, table: &str) -> Option<&EntitySchema> {
        self.entities.get(table)
    }

    /// Look up an entity, failing with an unknown-reference error.
    pub fn require(&self, table: &str) -> Result<&EntitySchema, FindError> {
        self.get(table)
            .ok_or_else(|| FindError::unknown_reference(format!("unknown entity \"{table}\"")))
    }
}
