//! # findcrate
//!
//! Turns untrusted URL query parameters into relational queries over a
//! declared entity schema. Keys address properties, possibly through one
//! relation (`parent.age`, `pets.name`), pick a filter (`age:gt=30`) or a
//! directive (`orderBy`, `rangeStart`, `eager`, ...). Every name is checked
//! against the schema and an optional whitelist before any SQL is built.
//!
//! ```rust,ignore
//! use findcrate::{EntitySchema, FindQueryBuilder, QueryParams, Schema};
//!
//! let schema = Schema::new()
//!     .entity(EntitySchema::from_entity::<person::Entity>()
//!         .relation(Relation::one_to_one("parent", "persons", "parent_id", "id"))
//!         .relation(Relation::to_many("pets", "animals", "id", "owner_id")));
//!
//! let persons = FindQueryBuilder::new(schema, "persons")?
//!     .allow(["firstName", "lastName", "age", "parent.age", "pets.name"]);
//!
//! let params = QueryParams::from_query_string("pets.name=Fluffy&orderBy=parent.age&rangeStart=0&rangeEnd=9");
//! let result = persons.build(&params)?.execute(&db).await?;
//! ```

pub mod config;
pub mod core;
pub mod errors;
pub mod filtering;
pub mod models;
pub mod schema;

pub use config::{FindConfig, SpecialParameter, SpecialParameters};
pub use self::core::{FindQuery, FindQueryBuilder, QueryBuilder};
pub use errors::{ErrorKind, FindError};
pub use filtering::{Operator, Predicate, PropertyRef, RelationExpression, Whitelist};
pub use models::{FindResult, ParamValue, QueryParams};
pub use schema::{Cardinality, EntitySchema, JoinSpec, PropertyType, Relation, Schema, Through};
