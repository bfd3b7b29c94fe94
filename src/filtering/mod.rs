//! # Query Parameter Filtering
//!
//! Translates flat query parameters into typed parameters: filters over
//! property paths, and directives for ordering, ranges, grouping, counting
//! and eager loading.
//!
//! ## Query Parameter Examples
//!
//! ### Filters
//! ```rust,ignore
//! // Equality (the default filter)
//! GET /persons?firstName=Jennifer
//!
//! // Named filters
//! GET /persons?age:gte=18&age:lt=65
//! GET /persons?lastName:likeLower=%aniston%
//! GET /persons?id:in=1,2,3
//! GET /persons?parentId:isNull=
//!
//! // Through relations
//! GET /persons?parent.age:gt=60       // to-one: joined
//! GET /persons?pets.name:eq=Fluffy     // to-many: EXISTS subquery, no duplicate rows
//!
//! // OR over properties, AND across keys
//! GET /persons?firstName|lastName:likeLower=%jen%&age:gt=30
//! ```
//!
//! ### Directives
//! ```rust,ignore
//! GET /persons?orderBy=lastName&orderByDesc=parent.age
//! GET /persons?rangeStart=0&rangeEnd=24          // inclusive, reports total
//! GET /persons?groupBy=lastName&count=*
//! GET /persons?eager=[pets, children.movies]
//! ```

pub mod eager;
pub mod filters;
pub mod pagination;
pub mod parser;
pub mod reference;
pub mod whitelist;

// Re-export commonly used items
pub use eager::RelationExpression;
pub use filters::{DEFAULT_FILTER, FilterFn, FilterRegistry, Operator, Predicate, typed_value};
pub use pagination::{MAX_RANGE_BOUND, content_range, parse_range, range_limit};
pub use parser::{Directive, FilterParameter, ParameterParser, QueryParameter};
pub use reference::{MAX_RELATION_DEPTH, PropertyRef, ReferenceResolver, relation_alias};
pub use whitelist::Whitelist;
