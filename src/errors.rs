//! # Error Handling
//!
//! Every failure the engine can detect while building is an input error: the
//! caller sent a key, path, filter, value or bound that does not fit the
//! configured schema. All of them map to `400 Bad Request`. Setting up a
//! builder can fail with a configuration error, and query execution with a
//! database error; both map to `500`, and database details are logged but
//! never sent to the client.
//!
//! ```rust,ignore
//! async fn list(params: QueryParams) -> Result<Json<FindResult>, FindError> {
//!     let query = PERSONS.build(&params)?;
//!     Ok(Json(query.execute(&db).await?))
//! }
//! ```

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::DbErr;
use serde::Serialize;
use std::fmt;

/// Category of a [`FindError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// Malformed filter key: extra colons, empty segments, empty parts
    Syntax,
    /// Relation or property not present in the schema
    UnknownReference,
    /// Filter name not registered
    UnknownFilter,
    /// Property path or eager expression outside the configured whitelist
    Permission,
    /// Ordering requested through a to-many relation
    UnsupportedOrdering,
    /// Range bound missing or not a non-negative integer
    InvalidRange,
    /// Filter value that does not parse as the property's type
    InvalidValue,
    /// Builder set up inconsistently, e.g. two directives sharing a key
    Configuration,
    /// Query execution failed
    Database,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Syntax => "syntax",
            Self::UnknownReference => "unknownReference",
            Self::UnknownFilter => "unknownFilter",
            Self::Permission => "permission",
            Self::UnsupportedOrdering => "unsupportedOrdering",
            Self::InvalidRange => "invalidRange",
            Self::InvalidValue => "invalidValue",
            Self::Configuration => "configuration",
            Self::Database => "database",
        }
    }
}

/// Error returned by parsing, whitelist checking, assembly and execution.
#[derive(Debug)]
pub struct FindError {
    kind: ErrorKind,
    message: String,
    internal: Option<DbErr>,
}

impl FindError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            internal: None,
        }
    }

    /// Malformed key, e.g. `a::eq` or `a..b`
    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Syntax, message)
    }

    pub fn unknown_reference(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownReference, message)
    }

    pub fn unknown_filter(name: &str) -> Self {
        Self::new(ErrorKind::UnknownFilter, format!("unknown filter \"{name}\""))
    }

    /// Path used outside the whitelist
    pub fn permission(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Permission, message)
    }

    pub fn unsupported_ordering(path: &str) -> Self {
        Self::new(
            ErrorKind::UnsupportedOrdering,
            format!("cannot order by \"{path}\": ordering through a to-many relation is not supported"),
        )
    }

    pub fn invalid_range(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRange, message)
    }

    /// `value` given for `path` is not a valid `expected`
    pub fn invalid_value(path: &str, value: &str, expected: &str) -> Self {
        Self::new(
            ErrorKind::InvalidValue,
            format!("value \"{value}\" for \"{path}\" is not a valid {expected}"),
        )
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Wrap a database error. The details are logged, not exposed.
    pub fn database(err: DbErr) -> Self {
        Self {
            kind: ErrorKind::Database,
            message: "A database error occurred".to_string(),
            internal: Some(err),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// User-facing message (sanitized for database errors)
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// HTTP status for this error. Input errors are all bad requests; a
    /// misconfigured builder or a failing database is a server error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self.kind {
            ErrorKind::Database | ErrorKind::Configuration => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    fn log(&self) {
        if let Some(internal) = &self.internal {
            tracing::error!(error = ?internal, "Database error occurred");
        } else {
            tracing::debug!(
                kind = self.kind.as_str(),
                error = %self.message,
                "Rejected query parameters"
            );
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse<'a> {
    error: &'a str,
    kind: ErrorKind,
}

impl IntoResponse for FindError {
    fn into_response(self) -> Response {
        self.log();
        let body = ErrorResponse {
            error: &self.message,
            kind: self.kind,
        };
        (self.status_code(), Json(body)).into_response()
    }
}

impl fmt::Display for FindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for FindError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.internal
            .as_ref()
            .map(|err| err as &(dyn std::error::Error + 'static))
    }
}

impl From<DbErr> for FindError {
    fn from(err: DbErr) -> Self {
        Self::database(err)
    }
}
