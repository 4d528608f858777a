//! Error taxonomy for the storage layer.
//!
//! Every repository call returns [`DbError`]. Raw `rusqlite` and pool errors
//! are converted here so callers never see driver types.

use rusqlite::ErrorCode;
use thiserror::Error;

pub type DbResult<T> = std::result::Result<T, DbError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DbError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} already exists with the same {key}")]
    UniqueConstraintViolation { entity: &'static str, key: String },

    #[error("{entity} references a missing or dependent row via {reference}")]
    ForeignKeyViolation {
        entity: &'static str,
        reference: String,
    },

    #[error("invalid {field}: {reason}")]
    ValidationError { field: String, reason: String },

    #[error("storage error: {0}")]
    Storage(String),
}

impl DbError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn foreign_key(entity: &'static str, reference: impl Into<String>) -> Self {
        DbError::ForeignKeyViolation {
            entity,
            reference: reference.into(),
        }
    }

    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        DbError::ValidationError {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::NotFound { .. })
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, DbError::UniqueConstraintViolation { .. })
    }

    pub fn is_foreign_key_violation(&self) -> bool {
        matches!(self, DbError::ForeignKeyViolation { .. })
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, msg) if e.code == ErrorCode::ConstraintViolation => {
                constraint_error(e.extended_code, msg.as_deref().unwrap_or_default())
                    .unwrap_or_else(|| DbError::Storage(err.to_string()))
            }
            _ => DbError::Storage(err.to_string()),
        }
    }
}

impl From<r2d2::Error> for DbError {
    fn from(err: r2d2::Error) -> Self {
        DbError::Storage(format!("connection pool: {err}"))
    }
}

/// Map a SQLite constraint failure to the typed taxonomy.
///
/// SQLite reports unique failures as
/// `UNIQUE constraint failed: cities.country_id, cities.name`.
fn constraint_error(extended_code: i32, message: &str) -> Option<DbError> {
    match extended_code {
        rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
            let (table, columns) = parse_constraint_columns(message, "UNIQUE constraint failed:")?;
            Some(DbError::UniqueConstraintViolation {
                entity: entity_for_table(&table),
                key: columns.join("_"),
            })
        }
        rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY => Some(DbError::ForeignKeyViolation {
            entity: "record",
            reference: "unknown".to_string(),
        }),
        rusqlite::ffi::SQLITE_CONSTRAINT_NOTNULL => {
            let (_, columns) = parse_constraint_columns(message, "NOT NULL constraint failed:")?;
            Some(DbError::validation(columns.join("_"), "is required"))
        }
        rusqlite::ffi::SQLITE_CONSTRAINT_CHECK => {
            let detail = message
                .strip_prefix("CHECK constraint failed:")
                .map(str::trim)
                .unwrap_or(message);
            Some(DbError::validation(detail, "violates a check constraint"))
        }
        _ => None,
    }
}

/// Split `"<prefix> t.a_b, t.c"` into `("t", ["aB", "c"])`.
fn parse_constraint_columns(message: &str, prefix: &str) -> Option<(String, Vec<String>)> {
    let rest = message.strip_prefix(prefix)?.trim();
    let mut table = None;
    let mut columns = Vec::new();
    for qualified in rest.split(',') {
        let (t, column) = qualified.trim().split_once('.')?;
        table.get_or_insert_with(|| t.to_string());
        columns.push(camel_case(column));
    }
    Some((table?, columns))
}

fn camel_case(column: &str) -> String {
    let mut out = String::with_capacity(column.len());
    let mut upper = false;
    for c in column.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.push(c.to_ascii_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

pub(crate) fn entity_for_table(table: &str) -> &'static str {
    match table {
        "users" => "User",
        "countries" => "Country",
        "cities" => "City",
        "places" => "Place",
        "lists" => "List",
        "list_places" => "ListPlace",
        "list_likes" => "ListLike",
        "user_locations" => "UserLocation",
        _ => "record",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camel_case() {
        assert_eq!(camel_case("country_id"), "countryId");
        assert_eq!(camel_case("name"), "name");
        assert_eq!(camel_case("google_place_id"), "googlePlaceId");
    }

    #[test]
    fn test_unique_message_maps_to_compound_key() {
        let err = constraint_error(
            rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE,
            "UNIQUE constraint failed: cities.country_id, cities.name",
        );
        assert_eq!(
            err,
            Some(DbError::UniqueConstraintViolation {
                entity: "City",
                key: "countryId_name".to_string(),
            })
        );
    }

    #[test]
    fn test_primary_key_message_maps_to_unique() {
        let err = constraint_error(
            rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY,
            "UNIQUE constraint failed: list_likes.user_id, list_likes.list_id",
        );
        assert_eq!(
            err,
            Some(DbError::UniqueConstraintViolation {
                entity: "ListLike",
                key: "userId_listId".to_string(),
            })
        );
    }

    #[test]
    fn test_not_null_maps_to_validation() {
        let err = constraint_error(
            rusqlite::ffi::SQLITE_CONSTRAINT_NOTNULL,
            "NOT NULL constraint failed: users.email",
        );
        assert_eq!(err, Some(DbError::validation("email", "is required")));
    }

    #[test]
    fn test_engine_error_becomes_storage() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let err: DbError = conn.execute("SELECT * FROM missing", []).unwrap_err().into();
        assert!(matches!(err, DbError::Storage(_)));
    }
}
