use core::fmt;
use diesel::result::{ConnectionError, DatabaseErrorKind, Error as DieselError};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors surfaced by [`crate::db::store::ValueStore`].
#[derive(Debug)]
pub enum StoreError {
    /// Lookup by id found no row.
    NotFound { entity: &'static str, id: i64 },
    /// A value with the same `(time, value_type_id, device_id)` already exists.
    ConstraintViolation(String),
    /// Any other rejected write (foreign key, not-null, check). Rolled back.
    Integrity(String),
    /// Unclassified database failure
    Database(DieselError),
    Connection(ConnectionError),
    Migration(String),
    /// A writer panicked while holding the connection.
    Poisoned,
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl Into<i64>) -> Self {
        StoreError::NotFound { entity, id: id.into() }
    }

    /// Failures a request layer should answer with a client error.
    pub fn is_client_error(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// Failures a request layer should answer with a rejected-write response.
    pub fn is_rejected_write(&self) -> bool {
        matches!(self, StoreError::ConstraintViolation(_) | StoreError::Integrity(_))
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound { entity, id } => write!(f, "{} {} not found", entity, id),
            StoreError::ConstraintViolation(m) => write!(f, "duplicate value: {}", m),
            StoreError::Integrity(m) => write!(f, "integrity error: {}", m),
            StoreError::Database(e) => write!(f, "database error: {}", e),
            StoreError::Connection(e) => write!(f, "database connection failed: {}", e),
            StoreError::Migration(m) => write!(f, "applying database migrations failed: {}", m),
            StoreError::Poisoned => write!(f, "database connection poisoned by a panicked writer"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StoreError::Database(e) => Some(e),
            StoreError::Connection(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DieselError> for StoreError {
    fn from(value: DieselError) -> Self {
        match value {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                StoreError::ConstraintViolation(info.message().to_string())
            }
            DieselError::DatabaseError(
                DatabaseErrorKind::ForeignKeyViolation
                | DatabaseErrorKind::NotNullViolation
                | DatabaseErrorKind::CheckViolation,
                info,
            ) => StoreError::Integrity(info.message().to_string()),
            other => StoreError::Database(other),
        }
    }
}

impl From<ConnectionError> for StoreError {
    fn from(value: ConnectionError) -> Self {
        StoreError::Connection(value)
    }
}
