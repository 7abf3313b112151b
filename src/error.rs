use core::fmt;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors surfaced synchronously by every storage-backed operation.
#[derive(Debug)]
pub enum AccessError {
    /// Duplicate unique key, dangling foreign key or failed CHECK at write time
    ConstraintViolation(String),
    /// Caller neither owns the row nor is an admin
    AccessDenied(String),
    /// Invalid enum value, blank identifier or inverted time range
    MalformedInput(String),
    /// Target row of a privileged operation does not exist
    NotFound(String),
    /// Any other storage failure
    Storage(DieselError),
}

impl AccessError {
    pub fn denied(what: impl Into<String>) -> Self {
        AccessError::AccessDenied(what.into())
    }

    pub fn malformed(what: impl Into<String>) -> Self {
        AccessError::MalformedInput(what.into())
    }
}

impl Display for AccessError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AccessError::ConstraintViolation(m) => write!(f, "rejected write: {}", m),
            AccessError::AccessDenied(m) => write!(f, "access denied: {}", m),
            AccessError::MalformedInput(m) => write!(f, "malformed input: {}", m),
            AccessError::NotFound(m) => write!(f, "not found: {}", m),
            AccessError::Storage(e) => write!(f, "storage error: {}", e),
        }
    }
}

impl Error for AccessError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AccessError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DieselError> for AccessError {
    fn from(value: DieselError) -> Self {
        match value {
            DieselError::DatabaseError(kind, info) => match kind {
                DatabaseErrorKind::UniqueViolation
                | DatabaseErrorKind::ForeignKeyViolation
                | DatabaseErrorKind::CheckViolation
                | DatabaseErrorKind::NotNullViolation => {
                    let detail = match info.constraint_name() {
                        Some(c) => format!("{} (constraint {})", info.message(), c),
                        None => info.message().to_string(),
                    };
                    AccessError::ConstraintViolation(detail)
                }
                other => AccessError::Storage(DieselError::DatabaseError(other, info)),
            },
            other => AccessError::Storage(other),
        }
    }
}
