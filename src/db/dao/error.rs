use std::fmt;

use sea_orm::{DbErr, SqlErr};

/// Storage failures as seen by the service layer. Raw `DbErr` is only
/// inspected here.
#[derive(Debug)]
pub enum DaoLayerError {
    Db(DbErr),
    NotFound { entity: &'static str, id: String },
    UniqueViolation { constraint: String },
}

pub type DaoResult<T> = Result<T, DaoLayerError>;

impl DaoLayerError {
    pub fn from_db(err: DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(constraint)) => {
                DaoLayerError::UniqueViolation { constraint }
            }
            _ => DaoLayerError::Db(err),
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        DaoLayerError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<DbErr> for DaoLayerError {
    fn from(err: DbErr) -> Self {
        Self::from_db(err)
    }
}

impl fmt::Display for DaoLayerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaoLayerError::Db(err) => write!(f, "Database error: {err}"),
            DaoLayerError::NotFound { entity, id } => {
                write!(f, "{entity} not found (id={id})")
            }
            DaoLayerError::UniqueViolation { constraint } => {
                write!(f, "Unique constraint violated: {constraint}")
            }
        }
    }
}

impl std::error::Error for DaoLayerError {}
