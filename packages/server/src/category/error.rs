use sea_orm::{DbErr, SqlErr};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CategoryError {
    /// Bad input or a broken tree rule. Safe to show to the caller.
    #[error("{0}")]
    Validation(String),

    #[error("category {0} not found")]
    NotFound(Uuid),

    /// Soft-delete on a deleted category, or restore on a live one.
    #[error("{0}")]
    InvalidState(String),

    #[error(transparent)]
    Db(#[from] DbErr),
}

impl CategoryError {
    /// Map a failed write. Slug uniqueness races and parents deleted
    /// mid-request surface as validation errors.
    pub(crate) fn from_write(err: DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(detail)) => {
                tracing::debug!(%detail, "Slug collision caught by unique constraint");
                CategoryError::Validation("A category with this slug already exists".into())
            }
            Some(SqlErr::ForeignKeyConstraintViolation(detail)) => {
                tracing::debug!(%detail, "Parent vanished before the write");
                CategoryError::Validation("Parent category no longer exists".into())
            }
            _ => CategoryError::Db(err),
        }
    }
}
