use rusqlite::ErrorCode;
use thiserror::Error;

/// Failures surfaced by the contact store.
///
/// Unique-constraint races and busy/locked databases are retried inside the
/// store and only show up here, as `Storage`, once the retries run out.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("email is required")]
    EmailRequired,

    #[error("tags are required when updating an existing contact")]
    TagsRequired,

    #[error("storage failure: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl StoreError {
    /// True when the request deadline interrupted the operation.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            StoreError::Storage(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::OperationInterrupted
        )
    }

    pub(crate) fn is_retryable(&self) -> bool {
        match self {
            StoreError::Storage(err) => is_retryable(err),
            _ => false,
        }
    }
}

/// A UNIQUE constraint fired. Other constraint kinds (foreign key, not null)
/// are genuine failures.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

pub(crate) fn is_retryable(err: &rusqlite::Error) -> bool {
    if is_unique_violation(err) {
        return true;
    }
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::DatabaseBusy || e.code == ErrorCode::DatabaseLocked
    )
}

pub(crate) fn deadline_exceeded() -> rusqlite::Error {
    rusqlite::Error::SqliteFailure(
        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_INTERRUPT),
        Some("request deadline exceeded".to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(code: std::os::raw::c_int) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(code), None)
    }

    #[test]
    fn test_unique_violation_is_retryable() {
        let err = failure(rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE);
        assert!(is_unique_violation(&err));
        assert!(StoreError::from(err).is_retryable());
    }

    #[test]
    fn test_foreign_key_violation_is_not_retryable() {
        let err = failure(rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY);
        assert!(!is_unique_violation(&err));
        assert!(!StoreError::from(err).is_retryable());
    }

    #[test]
    fn test_busy_is_retryable() {
        assert!(StoreError::from(failure(rusqlite::ffi::SQLITE_BUSY)).is_retryable());
        assert!(StoreError::from(failure(rusqlite::ffi::SQLITE_LOCKED)).is_retryable());
    }

    #[test]
    fn test_deadline_is_timeout() {
        let err = StoreError::from(deadline_exceeded());
        assert!(err.is_timeout());
        assert!(!err.is_retryable());
        assert!(!StoreError::TagsRequired.is_timeout());
    }
}
