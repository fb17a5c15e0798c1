use error_types::ServiceError;
use thiserror::Error;
use tonic::Status;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Absent, consumed and expired rows all surface here
    #[error("message not found")]
    NotFound,

    #[error("message already exists")]
    AlreadyExists,

    #[error("database unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl StorageError {
    pub fn invalid(message: impl Into<String>) -> Self {
        StorageError::InvalidArgument(message.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StorageError::NotFound,
            sqlx::Error::Database(ref db) if db.is_unique_violation() => StorageError::AlreadyExists,
            // A reminder logged for a row that was deleted meanwhile
            sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => StorageError::NotFound,
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StorageError::Unavailable(err.to_string())
            }
            other => StorageError::Database(other),
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidArgument(message) => ServiceError::invalid(message),
            StorageError::NotFound => ServiceError::NotFound,
            StorageError::AlreadyExists => ServiceError::AlreadyExists {
                message: "message already exists".to_string(),
            },
            StorageError::Unavailable(message) => ServiceError::transient("storage", message),
            StorageError::Database(source) => ServiceError::internal(source),
        }
    }
}

impl From<StorageError> for Status {
    fn from(err: StorageError) -> Self {
        let err = ServiceError::from(err);
        err.log();
        err.to_status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;

    #[test]
    fn test_status_codes() {
        assert_eq!(Status::from(StorageError::NotFound).code(), Code::NotFound);
        assert_eq!(Status::from(StorageError::AlreadyExists).code(), Code::AlreadyExists);
        assert_eq!(
            Status::from(StorageError::invalid("max_view_count out of range")).code(),
            Code::InvalidArgument
        );
        assert_eq!(
            Status::from(StorageError::Unavailable("pool timed out".into())).code(),
            Code::Unavailable
        );
    }

    #[test]
    fn test_pool_timeout_is_transient() {
        assert!(StorageError::from(sqlx::Error::PoolTimedOut).is_transient());
        assert!(matches!(
            StorageError::from(sqlx::Error::RowNotFound),
            StorageError::NotFound
        ));
    }
}
