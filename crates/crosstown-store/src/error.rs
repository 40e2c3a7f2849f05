use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid event: {0}")]
    InvalidEvent(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
