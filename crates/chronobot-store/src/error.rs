use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("invalid duration: {0}")]
    InvalidDuration(String),

    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("snapshot serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
