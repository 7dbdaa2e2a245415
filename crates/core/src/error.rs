use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("row id must be an integer, got {0}")]
    InvalidRowId(String),
}
