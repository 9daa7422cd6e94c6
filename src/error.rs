use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corruption: {0}")]
    Corrupt(String),

    #[error("Duplicate key.")]
    DuplicateKey,

    #[error("Table full.")]
    TableFull,

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, DbError>;
