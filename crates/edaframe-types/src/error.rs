use thiserror::Error;

#[derive(Error, Debug)]
pub enum EdaError {
    #[error("{0} not supported")]
    UnsupportedInputType(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("compute mode {0:?} not supported, expected \"lengths\" or \"nulls\"")]
    UnsupportedComputeMode(String),

    #[error("Type error: {0}")]
    Type(String),

    #[error("Format error: {0}")]
    Format(String),

    #[error("Engine error: {0}")]
    Engine(String),
}

pub type Result<T> = std::result::Result<T, EdaError>;
