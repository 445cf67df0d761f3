use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("unknown request status: {0}")]
    UnknownStatus(String),

    #[error("unknown collection kind: {0}")]
    UnknownCollectionKind(String),

    #[error("unknown approval action: {0}")]
    UnknownAction(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;
