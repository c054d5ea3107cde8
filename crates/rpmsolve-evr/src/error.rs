use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvrError {
    #[error("Invalid epoch in \"{0}\"")]
    InvalidEpoch(String),

    #[error("Empty version in \"{0}\"")]
    EmptyVersion(String),

    #[error("Empty name in \"{0}\"")]
    EmptyName(String),

    #[error("Invalid comparator \"{0}\"")]
    InvalidComparator(String),

    #[error("Could not parse dependency expression \"{expression}\": {reason}")]
    InvalidReldep { expression: String, reason: String },
}

pub type Result<T> = std::result::Result<T, EvrError>;
