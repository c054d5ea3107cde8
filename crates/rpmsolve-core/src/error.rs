use thiserror::Error;

use crate::solver::ProblemSet;
use crate::state::State;

#[derive(Error, Debug)]
pub enum ResolveError {
    // Universe construction errors
    #[error("Failed to load repository {repo}: {message}")]
    Load { repo: String, message: String },

    #[error("Package set from universe generation {found} used with generation {expected}")]
    UniverseMismatch { expected: u64, found: u64 },

    // Selector errors
    #[error("Invalid package selector \"{pattern}\": {reason}")]
    InvalidSelector { pattern: String, reason: String },

    // Goal errors
    #[error("Goal can no longer be modified once resolution has started")]
    GoalFrozen,

    #[error("Could not resolve dependencies: {0}")]
    Unsatisfiable(ProblemSet),

    // State machine errors
    #[error("Cannot move from {from} to {to}")]
    InvalidTransition { from: State, to: State },

    // Config errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Dependency expression errors
    #[error(transparent)]
    Evr(#[from] rpmsolve_evr::EvrError),

    // JSON/parsing errors
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ResolveError {
    pub(crate) fn load(repo: impl Into<String>, message: impl Into<String>) -> Self {
        ResolveError::Load {
            repo: repo.into(),
            message: message.into(),
        }
    }

    pub(crate) fn invalid_selector(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        ResolveError::InvalidSelector {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ResolveError>;
