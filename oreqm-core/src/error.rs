//! Error types for the oreqm engine

use thiserror::Error;

/// Errors returned by fallible engine operations.
///
/// Structural anomalies inside a well-formed document (duplicates, dangling
/// links, safety violations) are not errors; they land in the
/// [`ProblemLog`](crate::problems::ProblemLog) instead.
#[derive(Debug, Error)]
pub enum OreqmError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("No main document loaded")]
    NoDocument,

    #[error(transparent)]
    SafetyRule(#[from] crate::safety::SafetyRuleError),
}

impl From<roxmltree::Error> for OreqmError {
    fn from(e: roxmltree::Error) -> Self {
        OreqmError::Parse(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OreqmError>;
