/// Failure of an outside collaborator consulted by a stage.
///
/// Stages turn these into retriable `Dependency` faults.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    #[error("{service} unavailable: {reason}")]
    Unavailable { service: &'static str, reason: String },

    #[error("{service} did not answer within {timeout_ms}ms")]
    Timeout { service: &'static str, timeout_ms: u64 },
}

#[derive(Debug, thiserror::Error)]
pub enum StagesError {
    #[error("invalid stage pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("no stage is registered at '{0}'")]
    UnknownAddress(String),
}

pub type Result<T, E = StagesError> = std::result::Result<T, E>;
