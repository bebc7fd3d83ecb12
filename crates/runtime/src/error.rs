use switchyard_broker::BrokerError;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("failed to encode envelope: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("address '{0}' already has an actor")]
    DuplicateActor(String),
}

pub type Result<T, E = RuntimeError> = std::result::Result<T, E>;
