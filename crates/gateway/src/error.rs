use {
    switchyard_broker::BrokerError, switchyard_common::FromMessage,
    switchyard_runtime::RuntimeError, switchyard_stages::StagesError,
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Stages(#[from] StagesError),

    #[error("failed to encode envelope: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("request {message_id} timed out after {elapsed_ms}ms")]
    TimedOut {
        message_id: String,
        session_id: String,
        elapsed_ms: u64,
    },

    #[error("request {message_id} was cancelled")]
    Cancelled { message_id: String },

    #[error("message id {0} is already awaiting a response")]
    DuplicateCorrelation(String),

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

switchyard_common::impl_context!();
