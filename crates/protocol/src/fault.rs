use serde::{Deserialize, Serialize};

/// Classes of failure a hop can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// Stage exceeded its execution budget.
    Timeout,
    /// A downstream collaborator (lookup, log, business API) failed.
    Dependency,
    Validation,
    LowConfidence,
    /// Publishing to the broker kept failing after local retries.
    Transport,
    ProtocolViolation,
    Internal,
}

impl FaultKind {
    pub fn is_retriable(self) -> bool {
        matches!(self, Self::Timeout | Self::Dependency | Self::Transport)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Dependency => "dependency",
            Self::Validation => "validation",
            Self::LowConfidence => "low_confidence",
            Self::Transport => "transport",
            Self::ProtocolViolation => "protocol_violation",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for FaultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Written into `payload.error` by the runtime when a hop fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaultDescriptor {
    /// Address of the step that faulted.
    pub step: String,
    pub kind: FaultKind,
    pub message: String,
    /// 1-based attempt number of the faulting step.
    pub attempt: u32,
    pub retriable: bool,
}

impl FaultDescriptor {
    pub fn new(step: impl Into<String>, kind: FaultKind, message: impl Into<String>, attempt: u32) -> Self {
        Self {
            step: step.into(),
            kind,
            message: message.into(),
            attempt,
            retriable: kind.is_retriable(),
        }
    }

    /// Force the non-retriable marker regardless of kind.
    #[must_use]
    pub fn fatal(mut self) -> Self {
        self.retriable = false;
        self
    }
}
