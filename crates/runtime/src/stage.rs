use {
    async_trait::async_trait,
    switchyard_protocol::{Envelope, FaultKind, Payload, PayloadPatch, StageKind},
};

/// Failure reported by a stage instead of a patch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct StageFault {
    pub kind: FaultKind,
    pub message: String,
}

impl StageFault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn dependency(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Dependency, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Validation, message)
    }

    pub fn low_confidence(message: impl Into<String>) -> Self {
        Self::new(FaultKind::LowConfidence, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Internal, message)
    }
}

/// A processing stage: `payload -> patch | fault`.
///
/// Stages never touch the route. Redelivery of the same payload must produce
/// the same patch; the runtime does not deduplicate.
#[async_trait]
pub trait Stage: Send + Sync {
    fn address(&self) -> &str;

    /// Determines which payload slot the patch may write.
    fn kind(&self) -> StageKind;

    async fn process(&self, payload: &Payload) -> Result<PayloadPatch, StageFault>;
}

/// What a router wants done with the envelope it returns.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// Advance the cursor one step, then publish to the step under it.
    Advance(Envelope),
    /// Publish to the step under the cursor as-is.
    Divert(Envelope),
    /// Publish straight to the aggregation address.
    Terminate(Envelope),
}

impl Dispatch {
    pub fn envelope(&self) -> &Envelope {
        match self {
            Self::Advance(e) | Self::Divert(e) | Self::Terminate(e) => e,
        }
    }
}

/// A stage specialisation that rewrites the remaining route.
#[async_trait]
pub trait Router: Send + Sync {
    fn address(&self) -> &str;

    /// Whether this router receives faulted envelopes as an error handler,
    /// i.e. while the cursor still points at the step that failed.
    fn handles_faults(&self) -> bool {
        false
    }

    async fn route(&self, envelope: Envelope) -> Dispatch;
}
