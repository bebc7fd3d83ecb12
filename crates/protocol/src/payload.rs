//! Append-only enrichment container.
//!
//! Origin fields are set once at ingress. Each enrichment slot is owned by
//! exactly one stage kind and, once populated, is never rewritten or cleared.
//! The only mutable field is `error`, set by the runtime when a hop fails and
//! cleared by the escalation router when it schedules a retry.

use serde::{Deserialize, Serialize};

use crate::{
    fault::FaultDescriptor,
    route::RouteBoundsError,
    slots::{
        Classification, CustomerContext, Draft, Entities, EscalationRecord, ExecutionReport,
        ValidationReport,
    },
};

/// Names of the enrichment slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    Classification,
    Entities,
    Context,
    Draft,
    Validation,
    Execution,
    Escalation,
}

impl Slot {
    pub const ALL: [Slot; 7] = [
        Slot::Classification,
        Slot::Entities,
        Slot::Context,
        Slot::Draft,
        Slot::Validation,
        Slot::Execution,
        Slot::Escalation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Classification => "classification",
            Self::Entities => "entities",
            Self::Context => "context",
            Self::Draft => "draft",
            Self::Validation => "validation",
            Self::Execution => "execution",
            Self::Escalation => "escalation",
        }
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kinds of payload writers. Each kind owns exactly one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Classification,
    Entities,
    Context,
    Drafting,
    Validation,
    Execution,
    Escalation,
}

impl StageKind {
    pub fn owned_slot(self) -> Slot {
        match self {
            Self::Classification => Slot::Classification,
            Self::Entities => Slot::Entities,
            Self::Context => Slot::Context,
            Self::Drafting => Slot::Draft,
            Self::Validation => Slot::Validation,
            Self::Execution => Slot::Execution,
            Self::Escalation => Slot::Escalation,
        }
    }
}

/// Contract violations that are fatal to a message (never to the process).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolViolation {
    #[error("slot '{slot}' is already populated and cannot be rewritten")]
    SlotRewrite { slot: Slot },

    #[error("slot '{slot}' is not owned by this stage (owns '{owner}')")]
    ForeignSlot { slot: Slot, owner: Slot },

    #[error("route references unknown address '{address}'")]
    UnknownAddress { address: String },

    #[error(transparent)]
    RouteBounds(#[from] RouteBoundsError),
}

/// Slot values produced by one stage invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entities: Option<Entities>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<CustomerContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft: Option<Draft>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation: Option<EscalationRecord>,
}

impl PayloadPatch {
    pub fn classification(value: Classification) -> Self {
        Self {
            classification: Some(value),
            ..Self::default()
        }
    }

    pub fn entities(value: Entities) -> Self {
        Self {
            entities: Some(value),
            ..Self::default()
        }
    }

    pub fn context(value: CustomerContext) -> Self {
        Self {
            context: Some(value),
            ..Self::default()
        }
    }

    pub fn draft(value: Draft) -> Self {
        Self {
            draft: Some(value),
            ..Self::default()
        }
    }

    pub fn validation(value: ValidationReport) -> Self {
        Self {
            validation: Some(value),
            ..Self::default()
        }
    }

    pub fn execution(value: ExecutionReport) -> Self {
        Self {
            execution: Some(value),
            ..Self::default()
        }
    }

    pub fn escalation(value: EscalationRecord) -> Self {
        Self {
            escalation: Some(value),
            ..Self::default()
        }
    }

    /// Slots this patch writes.
    pub fn written_slots(&self) -> Vec<Slot> {
        let present = [
            self.classification.is_some(),
            self.entities.is_some(),
            self.context.is_some(),
            self.draft.is_some(),
            self.validation.is_some(),
            self.execution.is_some(),
            self.escalation.is_some(),
        ];
        Slot::ALL
            .into_iter()
            .zip(present)
            .filter_map(|(slot, set)| set.then_some(slot))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.written_slots().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    pub customer_message: String,
    pub customer_identity: String,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entities: Option<Entities>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<CustomerContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft: Option<Draft>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation: Option<EscalationRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FaultDescriptor>,
}

impl Payload {
    pub fn new(
        customer_message: impl Into<String>,
        customer_identity: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            customer_message: customer_message.into(),
            customer_identity: customer_identity.into(),
            session_id: session_id.into(),
            classification: None,
            entities: None,
            context: None,
            draft: None,
            validation: None,
            execution: None,
            escalation: None,
            error: None,
        }
    }

    pub fn is_populated(&self, slot: Slot) -> bool {
        match slot {
            Slot::Classification => self.classification.is_some(),
            Slot::Entities => self.entities.is_some(),
            Slot::Context => self.context.is_some(),
            Slot::Draft => self.draft.is_some(),
            Slot::Validation => self.validation.is_some(),
            Slot::Execution => self.execution.is_some(),
            Slot::Escalation => self.escalation.is_some(),
        }
    }

    /// Merge a stage's patch. Either every slot in the patch is applied or
    /// none is.
    pub fn merge(&mut self, patch: PayloadPatch, owner: Slot) -> Result<(), ProtocolViolation> {
        for slot in patch.written_slots() {
            if slot != owner {
                return Err(ProtocolViolation::ForeignSlot { slot, owner });
            }
            if self.is_populated(slot) {
                return Err(ProtocolViolation::SlotRewrite { slot });
            }
        }

        let PayloadPatch {
            classification,
            entities,
            context,
            draft,
            validation,
            execution,
            escalation,
        } = patch;
        if classification.is_some() {
            self.classification = classification;
        }
        if entities.is_some() {
            self.entities = entities;
        }
        if context.is_some() {
            self.context = context;
        }
        if draft.is_some() {
            self.draft = draft;
        }
        if validation.is_some() {
            self.validation = validation;
        }
        if execution.is_some() {
            self.execution = execution;
        }
        if escalation.is_some() {
            self.escalation = escalation;
        }
        Ok(())
    }
}
