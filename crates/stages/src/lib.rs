//! The closed set of processing stages hosted by the actor runtime.
//!
//! Every stage is a deterministic `payload -> patch | fault` strategy that
//! writes exactly one enrichment slot. Stages that consult outside data do so
//! through the collaborator traits in [`context`] and [`execution`]; the
//! in-memory implementations here back the demo mesh and the tests.

pub mod classification;
pub mod context;
pub mod drafting;
pub mod entities;
pub mod error;
pub mod execution;
pub mod lexicon;
pub mod registry;
pub mod validation;

pub use {
    classification::ClassificationStage,
    context::{
        ContextStage, ContextStore, ConversationLog, FlakyContextStore, InMemoryContextStore,
        InMemoryConversationLog,
    },
    drafting::DraftingStage,
    entities::EntityStage,
    error::{CollaboratorError, Result, StagesError},
    execution::{ActionExecutor, ExecutionStage, SimulatedBackend},
    registry::{Collaborators, StageRegistry},
    validation::ValidationStage,
};
