//! Address-keyed registry of the stage set, resolved once at startup.

use std::{collections::BTreeMap, sync::Arc};

use switchyard_runtime::Stage;

use crate::{
    classification::ClassificationStage,
    context::{
        ContextStage, ContextStore, ConversationLog, InMemoryContextStore, InMemoryConversationLog,
    },
    drafting::DraftingStage,
    entities::EntityStage,
    error::{Result, StagesError},
    execution::{ActionExecutor, ExecutionStage, SimulatedBackend},
    validation::ValidationStage,
};

/// Outside services the stages consult.
#[derive(Clone)]
pub struct Collaborators {
    pub context_store: Arc<dyn ContextStore>,
    pub conversation_log: Arc<dyn ConversationLog>,
    pub executor: Arc<dyn ActionExecutor>,
}

impl Collaborators {
    /// In-memory collaborators seeded with the demo customers and orders.
    pub fn in_memory() -> Self {
        Self {
            context_store: Arc::new(InMemoryContextStore::with_demo_data()),
            conversation_log: Arc::new(InMemoryConversationLog::new()),
            executor: Arc::new(SimulatedBackend::with_demo_data()),
        }
    }
}

#[derive(Default, Clone)]
pub struct StageRegistry {
    stages: BTreeMap<String, Arc<dyn Stage>>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The full processing stage set wired to `collaborators`.
    pub fn standard(collaborators: &Collaborators) -> Result<Self> {
        let mut registry = Self::new();
        registry.insert(Arc::new(
            ClassificationStage::new()?
                .with_context_store(Arc::clone(&collaborators.context_store)),
        ));
        registry.insert(Arc::new(EntityStage::new()?));
        registry.insert(Arc::new(ContextStage::new(
            Arc::clone(&collaborators.context_store),
            Arc::clone(&collaborators.conversation_log),
        )));
        registry.insert(Arc::new(DraftingStage::new()));
        registry.insert(Arc::new(ValidationStage::new()?));
        registry.insert(Arc::new(ExecutionStage::new(Arc::clone(
            &collaborators.executor,
        ))?));
        Ok(registry)
    }

    /// Registers `stage` at its own address, replacing any previous one.
    pub fn insert(&mut self, stage: Arc<dyn Stage>) -> Option<Arc<dyn Stage>> {
        self.stages.insert(stage.address().to_string(), stage)
    }

    pub fn get(&self, address: &str) -> Option<Arc<dyn Stage>> {
        self.stages.get(address).cloned()
    }

    pub fn resolve(&self, address: &str) -> Result<Arc<dyn Stage>> {
        self.get(address)
            .ok_or_else(|| StagesError::UnknownAddress(address.to_string()))
    }

    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.stages.keys().map(String::as_str)
    }

    pub fn stages(&self) -> impl Iterator<Item = &Arc<dyn Stage>> {
        self.stages.values()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        switchyard_protocol::{StageKind, addresses},
    };

    #[test]
    fn standard_registry_covers_every_stage_address() {
        let registry = StageRegistry::standard(&Collaborators::in_memory()).unwrap();
        let mut expected = vec![
            addresses::CLASSIFICATION,
            addresses::CONTEXT,
            addresses::DRAFTING,
            addresses::ENTITIES,
            addresses::EXECUTION,
            addresses::VALIDATION,
        ];
        expected.sort_unstable();
        assert_eq!(registry.addresses().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn each_stage_owns_a_distinct_kind() {
        let registry = StageRegistry::standard(&Collaborators::in_memory()).unwrap();
        let mut kinds: Vec<StageKind> = registry.stages().map(|s| s.kind()).collect();
        let before = kinds.len();
        kinds.sort_by_key(|k| k.owned_slot().as_str());
        kinds.dedup();
        assert_eq!(kinds.len(), before);
    }

    #[test]
    fn unknown_address_is_an_error() {
        let registry = StageRegistry::standard(&Collaborators::in_memory()).unwrap();
        assert!(matches!(
            registry.resolve("nope"),
            Err(StagesError::UnknownAddress(a)) if a == "nope"
        ));
        assert!(registry.resolve(addresses::DRAFTING).is_ok());
    }

    #[test]
    fn insert_replaces_by_address() {
        let mut registry = StageRegistry::standard(&Collaborators::in_memory()).unwrap();
        let len = registry.len();
        let replaced = registry.insert(Arc::new(DraftingStage::new()));
        assert!(replaced.is_some());
        assert_eq!(registry.len(), len);
    }
}
