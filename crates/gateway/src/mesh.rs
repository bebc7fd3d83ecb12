//! Wires the whole mesh onto one broker: stage actors, both routers, the
//! cancellation listener, and the correlation gateway.

use std::sync::Arc;

use {
    switchyard_broker::{Broker, InMemoryBroker},
    switchyard_config::SwitchyardConfig,
    switchyard_routers::{
        Cancellations, DecisionRouter, DecisionSettings, EscalationRouter, HandoffQueue,
        listen_for_cancellations,
    },
    switchyard_runtime::{ActorHandle, ActorRuntime, AddressBook, RuntimeSettings},
    switchyard_stages::{Collaborators, StageRegistry},
    tokio::task::JoinHandle,
    tokio_util::sync::CancellationToken,
    tracing::info,
};

use crate::{
    error::Result,
    gateway::{CorrelationGateway, GatewaySettings},
    registry::{ConnectionRegistry, HeartbeatSettings},
};

pub struct MeshBuilder {
    config: SwitchyardConfig,
    broker: Option<Arc<dyn Broker>>,
    collaborators: Option<Collaborators>,
    stages: Option<StageRegistry>,
    queue: Option<Arc<HandoffQueue>>,
}

impl MeshBuilder {
    /// Defaults to the in-process broker.
    #[must_use]
    pub fn broker(mut self, broker: Arc<dyn Broker>) -> Self {
        self.broker = Some(broker);
        self
    }

    /// Defaults to [`Collaborators::in_memory`].
    #[must_use]
    pub fn collaborators(mut self, collaborators: Collaborators) -> Self {
        self.collaborators = Some(collaborators);
        self
    }

    /// Defaults to [`StageRegistry::standard`] over the collaborators.
    #[must_use]
    pub fn stages(mut self, stages: StageRegistry) -> Self {
        self.stages = Some(stages);
        self
    }

    #[must_use]
    pub fn handoff_queue(mut self, queue: Arc<HandoffQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub async fn start(self) -> Result<Mesh> {
        let config = self.config;
        let broker = self
            .broker
            .unwrap_or_else(|| Arc::new(InMemoryBroker::new()));
        let collaborators = self.collaborators.unwrap_or_else(Collaborators::in_memory);
        let stages = match self.stages {
            Some(stages) => stages,
            None => StageRegistry::standard(&collaborators)?,
        };
        let queue = self.queue.unwrap_or_default();
        let token = CancellationToken::new();

        let book = Arc::new(AddressBook::new(config.pipeline.aggregation_address.clone()));
        let runtime = ActorRuntime::new(
            Arc::clone(&broker),
            Arc::clone(&book),
            RuntimeSettings::from(&config),
        );

        let mut actors = Vec::new();
        for stage in stages.stages() {
            actors.push(runtime.spawn_stage(Arc::clone(stage)).await?);
        }
        actors.push(
            runtime
                .spawn_router(Arc::new(DecisionRouter::new(DecisionSettings::from(&config))))
                .await?,
        );

        let cancellations = Arc::new(Cancellations::new(std::time::Duration::from_secs(
            config.escalation.cancellation_ttl_secs,
        )));
        let mut tasks = vec![
            listen_for_cancellations(
                Arc::clone(&broker),
                Arc::clone(&cancellations),
                token.child_token(),
            )
            .await?,
        ];
        actors.push(
            runtime
                .spawn_router(Arc::new(EscalationRouter::new(
                    config.escalation.clone(),
                    Arc::clone(&queue),
                    Arc::clone(&cancellations),
                )))
                .await?,
        );

        let gateway = Arc::new(CorrelationGateway::new(
            Arc::clone(&broker),
            Arc::clone(&collaborators.conversation_log),
            GatewaySettings::from(&config),
        ));
        tasks.push(gateway.start(token.child_token()).await?);

        let registry = Arc::new(ConnectionRegistry::new(
            Arc::clone(&gateway),
            HeartbeatSettings::from(&config.gateway),
        ));
        tasks.push(registry.spawn_heartbeat(token.child_token()));

        info!(
            actors = actors.len(),
            steps = ?config.pipeline.steps,
            "mesh started"
        );

        Ok(Mesh {
            config,
            runtime,
            actors,
            tasks,
            token,
            gateway,
            registry,
            cancellations,
            queue,
        })
    }
}

/// A running mesh.
pub struct Mesh {
    config: SwitchyardConfig,
    runtime: ActorRuntime,
    actors: Vec<ActorHandle>,
    tasks: Vec<JoinHandle<()>>,
    token: CancellationToken,
    gateway: Arc<CorrelationGateway>,
    registry: Arc<ConnectionRegistry>,
    cancellations: Arc<Cancellations>,
    queue: Arc<HandoffQueue>,
}

impl Mesh {
    pub fn builder(config: SwitchyardConfig) -> MeshBuilder {
        MeshBuilder {
            config,
            broker: None,
            collaborators: None,
            stages: None,
            queue: None,
        }
    }

    pub fn config(&self) -> &SwitchyardConfig {
        &self.config
    }

    pub fn gateway(&self) -> &Arc<CorrelationGateway> {
        &self.gateway
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn cancellations(&self) -> &Arc<Cancellations> {
        &self.cancellations
    }

    pub fn handoff_queue(&self) -> &Arc<HandoffQueue> {
        &self.queue
    }

    /// Addresses with a running actor.
    pub fn addresses(&self) -> Vec<&str> {
        self.actors.iter().map(ActorHandle::address).collect()
    }

    /// Stop every actor and background task, letting in-flight hops finish.
    pub async fn shutdown(self) {
        self.token.cancel();
        self.runtime.shutdown();
        for actor in self.actors {
            actor.join().await;
        }
        for task in self.tasks {
            let _ = task.await;
        }
        info!("mesh stopped");
    }
}
