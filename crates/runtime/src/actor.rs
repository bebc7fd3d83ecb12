use std::sync::Arc;

use {
    dashmap::DashMap,
    switchyard_broker::{Broker, Subscription},
    tokio::{sync::Semaphore, task::JoinSet},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info},
};

use crate::{
    address_book::AddressBook,
    error::{Result, RuntimeError},
    hop::{Hop, Hosted},
    settings::RuntimeSettings,
    stage::{Router, Stage},
};

/// Spawns and supervises actors on a shared broker.
pub struct ActorRuntime {
    broker: Arc<dyn Broker>,
    book: Arc<AddressBook>,
    settings: Arc<RuntimeSettings>,
    shutdown: CancellationToken,
    running: DashMap<String, CancellationToken>,
}

impl ActorRuntime {
    pub fn new(broker: Arc<dyn Broker>, book: Arc<AddressBook>, settings: RuntimeSettings) -> Self {
        Self {
            broker,
            book,
            settings: Arc::new(settings),
            shutdown: CancellationToken::new(),
            running: DashMap::new(),
        }
    }

    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }

    pub fn address_book(&self) -> &Arc<AddressBook> {
        &self.book
    }

    pub fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    pub async fn spawn_stage(&self, stage: Arc<dyn Stage>) -> Result<ActorHandle> {
        self.spawn(Hosted::Stage(stage)).await
    }

    pub async fn spawn_router(&self, router: Arc<dyn Router>) -> Result<ActorHandle> {
        self.spawn(Hosted::Router(router)).await
    }

    /// Subscribe before returning so nothing published afterwards is missed.
    async fn spawn(&self, hosted: Hosted) -> Result<ActorHandle> {
        let address = hosted.address().to_string();
        if self
            .running
            .get(&address)
            .is_some_and(|token| !token.is_cancelled())
        {
            return Err(RuntimeError::DuplicateActor(address));
        }

        let subscription = self.broker.subscribe(&address).await?;
        self.book.register(address.clone());

        let token = self.shutdown.child_token();
        self.running.insert(address.clone(), token.clone());

        let hop = Hop::new(
            hosted,
            Arc::clone(&self.broker),
            Arc::clone(&self.book),
            Arc::clone(&self.settings),
        );
        let limit = Arc::new(Semaphore::new(self.settings.max_in_flight.max(1)));
        let join = tokio::spawn(run_actor(hop, subscription, limit, token.clone()));
        info!(address, "actor started");

        Ok(ActorHandle {
            address,
            token,
            join,
        })
    }

    /// Stop every actor spawned by this runtime.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

async fn run_actor(
    hop: Hop,
    mut subscription: Subscription,
    limit: Arc<Semaphore>,
    token: CancellationToken,
) {
    let mut in_flight = JoinSet::new();

    loop {
        let delivery = tokio::select! {
            _ = token.cancelled() => break,
            delivery = subscription.recv() => delivery,
        };
        let Some(bytes) = delivery else {
            debug!(address = hop.address(), "subscription closed");
            break;
        };

        let permit = tokio::select! {
            _ = token.cancelled() => break,
            permit = Arc::clone(&limit).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let hop = hop.clone();
        in_flight.spawn(async move {
            hop.handle_delivery(bytes).await;
            drop(permit);
        });
        while in_flight.try_join_next().is_some() {}
    }

    // Let in-flight hops publish before the actor goes away.
    while in_flight.join_next().await.is_some() {}
    info!(address = hop.address(), "actor stopped");
}

/// Handle to a running actor.
pub struct ActorHandle {
    address: String,
    token: CancellationToken,
    join: tokio::task::JoinHandle<()>,
}

impl ActorHandle {
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Ask the actor to stop after finishing in-flight deliveries.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub async fn join(self) {
        if let Err(e) = self.join.await {
            tracing::warn!(address = %self.address, error = %e, "actor task ended abnormally");
        }
    }
}
