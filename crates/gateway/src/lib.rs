//! Gateway: the synchronous edge of the mesh.
//!
//! Lifecycle:
//! 1. Start the mesh (stage actors, routers, cancellation listener)
//! 2. Start the aggregation listener, sole subscriber of the aggregation address
//! 3. Start the heartbeat over streaming connections
//! 4. Serve `POST /api/chat`, `GET /api/health`, `GET /ws` (and `GET /metrics`)
//!
//! Every request is correlated by `message_id`: the caller waits on a
//! correlation entry until the terminal envelope arrives or its deadline
//! passes.

pub mod correlation;
pub mod error;
pub mod gateway;
pub mod mesh;
pub mod registry;
pub mod server;
pub mod ws;

pub use {
    correlation::{CorrelationTable, Resolution},
    error::{Error as GatewayError, Result},
    gateway::{CorrelationGateway, GatewaySettings, PendingRequest},
    mesh::{Mesh, MeshBuilder},
    registry::{ConnectionRegistry, HeartbeatSettings, Outbound},
    server::{AppState, bind, build_gateway_app, serve},
};
