use std::{net::SocketAddr, sync::Arc};

use {
    axum::{
        Router,
        extract::{State, WebSocketUpgrade},
        http::StatusCode,
        response::{IntoResponse, Json, Response},
        routing::{get, post},
    },
    switchyard_metrics::MetricsHandle,
    switchyard_protocol::{
        ErrorShape, GatewayResponse, PROTOCOL_VERSION, SubmitRequest, error_codes,
    },
    tokio::net::TcpListener,
    tokio_util::sync::CancellationToken,
    tower_http::{
        cors::{Any, CorsLayer},
        trace::TraceLayer,
    },
    tracing::{info, warn},
};

use crate::{
    error::{Context, Error, Result},
    gateway::CorrelationGateway,
    registry::ConnectionRegistry,
    ws::handle_connection,
};

// ── Shared app state ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<CorrelationGateway>,
    pub registry: Arc<ConnectionRegistry>,
    pub metrics: MetricsHandle,
    pub max_frame_bytes: usize,
}

// ── Server startup ───────────────────────────────────────────────────────────

/// Build the HTTP/WebSocket router (shared between the binary and tests).
pub fn build_gateway_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let router = Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/api/health", get(health_handler))
        .route("/ws", get(ws_upgrade_handler));

    #[cfg(feature = "prometheus")]
    let router = router.route("/metrics", get(prometheus_metrics_handler));

    router
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind the listener. Port 0 picks an ephemeral port.
pub async fn bind(bind: &str, port: u16) -> Result<TcpListener> {
    let addr = format!("{bind}:{port}");
    TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))
}

/// Serve `app` on `listener` until `shutdown` fires.
pub async fn serve(listener: TcpListener, app: Router, shutdown: CancellationToken) -> Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, protocol = PROTOCOL_VERSION, "gateway listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown.cancelled_owned())
    .await?;
    info!("gateway stopped");
    Ok(())
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// The handler future is dropped when the client disconnects, which cancels
/// the request through the pending guard.
async fn chat_handler(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> Response {
    match state.gateway.submit(request).await {
        Ok(response) => Json(response).into_response(),
        Err(Error::TimedOut {
            message_id,
            session_id,
            elapsed_ms,
        }) => (
            StatusCode::GATEWAY_TIMEOUT,
            Json(GatewayResponse::timed_out(message_id, session_id, elapsed_ms)),
        )
            .into_response(),
        Err(Error::InvalidRequest(reason)) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorShape::new(error_codes::INVALID_REQUEST, reason)),
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "chat request failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorShape::new(error_codes::UNAVAILABLE, "mesh unavailable").retryable(true)),
            )
                .into_response()
        },
    }
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": PROTOCOL_VERSION,
        "pending": state.gateway.pending(),
        "connections": state.registry.len(),
    }))
}

async fn ws_upgrade_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let max_frame_bytes = state.max_frame_bytes;
    ws.max_message_size(max_frame_bytes.saturating_mul(2))
        .on_upgrade(move |socket| handle_connection(socket, state.registry, max_frame_bytes))
}

/// Prometheus text exposition, unauthenticated for scrapers.
#[cfg(feature = "prometheus")]
async fn prometheus_metrics_handler(State(state): State<AppState>) -> Response {
    use axum::http::header;

    if !state.metrics.is_enabled() {
        return (StatusCode::SERVICE_UNAVAILABLE, "Metrics not enabled").into_response();
    }
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics.render(),
    )
        .into_response()
}
