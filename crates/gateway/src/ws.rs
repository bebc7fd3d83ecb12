use std::sync::Arc;

use {
    axum::extract::ws::{Message, WebSocket},
    bytes::Bytes,
    futures::{SinkExt, stream::StreamExt},
    switchyard_protocol::{
        ErrorShape, EventFrame, GatewayFrame, GatewayResponse, Origin, PROTOCOL_VERSION,
        ResponseFrame, SubmitParams, SubmitRequest, error_codes, events, methods,
    },
    tokio::sync::mpsc,
    tracing::{debug, info, warn},
};

use crate::{
    error::Error,
    registry::{ConnectionRegistry, Outbound},
};

/// Serve one WebSocket connection: register → message loop → cleanup.
pub async fn handle_connection(
    socket: WebSocket,
    registry: Arc<ConnectionRegistry>,
    max_frame_bytes: usize,
) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    info!(conn_id = %conn_id, "ws: new connection");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (client_tx, mut client_rx) = mpsc::unbounded_channel::<Outbound>();

    // Write loop: everything the connection sends goes through `client_tx`.
    let write_conn_id = conn_id.clone();
    let write_handle = tokio::spawn(async move {
        while let Some(outbound) = client_rx.recv().await {
            let (message, closing) = match outbound {
                Outbound::Text(text) => (Message::Text(text.into()), false),
                Outbound::Ping => (Message::Ping(Bytes::new()), false),
                Outbound::Close => (Message::Close(None), true),
            };
            if ws_tx.send(message).await.is_err() || closing {
                debug!(conn_id = %write_conn_id, "ws: write loop closed");
                break;
            }
        }
    });

    let closed = registry.register(&conn_id, client_tx.clone());
    let heartbeat = registry.heartbeat();
    send_event(
        &client_tx,
        &registry,
        events::CONNECTED,
        serde_json::json!({
            "connId": conn_id,
            "protocol": PROTOCOL_VERSION,
            "heartbeatIntervalMs": heartbeat.interval.as_millis() as u64,
            "maxFrameBytes": max_frame_bytes,
        }),
    );

    // ── Message loop ─────────────────────────────────────────────────────

    loop {
        let msg = tokio::select! {
            _ = closed.cancelled() => {
                debug!(conn_id = %conn_id, "ws: connection dropped by the registry");
                break;
            },
            msg = ws_rx.next() => msg,
        };
        let Some(msg) = msg else {
            break;
        };
        let text = match msg {
            Ok(Message::Text(t)) => t.to_string(),
            Ok(Message::Pong(_)) => {
                registry.record_pong(&conn_id);
                continue;
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!(conn_id = %conn_id, error = %e, "ws: read error");
                break;
            },
        };
        // Any traffic proves the peer is alive.
        registry.record_pong(&conn_id);

        if text.len() > max_frame_bytes {
            warn!(conn_id = %conn_id, size = text.len(), "ws: frame too large");
            send_event(
                &client_tx,
                &registry,
                events::ERROR,
                serde_json::json!({
                    "code": error_codes::FRAME_TOO_LARGE,
                    "message": "frame too large",
                    "maxBytes": max_frame_bytes,
                }),
            );
            continue;
        }

        let (id, method, params) = match serde_json::from_str::<GatewayFrame>(&text) {
            Ok(GatewayFrame::Request { id, method, params }) => (id, method, params),
            Ok(_) => {
                debug!(conn_id = %conn_id, "ws: ignoring non-request frame");
                continue;
            },
            Err(e) => {
                warn!(conn_id = %conn_id, error = %e, "ws: invalid frame");
                send_event(
                    &client_tx,
                    &registry,
                    events::ERROR,
                    serde_json::json!({
                        "code": error_codes::INVALID_REQUEST,
                        "message": "invalid frame",
                    }),
                );
                continue;
            },
        };
        debug!(conn_id = %conn_id, request_id = %id, method = %method, "ws: request frame");

        let response = match method.as_str() {
            methods::PING => ResponseFrame::ok(&id, serde_json::json!({ "pong": true })),
            methods::SUBMIT => submit(&registry, &conn_id, &id, params).await,
            other => ResponseFrame::err(
                &id,
                ErrorShape::new(error_codes::UNKNOWN_METHOD, format!("unknown method '{other}'")),
            ),
        };
        send_frame(&client_tx, &response);
    }

    // ── Cleanup ──────────────────────────────────────────────────────────

    let duration = registry.unregister(&conn_id).await.unwrap_or_default();
    info!(
        conn_id = %conn_id,
        duration_secs = duration.as_secs(),
        "ws: connection closed"
    );

    drop(client_tx);
    write_handle.abort();
}

/// Dispatch one `submit` frame and arrange for its result to be pushed as a
/// `chat.response` event. Returns the acknowledgement.
async fn submit(
    registry: &Arc<ConnectionRegistry>,
    conn_id: &str,
    request_id: &str,
    params: Option<serde_json::Value>,
) -> ResponseFrame {
    let params: SubmitParams =
        match serde_json::from_value(params.unwrap_or(serde_json::Value::Null)) {
            Ok(p) => p,
            Err(e) => {
                return ResponseFrame::err(
                    request_id,
                    ErrorShape::new(error_codes::INVALID_REQUEST, e.to_string()),
                );
            },
        };
    let request = SubmitRequest {
        message: params.message,
        customer_identity: params.customer_identity,
        session_id: params.session_id,
    };

    let origin = Origin::Stream {
        conn_id: conn_id.to_string(),
    };
    let pending = match registry
        .gateway()
        .dispatch(request, origin, Some(conn_id))
        .await
    {
        Ok(pending) => pending,
        Err(Error::InvalidRequest(reason)) => {
            return ResponseFrame::err(
                request_id,
                ErrorShape::new(error_codes::INVALID_REQUEST, reason),
            );
        },
        Err(e) => {
            warn!(conn_id, error = %e, "ws: submit failed");
            return ResponseFrame::err(
                request_id,
                ErrorShape::new(error_codes::UNAVAILABLE, "mesh unavailable").retryable(true),
            );
        },
    };

    let message_id = pending.message_id().to_string();
    let session_id = pending.session_id().to_string();
    if !registry.track(conn_id, &message_id) {
        // Unregistered meanwhile; dropping `pending` cancels the request.
        return ResponseFrame::err(
            request_id,
            ErrorShape::new(error_codes::UNAVAILABLE, "connection closed"),
        );
    }

    let waiter_registry = Arc::clone(registry);
    let waiter_conn = conn_id.to_string();
    let waiter_request = request_id.to_string();
    tokio::spawn(async move {
        let response = match pending.wait().await {
            Ok(response) => response,
            Err(Error::TimedOut {
                message_id,
                session_id,
                elapsed_ms,
            }) => GatewayResponse::timed_out(message_id, session_id, elapsed_ms),
            Err(Error::Cancelled { .. }) => return,
            Err(e) => {
                warn!(conn_id = %waiter_conn, error = %e, "ws: request failed");
                return;
            },
        };
        let message_id = response.message_id.clone();
        let payload = serde_json::json!({
            "requestId": waiter_request,
            "messageId": message_id,
            "response": response,
        });
        let event = EventFrame::new(events::CHAT_RESPONSE, payload, waiter_registry.next_seq());
        match serde_json::to_string(&event) {
            Ok(frame) => {
                waiter_registry.deliver(&waiter_conn, &message_id, frame);
            },
            Err(e) => warn!(error = %e, "ws: failed to serialize response event"),
        }
    });

    ResponseFrame::ok(
        request_id,
        serde_json::json!({ "messageId": message_id, "sessionId": session_id }),
    )
}

fn send_event(
    tx: &mpsc::UnboundedSender<Outbound>,
    registry: &ConnectionRegistry,
    event: &str,
    payload: serde_json::Value,
) {
    let frame = EventFrame::new(event, payload, registry.next_seq());
    send_frame(tx, &frame);
}

fn send_frame(tx: &mpsc::UnboundedSender<Outbound>, frame: &impl serde::Serialize) {
    match serde_json::to_string(frame) {
        Ok(text) => {
            let _ = tx.send(Outbound::Text(text));
        },
        Err(e) => warn!(error = %e, "ws: failed to serialize frame"),
    }
}
