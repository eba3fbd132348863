use std::net::SocketAddr;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::bus::{Hub, RateLimit, Subscription};

use crate::prelude::*;

/// WebSocket adapter.
///
/// Routes:
///
/// * `GET /ws/<topic>[?rate=<hz>]` streams messages of a topic as JSON text frames, at most
///   `rate` messages per second when `rate` is set;
/// * `GET /ws` accepts envelopes only.
///
/// Text frames received on any socket are handled as envelopes by [`Hub::handle_message`].
#[derive(Clone, Debug)]
pub struct WebSocketAdapter {
    hub: Hub,
    cancel: CancellationToken,
}

#[derive(Clone, Debug)]
struct AdapterState {
    hub: Hub,
    cancel: CancellationToken,
}

#[derive(Debug, Default, Deserialize)]
struct StreamParams {
    rate: Option<f64>,
}

impl WebSocketAdapter {
    /// Creates an adapter. All sockets are closed once `cancel` is triggered.
    pub fn new(hub: Hub, cancel: CancellationToken) -> Self {
        Self { hub, cancel }
    }

    /// Axum router serving the adapter routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(envelope_handler))
            .route("/ws/:topic", get(topic_handler))
            .with_state(AdapterState {
                hub: self.hub.clone(),
                cancel: self.cancel.clone(),
            })
    }

    /// Binds a listener and serves until cancelled.
    ///
    /// Fails only if the address can't be bound.
    pub async fn bind(self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serves on an already bound listener until cancelled.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        log::info!("[ws] listening on ws://{}/ws", listener.local_addr()?);

        let cancel = self.cancel.clone();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await?;

        log::debug!("[ws] server stopped");
        Ok(())
    }
}

async fn envelope_handler(ws: WebSocketUpgrade, State(state): State<AdapterState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, None))
}

async fn topic_handler(
    ws: WebSocketUpgrade,
    Path(topic): Path<String>,
    Query(params): Query<StreamParams>,
    State(state): State<AdapterState>,
) -> Response {
    let subscription = match state.hub.subscribe(&topic, RateLimit::from_hz(params.rate)) {
        Ok(subscription) => subscription,
        Err(err) => {
            log::debug!("[ws] rejecting client: {err}");
            return (StatusCode::NOT_FOUND, err.to_string()).into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, Some(subscription)))
}

async fn handle_socket(socket: WebSocket, state: AdapterState, subscription: Option<Subscription>) {
    let label = match &subscription {
        Some(subscription) => format!("ws/{}", subscription.topic()),
        None => "ws".to_string(),
    };
    log::debug!("[{label}] client connected");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let closed = state.cancel.child_token();

    let writer = subscription.map(|mut subscription| {
        let closed = closed.clone();
        let label = label.clone();
        tokio::spawn(async move {
            loop {
                let message = tokio::select! {
                    _ = closed.cancelled() => break,
                    message = subscription.recv() => match message {
                        Some(message) => message,
                        None => break,
                    },
                };
                if ws_tx.send(WsMessage::Text(message.to_string())).await.is_err() {
                    log::debug!("[{label}] send failed, closing");
                    break;
                }
            }
            let _ = ws_tx.close().await;
            closed.cancel();
        })
    });

    loop {
        let frame = tokio::select! {
            _ = closed.cancelled() => break,
            frame = ws_rx.next() => frame,
        };

        match frame {
            Some(Ok(WsMessage::Text(text))) => {
                state.hub.handle_message(text.as_bytes());
            }
            Some(Ok(WsMessage::Binary(_))) => {
                log::debug!("[{label}] binary frame ignored");
            }
            Some(Ok(WsMessage::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(err)) => {
                log::debug!("[{label}] socket error: {err}");
                break;
            }
        }
    }

    closed.cancel();
    if let Some(writer) = writer {
        let _ = writer.await;
    }
    log::debug!("[{label}] client disconnected");
}
