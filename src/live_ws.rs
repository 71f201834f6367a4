//! WebSocket handler for live collection snapshots
//!
//! Each connected client receives the full current snapshot of its
//! subscribed collections, then every new snapshot as the store publishes
//! it. Snapshots replace the client's copy; there are no deltas.
//!
//! ## Protocol
//!
//! ### Client → Server
//! ```json
//! {"type": "subscribe", "collections": ["habits", "feed"]}
//! {"type": "ping"}
//! ```
//!
//! ### Server → Client
//! ```json
//! {"type": "snapshot", "collection": "habits", "version": 7, "documents": [...]}
//! {"type": "heartbeat", "timestamp": "..."}
//! {"type": "pong"}
//! ```

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::upgrade::Upgraded;
use hyper::{header, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::{Message as WsMessage, Role};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};

use crate::live::{LiveMessage, LiveView};
use crate::store::Collection;

/// Messages from client to server
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Replace the subscription set (empty = every collection)
    Subscribe {
        #[serde(default)]
        collections: Vec<Collection>,
    },
    /// Ping to keep connection alive
    Ping,
}

/// Check if the request is a WebSocket upgrade request
pub fn is_websocket_upgrade(req: &Request<Incoming>) -> bool {
    let header_has = |name: header::HeaderName, needle: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_lowercase().contains(needle))
            .unwrap_or(false)
    };

    header_has(header::CONNECTION, "upgrade") && header_has(header::UPGRADE, "websocket")
}

fn plain(status: StatusCode, message: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(message)));
    *response.status_mut() = status;
    response
}

/// Handle WebSocket upgrade for the live endpoint
pub async fn handle_live_upgrade(
    req: Request<Incoming>,
    live: Arc<LiveView>,
    uid: String,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    if !is_websocket_upgrade(&req) {
        return Ok(plain(StatusCode::BAD_REQUEST, "Expected WebSocket upgrade"));
    }

    let accept_key = match req.headers().get(header::SEC_WEBSOCKET_KEY) {
        Some(key) => derive_accept_key(key.as_bytes()),
        None => return Ok(plain(StatusCode::BAD_REQUEST, "Missing Sec-WebSocket-Key")),
    };

    info!(uid = %uid, "WebSocket upgrade request for /live");

    // The connection is only usable once hyper has sent the 101 below
    tokio::spawn(async move {
        match hyper::upgrade::on(req).await {
            Ok(upgraded) => {
                let ws_stream =
                    WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, None)
                        .await;

                if let Err(e) = handle_connection(ws_stream, live, &uid).await {
                    warn!(uid = %uid, error = %e, "WebSocket connection error");
                }
            }
            Err(e) => {
                error!(error = %e, "WebSocket upgrade failed");
            }
        }
    });

    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    let headers = response.headers_mut();
    headers.insert(header::CONNECTION, header::HeaderValue::from_static("Upgrade"));
    headers.insert(header::UPGRADE, header::HeaderValue::from_static("websocket"));
    if let Ok(value) = header::HeaderValue::from_str(&accept_key) {
        headers.insert(header::SEC_WEBSOCKET_ACCEPT, value);
    }
    Ok(response)
}

/// Whether a subscription set lets `message` through
fn wants(subscriptions: &HashSet<Collection>, message: &LiveMessage) -> bool {
    match message.collection() {
        Some(collection) => subscriptions.contains(&collection),
        None => true,
    }
}

/// Handle an established WebSocket connection
async fn handle_connection(
    ws_stream: WebSocketStream<TokioIo<Upgraded>>,
    live: Arc<LiveView>,
    uid: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (mut ws_sink, mut ws_stream) = ws_stream.split();

    let mut subscriptions: HashSet<Collection> = Collection::ALL.into_iter().collect();
    let mut updates_rx = live.subscribe();
    let mut heartbeat_timer = tokio::time::interval(live.config().heartbeat_interval);

    // Everything the client needs before the first push
    for message in live.initial_messages(&Collection::ALL).await {
        let json = serde_json::to_string(&message)?;
        ws_sink.send(WsMessage::Text(json.into())).await?;
    }

    info!(uid = %uid, "WebSocket connection established for /live");

    loop {
        tokio::select! {
            msg = ws_stream.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        let reply = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Subscribe { collections }) => {
                                subscriptions = if collections.is_empty() {
                                    Collection::ALL.into_iter().collect()
                                } else {
                                    collections.into_iter().collect()
                                };
                                debug!(uid = %uid, collections = ?subscriptions, "Client subscribed");

                                let wanted: Vec<Collection> = Collection::ALL
                                    .into_iter()
                                    .filter(|c| subscriptions.contains(c))
                                    .collect();
                                live.initial_messages(&wanted).await
                            }
                            Ok(ClientMessage::Ping) => vec![LiveMessage::Pong],
                            Err(e) => {
                                warn!(error = %e, "Failed to parse client message");
                                vec![LiveMessage::Error { message: "Unrecognized message".into() }]
                            }
                        };

                        for message in reply {
                            let json = serde_json::to_string(&message)?;
                            ws_sink.send(WsMessage::Text(json.into())).await?;
                        }
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        ws_sink.send(WsMessage::Pong(data)).await?;
                    }
                    Some(Ok(WsMessage::Close(_))) => {
                        info!(uid = %uid, "WebSocket client disconnected");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket receive error");
                        break;
                    }
                    None => break,
                }
            }

            result = updates_rx.recv() => {
                match result {
                    Ok(message) => {
                        if wants(&subscriptions, &message) {
                            let json = serde_json::to_string(&message)?;
                            if let Err(e) = ws_sink.send(WsMessage::Text(json.into())).await {
                                warn!(error = %e, "Failed to send snapshot to client");
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        // Later snapshots supersede the skipped ones; resend current state
                        warn!(skipped = n, "Client lagged behind, resending snapshots");
                        let wanted: Vec<Collection> = subscriptions.iter().copied().collect();
                        for message in live.initial_messages(&wanted).await {
                            let json = serde_json::to_string(&message)?;
                            ws_sink.send(WsMessage::Text(json.into())).await?;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Live view closed");
                        break;
                    }
                }
            }

            _ = heartbeat_timer.tick() => {
                let heartbeat = LiveMessage::Heartbeat {
                    timestamp: chrono::Utc::now().to_rfc3339(),
                };
                let json = serde_json::to_string(&heartbeat)?;
                if let Err(e) = ws_sink.send(WsMessage::Text(json.into())).await {
                    warn!(error = %e, "Failed to send heartbeat");
                    break;
                }
            }
        }
    }

    info!(uid = %uid, "WebSocket connection closed for /live");
    Ok(())
}
