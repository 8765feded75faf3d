//! Dashboard WebSocket connection management.
//!
//! The hub tracks connected dashboard sockets and their liveness; the
//! transport (accept, upgrade, raw frames) lives with the gateway. Each
//! registered socket gets a bounded outbound queue - a slow consumer
//! loses broadcasts rather than stalling the broadcaster.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;

/// Outbound frames buffered per socket before broadcasts are dropped.
const SOCKET_BUFFER: usize = 64;

pub type SocketId = uuid::Uuid;

#[derive(Debug, Error)]
pub enum HubError {
    /// The concurrent-socket cap is reached; the registration is refused.
    #[error("websocket connection limit reached")]
    AtCapacity,
}

/// What the transport should do after an inbound message.
#[derive(Debug, PartialEq, Eq)]
pub enum HubReply {
    /// Send this frame back to the socket.
    Send(String),
    /// Send a fresh comprehensive snapshot (the hub does not own the
    /// aggregator).
    Comprehensive,
    /// Nothing to do.
    None,
}

struct Connection {
    sender: mpsc::Sender<String>,
    last_pong: Instant,
    authenticated: bool,
}

/// Registry of dashboard sockets with a cap and pong-based staleness.
pub struct SocketHub {
    connections: RwLock<HashMap<SocketId, Connection>>,
    max_connections: usize,
    pong_timeout: Duration,
    auth_token: Option<String>,
}

impl SocketHub {
    pub fn new(max_connections: usize, pong_timeout: Duration, auth_token: Option<String>) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            max_connections,
            pong_timeout,
            auth_token,
        }
    }

    /// Registers a socket, returning its id and the outbound frame queue.
    /// Refused once the cap is reached.
    pub fn register(&self) -> Result<(SocketId, mpsc::Receiver<String>), HubError> {
        let mut connections = self.write();
        if connections.len() >= self.max_connections {
            return Err(HubError::AtCapacity);
        }
        let id = uuid::Uuid::new_v4();
        let (sender, receiver) = mpsc::channel(SOCKET_BUFFER);
        connections.insert(
            id,
            Connection {
                sender,
                last_pong: Instant::now(),
                // With no token configured, every socket is trusted.
                authenticated: self.auth_token.is_none(),
            },
        );
        tracing::debug!(socket = %id, total = connections.len(), "websocket registered");
        Ok((id, receiver))
    }

    pub fn unregister(&self, id: &SocketId) {
        let mut connections = self.write();
        if connections.remove(id).is_some() {
            tracing::debug!(socket = %id, total = connections.len(), "websocket closed");
        }
    }

    pub fn count(&self) -> usize {
        self.read().len()
    }

    /// Marks the socket alive (transport-level pong or protocol ping).
    pub fn touch(&self, id: &SocketId) {
        if let Some(connection) = self.write().get_mut(id) {
            connection.last_pong = Instant::now();
        }
    }

    /// Queues a frame to every authenticated socket; full queues drop the
    /// frame. Returns how many sockets received it.
    pub fn broadcast(&self, message: &str) -> usize {
        let connections = self.read();
        let mut sent = 0;
        for connection in connections.values() {
            if !connection.authenticated {
                continue;
            }
            if connection.sender.try_send(message.to_string()).is_ok() {
                sent += 1;
            }
        }
        sent
    }

    /// Sends one frame to one socket.
    pub fn send_to(&self, id: &SocketId, message: &str) -> bool {
        let connections = self.read();
        connections
            .get(id)
            .map(|c| c.sender.try_send(message.to_string()).is_ok())
            .unwrap_or(false)
    }

    /// Removes sockets that have not answered a ping within the timeout.
    /// Dropping the sender ends the socket's send loop, which closes the
    /// connection.
    pub fn sweep_stale(&self) -> Vec<SocketId> {
        let now = Instant::now();
        let mut connections = self.write();
        let stale: Vec<SocketId> = connections
            .iter()
            .filter(|(_, c)| now.duration_since(c.last_pong) > self.pong_timeout)
            .map(|(id, _)| *id)
            .collect();
        for id in &stale {
            connections.remove(id);
            tracing::debug!(socket = %id, "stale websocket dropped");
        }
        stale
    }

    /// Dispatches a typed inbound message.
    pub fn handle_message(&self, id: &SocketId, raw: &str) -> HubReply {
        let Ok(message) = serde_json::from_str::<Value>(raw) else {
            return HubReply::Send(error_frame("invalid_json", "message is not valid JSON"));
        };
        let message_type = message.get("type").and_then(Value::as_str).unwrap_or("");

        match message_type {
            "ping" => {
                self.touch(id);
                HubReply::Send(
                    json!({ "type": "pong", "timestamp": unix_millis() }).to_string(),
                )
            }
            "request_update" => {
                if self.is_authenticated(id) {
                    HubReply::Comprehensive
                } else {
                    HubReply::Send(error_frame("unauthorized", "authenticate first"))
                }
            }
            "auth" => {
                let token = message.get("token").and_then(Value::as_str).unwrap_or("");
                self.authenticate(id, token)
            }
            other => HubReply::Send(error_frame(
                "unknown_type",
                &format!("unsupported message type '{other}'"),
            )),
        }
    }

    fn authenticate(&self, id: &SocketId, token: &str) -> HubReply {
        let Some(expected) = &self.auth_token else {
            return HubReply::Send(json!({ "type": "auth_success" }).to_string());
        };
        if !token.is_empty() && token == expected {
            if let Some(connection) = self.write().get_mut(id) {
                connection.authenticated = true;
            }
            HubReply::Send(json!({ "type": "auth_success" }).to_string())
        } else {
            HubReply::Send(
                json!({ "type": "auth_failed", "message": "invalid authentication token" })
                    .to_string(),
            )
        }
    }

    fn is_authenticated(&self, id: &SocketId) -> bool {
        self.read().get(id).map(|c| c.authenticated).unwrap_or(false)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<SocketId, Connection>> {
        self.connections.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<SocketId, Connection>> {
        self.connections.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn error_frame(code: &str, message: &str) -> String {
    json!({ "type": "error", "code": code, "message": message }).to_string()
}

fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
