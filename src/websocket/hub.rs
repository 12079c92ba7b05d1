//! WebSocket Connection Hub
//!
//! Tracks every live connection and owns the outbound queue of each one.
//! Channels never touch sockets directly; they reach subscribers through the
//! [`Transport`] implemented here, keyed by [`ConnectionId`].

use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Unique identifier for a WebSocket connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Work item for a connection's writer task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Binary protocol message
    Binary(Vec<u8>),
    /// Close the connection with a reason
    Close { reason: String },
}

/// Delivery of encoded messages to a single connection
pub trait Transport: Send + Sync {
    fn send(&self, id: ConnectionId, data: &[u8]) -> Result<(), SendError>;
}

/// Configuration for the connection hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Maximum number of concurrent connections
    pub max_connections: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_connections: 1000,
        }
    }
}

/// Handle for sending messages to a specific connection
pub struct ConnectionHandle {
    /// Channel sender drained by the connection's writer task
    pub sender: mpsc::UnboundedSender<Outbound>,
}

/// Registry of live connections
pub struct ConnectionHub {
    /// Active connections: ConnectionId → ConnectionHandle
    connections: RwLock<HashMap<ConnectionId, ConnectionHandle>>,
    config: HubConfig,
}

impl ConnectionHub {
    /// Create a new connection hub
    pub fn new(config: HubConfig) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Register a new connection
    ///
    /// Returns the connection ID on success, or an error if the connection
    /// limit has been reached.
    pub fn register(
        &self,
        sender: mpsc::UnboundedSender<Outbound>,
    ) -> Result<ConnectionId, HubError> {
        let mut connections = self.write();
        if connections.len() >= self.config.max_connections {
            return Err(HubError::TooManyConnections(self.config.max_connections));
        }

        let id = ConnectionId::new();
        connections.insert(id, ConnectionHandle { sender });

        tracing::info!(connection_id = %id, "WebSocket connected");
        Ok(id)
    }

    /// Forget a connection. Returns false if it was not registered.
    pub fn unregister(&self, id: ConnectionId) -> bool {
        let removed = self.write().remove(&id).is_some();
        if removed {
            tracing::info!(connection_id = %id, "WebSocket disconnected");
        }
        removed
    }

    /// Queue an outbound item for a specific connection
    pub fn send_to(&self, id: ConnectionId, item: Outbound) -> Result<(), SendError> {
        let connections = self.read();
        let handle = connections
            .get(&id)
            .ok_or(SendError::ConnectionNotFound(id))?;

        handle
            .sender
            .send(item)
            .map_err(|_| SendError::ConnectionClosed(id))
    }

    /// Ask every live connection to close with `reason`.
    ///
    /// Connections stay registered until their handler observes the close.
    /// Returns the number of connections notified.
    pub fn close_all(&self, reason: &str) -> usize {
        let connections = self.read();
        let mut notified = 0;

        for (id, handle) in connections.iter() {
            let close = Outbound::Close {
                reason: reason.to_string(),
            };
            match handle.sender.send(close) {
                Ok(()) => notified += 1,
                Err(_) => {
                    tracing::debug!(connection_id = %id, "Connection already closing");
                }
            }
        }

        notified
    }

    /// Get the current connection count
    pub fn connection_count(&self) -> usize {
        self.read().len()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.read().contains_key(&id)
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ConnectionId, ConnectionHandle>> {
        self.connections.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ConnectionId, ConnectionHandle>> {
        self.connections.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for ConnectionHub {
    fn send(&self, id: ConnectionId, data: &[u8]) -> Result<(), SendError> {
        self.send_to(id, Outbound::Binary(data.to_vec()))
    }
}

/// Errors that can occur while registering connections
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Too many connections (limit: {0})")]
    TooManyConnections(usize),

    #[error("Server is not accepting connections")]
    NotAccepting,
}

/// Errors that can occur while sending to a connection
#[derive(Debug, Error)]
pub enum SendError {
    #[error("Connection not found: {0}")]
    ConnectionNotFound(ConnectionId),

    #[error("Connection closed: {0}")]
    ConnectionClosed(ConnectionId),
}
