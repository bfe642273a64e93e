use std::{
    collections::{HashMap, HashSet},
    sync::atomic::{AtomicU64, Ordering},
};

use shared::{
    domain::{ConnectionId, ConnectionRole, SessionCode},
    error::SessionError,
    protocol::ServerEvent,
};
use thiserror::Error;
use tokio::sync::{
    mpsc::{self, error::TrySendError},
    RwLock,
};
use tracing::{debug, warn};

use crate::codec::{self, Frame};

/// Outbound half of a connection. The registry is the only writer.
pub type FrameSink = mpsc::Sender<Frame>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("connection {0} is not registered")]
    Unknown(ConnectionId),
    #[error("connection {0} is closed")]
    Closed(ConnectionId),
    #[error("outbound buffer of connection {0} is full")]
    Full(ConnectionId),
    #[error("failed to encode event: {0}")]
    Encode(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub session: SessionCode,
    pub role: ConnectionRole,
}

struct ConnectionEntry {
    sink: FrameSink,
    membership: Option<Membership>,
    alive: bool,
}

#[derive(Default)]
struct RegistryState {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    by_session: HashMap<SessionCode, HashSet<ConnectionId>>,
}

impl RegistryState {
    fn detach(&mut self, connection: ConnectionId, session: &SessionCode) {
        if let Some(members) = self.by_session.get_mut(session) {
            members.remove(&connection);
            if members.is_empty() {
                self.by_session.remove(session);
            }
        }
    }
}

/// Process-wide table of live connections and their session membership.
#[derive(Default)]
pub struct ConnectionRegistry {
    next_id: AtomicU64,
    state: RwLock<RegistryState>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, sink: FrameSink) -> ConnectionId {
        let connection = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.state.write().await.connections.insert(
            connection,
            ConnectionEntry {
                sink,
                membership: None,
                alive: true,
            },
        );
        debug!(%connection, "connection registered");
        connection
    }

    /// Binds a connection to a session. Rebinding within the same session only
    /// changes the role.
    pub async fn bind(
        &self,
        connection: ConnectionId,
        session: &SessionCode,
        role: ConnectionRole,
    ) -> Result<(), SessionError> {
        let mut state = self.state.write().await;
        let entry = state
            .connections
            .get_mut(&connection)
            .ok_or_else(|| SessionError::Internal(format!("connection {connection} is gone")))?;

        match &mut entry.membership {
            Some(current) if &current.session != session => {
                return Err(SessionError::AlreadyInSession(current.session.clone()));
            }
            Some(current) => current.role = role,
            None => {
                entry.membership = Some(Membership {
                    session: session.clone(),
                    role,
                });
            }
        }
        state
            .by_session
            .entry(session.clone())
            .or_default()
            .insert(connection);
        Ok(())
    }

    pub async fn release(&self, connection: ConnectionId) -> Option<Membership> {
        let mut state = self.state.write().await;
        let membership = state.connections.get_mut(&connection)?.membership.take()?;
        state.detach(connection, &membership.session);
        Some(membership)
    }

    pub async fn release_session(&self, session: &SessionCode) -> usize {
        let mut state = self.state.write().await;
        let Some(members) = state.by_session.remove(session) else {
            return 0;
        };
        for connection in &members {
            if let Some(entry) = state.connections.get_mut(connection) {
                if entry
                    .membership
                    .as_ref()
                    .is_some_and(|m| &m.session == session)
                {
                    entry.membership = None;
                }
            }
        }
        members.len()
    }

    pub async fn membership(&self, connection: ConnectionId) -> Option<Membership> {
        self.state
            .read()
            .await
            .connections
            .get(&connection)?
            .membership
            .clone()
    }

    pub async fn send(&self, connection: ConnectionId, event: &ServerEvent) -> Result<(), SendError> {
        let frame = codec::encode(event).map_err(|e| SendError::Encode(e.to_string()))?;
        self.send_frame(connection, frame).await
    }

    async fn send_frame(&self, connection: ConnectionId, frame: Frame) -> Result<(), SendError> {
        let result = {
            let state = self.state.read().await;
            let entry = state
                .connections
                .get(&connection)
                .ok_or(SendError::Unknown(connection))?;
            if !entry.alive {
                return Err(SendError::Closed(connection));
            }
            entry.sink.try_send(frame)
        };

        match result {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(SendError::Full(connection)),
            Err(TrySendError::Closed(_)) => {
                if let Some(entry) = self.state.write().await.connections.get_mut(&connection) {
                    entry.alive = false;
                }
                Err(SendError::Closed(connection))
            }
        }
    }

    pub async fn broadcast(
        &self,
        session: &SessionCode,
        event: &ServerEvent,
        excluding: &HashSet<ConnectionId>,
    ) -> Vec<ConnectionId> {
        let frame = match codec::encode(event) {
            Ok(frame) => frame,
            Err(error) => {
                warn!(%session, %error, "failed to encode broadcast");
                return Vec::new();
            }
        };
        let members: Vec<ConnectionId> = {
            let state = self.state.read().await;
            let mut members: Vec<_> = state
                .by_session
                .get(session)
                .map(|m| m.iter().copied().collect())
                .unwrap_or_default();
            members.sort();
            members
        };

        let mut failed = Vec::new();
        for connection in members {
            if excluding.contains(&connection) {
                continue;
            }
            if self.send_frame(connection, frame.clone()).await.is_err() {
                failed.push(connection);
            }
        }
        failed
    }

    pub async fn unregister(&self, connection: ConnectionId) -> Option<Membership> {
        let mut state = self.state.write().await;
        let entry = state.connections.remove(&connection)?;
        let membership = entry.membership?;
        state.detach(connection, &membership.session);
        debug!(%connection, session = %membership.session, "connection unregistered");
        Some(membership)
    }

    pub async fn is_alive(&self, connection: ConnectionId) -> bool {
        self.state
            .read()
            .await
            .connections
            .get(&connection)
            .is_some_and(|entry| entry.alive)
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.connections.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
