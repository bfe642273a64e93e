use std::sync::Arc;

use quiz_store::QuizSource;
use shared::{
    domain::{ConnectionId, SessionCode},
    error::SessionError,
    protocol::{ClientCommand, EndReason, ServerEvent},
};
use tracing::{debug, info, warn};

use crate::{
    codec,
    config::EngineConfig,
    manager::SessionManager,
    registry::{ConnectionRegistry, FrameSink},
    rejoin::TokenIssuer,
    worker::{SessionCommand, SessionInput},
};

pub struct Dispatcher {
    registry: Arc<ConnectionRegistry>,
    manager: SessionManager,
    config: Arc<EngineConfig>,
}

impl Dispatcher {
    pub fn new(config: EngineConfig, quizzes: Arc<dyn QuizSource>) -> Self {
        let tokens = match &config.token_secret {
            Some(secret) => TokenIssuer::new(secret, config.rejoin_token_ttl_seconds),
            None => TokenIssuer::random(config.rejoin_token_ttl_seconds),
        };
        let config = Arc::new(config);
        let registry = Arc::new(ConnectionRegistry::new());
        let manager = SessionManager::new(
            Arc::clone(&registry),
            quizzes,
            Arc::new(tokens),
            Arc::clone(&config),
        );
        Self {
            registry,
            manager,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn connect(&self, sink: FrameSink) -> ConnectionId {
        self.registry.register(sink).await
    }

    /// Decodes one inbound text frame and acts on it. Failures are reported to
    /// the sending connection only.
    pub async fn handle_frame(&self, connection: ConnectionId, raw: &str) {
        match codec::decode(raw, self.config.max_frame_bytes) {
            Ok(command) => self.handle_command(connection, command).await,
            Err(error) => {
                debug!(%connection, %error, "undecodable frame");
                self.reply_error(connection, error.into()).await;
            }
        }
    }

    pub async fn handle_binary(&self, connection: ConnectionId, raw: &[u8]) {
        match codec::decode_bytes(raw, self.config.max_frame_bytes) {
            Ok(command) => self.handle_command(connection, command).await,
            Err(error) => {
                debug!(%connection, %error, "undecodable frame");
                self.reply_error(connection, error.into()).await;
            }
        }
    }

    pub async fn handle_command(&self, connection: ConnectionId, command: ClientCommand) {
        if let Err(error) = self.route(connection, command).await {
            self.reply_error(connection, error).await;
        }
    }

    async fn route(&self, connection: ConnectionId, command: ClientCommand) -> Result<(), SessionError> {
        let membership = self.registry.membership(connection).await;
        let (code, command) = match command {
            ClientCommand::CreateSession { quiz_id } => {
                if let Some(current) = membership {
                    return Err(SessionError::AlreadyInSession(current.session));
                }
                self.manager.create(quiz_id, connection).await?;
                return Ok(());
            }
            ClientCommand::JoinSession {
                session_id,
                player_name,
            } => {
                ensure_free(membership.as_ref().map(|m| &m.session), &session_id)?;
                (session_id, SessionCommand::Join { name: player_name })
            }
            ClientCommand::RejoinSession {
                session_id,
                player_id,
                token,
            } => {
                ensure_free(membership.as_ref().map(|m| &m.session), &session_id)?;
                (session_id, SessionCommand::Rejoin { player_id, token })
            }
            ClientCommand::RejoinHost { session_id, token } => {
                ensure_free(membership.as_ref().map(|m| &m.session), &session_id)?;
                (session_id, SessionCommand::RejoinHost { token })
            }
            ClientCommand::StartQuiz => (member_of(membership)?, SessionCommand::Start),
            ClientCommand::SubmitAnswer { option_index } => (
                member_of(membership)?,
                SessionCommand::Submit { option_index },
            ),
            ClientCommand::LeaveSession => (member_of(membership)?, SessionCommand::Leave),
        };

        self.manager
            .lookup(&code)
            .await?
            .send(SessionInput::Command {
                connection,
                command,
            })
    }

    pub async fn disconnect(&self, connection: ConnectionId) {
        let Some(membership) = self.registry.unregister(connection).await else {
            return;
        };
        match self.manager.lookup(&membership.session).await {
            Ok(handle) => {
                if let Err(error) = handle.send(SessionInput::ConnectionLost { connection }) {
                    debug!(%connection, %error, "session ended before disconnect");
                }
            }
            Err(error) => debug!(%connection, %error, "session ended before disconnect"),
        }
    }

    pub async fn shutdown(&self, reason: EndReason) {
        let stopped = self.manager.shutdown_all(reason).await;
        info!(stopped, ?reason, "sessions shut down");
    }

    async fn reply_error(&self, connection: ConnectionId, error: SessionError) {
        if let Err(send_error) = self
            .registry
            .send(connection, &ServerEvent::Error(error.into()))
            .await
        {
            warn!(%connection, error = %send_error, "failed to report error");
        }
    }
}

fn ensure_free(current: Option<&SessionCode>, target: &SessionCode) -> Result<(), SessionError> {
    match current {
        Some(current) if current != target => Err(SessionError::AlreadyInSession(current.clone())),
        _ => Ok(()),
    }
}

fn member_of(membership: Option<crate::registry::Membership>) -> Result<SessionCode, SessionError> {
    membership
        .map(|m| m.session)
        .ok_or_else(|| SessionError::unauthorized("connection has not joined a session"))
}

#[cfg(test)]
#[path = "tests/dispatcher_tests.rs"]
mod tests;
