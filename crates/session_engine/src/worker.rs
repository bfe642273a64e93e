use std::{collections::HashSet, sync::Arc};

use shared::{
    domain::{ConnectionId, ConnectionRole, PlayerId, SessionCode},
    error::SessionError,
    protocol::{EndReason, ServerEvent},
};
use tokio::{
    sync::mpsc::{UnboundedReceiver, UnboundedSender},
    time::Instant,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    broadcaster::{self, Transition},
    config::EngineConfig,
    manager::SessionDirectory,
    registry::ConnectionRegistry,
    rejoin::{TokenIssuer, TokenSubject},
    scheduler::{RoundScheduler, TimerSignal},
    session::{Departure, Phase, Session},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Join { name: String },
    Rejoin { player_id: PlayerId, token: String },
    RejoinHost { token: String },
    Start,
    Submit { option_index: usize },
    Leave,
}

#[derive(Debug)]
pub enum SessionInput {
    Command {
        connection: ConnectionId,
        command: SessionCommand,
    },
    ConnectionLost {
        connection: ConnectionId,
    },
    Timer(TimerSignal),
    Shutdown {
        reason: EndReason,
    },
}

#[derive(Debug, Clone)]
pub struct SessionHandle {
    code: SessionCode,
    instance: Uuid,
    tx: UnboundedSender<SessionInput>,
}

impl SessionHandle {
    pub fn new(code: SessionCode, instance: Uuid, tx: UnboundedSender<SessionInput>) -> Self {
        Self { code, instance, tx }
    }

    pub fn code(&self) -> &SessionCode {
        &self.code
    }

    pub fn instance(&self) -> Uuid {
        self.instance
    }

    pub fn send(&self, input: SessionInput) -> Result<(), SessionError> {
        self.tx
            .send(input)
            .map_err(|_| SessionError::SessionNotFound(self.code.clone()))
    }

    pub async fn closed(&self) {
        self.tx.closed().await
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[derive(Clone)]
pub struct WorkerContext {
    pub registry: Arc<ConnectionRegistry>,
    pub directory: Arc<SessionDirectory>,
    pub tokens: Arc<TokenIssuer>,
    pub config: Arc<EngineConfig>,
}

/// Owns one session and applies its inputs one at a time.
pub struct SessionWorker {
    session: Session,
    scheduler: RoundScheduler,
    inbox: UnboundedReceiver<SessionInput>,
    ctx: WorkerContext,
}

impl SessionWorker {
    pub fn spawn(
        session: Session,
        tx: UnboundedSender<SessionInput>,
        inbox: UnboundedReceiver<SessionInput>,
        ctx: WorkerContext,
    ) -> tokio::task::JoinHandle<()> {
        let worker = Self {
            session,
            scheduler: RoundScheduler::new(tx),
            inbox,
            ctx,
        };
        tokio::spawn(worker.run())
    }

    async fn run(mut self) {
        self.announce().await;
        while let Some(input) = self.inbox.recv().await {
            if let Some(reason) = self.apply(input).await {
                self.teardown(reason).await;
                return;
            }
        }
    }

    async fn announce(&mut self) {
        let Some(host) = self.session.host() else {
            return;
        };
        let event = match self.mint(TokenSubject::Host) {
            Ok(host_token) => ServerEvent::SessionCreated {
                session_id: self.code().clone(),
                quiz_title: self.session.quiz_title().to_string(),
                question_count: self.session.question_count(),
                host_token,
            },
            Err(error) => ServerEvent::Error(error.into()),
        };
        self.send(host, event).await;
        info!(
            session = %self.code(),
            questions = self.session.question_count(),
            "session created"
        );
    }

    fn code(&self) -> &SessionCode {
        self.session.code()
    }

    fn mint(&self, subject: TokenSubject) -> Result<String, SessionError> {
        self.ctx
            .tokens
            .mint(self.session.code(), self.session.instance(), subject)
            .map_err(|e| SessionError::Internal(e.to_string()))
    }

    fn verify(&self, token: &str, subject: TokenSubject) -> Result<(), SessionError> {
        self.ctx
            .tokens
            .verify(token, self.session.code(), self.session.instance(), subject)
            .map_err(|e| SessionError::RejoinRejected(e.to_string()))
    }

    async fn send(&self, connection: ConnectionId, event: ServerEvent) {
        if let Err(error) = self.ctx.registry.send(connection, &event).await {
            warn!(session = %self.code(), %connection, %error, "dropped outbound event");
        }
    }

    async fn reply_error(&self, connection: ConnectionId, error: SessionError) {
        debug!(session = %self.code(), %connection, %error, "command rejected");
        self.send(connection, ServerEvent::Error(error.into())).await;
    }

    async fn publish(&self, transition: Transition) {
        let deliveries = broadcaster::plan(&self.session, &transition, Instant::now());
        broadcaster::deliver(&self.ctx.registry, deliveries).await;
    }

    async fn apply(&mut self, input: SessionInput) -> Option<EndReason> {
        match input {
            SessionInput::Command {
                connection,
                command,
            } => match self.handle_command(connection, command).await {
                Ok(end) => end,
                Err(error) => {
                    self.reply_error(connection, error).await;
                    None
                }
            },
            SessionInput::ConnectionLost { connection } => {
                self.connection_lost(connection).await;
                None
            }
            SessionInput::Timer(signal) => self.on_timer(signal).await,
            SessionInput::Shutdown { reason } => Some(reason),
        }
    }

    async fn handle_command(
        &mut self,
        connection: ConnectionId,
        command: SessionCommand,
    ) -> Result<Option<EndReason>, SessionError> {
        match command {
            SessionCommand::Join { name } => self.join(connection, &name).await?,
            SessionCommand::Rejoin { player_id, token } => {
                self.rejoin(connection, player_id, &token).await?
            }
            SessionCommand::RejoinHost { token } => self.rejoin_host(connection, &token).await?,
            SessionCommand::Start => {
                let now = Instant::now();
                self.session.start(connection, now)?;
                self.round_opened(0, now).await;
            }
            SessionCommand::Submit { option_index } => {
                let outcome = match self.session.submit(connection, option_index, Instant::now()) {
                    Ok(outcome) => outcome,
                    Err(error) => {
                        self.send(connection, ServerEvent::AnswerAck { accepted: false })
                            .await;
                        return Err(error);
                    }
                };
                self.send(connection, ServerEvent::AnswerAck { accepted: true })
                    .await;
                self.publish(Transition::AnswerRecorded(outcome.round)).await;
                if outcome.all_answered {
                    self.close_round(outcome.round).await;
                }
            }
            SessionCommand::Leave => {
                match self.session.disconnect(connection, Instant::now()) {
                    Some(Departure::Host) => return Ok(Some(EndReason::HostLeft)),
                    Some(Departure::Player(player_id)) => {
                        self.ctx.registry.release(connection).await;
                        info!(session = %self.code(), %player_id, "player left");
                        self.player_gone(player_id).await;
                    }
                    None => {
                        return Err(SessionError::unauthorized(
                            "connection is not part of this session",
                        ))
                    }
                }
            }
        }
        Ok(None)
    }

    fn ensure_unseated(&self, connection: ConnectionId) -> Result<(), SessionError> {
        if self.session.host() == Some(connection)
            || self.session.player_by_connection(connection).is_some()
        {
            return Err(SessionError::AlreadyInSession(self.code().clone()));
        }
        Ok(())
    }

    async fn join(&mut self, connection: ConnectionId, name: &str) -> Result<(), SessionError> {
        self.ensure_unseated(connection)?;
        let player_id = self.session.next_player_id();
        let code = self.code().clone();
        self.ctx
            .registry
            .bind(connection, &code, ConnectionRole::Player(player_id))
            .await?;
        if let Err(error) = self.session.admit(connection, name) {
            self.ctx.registry.release(connection).await;
            return Err(error);
        }

        let rejoin_token = self.mint(TokenSubject::Player(player_id))?;
        self.send(
            connection,
            ServerEvent::JoinAccepted {
                session_id: code.clone(),
                player_id,
                rejoin_token,
            },
        )
        .await;
        self.publish(Transition::PlayerJoined(player_id)).await;
        for event in broadcaster::resync_player(&self.session, Instant::now()) {
            self.send(connection, event).await;
        }
        info!(session = %code, %player_id, "player joined");
        Ok(())
    }

    async fn rejoin(
        &mut self,
        connection: ConnectionId,
        player_id: PlayerId,
        token: &str,
    ) -> Result<(), SessionError> {
        self.verify(token, TokenSubject::Player(player_id))?;
        match self.session.player_by_connection(connection) {
            Some(player) if player.id == player_id => {}
            Some(_) => return Err(SessionError::AlreadyInSession(self.code().clone())),
            None if self.session.host() == Some(connection) => {
                return Err(SessionError::AlreadyInSession(self.code().clone()))
            }
            None => {}
        }

        let code = self.code().clone();
        self.ctx
            .registry
            .bind(connection, &code, ConnectionRole::Player(player_id))
            .await?;
        let previous = match self.session.rejoin(connection, player_id) {
            Ok(previous) => previous,
            Err(error) => {
                self.ctx.registry.release(connection).await;
                return Err(error);
            }
        };
        if let Some(previous) = previous.filter(|&p| p != connection) {
            self.displace(previous, "player reconnected from another connection")
                .await;
        }

        let rejoin_token = self.mint(TokenSubject::Player(player_id))?;
        let Some(player) = self.session.player(player_id) else {
            return Err(SessionError::Internal(format!("player {player_id} vanished")));
        };
        let answered_current = match self.session.phase() {
            Phase::RoundActive(round) => player.answers.contains_key(&round),
            _ => false,
        };
        let event = ServerEvent::Rejoined {
            session_id: code.clone(),
            player_id,
            name: player.name.clone(),
            score: player.score,
            answered_current,
            rejoin_token,
        };
        self.send(connection, event).await;
        for event in broadcaster::resync_player(&self.session, Instant::now()) {
            self.send(connection, event).await;
        }
        self.publish(Transition::PlayerStatus(player_id)).await;
        info!(session = %code, %player_id, "player rejoined");
        Ok(())
    }

    async fn rejoin_host(&mut self, connection: ConnectionId, token: &str) -> Result<(), SessionError> {
        self.verify(token, TokenSubject::Host)?;
        if self.session.player_by_connection(connection).is_some() {
            return Err(SessionError::AlreadyInSession(self.code().clone()));
        }

        let code = self.code().clone();
        self.ctx
            .registry
            .bind(connection, &code, ConnectionRole::Host)
            .await?;
        let previous = match self.session.reclaim_host(connection) {
            Ok(previous) => previous,
            Err(error) => {
                self.ctx.registry.release(connection).await;
                return Err(error);
            }
        };
        if let Some(previous) = previous.filter(|&p| p != connection) {
            self.displace(previous, "host reconnected from another connection")
                .await;
        }
        self.scheduler.cancel_host_grace();

        let host_token = self.mint(TokenSubject::Host)?;
        self.send(
            connection,
            ServerEvent::HostRejoined {
                session_id: code.clone(),
                host_token,
            },
        )
        .await;
        for event in broadcaster::resync_host(&self.session, Instant::now()) {
            self.send(connection, event).await;
        }
        self.publish(Transition::HostStatus {
            connected: true,
            grace: None,
        })
        .await;
        info!(session = %code, %connection, "host reclaimed session");
        Ok(())
    }

    async fn displace(&self, previous: ConnectionId, reason: &str) {
        self.reply_error(previous, SessionError::RejoinRejected(reason.to_string()))
            .await;
        self.ctx.registry.release(previous).await;
    }

    async fn connection_lost(&mut self, connection: ConnectionId) {
        match self.session.disconnect(connection, Instant::now()) {
            Some(Departure::Host) => {
                let grace = self.ctx.config.host_grace();
                self.scheduler.arm_host_grace(grace);
                info!(session = %self.code(), ?grace, "host disconnected");
                self.publish(Transition::HostStatus {
                    connected: false,
                    grace: Some(grace),
                })
                .await;
            }
            Some(Departure::Player(player_id)) => {
                info!(session = %self.code(), %player_id, "player disconnected");
                self.player_gone(player_id).await;
            }
            None => debug!(session = %self.code(), %connection, "unknown connection lost"),
        }
    }

    async fn player_gone(&mut self, player_id: PlayerId) {
        self.publish(Transition::PlayerStatus(player_id)).await;
        if let Phase::RoundActive(round) = self.session.phase() {
            if self.session.all_connected_answered(round) {
                self.close_round(round).await;
            }
        }
    }

    async fn round_opened(&mut self, round: usize, now: Instant) {
        self.scheduler.arm_round(
            self.session.remaining(now),
            TimerSignal::RoundDeadline { round },
        );
        info!(session = %self.code(), round, "round started");
        self.publish(Transition::RoundStarted(round)).await;
    }

    async fn close_round(&mut self, round: usize) {
        if !self.session.close_round(round) {
            return;
        }
        self.scheduler.arm_round(
            self.ctx.config.reveal_interval(),
            TimerSignal::RevealElapsed { round },
        );
        info!(session = %self.code(), round, "round closed");
        self.publish(Transition::RoundEnded(round)).await;
    }

    async fn on_timer(&mut self, signal: TimerSignal) -> Option<EndReason> {
        match signal {
            TimerSignal::RoundDeadline { round } => {
                if self.session.phase() == Phase::RoundActive(round) {
                    self.close_round(round).await;
                } else {
                    debug!(session = %self.code(), ?signal, "stale timer dropped");
                }
                None
            }
            TimerSignal::RevealElapsed { round } => {
                let now = Instant::now();
                match self.session.advance(round, now) {
                    Some(Phase::RoundActive(next)) => {
                        self.round_opened(next, now).await;
                        None
                    }
                    Some(Phase::Finished) => Some(EndReason::Completed),
                    _ => {
                        debug!(session = %self.code(), ?signal, "stale timer dropped");
                        None
                    }
                }
            }
            TimerSignal::HostGraceElapsed { epoch } => {
                if self.scheduler.is_current_host_epoch(epoch) && self.session.host().is_none() {
                    Some(EndReason::HostTimeout)
                } else {
                    debug!(session = %self.code(), ?signal, "stale timer dropped");
                    None
                }
            }
        }
    }

    async fn teardown(mut self, reason: EndReason) {
        self.session.end();
        self.scheduler.cancel_all();
        let code = self.code().clone();

        let event = ServerEvent::SessionEnded {
            reason,
            leaderboard: self.session.leaderboard(),
        };
        let failed = self
            .ctx
            .registry
            .broadcast(&code, &event, &HashSet::new())
            .await;
        if !failed.is_empty() {
            warn!(session = %code, failed = failed.len(), "session end not delivered to all members");
        }
        let released = self.ctx.registry.release_session(&code).await;
        // Released before the code is free for reuse.
        self.ctx
            .directory
            .remove_if(&code, self.session.instance())
            .await;

        self.inbox.close();
        while let Ok(input) = self.inbox.try_recv() {
            if let SessionInput::Command { connection, .. } = input {
                self.reply_error(connection, SessionError::SessionNotFound(code.clone()))
                    .await;
            }
        }
        info!(session = %code, ?reason, released, "session ended");
    }
}
