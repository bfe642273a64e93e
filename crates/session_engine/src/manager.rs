use std::{collections::HashMap, sync::Arc};

use quiz_store::{QuizFetchError, QuizSource};
use rand::Rng;
use shared::{
    domain::{ConnectionId, ConnectionRole, QuizId, SessionCode},
    error::SessionError,
    protocol::EndReason,
};
use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    config::EngineConfig,
    registry::ConnectionRegistry,
    rejoin::TokenIssuer,
    session::Session,
    worker::{SessionHandle, SessionInput, SessionWorker, WorkerContext},
};

pub const SESSION_CODE_DIGITS: u32 = 6;

fn random_code() -> SessionCode {
    let upper = 10u32.pow(SESSION_CODE_DIGITS);
    let value = rand::thread_rng().gen_range(0..upper);
    SessionCode(format!("{value:0width$}", width = SESSION_CODE_DIGITS as usize))
}

#[derive(Default)]
pub struct SessionDirectory {
    sessions: RwLock<HashMap<SessionCode, SessionHandle>>,
}

impl SessionDirectory {
    /// Picks a code no live session uses and stores whatever `build` makes
    /// for it, under one lock.
    pub async fn insert_with<T>(
        &self,
        build: impl FnOnce(SessionCode) -> (SessionHandle, T),
    ) -> (SessionHandle, T) {
        let mut sessions = self.sessions.write().await;
        let code = loop {
            let candidate = random_code();
            if !sessions.contains_key(&candidate) {
                break candidate;
            }
        };
        let (handle, extra) = build(code.clone());
        sessions.insert(code, handle.clone());
        (handle, extra)
    }

    pub async fn get(&self, code: &SessionCode) -> Option<SessionHandle> {
        self.sessions.read().await.get(code).cloned()
    }

    pub async fn remove_if(&self, code: &SessionCode, instance: Uuid) -> bool {
        let mut sessions = self.sessions.write().await;
        if sessions.get(code).is_some_and(|h| h.instance() == instance) {
            sessions.remove(code);
            return true;
        }
        false
    }

    pub async fn codes(&self) -> Vec<SessionCode> {
        let mut codes: Vec<_> = self.sessions.read().await.keys().cloned().collect();
        codes.sort();
        codes
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

pub struct SessionManager {
    directory: Arc<SessionDirectory>,
    registry: Arc<ConnectionRegistry>,
    quizzes: Arc<dyn QuizSource>,
    tokens: Arc<TokenIssuer>,
    config: Arc<EngineConfig>,
}

impl SessionManager {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        quizzes: Arc<dyn QuizSource>,
        tokens: Arc<TokenIssuer>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            directory: Arc::new(SessionDirectory::default()),
            registry,
            quizzes,
            tokens,
            config,
        }
    }

    pub fn directory(&self) -> &Arc<SessionDirectory> {
        &self.directory
    }

    pub async fn create(
        &self,
        quiz_id: QuizId,
        host: ConnectionId,
    ) -> Result<SessionCode, SessionError> {
        let quiz = self
            .quizzes
            .fetch_quiz_by_id(quiz_id)
            .await
            .map_err(|error| {
                warn!(%quiz_id, %error, "quiz load failed");
                let reason = match &error {
                    QuizFetchError::NotFound(_) => "quiz does not exist".to_string(),
                    other => other.to_string(),
                };
                SessionError::QuizLoadFailure { quiz_id, reason }
            })?;
        if quiz.questions.is_empty() {
            return Err(SessionError::QuizLoadFailure {
                quiz_id,
                reason: "quiz has no questions".into(),
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let scoring = self.config.scoring;
        let max_players = self.config.max_players_per_session;
        let worker_tx = tx.clone();
        let (handle, session) = self
            .directory
            .insert_with(move |code| {
                let session = Session::new(code.clone(), quiz, host, scoring, max_players);
                (SessionHandle::new(code, session.instance(), tx), session)
            })
            .await;
        let code = handle.code().clone();

        if let Err(error) = self
            .registry
            .bind(host, &code, ConnectionRole::Host)
            .await
        {
            self.directory.remove_if(&code, handle.instance()).await;
            return Err(error);
        }

        SessionWorker::spawn(
            session,
            worker_tx,
            rx,
            WorkerContext {
                registry: Arc::clone(&self.registry),
                directory: Arc::clone(&self.directory),
                tokens: Arc::clone(&self.tokens),
                config: Arc::clone(&self.config),
            },
        );
        info!(session = %code, %quiz_id, %host, "session spawned");
        Ok(code)
    }

    pub async fn lookup(&self, code: &SessionCode) -> Result<SessionHandle, SessionError> {
        self.directory
            .get(code)
            .await
            .filter(|handle| !handle.is_closed())
            .ok_or_else(|| SessionError::SessionNotFound(code.clone()))
    }

    pub async fn destroy(&self, code: &SessionCode, reason: EndReason) -> Result<(), SessionError> {
        let handle = self
            .directory
            .get(code)
            .await
            .ok_or_else(|| SessionError::SessionNotFound(code.clone()))?;
        handle.send(SessionInput::Shutdown { reason })?;
        // The worker frees the code itself once its members are released.
        handle.closed().await;
        Ok(())
    }

    pub async fn live_sessions(&self) -> Vec<SessionCode> {
        self.directory.codes().await
    }

    pub async fn shutdown_all(&self, reason: EndReason) -> usize {
        let codes = self.directory.codes().await;
        let mut stopped = 0;
        for code in codes {
            if self.destroy(&code, reason).await.is_ok() {
                stopped += 1;
            }
        }
        stopped
    }
}

#[cfg(test)]
#[path = "tests/manager_tests.rs"]
mod tests;
