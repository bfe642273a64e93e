use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{QuizId, SessionCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    DecodeError,
    SessionNotFound,
    UnauthorizedRole,
    InvalidStateTransition,
    DuplicateSubmission,
    QuizLoadFailure,
    InvalidAnswer,
    InvalidName,
    RejoinRejected,
    AlreadyInSession,
    SessionFull,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Failure of a single command. Always scoped to the connection that issued it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("malformed frame: {0}")]
    Decode(String),
    #[error("session {0} not found")]
    SessionNotFound(SessionCode),
    #[error("{0}")]
    UnauthorizedRole(String),
    #[error("{0}")]
    InvalidStateTransition(String),
    #[error("answer for round {round} already recorded")]
    DuplicateSubmission { round: usize },
    #[error("failed to load quiz {quiz_id}: {reason}")]
    QuizLoadFailure { quiz_id: QuizId, reason: String },
    #[error("option {option} is out of range for {options} options")]
    InvalidAnswer { option: usize, options: usize },
    #[error("{0}")]
    InvalidName(String),
    #[error("rejoin rejected: {0}")]
    RejoinRejected(String),
    #[error("connection already belongs to session {0}")]
    AlreadyInSession(SessionCode),
    #[error("session {0} is full")]
    SessionFull(SessionCode),
    #[error("internal error: {0}")]
    Internal(String),
}

impl SessionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Decode(_) => ErrorCode::DecodeError,
            Self::SessionNotFound(_) => ErrorCode::SessionNotFound,
            Self::UnauthorizedRole(_) => ErrorCode::UnauthorizedRole,
            Self::InvalidStateTransition(_) => ErrorCode::InvalidStateTransition,
            Self::DuplicateSubmission { .. } => ErrorCode::DuplicateSubmission,
            Self::QuizLoadFailure { .. } => ErrorCode::QuizLoadFailure,
            Self::InvalidAnswer { .. } => ErrorCode::InvalidAnswer,
            Self::InvalidName(_) => ErrorCode::InvalidName,
            Self::RejoinRejected(_) => ErrorCode::RejoinRejected,
            Self::AlreadyInSession(_) => ErrorCode::AlreadyInSession,
            Self::SessionFull(_) => ErrorCode::SessionFull,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::UnauthorizedRole(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidStateTransition(message.into())
    }
}

impl From<SessionError> for ApiError {
    fn from(value: SessionError) -> Self {
        Self {
            code: value.code(),
            message: value.to_string(),
        }
    }
}
