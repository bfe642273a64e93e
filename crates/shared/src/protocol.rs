use serde::{Deserialize, Serialize};

use crate::{
    domain::{PlayerId, QuizDefinition, QuizId, SessionCode},
    error::ApiError,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientCommand {
    CreateSession {
        quiz_id: QuizId,
    },
    JoinSession {
        session_id: SessionCode,
        player_name: String,
    },
    RejoinSession {
        session_id: SessionCode,
        player_id: PlayerId,
        token: String,
    },
    RejoinHost {
        session_id: SessionCode,
        token: String,
    },
    StartQuiz,
    SubmitAnswer {
        option_index: usize,
    },
    LeaveSession,
}

impl ClientCommand {
    /// Wire names of every inbound `type`.
    pub const TYPES: &'static [&'static str] = &[
        "create_session",
        "join_session",
        "rejoin_session",
        "rejoin_host",
        "start_quiz",
        "submit_answer",
        "leave_session",
    ];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerResult {
    pub player_id: PlayerId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option_index: Option<usize>,
    pub correct: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    pub points: u64,
    pub total_score: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedPlayer {
    pub rank: usize,
    pub player_id: PlayerId,
    pub name: String,
    pub score: u64,
    pub connected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Completed,
    HostLeft,
    HostTimeout,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    SessionCreated {
        session_id: SessionCode,
        quiz_title: String,
        question_count: usize,
        host_token: String,
    },
    JoinAccepted {
        session_id: SessionCode,
        player_id: PlayerId,
        rejoin_token: String,
    },
    Rejoined {
        session_id: SessionCode,
        player_id: PlayerId,
        name: String,
        score: u64,
        answered_current: bool,
        rejoin_token: String,
    },
    HostRejoined {
        session_id: SessionCode,
        host_token: String,
    },
    PlayerJoined {
        player_id: PlayerId,
        name: String,
    },
    PlayerStatus {
        player_id: PlayerId,
        connected: bool,
    },
    HostStatus {
        connected: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        grace_ms: Option<u64>,
    },
    RoundStarted {
        round_index: usize,
        question_count: usize,
        question: String,
        options: Vec<String>,
        duration_ms: u64,
        remaining_ms: u64,
    },
    AnswerAck {
        accepted: bool,
    },
    AnswerProgress {
        round_index: usize,
        answered: usize,
        connected: usize,
    },
    RoundEnded {
        round_index: usize,
        correct_option_index: usize,
        results: Vec<PlayerResult>,
    },
    RoundStatistics {
        round_index: usize,
        option_counts: Vec<usize>,
        answered: usize,
        correct: usize,
        players: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        average_latency_ms: Option<u64>,
    },
    Leaderboard {
        players: Vec<RankedPlayer>,
    },
    SessionEnded {
        reason: EndReason,
        leaderboard: Vec<RankedPlayer>,
    },
    Error(ApiError),
}

/// Quiz as shown over HTTP: everything but the answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizOutline {
    pub quiz_id: QuizId,
    pub title: String,
    pub questions: Vec<QuestionOutline>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOutline {
    pub prompt: String,
    pub options: Vec<String>,
    pub duration_ms: u64,
}

impl From<QuizDefinition> for QuizOutline {
    fn from(value: QuizDefinition) -> Self {
        Self {
            quiz_id: value.quiz_id,
            title: value.title,
            questions: value
                .questions
                .into_iter()
                .map(|q| QuestionOutline {
                    prompt: q.prompt,
                    options: q.options,
                    duration_ms: q.duration_ms,
                })
                .collect(),
        }
    }
}
