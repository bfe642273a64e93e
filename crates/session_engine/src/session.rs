use std::{
    collections::{BTreeMap, HashMap},
    time::Duration,
};

use shared::{
    domain::{ConnectionId, PlayerId, QuestionDefinition, QuizDefinition, SessionCode},
    error::SessionError,
    protocol::{PlayerResult, RankedPlayer, ServerEvent},
};
use tokio::time::Instant;
use uuid::Uuid;

use crate::scoring::ScoringRules;

pub const MAX_NAME_CHARS: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub prompt: String,
    pub options: Vec<String>,
    pub correct_index: usize,
    pub duration: Duration,
}

impl From<QuestionDefinition> for Question {
    fn from(value: QuestionDefinition) -> Self {
        Self {
            prompt: value.prompt,
            options: value.options,
            correct_index: value.correct_index,
            duration: Duration::from_millis(value.duration_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Lobby,
    RoundActive(usize),
    RoundReveal(usize),
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerRecord {
    pub option_index: usize,
    pub latency: Duration,
    pub correct: bool,
    /// Filled in when the round closes.
    pub points: u64,
}

#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub score: u64,
    pub answers: BTreeMap<usize, AnswerRecord>,
    pub connection: Option<ConnectionId>,
    pub disconnected_at: Option<Instant>,
}

impl Player {
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Departure {
    Host,
    Player(PlayerId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub round: usize,
    pub all_answered: bool,
}

/// State of one live quiz. Every mutation goes through the owning worker, so
/// nothing here is shared or locked.
#[derive(Debug)]
pub struct Session {
    code: SessionCode,
    instance: Uuid,
    quiz_title: String,
    questions: Vec<Question>,
    phase: Phase,
    round_started_at: Option<Instant>,
    players: HashMap<PlayerId, Player>,
    host: Option<ConnectionId>,
    host_lost_at: Option<Instant>,
    next_player_id: u64,
    scoring: ScoringRules,
    max_players: usize,
}

impl Session {
    pub fn new(
        code: SessionCode,
        quiz: QuizDefinition,
        host: ConnectionId,
        scoring: ScoringRules,
        max_players: usize,
    ) -> Self {
        Self {
            code,
            instance: Uuid::new_v4(),
            quiz_title: quiz.title,
            questions: quiz.questions.into_iter().map(Question::from).collect(),
            phase: Phase::Lobby,
            round_started_at: None,
            players: HashMap::new(),
            host: Some(host),
            host_lost_at: None,
            next_player_id: 1,
            scoring,
            max_players,
        }
    }

    pub fn code(&self) -> &SessionCode {
        &self.code
    }

    pub fn instance(&self) -> Uuid {
        self.instance
    }

    pub fn quiz_title(&self) -> &str {
        &self.quiz_title
    }

    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    pub fn question(&self, round: usize) -> Option<&Question> {
        self.questions.get(round)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Finished
    }

    pub fn host(&self) -> Option<ConnectionId> {
        self.host
    }

    pub fn host_lost_at(&self) -> Option<Instant> {
        self.host_lost_at
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn players(&self) -> Vec<&Player> {
        let mut players: Vec<_> = self.players.values().collect();
        players.sort_by_key(|p| p.id);
        players
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn player_by_connection(&self, connection: ConnectionId) -> Option<&Player> {
        self.players
            .values()
            .find(|p| p.connection == Some(connection))
    }

    pub fn player_connections(&self) -> Vec<ConnectionId> {
        self.players()
            .into_iter()
            .filter_map(|p| p.connection)
            .collect()
    }

    pub fn next_player_id(&self) -> PlayerId {
        PlayerId(self.next_player_id)
    }

    pub fn deadline(&self) -> Option<Instant> {
        let Phase::RoundActive(round) = self.phase else {
            return None;
        };
        Some(self.round_started_at? + self.questions.get(round)?.duration)
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.deadline()
            .map(|deadline| deadline.saturating_duration_since(now))
            .unwrap_or_default()
    }

    pub fn admit(
        &mut self,
        connection: ConnectionId,
        name: &str,
    ) -> Result<PlayerId, SessionError> {
        if self.is_finished() {
            return Err(SessionError::invalid_state("session has finished"));
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(SessionError::InvalidName("player name must not be empty".into()));
        }
        if name.chars().count() > MAX_NAME_CHARS {
            return Err(SessionError::InvalidName(format!(
                "player name must be at most {MAX_NAME_CHARS} characters"
            )));
        }
        if self.players.len() >= self.max_players {
            return Err(SessionError::SessionFull(self.code.clone()));
        }

        let id = PlayerId(self.next_player_id);
        self.next_player_id += 1;
        self.players.insert(
            id,
            Player {
                id,
                name: name.to_string(),
                score: 0,
                answers: BTreeMap::new(),
                connection: Some(connection),
                disconnected_at: None,
            },
        );
        Ok(id)
    }

    /// Rebinds an existing player to a new connection, returning the
    /// connection it displaced.
    pub fn rejoin(
        &mut self,
        connection: ConnectionId,
        player_id: PlayerId,
    ) -> Result<Option<ConnectionId>, SessionError> {
        if self.is_finished() {
            return Err(SessionError::invalid_state("session has finished"));
        }
        let player = self
            .players
            .get_mut(&player_id)
            .ok_or_else(|| SessionError::RejoinRejected(format!("no player {player_id}")))?;
        player.disconnected_at = None;
        Ok(player.connection.replace(connection))
    }

    pub fn reclaim_host(
        &mut self,
        connection: ConnectionId,
    ) -> Result<Option<ConnectionId>, SessionError> {
        if self.is_finished() {
            return Err(SessionError::invalid_state("session has finished"));
        }
        self.host_lost_at = None;
        Ok(self.host.replace(connection))
    }

    pub fn start(&mut self, connection: ConnectionId, now: Instant) -> Result<(), SessionError> {
        if self.host != Some(connection) {
            return Err(SessionError::unauthorized("only the host can start the quiz"));
        }
        if self.phase != Phase::Lobby {
            return Err(SessionError::invalid_state("quiz has already started"));
        }
        if self.players.is_empty() {
            return Err(SessionError::invalid_state(
                "at least one player must join before starting",
            ));
        }
        self.begin_round(0, now);
        Ok(())
    }

    fn begin_round(&mut self, round: usize, now: Instant) {
        self.phase = Phase::RoundActive(round);
        self.round_started_at = Some(now);
    }

    pub fn submit(
        &mut self,
        connection: ConnectionId,
        option_index: usize,
        now: Instant,
    ) -> Result<SubmitOutcome, SessionError> {
        let player_id = self
            .player_by_connection(connection)
            .map(|p| p.id)
            .ok_or_else(|| SessionError::unauthorized("only players can submit answers"))?;
        let Phase::RoundActive(round) = self.phase else {
            return Err(SessionError::invalid_state("no round is accepting answers"));
        };
        let (Some(started_at), Some(question)) = (self.round_started_at, self.questions.get(round))
        else {
            return Err(SessionError::Internal(format!("round {round} has no question")));
        };
        if now >= started_at + question.duration {
            return Err(SessionError::invalid_state(format!(
                "round {round} deadline has passed"
            )));
        }
        let options = question.options.len();
        let correct = option_index == question.correct_index;

        let player = self
            .players
            .get_mut(&player_id)
            .ok_or_else(|| SessionError::Internal(format!("player {player_id} vanished")))?;
        if player.answers.contains_key(&round) {
            return Err(SessionError::DuplicateSubmission { round });
        }
        if option_index >= options {
            return Err(SessionError::InvalidAnswer {
                option: option_index,
                options,
            });
        }
        player.answers.insert(
            round,
            AnswerRecord {
                option_index,
                latency: now.saturating_duration_since(started_at),
                correct,
                points: 0,
            },
        );

        Ok(SubmitOutcome {
            round,
            all_answered: self.all_connected_answered(round),
        })
    }

    /// Scores the round and moves to reveal. Returns false when the round is
    /// not the active one, so a second close is a no-op.
    pub fn close_round(&mut self, round: usize) -> bool {
        if self.phase != Phase::RoundActive(round) {
            return false;
        }
        let Some(duration) = self.questions.get(round).map(|q| q.duration) else {
            return false;
        };
        for player in self.players.values_mut() {
            if let Some(record) = player.answers.get_mut(&round) {
                record.points = self.scoring.points(record.correct, record.latency, duration);
                player.score += record.points;
            }
        }
        self.phase = Phase::RoundReveal(round);
        true
    }

    pub fn advance(&mut self, round: usize, now: Instant) -> Option<Phase> {
        if self.phase != Phase::RoundReveal(round) {
            return None;
        }
        if round + 1 < self.questions.len() {
            self.begin_round(round + 1, now);
        } else {
            self.phase = Phase::Finished;
            self.round_started_at = None;
        }
        Some(self.phase)
    }

    /// Unbinds whoever holds `connection`; players keep their record.
    pub fn disconnect(&mut self, connection: ConnectionId, now: Instant) -> Option<Departure> {
        if self.host == Some(connection) {
            self.host = None;
            self.host_lost_at = Some(now);
            return Some(Departure::Host);
        }
        let player = self
            .players
            .values_mut()
            .find(|p| p.connection == Some(connection))?;
        player.connection = None;
        player.disconnected_at = Some(now);
        Some(Departure::Player(player.id))
    }

    pub fn end(&mut self) {
        self.phase = Phase::Finished;
        self.round_started_at = None;
    }

    /// True when at least one player is connected and every connected player
    /// answered `round`.
    pub fn all_connected_answered(&self, round: usize) -> bool {
        let mut connected = self.players.values().filter(|p| p.is_connected()).peekable();
        connected.peek().is_some() && connected.all(|p| p.answers.contains_key(&round))
    }

    pub fn answer_progress(&self, round: usize) -> (usize, usize) {
        let answered = self
            .players
            .values()
            .filter(|p| p.answers.contains_key(&round))
            .count();
        let connected = self.players.values().filter(|p| p.is_connected()).count();
        (answered, connected)
    }

    pub fn leaderboard(&self) -> Vec<RankedPlayer> {
        let mut players: Vec<_> = self.players.values().collect();
        players.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.id.cmp(&b.id))
        });

        let mut ranked: Vec<RankedPlayer> = Vec::with_capacity(players.len());
        for (index, player) in players.into_iter().enumerate() {
            let rank = match ranked.last() {
                Some(prev) if prev.score == player.score => prev.rank,
                _ => index + 1,
            };
            ranked.push(RankedPlayer {
                rank,
                player_id: player.id,
                name: player.name.clone(),
                score: player.score,
                connected: player.is_connected(),
            });
        }
        ranked
    }

    pub fn round_results(&self, round: usize) -> Vec<PlayerResult> {
        self.players()
            .into_iter()
            .map(|player| {
                let record = player.answers.get(&round);
                PlayerResult {
                    player_id: player.id,
                    name: player.name.clone(),
                    option_index: record.map(|r| r.option_index),
                    correct: record.is_some_and(|r| r.correct),
                    latency_ms: record.map(|r| r.latency.as_millis() as u64),
                    points: record.map_or(0, |r| r.points),
                    total_score: player.score,
                }
            })
            .collect()
    }

    pub fn round_statistics(&self, round: usize) -> Option<ServerEvent> {
        let question = self.questions.get(round)?;
        let mut option_counts = vec![0; question.options.len()];
        let mut answered = 0;
        let mut correct = 0;
        let mut total_latency = Duration::ZERO;
        for record in self.players.values().filter_map(|p| p.answers.get(&round)) {
            if let Some(count) = option_counts.get_mut(record.option_index) {
                *count += 1;
            }
            answered += 1;
            if record.correct {
                correct += 1;
            }
            total_latency += record.latency;
        }
        let average_latency_ms =
            (answered > 0).then(|| (total_latency.as_millis() / answered as u128) as u64);

        Some(ServerEvent::RoundStatistics {
            round_index: round,
            option_counts,
            answered,
            correct,
            players: self.players.len(),
            average_latency_ms,
        })
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
