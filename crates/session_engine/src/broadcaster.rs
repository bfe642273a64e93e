use std::time::Duration;

use shared::{
    domain::{ConnectionId, PlayerId},
    protocol::ServerEvent,
};
use tokio::time::Instant;
use tracing::warn;

use crate::{
    registry::ConnectionRegistry,
    session::{Phase, Session},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    PlayerJoined(PlayerId),
    PlayerStatus(PlayerId),
    AnswerRecorded(usize),
    RoundStarted(usize),
    RoundEnded(usize),
    HostStatus {
        connected: bool,
        grace: Option<Duration>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub connection: ConnectionId,
    pub event: ServerEvent,
}

fn to_all(targets: &[ConnectionId], event: &ServerEvent, out: &mut Vec<Delivery>) {
    out.extend(targets.iter().map(|&connection| Delivery {
        connection,
        event: event.clone(),
    }));
}

fn everyone(session: &Session) -> Vec<ConnectionId> {
    let mut targets = session.player_connections();
    if let Some(host) = session.host() {
        targets.push(host);
    }
    targets
}

fn round_started(session: &Session, round: usize, now: Instant) -> Option<ServerEvent> {
    let question = session.question(round)?;
    Some(ServerEvent::RoundStarted {
        round_index: round,
        question_count: session.question_count(),
        question: question.prompt.clone(),
        options: question.options.clone(),
        duration_ms: question.duration.as_millis() as u64,
        remaining_ms: session.remaining(now).as_millis() as u64,
    })
}

fn round_ended(session: &Session, round: usize) -> Option<ServerEvent> {
    let question = session.question(round)?;
    Some(ServerEvent::RoundEnded {
        round_index: round,
        correct_option_index: question.correct_index,
        results: session.round_results(round),
    })
}

/// Works out who hears about a transition. Pure: nothing is sent here.
pub fn plan(session: &Session, transition: &Transition, now: Instant) -> Vec<Delivery> {
    let mut out = Vec::new();

    match *transition {
        Transition::PlayerJoined(player_id) => {
            if let Some(player) = session.player(player_id) {
                let event = ServerEvent::PlayerJoined {
                    player_id,
                    name: player.name.clone(),
                };
                to_all(&everyone(session), &event, &mut out);
            }
        }
        Transition::PlayerStatus(player_id) => {
            if let (Some(host), Some(player)) = (session.host(), session.player(player_id)) {
                out.push(Delivery {
                    connection: host,
                    event: ServerEvent::PlayerStatus {
                        player_id,
                        connected: player.is_connected(),
                    },
                });
            }
        }
        Transition::AnswerRecorded(round) => {
            if let Some(host) = session.host() {
                let (answered, connected) = session.answer_progress(round);
                out.push(Delivery {
                    connection: host,
                    event: ServerEvent::AnswerProgress {
                        round_index: round,
                        answered,
                        connected,
                    },
                });
            }
        }
        Transition::RoundStarted(round) => {
            if let Some(event) = round_started(session, round, now) {
                to_all(&everyone(session), &event, &mut out);
            }
        }
        Transition::RoundEnded(round) => {
            let targets = everyone(session);
            if let Some(event) = round_ended(session, round) {
                to_all(&targets, &event, &mut out);
            }
            if let (Some(host), Some(stats)) = (session.host(), session.round_statistics(round)) {
                out.push(Delivery {
                    connection: host,
                    event: stats,
                });
            }
            let leaderboard = ServerEvent::Leaderboard {
                players: session.leaderboard(),
            };
            to_all(&targets, &leaderboard, &mut out);
        }
        Transition::HostStatus { connected, grace } => {
            let event = ServerEvent::HostStatus {
                connected,
                grace_ms: grace.map(|g| g.as_millis() as u64),
            };
            to_all(&session.player_connections(), &event, &mut out);
        }
    }

    out
}

pub fn resync_player(session: &Session, now: Instant) -> Vec<ServerEvent> {
    match session.phase() {
        Phase::Lobby => Vec::new(),
        Phase::RoundActive(round) => round_started(session, round, now).into_iter().collect(),
        Phase::RoundReveal(round) => {
            let mut events: Vec<_> = round_ended(session, round).into_iter().collect();
            events.push(ServerEvent::Leaderboard {
                players: session.leaderboard(),
            });
            events
        }
        Phase::Finished => vec![ServerEvent::Leaderboard {
            players: session.leaderboard(),
        }],
    }
}

pub fn resync_host(session: &Session, now: Instant) -> Vec<ServerEvent> {
    let mut events: Vec<ServerEvent> = session
        .players()
        .into_iter()
        .flat_map(|p| {
            [
                ServerEvent::PlayerJoined {
                    player_id: p.id,
                    name: p.name.clone(),
                },
                ServerEvent::PlayerStatus {
                    player_id: p.id,
                    connected: p.is_connected(),
                },
            ]
        })
        .collect();
    match session.phase() {
        Phase::RoundActive(round) => {
            events.extend(round_started(session, round, now));
            let (answered, connected) = session.answer_progress(round);
            events.push(ServerEvent::AnswerProgress {
                round_index: round,
                answered,
                connected,
            });
        }
        Phase::RoundReveal(_) | Phase::Finished => events.push(ServerEvent::Leaderboard {
            players: session.leaderboard(),
        }),
        Phase::Lobby => {}
    }
    events
}

pub async fn deliver(registry: &ConnectionRegistry, deliveries: Vec<Delivery>) -> usize {
    let mut failed = 0;
    for Delivery { connection, event } in deliveries {
        if let Err(error) = registry.send(connection, &event).await {
            failed += 1;
            warn!(%connection, %error, "dropped outbound event");
        }
    }
    failed
}

#[cfg(test)]
#[path = "tests/broadcaster_tests.rs"]
mod tests;
