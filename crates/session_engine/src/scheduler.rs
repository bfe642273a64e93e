use std::time::Duration;

use tokio::{sync::mpsc::UnboundedSender, task::JoinHandle, time};
use tracing::debug;

use crate::worker::SessionInput;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerSignal {
    RoundDeadline { round: usize },
    RevealElapsed { round: usize },
    HostGraceElapsed { epoch: u64 },
}

struct Armed {
    signal: TimerSignal,
    task: JoinHandle<()>,
}

impl Armed {
    fn cancel(self) {
        self.task.abort();
    }
}

/// Per-session timers. Expiry only enqueues a signal into the session's own
/// queue; the session decides whether the signal still applies.
pub struct RoundScheduler {
    inbox: UnboundedSender<SessionInput>,
    round_timer: Option<Armed>,
    host_timer: Option<Armed>,
    host_epoch: u64,
}

impl RoundScheduler {
    pub fn new(inbox: UnboundedSender<SessionInput>) -> Self {
        Self {
            inbox,
            round_timer: None,
            host_timer: None,
            host_epoch: 0,
        }
    }

    fn spawn(&self, after: Duration, signal: TimerSignal) -> Armed {
        let inbox = self.inbox.clone();
        let task = tokio::spawn(async move {
            time::sleep(after).await;
            if inbox.send(SessionInput::Timer(signal)).is_err() {
                debug!(?signal, "session gone before timer fired");
            }
        });
        Armed { signal, task }
    }

    pub fn arm_round(&mut self, after: Duration, signal: TimerSignal) {
        let armed = self.spawn(after, signal);
        if let Some(previous) = self.round_timer.replace(armed) {
            previous.cancel();
        }
    }

    pub fn cancel_round(&mut self) {
        if let Some(armed) = self.round_timer.take() {
            armed.cancel();
        }
    }

    pub fn armed_round_signal(&self) -> Option<TimerSignal> {
        self.round_timer.as_ref().map(|armed| armed.signal)
    }

    pub fn arm_host_grace(&mut self, after: Duration) -> u64 {
        self.host_epoch += 1;
        let armed = self.spawn(
            after,
            TimerSignal::HostGraceElapsed {
                epoch: self.host_epoch,
            },
        );
        if let Some(previous) = self.host_timer.replace(armed) {
            previous.cancel();
        }
        self.host_epoch
    }

    /// Cancels the grace window; a signal already queued becomes stale.
    pub fn cancel_host_grace(&mut self) {
        self.host_epoch += 1;
        if let Some(armed) = self.host_timer.take() {
            armed.cancel();
        }
    }

    pub fn is_current_host_epoch(&self, epoch: u64) -> bool {
        self.host_timer.is_some() && epoch == self.host_epoch
    }

    pub fn cancel_all(&mut self) {
        self.cancel_round();
        self.cancel_host_grace();
    }
}

impl Drop for RoundScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
#[path = "tests/scheduler_tests.rs"]
mod tests;
