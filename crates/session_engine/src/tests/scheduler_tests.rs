use super::*;
use tokio::sync::mpsc;

fn timer_signal(input: SessionInput) -> TimerSignal {
    match input {
        SessionInput::Timer(signal) => signal,
        _ => panic!("expected a timer signal"),
    }
}

#[tokio::test(start_paused = true)]
async fn round_timer_enqueues_after_duration() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut scheduler = RoundScheduler::new(tx);

    scheduler.arm_round(
        Duration::from_millis(10_000),
        TimerSignal::RoundDeadline { round: 0 },
    );
    time::sleep(Duration::from_millis(9_999)).await;
    assert!(rx.try_recv().is_err());

    let input = rx.recv().await.expect("signal");
    assert_eq!(timer_signal(input), TimerSignal::RoundDeadline { round: 0 });
}

#[tokio::test(start_paused = true)]
async fn rearming_cancels_previous_round_timer() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut scheduler = RoundScheduler::new(tx);

    scheduler.arm_round(
        Duration::from_millis(1_000),
        TimerSignal::RoundDeadline { round: 0 },
    );
    scheduler.arm_round(
        Duration::from_millis(5_000),
        TimerSignal::RevealElapsed { round: 0 },
    );
    assert_eq!(
        scheduler.armed_round_signal(),
        Some(TimerSignal::RevealElapsed { round: 0 })
    );

    let input = rx.recv().await.expect("signal");
    assert_eq!(timer_signal(input), TimerSignal::RevealElapsed { round: 0 });
    time::sleep(Duration::from_secs(10)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn cancelled_host_grace_makes_epoch_stale() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut scheduler = RoundScheduler::new(tx);

    let first = scheduler.arm_host_grace(Duration::from_secs(30));
    assert!(scheduler.is_current_host_epoch(first));
    scheduler.cancel_host_grace();
    assert!(!scheduler.is_current_host_epoch(first));

    let second = scheduler.arm_host_grace(Duration::from_secs(30));
    assert_ne!(first, second);
    let input = rx.recv().await.expect("signal");
    assert_eq!(
        timer_signal(input),
        TimerSignal::HostGraceElapsed { epoch: second }
    );
    assert!(scheduler.is_current_host_epoch(second));
}

#[tokio::test(start_paused = true)]
async fn dropping_the_scheduler_aborts_timers() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut scheduler = RoundScheduler::new(tx.clone());
    scheduler.arm_round(
        Duration::from_secs(1),
        TimerSignal::RoundDeadline { round: 0 },
    );
    scheduler.arm_host_grace(Duration::from_secs(1));
    drop(scheduler);

    time::sleep(Duration::from_secs(5)).await;
    assert!(rx.try_recv().is_err());
    drop(tx);
}
