use std::time::Duration;

use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval_at},
};
use tracing::{debug, info, warn};

use crate::state::{
    match_state::MatchStatus,
    store::{Action, ActionError, MatchStore, Origin, SharedStore},
};

const TICK: Duration = Duration::from_secs(1);

/// Result of one countdown step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The match is not active; nothing changed.
    Idle,
    /// Seconds left after the decrement.
    Running(u32),
    /// The countdown hit zero and the match finished.
    Expired,
}

/// Advance the countdown by one second against the latest stored value.
///
/// The read and the write happen under the store lock, so a concurrent
/// remote override is either fully before or fully after the tick.
pub fn tick(store: &MatchStore) -> TickOutcome {
    let mut outcome = TickOutcome::Idle;
    let result = store.dispatch_from(Origin::Local, |state| {
        if state.status != MatchStatus::Active {
            return Ok::<_, ActionError>(Vec::new());
        }
        let actions = if state.time_remaining_secs > 1 {
            let left = state.time_remaining_secs - 1;
            outcome = TickOutcome::Running(left);
            vec![Action::SetTimeRemaining(left)]
        } else {
            outcome = TickOutcome::Expired;
            vec![
                Action::SetTimeRemaining(0),
                Action::SetStatus(MatchStatus::Finished),
            ]
        };
        Ok(actions)
    });

    if let Err(err) = result {
        warn!(error = %err, "countdown tick rejected");
        return TickOutcome::Idle;
    }
    outcome
}

/// Long-lived countdown task: starts ticking when the match becomes active and
/// stops as soon as it leaves that status. Dropping the handle cancels it.
pub struct MatchTimer {
    handle: JoinHandle<()>,
}

impl MatchTimer {
    /// Start the countdown task on `store`.
    pub fn spawn(store: SharedStore) -> Self {
        Self {
            handle: tokio::spawn(run(store)),
        }
    }
}

impl Drop for MatchTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run(store: SharedStore) {
    let mut status_rx = store.watch();

    loop {
        if status_rx
            .wait_for(|state| state.status == MatchStatus::Active)
            .await
            .is_err()
        {
            return;
        }
        info!("match timer started");

        let mut ticker = interval_at(Instant::now() + TICK, TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => match tick(&store) {
                    TickOutcome::Running(left) => debug!(left, "tick"),
                    TickOutcome::Expired => {
                        info!("time is up; match finished");
                        break;
                    }
                    TickOutcome::Idle => break,
                },
                changed = status_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    if status_rx.borrow_and_update().status != MatchStatus::Active {
                        info!("match timer stopped");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::sleep;

    use super::*;
    use crate::state::match_state::MatchState;

    fn active_store(seconds: u32) -> SharedStore {
        let store = MatchStore::shared(MatchState::with_duration(seconds));
        store
            .dispatch(Action::SetStatus(MatchStatus::Active))
            .unwrap();
        store
    }

    #[test]
    fn tick_is_idle_unless_active() {
        let store = MatchStore::new(MatchState::with_duration(30));
        assert_eq!(tick(&store), TickOutcome::Idle);
        assert_eq!(store.snapshot().time_remaining_secs, 30);
    }

    #[test]
    fn last_tick_finishes_the_match() {
        let store = active_store(2);
        assert_eq!(tick(&store), TickOutcome::Running(1));
        assert_eq!(tick(&store), TickOutcome::Expired);
        let state = store.snapshot();
        assert_eq!(state.time_remaining_secs, 0);
        assert_eq!(state.status, MatchStatus::Finished);
        assert_eq!(tick(&store), TickOutcome::Idle);
    }

    #[test]
    fn expiry_is_one_notification() {
        let store = active_store(1);
        let mut changes = store.subscribe();
        assert_eq!(tick(&store), TickOutcome::Expired);
        let change = changes.try_recv().unwrap();
        assert!(change.fields.status && change.fields.time_remaining);
        assert!(changes.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn counts_down_to_finished() {
        let store = active_store(3);
        let _timer = MatchTimer::spawn(store.clone());

        sleep(Duration::from_millis(1_500)).await;
        assert_eq!(store.snapshot().time_remaining_secs, 2);
        sleep(TICK).await;
        assert_eq!(store.snapshot().time_remaining_secs, 1);
        sleep(TICK).await;
        let state = store.snapshot();
        assert_eq!(state.time_remaining_secs, 0);
        assert_eq!(state.status, MatchStatus::Finished);

        sleep(TICK * 3).await;
        assert_eq!(store.snapshot().time_remaining_secs, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_match_leaves_active() {
        let store = active_store(10);
        let _timer = MatchTimer::spawn(store.clone());

        sleep(Duration::from_millis(1_500)).await;
        assert_eq!(store.snapshot().time_remaining_secs, 9);
        store
            .dispatch(Action::SetStatus(MatchStatus::Finished))
            .unwrap();

        sleep(TICK * 3).await;
        assert_eq!(store.snapshot().time_remaining_secs, 9);
    }

    #[tokio::test(start_paused = true)]
    async fn honours_time_overrides_between_ticks() {
        let store = active_store(600);
        let _timer = MatchTimer::spawn(store.clone());

        sleep(Duration::from_millis(1_500)).await;
        assert_eq!(store.snapshot().time_remaining_secs, 599);
        store
            .dispatch_batch(Origin::Remote, [Action::SetTimeRemaining(100)])
            .unwrap();

        sleep(TICK).await;
        assert_eq!(store.snapshot().time_remaining_secs, 99);
    }

    #[tokio::test(start_paused = true)]
    async fn restarts_for_the_next_round() {
        let store = active_store(10);
        let _timer = MatchTimer::spawn(store.clone());
        sleep(Duration::from_millis(1_500)).await;

        store
            .dispatch_batch(
                Origin::Local,
                [
                    Action::SetStatus(MatchStatus::Waiting),
                    Action::SetTimeRemaining(5),
                ],
            )
            .unwrap();
        sleep(TICK * 2).await;
        assert_eq!(store.snapshot().time_remaining_secs, 5);

        store
            .dispatch(Action::SetStatus(MatchStatus::Active))
            .unwrap();
        sleep(Duration::from_millis(1_500)).await;
        assert_eq!(store.snapshot().time_remaining_secs, 4);
    }
}
