//! Cancellable delayed and repeating callbacks
//!
//! Timers run as tasks on a shared [`TaskTracker`] so shutdown can wait for
//! them, and each one owns a child [`CancellationToken`] so it can be stopped
//! on its own or together with its parent.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Handle to a spawned timer
#[derive(Debug)]
pub struct TimerHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl TimerHandle {
    /// Stop the timer. A callback already in progress is not interrupted.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Run `callback` once after `delay` unless cancelled first
pub fn spawn_delayed<F>(
    tracker: &TaskTracker,
    parent: &CancellationToken,
    delay: Duration,
    callback: F,
) -> TimerHandle
where
    F: Future<Output = ()> + Send + 'static,
{
    let token = parent.child_token();
    let task_token = token.clone();

    let handle = tracker.spawn(async move {
        tokio::select! {
            _ = task_token.cancelled() => {}
            _ = sleep(delay) => callback.await,
        }
    });

    TimerHandle { token, handle }
}

/// Invoke `on_tick` at `first_tick`, then every `period`, until cancelled
///
/// Ticks that fall due while the runtime is busy are dropped, not replayed.
pub fn spawn_repeating<F>(
    tracker: &TaskTracker,
    parent: &CancellationToken,
    first_tick: Instant,
    period: Duration,
    mut on_tick: F,
) -> TimerHandle
where
    F: FnMut() + Send + 'static,
{
    let token = parent.child_token();
    let task_token = token.clone();

    let handle = tracker.spawn(async move {
        let mut ticker = interval_at(first_tick, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = task_token.cancelled() => break,
                _ = ticker.tick() => on_tick(),
            }
        }
    });

    TimerHandle { token, handle }
}
