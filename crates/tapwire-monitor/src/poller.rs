//! Adaptive polling scheduler.
//!
//! Polls immediately after a change, then backs off through slower tiers
//! the longer the gateway stays quiet. Quiet time is measured from the
//! last observed change, not from the last poll.

use async_trait::async_trait;
use std::fmt::Display;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTiers {
    /// Delay after a cycle that observed a change
    pub burst: Duration,
    pub short: Duration,
    pub medium: Duration,
    /// Cap for long quiet periods
    pub long: Duration,
    /// Quiet time below which `short` applies
    pub short_window: Duration,
    /// Quiet time below which `medium` applies
    pub medium_window: Duration,
}

impl Default for PollTiers {
    fn default() -> Self {
        Self {
            burst: Duration::from_millis(1_000),
            short: Duration::from_millis(2_000),
            medium: Duration::from_millis(5_000),
            long: Duration::from_millis(10_000),
            short_window: Duration::from_secs(5),
            medium_window: Duration::from_secs(30),
        }
    }
}

impl PollTiers {
    pub fn next_interval(&self, changed: bool, quiet_for: Duration) -> Duration {
        if changed {
            self.burst
        } else if quiet_for < self.short_window {
            self.short
        } else if quiet_for < self.medium_window {
            self.medium
        } else {
            self.long
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollMode {
    /// Refresh even if nothing changed
    pub force: bool,
    /// Failures are not surfaced to the user
    pub silent: bool,
}

impl PollMode {
    pub const INITIAL: PollMode = PollMode {
        force: true,
        silent: false,
    };
    pub const BACKGROUND: PollMode = PollMode {
        force: false,
        silent: true,
    };
}

/// One poll cycle. Returns whether a change was observed.
#[async_trait]
pub trait PollTarget: Send {
    type Error: Display + Send;

    async fn poll(&mut self, mode: PollMode) -> Result<bool, Self::Error>;
}

pub struct PollScheduler<T> {
    target: T,
    tiers: PollTiers,
}

impl<T: PollTarget + 'static> PollScheduler<T> {
    pub fn new(target: T, tiers: PollTiers) -> Self {
        Self { target, tiers }
    }

    /// Start polling on a background task.
    pub fn spawn(self) -> PollHandle<T> {
        let token = CancellationToken::new();
        let task = tokio::spawn(self.run(token.clone()));
        PollHandle {
            token,
            task: Some(task),
        }
    }

    /// Poll until `token` is cancelled, then hand the target back.
    ///
    /// Polls never overlap: the next one is scheduled only after the
    /// previous one has finished.
    pub async fn run(mut self, token: CancellationToken) -> T {
        let mut mode = PollMode::INITIAL;
        let mut last_change = Instant::now();

        loop {
            let outcome = tokio::select! {
                _ = token.cancelled() => break,
                outcome = self.target.poll(mode) => outcome,
            };

            let changed = match outcome {
                Ok(changed) => changed,
                Err(e) if mode.silent => {
                    debug!("Background poll failed: {}", e);
                    false
                }
                Err(e) => {
                    warn!("Poll failed: {}", e);
                    false
                }
            };
            let now = Instant::now();
            if changed {
                last_change = now;
            }
            let delay = self.tiers.next_interval(changed, now - last_change);
            debug!(changed, delay_ms = delay.as_millis() as u64, "Next poll scheduled");

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
            mode = PollMode::BACKGROUND;
        }

        self.target
    }
}

/// Handle to a running scheduler
pub struct PollHandle<T> {
    token: CancellationToken,
    task: Option<JoinHandle<T>>,
}

impl<T> PollHandle<T> {
    /// Cancel the pending timer (or the in-flight poll).
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait for the scheduler to stop and recover its target.
    pub async fn join(mut self) -> Option<T> {
        self.task.take()?.await.ok()
    }
}

impl<T> Drop for PollHandle<T> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Replies with scripted outcomes and records when and how it was polled.
    struct ScriptedTarget {
        script: VecDeque<Result<bool, String>>,
        polls: Arc<Mutex<Vec<(Instant, PollMode)>>>,
    }

    impl ScriptedTarget {
        fn new(script: Vec<Result<bool, String>>) -> (Self, Arc<Mutex<Vec<(Instant, PollMode)>>>) {
            let polls = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    script: script.into(),
                    polls: polls.clone(),
                },
                polls,
            )
        }
    }

    #[async_trait]
    impl PollTarget for ScriptedTarget {
        type Error = String;

        async fn poll(&mut self, mode: PollMode) -> Result<bool, String> {
            self.polls.lock().unwrap().push((Instant::now(), mode));
            self.script.pop_front().unwrap_or(Ok(false))
        }
    }

    fn offsets(polls: &[(Instant, PollMode)], start: Instant) -> Vec<u64> {
        polls
            .iter()
            .map(|(at, _)| (*at - start).as_secs())
            .collect()
    }

    #[test]
    fn test_tier_selection() {
        let tiers = PollTiers::default();
        assert_eq!(tiers.next_interval(true, Duration::from_secs(100)), tiers.burst);
        assert_eq!(tiers.next_interval(false, Duration::ZERO), tiers.short);
        assert_eq!(tiers.next_interval(false, Duration::from_secs(3)), tiers.short);
        assert_eq!(tiers.next_interval(false, Duration::from_secs(5)), tiers.medium);
        assert_eq!(tiers.next_interval(false, Duration::from_secs(29)), tiers.medium);
        assert_eq!(tiers.next_interval(false, Duration::from_secs(40)), tiers.long);
    }

    #[test]
    fn test_long_quiet_polls_less_often() {
        let tiers = PollTiers::default();
        let at_3 = tiers.next_interval(false, Duration::from_secs(3));
        let at_40 = tiers.next_interval(false, Duration::from_secs(40));
        assert!(at_40 > at_3);
        // a change snaps back to the fast tier
        assert!(tiers.next_interval(true, Duration::from_secs(40)) < at_3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_schedule() {
        let (target, polls) = ScriptedTarget::new(vec![Ok(true)]);
        let start = Instant::now();
        let handle = PollScheduler::new(target, PollTiers::default()).spawn();

        tokio::time::sleep(Duration::from_secs(41)).await;
        handle.shutdown();
        handle.join().await.unwrap();

        let polls = polls.lock().unwrap();
        assert_eq!(
            offsets(&polls, start),
            vec![0, 1, 3, 5, 10, 15, 20, 25, 30, 40]
        );
        assert_eq!(polls[0].1, PollMode::INITIAL);
        assert!(polls[1..].iter().all(|(_, mode)| *mode == PollMode::BACKGROUND));
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_resets_to_fast_tier() {
        let mut script = vec![Ok(false); 8];
        script.push(Ok(true));
        // polls at 0, 2, 4, 6, 11, 16, 21, 26 see nothing; 31 sees a change
        let (target, polls) = ScriptedTarget::new(script);
        let start = Instant::now();
        let handle = PollScheduler::new(target, PollTiers::default()).spawn();

        tokio::time::sleep(Duration::from_secs(33)).await;
        handle.shutdown();
        handle.join().await.unwrap();

        let polls = polls.lock().unwrap();
        assert_eq!(
            offsets(&polls, start),
            vec![0, 2, 4, 6, 11, 16, 21, 26, 31, 32]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_keep_polling() {
        let (target, polls) = ScriptedTarget::new(vec![Err("connection refused".to_string()); 10]);
        let handle = PollScheduler::new(target, PollTiers::default()).spawn();

        tokio::time::sleep(Duration::from_secs(10)).await;
        handle.shutdown();
        handle.join().await.unwrap();

        assert!(polls.lock().unwrap().len() >= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_pending_timer() {
        let (target, polls) = ScriptedTarget::new(vec![]);
        let handle = PollScheduler::new(target, PollTiers::default()).spawn();

        tokio::time::sleep(Duration::from_millis(500)).await;
        handle.shutdown();
        assert!(handle.is_shutdown());
        let target = handle.join().await.unwrap();
        assert_eq!(polls.lock().unwrap().len(), 1);
        assert!(target.script.is_empty());
    }
}
