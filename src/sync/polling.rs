//! Polling synchronization strategy

use super::error::SyncError;
use super::source::SnapshotSource;
use super::view::ClientView;
use crate::cli::CancellationToken;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Why a sync loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StopReason {
    /// No node in progress any more
    Settled,
    Cancelled,
}

/// Counters from one sync loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub ticks: u32,
    pub replacements: u32,
    pub failures: u32,
    pub stop: StopReason,
}

impl SyncOutcome {
    fn new() -> Self {
        Self {
            ticks: 0,
            replacements: 0,
            failures: 0,
            stop: StopReason::Settled,
        }
    }
}

/// Keeps a client view converging on the authoritative snapshot.
///
/// Implementations decide the transport: timed reads, a push channel, etc.
#[async_trait]
pub trait SyncStrategy: Send + Sync {
    async fn sync(
        &self,
        id: &str,
        source: &dyn SnapshotSource,
        view: &ClientView,
        cancel: CancellationToken,
    ) -> SyncOutcome;
}

/// Re-reads the snapshot at a fixed interval while any node is in progress
#[derive(Debug, Clone)]
pub struct PollingSync {
    interval: Duration,
}

impl PollingSync {
    pub fn new(interval: Duration) -> Result<Self, SyncError> {
        if interval.is_zero() {
            return Err(SyncError::ZeroInterval);
        }
        Ok(Self { interval })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[async_trait]
impl SyncStrategy for PollingSync {
    async fn sync(
        &self,
        id: &str,
        source: &dyn SnapshotSource,
        view: &ClientView,
        mut cancel: CancellationToken,
    ) -> SyncOutcome {
        let mut outcome = SyncOutcome::new();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the held view is already fresh
        ticker.tick().await;

        tracing::info!(
            workflow = id,
            source = %source.describe(),
            interval_ms = self.interval.as_millis() as u64,
            "Polling started"
        );

        loop {
            if !view.is_active() {
                outcome.stop = StopReason::Settled;
                break;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    outcome.stop = StopReason::Cancelled;
                    break;
                }
                _ = ticker.tick() => {}
            }

            outcome.ticks += 1;

            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    outcome.stop = StopReason::Cancelled;
                    break;
                }
                result = source.fetch(id) => result,
            };

            match fetched {
                Ok(snapshot) => {
                    if view.replace_if_changed(snapshot) {
                        outcome.replacements += 1;
                    }
                    tracing::debug!(workflow = id, tick = outcome.ticks, "Poll tick");
                }
                Err(e) => {
                    // Retried on the next tick whatever the cause
                    outcome.failures += 1;
                    tracing::warn!(
                        workflow = id,
                        tick = outcome.ticks,
                        retryable = e.is_retryable(),
                        error = %e,
                        "Snapshot read failed"
                    );
                }
            }
        }

        tracing::info!(
            workflow = id,
            ticks = outcome.ticks,
            replacements = outcome.replacements,
            failures = outcome.failures,
            stop = ?outcome.stop,
            "Polling stopped"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, Node, NodeStatus, Workflow};
    use crate::sync::SyncError;
    use crate::workflow::Snapshot;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays scripted reads, then repeats the last snapshot
    struct ScriptedSource {
        script: Mutex<VecDeque<Result<Snapshot, SyncError>>>,
        last: Mutex<Snapshot>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(initial: Snapshot, script: Vec<Result<Snapshot, SyncError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                last: Mutex::new(initial),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SnapshotSource for ScriptedSource {
        async fn fetch(&self, _id: &str) -> Result<Snapshot, SyncError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Ok(snapshot)) => {
                    *self.last.lock().unwrap() = snapshot.clone();
                    Ok(snapshot)
                }
                Some(Err(e)) => Err(e),
                None => Ok(self.last.lock().unwrap().clone()),
            }
        }

        fn describe(&self) -> String {
            "scripted".into()
        }
    }

    fn with_statuses(start: NodeStatus, a: NodeStatus) -> Snapshot {
        let workflow = Workflow::from_parts(
            "poll",
            vec![
                Node::trigger("start", "Start").with_status(start),
                Node::task("a", "A").with_status(a),
            ],
            vec![Edge::new("start", "a")],
        )
        .unwrap();
        Snapshot::new(workflow)
    }

    fn polling() -> PollingSync {
        PollingSync::new(Duration::from_millis(10)).unwrap()
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = PollingSync::new(Duration::ZERO).unwrap_err();
        assert!(matches!(err, SyncError::ZeroInterval));
        assert!(!err.is_retryable());

        let sync = PollingSync::new(Duration::from_millis(1)).unwrap();
        assert_eq!(sync.interval(), Duration::from_millis(1));
    }

    #[tokio::test]
    async fn test_polling_stops_when_settled() {
        let running = with_statuses(NodeStatus::InProgress, NodeStatus::Pending);
        let advanced = with_statuses(NodeStatus::Completed, NodeStatus::InProgress);
        let finished = with_statuses(NodeStatus::Completed, NodeStatus::Completed);

        let source = ScriptedSource::new(
            running.clone(),
            vec![
                Ok(running.clone()),
                Ok(advanced.clone()),
                Ok(finished.clone()),
            ],
        );
        let view = ClientView::new(running);

        let outcome = polling()
            .sync("wf", &source, &view, CancellationToken::new())
            .await;

        assert_eq!(outcome.stop, StopReason::Settled);
        assert_eq!(outcome.ticks, 3);
        // The identical first read did not count as a replacement
        assert_eq!(outcome.replacements, 2);
        assert_eq!(*view.current(), finished);
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn test_read_failures_are_retried() {
        let running = with_statuses(NodeStatus::InProgress, NodeStatus::Pending);
        let finished = with_statuses(NodeStatus::Completed, NodeStatus::Completed);

        let source = ScriptedSource::new(
            running.clone(),
            vec![
                Err(SyncError::network("connection reset")),
                Err(SyncError::Status {
                    status: 502,
                    body: String::new(),
                }),
                Ok(finished.clone()),
            ],
        );
        let view = ClientView::new(running);

        let outcome = polling()
            .sync("wf", &source, &view, CancellationToken::new())
            .await;

        assert_eq!(outcome.failures, 2);
        assert_eq!(outcome.replacements, 1);
        assert_eq!(outcome.stop, StopReason::Settled);
        assert_eq!(*view.current(), finished);
    }

    #[tokio::test]
    async fn test_inactive_view_does_not_poll() {
        let idle = with_statuses(NodeStatus::Pending, NodeStatus::Pending);
        let source = ScriptedSource::new(idle.clone(), vec![]);
        let view = ClientView::new(idle);

        let outcome = polling()
            .sync("wf", &source, &view, CancellationToken::new())
            .await;

        assert_eq!(outcome.ticks, 0);
        assert_eq!(outcome.stop, StopReason::Settled);
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_stops_polling() {
        let running = with_statuses(NodeStatus::InProgress, NodeStatus::Pending);
        let source = ScriptedSource::new(running.clone(), vec![]);
        let view = ClientView::new(running);

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(35)).await;
            canceller.cancel();
        });

        let outcome = polling().sync("wf", &source, &view, token).await;

        assert_eq!(outcome.stop, StopReason::Cancelled);
        assert!(outcome.ticks >= 1);
        assert_eq!(outcome.replacements, 0);

        // No further reads once the loop has returned
        let calls = source.calls();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(source.calls(), calls);
    }

    #[tokio::test]
    async fn test_already_cancelled() {
        let running = with_statuses(NodeStatus::InProgress, NodeStatus::Pending);
        let source = ScriptedSource::new(running.clone(), vec![]);
        let view = ClientView::new(running);

        let token = CancellationToken::new();
        token.cancel();

        let outcome = polling().sync("wf", &source, &view, token).await;
        assert_eq!(outcome.stop, StopReason::Cancelled);
        assert_eq!(source.calls(), 0);
    }
}
