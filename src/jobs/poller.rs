//! Client-side status polling
//!
//! A watch is an explicit cancellable repeating task rather than an
//! uncontrolled recurring callback: the returned handle stops the timer, and
//! a cancelled watch never invokes a callback afterwards. Any number of
//! independent watchers may observe the same job id concurrently.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::Job;

use super::registry::JobRegistry;

/// Where a poller reads job state from. Implemented by the in-process
/// registry; an HTTP client can implement it for remote dashboards.
#[async_trait]
pub trait JobLookup: Send + Sync + 'static {
    async fn lookup(&self, id: Uuid) -> Result<Job, AppError>;
}

#[async_trait]
impl JobLookup for JobRegistry {
    async fn lookup(&self, id: Uuid) -> Result<Job, AppError> {
        self.get(id)
            .await
            .ok_or_else(|| AppError::not_found("job", id))
    }
}

/// Handle for one active watch. Dropping the handle cancels the watch.
pub struct WatchHandle {
    cancel_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl WatchHandle {
    /// Stop watching. No callback fires after this returns.
    pub fn cancel(self) {
        let _ = self.cancel_tx.send(true);
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Typical poll interval for a single job.
pub const DEFAULT_JOB_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Typical refresh interval for the aggregate dashboard view.
pub const DEFAULT_DASHBOARD_POLL_INTERVAL: Duration = Duration::from_secs(5);

pub struct StatusPoller;

impl StatusPoller {
    /// Repeatedly query `lookup` for `id` every `interval` until the job
    /// reaches a terminal state, then invoke `on_terminal` exactly once and
    /// stop. If the query itself fails, invoke `on_error` exactly once and
    /// stop; a poller never silently continues after an error.
    pub fn watch<L, F, E>(
        lookup: Arc<L>,
        id: Uuid,
        interval: Duration,
        on_terminal: F,
        on_error: E,
    ) -> WatchHandle
    where
        L: JobLookup,
        F: FnOnce(Job) + Send + 'static,
        E: FnOnce(AppError) + Send + 'static,
    {
        let (cancel_tx, mut cancel_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            let mut on_terminal = Some(on_terminal);
            let mut on_error = Some(on_error);

            loop {
                tokio::select! {
                    // Fires on cancel() and when the handle is dropped.
                    _ = cancel_rx.changed() => return,
                    _ = ticker.tick() => {
                        match lookup.lookup(id).await {
                            Ok(job) if job.status.is_terminal() => {
                                if let Some(callback) = on_terminal.take() {
                                    callback(job);
                                }
                                return;
                            }
                            Ok(_) => {}
                            Err(err) => {
                                if let Some(callback) = on_error.take() {
                                    callback(err);
                                }
                                return;
                            }
                        }
                    }
                }
            }
        });

        WatchHandle { cancel_tx, task }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobType;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn watch_fires_terminal_callback_once() {
        let registry = Arc::new(JobRegistry::new());
        let job = registry.create(JobType::Clean).await;
        registry.mark_running(job.id).await.unwrap();
        registry
            .complete(job.id, serde_json::json!({"done": true}))
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = StatusPoller::watch(
            registry,
            job.id,
            Duration::from_millis(10),
            move |job| {
                tx.send(job).unwrap();
            },
            |_| panic!("query should not fail"),
        );

        let observed = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(observed.status.is_terminal());

        // Callback is FnOnce; the task must be done and nothing else arrives.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.is_finished());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn watch_reports_lookup_failure() {
        let registry = Arc::new(JobRegistry::new());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let _handle = StatusPoller::watch(
            registry,
            Uuid::new_v4(),
            Duration::from_millis(10),
            |_| panic!("unknown job cannot complete"),
            move |err| {
                tx.send(err.to_string()).unwrap();
            },
        );

        let message = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(message.contains("Not found"));
    }

    #[tokio::test]
    async fn cancelled_watch_never_invokes_callback() {
        let registry = Arc::new(JobRegistry::new());
        let job = registry.create(JobType::Scrape).await;
        registry.mark_running(job.id).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = StatusPoller::watch(
            registry.clone(),
            job.id,
            Duration::from_millis(10),
            move |job: Job| {
                tx.send(job).unwrap();
            },
            |_| panic!("query should not fail"),
        );

        handle.cancel();
        registry
            .complete(job.id, serde_json::json!({}))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn independent_watchers_do_not_interfere() {
        let registry = Arc::new(JobRegistry::new());
        let job = registry.create(JobType::Discover).await;
        registry.mark_running(job.id).await.unwrap();
        registry
            .complete(job.id, serde_json::json!({}))
            .await
            .unwrap();

        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let _a = StatusPoller::watch(
            registry.clone(),
            job.id,
            Duration::from_millis(10),
            move |job| {
                tx_a.send(job.id).unwrap();
            },
            |_| {},
        );
        let _b = StatusPoller::watch(
            registry,
            job.id,
            Duration::from_millis(10),
            move |job| {
                tx_b.send(job.id).unwrap();
            },
            |_| {},
        );

        let seen_a = tokio::time::timeout(Duration::from_secs(1), rx_a.recv())
            .await
            .unwrap()
            .unwrap();
        let seen_b = tokio::time::timeout(Duration::from_secs(1), rx_b.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(seen_a, job.id);
        assert_eq!(seen_b, job.id);
    }
}
