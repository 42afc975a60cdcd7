use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::trace;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{Job, JobStatus, JobType};

pub type JobSender = broadcast::Sender<Job>;
pub type JobReceiver = broadcast::Receiver<Job>;

/// In-memory table of job records, keyed by job id.
///
/// The registry is the sole mutation point for job state and serializes
/// updates per job id behind one lock. State only moves forward in the
/// partial order Pending < Running < terminal; no reader ever observes a
/// regression.
#[derive(Clone)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<Uuid, Job>>>,
    events_tx: JobSender,
}

impl JobRegistry {
    pub fn new() -> Self {
        let (events_tx, _) = broadcast::channel(1000);
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            events_tx,
        }
    }

    /// Subscribe to job state snapshots as they change.
    pub fn subscribe(&self) -> JobReceiver {
        self.events_tx.subscribe()
    }

    /// Create a new Pending job. Ids are random v4 UUIDs and never reused;
    /// resubmitting the same logical request always creates a new id.
    pub async fn create(&self, job_type: JobType) -> Job {
        let job = Job {
            id: Uuid::new_v4(),
            job_type,
            status: JobStatus::Pending,
            progress: 0,
            created_at: Utc::now(),
            completed_at: None,
            result: None,
            error: None,
        };

        {
            let mut jobs = self.jobs.write().await;
            jobs.insert(job.id, job.clone());
        }

        let _ = self.events_tx.send(job.clone());
        job
    }

    pub async fn get(&self, id: Uuid) -> Option<Job> {
        let jobs = self.jobs.read().await;
        jobs.get(&id).cloned()
    }

    /// List jobs, newest first, optionally filtered by status.
    pub async fn list(&self, status: Option<JobStatus>, limit: usize) -> Vec<Job> {
        let jobs = self.jobs.read().await;
        let mut listed: Vec<Job> = jobs
            .values()
            .filter(|job| status.map_or(true, |s| job.status == s))
            .cloned()
            .collect();
        listed.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        listed.truncate(limit);
        listed
    }

    /// Remove a job record. Returns false when the id is unknown.
    pub async fn delete(&self, id: Uuid) -> bool {
        let mut jobs = self.jobs.write().await;
        jobs.remove(&id).is_some()
    }

    /// Transition Pending -> Running. Idempotent for an already Running job;
    /// transitioning out of a terminal state is a programming error.
    pub async fn mark_running(&self, id: Uuid) -> Result<(), AppError> {
        let updated = {
            let mut jobs = self.jobs.write().await;
            let job = jobs
                .get_mut(&id)
                .ok_or_else(|| AppError::not_found("job", id))?;

            match job.status {
                JobStatus::Pending => {
                    job.status = JobStatus::Running;
                    job.progress = 0;
                }
                JobStatus::Running => return Ok(()),
                _ => {
                    return Err(AppError::internal(format!(
                        "job {} is already terminal",
                        id
                    )))
                }
            }
            job.clone()
        };

        let _ = self.events_tx.send(updated);
        Ok(())
    }

    /// Record a progress percentage for a Running job.
    ///
    /// Progress is monotonically non-decreasing: a later update carrying a
    /// smaller value than already observed is ignored, which tolerates
    /// last-write races among internal workers. Updates for unknown or
    /// non-Running jobs are dropped silently since workers may still report
    /// after a delete.
    pub async fn update_progress(&self, id: Uuid, percent: u8) {
        let updated = {
            let mut jobs = self.jobs.write().await;
            let Some(job) = jobs.get_mut(&id) else {
                trace!("Dropping progress update for unknown job {}", id);
                return;
            };
            if job.status != JobStatus::Running {
                return;
            }
            let percent = percent.min(100);
            if percent <= job.progress {
                return;
            }
            job.progress = percent;
            job.clone()
        };

        let _ = self.events_tx.send(updated);
    }

    /// Transition Running -> Completed, populating the result payload.
    pub async fn complete(&self, id: Uuid, result: Value) -> Result<(), AppError> {
        self.finish(id, |job| {
            job.status = JobStatus::Completed;
            job.progress = 100;
            job.result = Some(result);
        })
        .await
    }

    /// Transition Running -> Failed, populating a human-readable cause.
    pub async fn fail(&self, id: Uuid, error: String) -> Result<(), AppError> {
        self.finish(id, |job| {
            job.status = JobStatus::Failed;
            job.error = Some(error);
        })
        .await
    }

    async fn finish<F: FnOnce(&mut Job)>(&self, id: Uuid, apply: F) -> Result<(), AppError> {
        let updated = {
            let mut jobs = self.jobs.write().await;
            let job = jobs
                .get_mut(&id)
                .ok_or_else(|| AppError::not_found("job", id))?;

            if job.status.is_terminal() {
                return Err(AppError::internal(format!(
                    "job {} is already terminal",
                    id
                )));
            }

            apply(job);
            job.completed_at = Some(Utc::now());
            job.clone()
        };

        let _ = self.events_tx.send(updated);
        Ok(())
    }

    /// Drop terminal jobs older than the retention window. In-progress jobs
    /// are always kept.
    pub async fn cleanup_completed(&self, max_age_hours: i64) {
        let cutoff = Utc::now() - chrono::Duration::hours(max_age_hours);

        let mut jobs = self.jobs.write().await;
        jobs.retain(|_, job| match job.completed_at {
            Some(completed_at) => completed_at > cutoff,
            None => true,
        });
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Progress reporting handle given to a pipeline executor for one job.
#[derive(Clone)]
pub struct ProgressHandle {
    registry: JobRegistry,
    job_id: Uuid,
}

impl ProgressHandle {
    pub fn new(registry: JobRegistry, job_id: Uuid) -> Self {
        Self { registry, job_id }
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub async fn report(&self, percent: u8) {
        self.registry.update_progress(self.job_id, percent).await;
    }
}
