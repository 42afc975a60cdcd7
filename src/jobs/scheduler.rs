use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{Job, JobRequest, JobType};
use crate::pipeline::PipelineExecutor;

use super::registry::{JobRegistry, ProgressHandle};

/// Accepts job requests, creates job records and executes them either
/// synchronously on the caller's task or asynchronously in the background.
///
/// At most one executor invocation runs per job id; resubmitting the same
/// logical request always creates a new id.
#[derive(Clone)]
pub struct JobScheduler {
    registry: JobRegistry,
    executors: Arc<HashMap<JobType, Arc<dyn PipelineExecutor>>>,
}

impl JobScheduler {
    pub fn new(
        registry: JobRegistry,
        executors: HashMap<JobType, Arc<dyn PipelineExecutor>>,
    ) -> Self {
        Self {
            registry,
            executors: Arc::new(executors),
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Submit a job request.
    ///
    /// Synchronous submissions run the executor inline and return the
    /// terminal job; an execution error still leaves the record terminal
    /// before returning, so later lookups by id stay consistent.
    /// Asynchronous submissions return the Running snapshot immediately and
    /// leave polling to the caller.
    pub async fn submit(&self, request: JobRequest, synchronous: bool) -> Result<Job, AppError> {
        request.validate()?;

        let job_type = request.job_type();
        let executor = self
            .executors
            .get(&job_type)
            .cloned()
            .ok_or_else(|| AppError::internal(format!("no executor for {:?}", job_type)))?;

        let job = self.registry.create(job_type).await;
        info!(
            "Created {:?} job {} ({})",
            job_type,
            job.id,
            if synchronous { "sync" } else { "async" }
        );

        if synchronous {
            self.run(job.id, request, executor).await;
        } else {
            self.registry.mark_running(job.id).await?;
            let scheduler = self.clone();
            let id = job.id;
            tokio::spawn(async move {
                scheduler.run(id, request, executor).await;
            });
        }

        self.registry
            .get(job.id)
            .await
            .ok_or_else(|| AppError::not_found("job", job.id))
    }

    /// Drive one job from Running to a terminal state. Executor errors are
    /// captured into the job record rather than propagated.
    async fn run(&self, id: Uuid, request: JobRequest, executor: Arc<dyn PipelineExecutor>) {
        if let Err(e) = self.registry.mark_running(id).await {
            error!("Cannot start job {}: {}", id, e);
            return;
        }

        let progress = ProgressHandle::new(self.registry.clone(), id);
        match executor.execute(&request, progress).await {
            Ok(result) => {
                if let Err(e) = self.registry.complete(id, result).await {
                    error!("Failed to complete job {}: {}", id, e);
                } else {
                    info!("Job {} completed", id);
                }
            }
            Err(err) => {
                error!("Job {} failed: {}", id, err);
                if let Err(e) = self.registry.fail(id, err.to_string()).await {
                    error!("Failed to record failure for job {}: {}", id, e);
                }
            }
        }
    }
}
