use std::fmt::Display;

use thiserror::Error;

use crate::store::StoreError;

/// Identifier of a submitted job, unique within its environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(pub u64);

impl Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Outcome of a job which ran to its end
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSummary {
    /// Number of events moved from source to sink
    pub events: u64,
    /// Number of sink checkpoints, including the final one
    pub checkpoints: u64,
    /// True if the job ended because it was cancelled
    pub cancelled: bool,
}

/// Errors which terminate a running job
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Failed to open source `{0}`")]
    OpenSource(String, #[source] StoreError),
    #[error("Failed to open sink `{0}`")]
    OpenSink(String, #[source] StoreError),
    #[error("Reading from `{0}` failed")]
    Read(String, #[source] StoreError),
    #[error("Writing to `{0}` failed")]
    Write(String, #[source] StoreError),
    #[error("Checkpointing `{0}` failed")]
    Checkpoint(String, #[source] StoreError),
    #[error("Committing the read position of `{0}` failed")]
    Commit(String, #[source] StoreError),
    #[error("Job worker terminated without reporting a result")]
    WorkerLost,
}

/// Handle to a submitted job.
/// Dropping the handle does not stop the job.
#[derive(Debug)]
pub struct JobHandle {
    job_id: JobId,
    job_name: String,
    cancel: flume::Sender<()>,
    done: flume::Receiver<Result<JobSummary, JobError>>,
}

impl JobHandle {
    pub(crate) fn new(
        job_id: JobId,
        job_name: String,
        cancel: flume::Sender<()>,
        done: flume::Receiver<Result<JobSummary, JobError>>,
    ) -> Self {
        Self {
            job_id,
            job_name,
            cancel,
            done,
        }
    }

    /// Identifier assigned by the environment
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Name the job was submitted with
    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    /// Ask the job to stop. The job checkpoints its sink one last time before
    /// it ends. Cancelling a finished job has no effect.
    pub fn cancel(&self) {
        // a full channel means cancellation was already requested
        let _ = self.cancel.try_send(());
    }

    /// True if the job has ended, successfully or not
    pub fn is_finished(&self) -> bool {
        !self.done.is_empty() || self.done.is_disconnected()
    }

    /// Block the current thread until the job ends
    pub fn join(&self) -> Result<JobSummary, JobError> {
        self.done.recv().unwrap_or(Err(JobError::WorkerLost))
    }

    /// Wait until the job ends
    pub async fn wait(&self) -> Result<JobSummary, JobError> {
        self.done
            .recv_async()
            .await
            .unwrap_or(Err(JobError::WorkerLost))
    }
}
