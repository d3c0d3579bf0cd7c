//! Execution environments run submitted jobs. A job is a [JobGraph] made of a
//! single source and a single sink; the environment owns all runtime state of
//! the job once it is submitted and reports back through a [JobHandle].
use async_trait::async_trait;
use thiserror::Error;

use crate::store::StoreError;

mod checkpoint;
mod graph;
mod handle;
mod local;

pub use checkpoint::{CheckpointTrigger, IntervalCheckpoints, NoCheckpoints};
pub use graph::{JobGraph, SinkNode, SinkSpec, SourceNode, SourceSpec};
pub use handle::{JobError, JobHandle, JobId, JobSummary};
pub use local::LocalEnvironment;

/// Provides events to a job
pub trait EventSource: Send {
    /// Poll for the next event payload, `None` if nothing is available right now
    fn poll(&mut self) -> Result<Option<Vec<u8>>, StoreError>;

    /// Return true if this source will never produce events again
    fn is_finished(&mut self) -> bool;

    /// Called after the sink of the job completed a checkpoint. Everything
    /// polled so far is durable in the sink, a source which tracks its read
    /// position externally commits that position here.
    fn checkpoint(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Suspend this source.
    /// Suspend means the execution will be halted. Use this method to clean
    /// up any resources like external connections.
    fn suspend(&mut self) {}
}

/// Receives the events of a job
pub trait EventSink: Send {
    /// Write a single event payload
    fn sink(&mut self, payload: Vec<u8>) -> Result<(), StoreError>;

    /// Make everything written so far durable
    fn checkpoint(&mut self) -> Result<(), StoreError>;

    /// Release the sink, called once after the final checkpoint
    fn close(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Accepts job graphs for execution
#[async_trait]
pub trait ExecutionEnvironment: Send + Sync {
    /// Submit a graph under the given job name. This returns as soon as the
    /// job is accepted and does not wait for it to finish.
    async fn submit(&self, graph: JobGraph, name: &str) -> Result<JobHandle, EngineError>;
}

/// Errors raised by an environment when accepting a job
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to spawn worker for job `{0}`")]
    Spawn(String, #[source] std::io::Error),
}
