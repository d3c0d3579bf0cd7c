use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use bon::Builder;
use tracing::{debug, error, info};

use super::{
    CheckpointTrigger, EngineError, EventSink, EventSource, ExecutionEnvironment,
    IntervalCheckpoints, JobError, JobGraph, JobHandle, JobId, JobSummary, NoCheckpoints,
};
use crate::config::EngineConfig;

/// Runs every submitted job on its own thread within this process.
///
/// The worker polls the source, writes each event to the sink and
/// checkpoints the sink at the configured interval. A job ends when its
/// source is finished or when it is cancelled through its [JobHandle]; in both
/// cases the sink is checkpointed one final time.
#[derive(Builder, Debug)]
pub struct LocalEnvironment {
    /// Interval of sink checkpoints. Without an interval sinks are only
    /// checkpointed when the job ends.
    checkpoints: Option<Duration>,
    /// Pause after polling a source returned nothing
    #[builder(default = Duration::from_millis(10))]
    idle_backoff: Duration,
    #[builder(skip)]
    next_job_id: AtomicU64,
}

impl LocalEnvironment {
    /// Create an environment from engine settings
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::builder()
            .checkpoints(config.checkpoint_interval())
            .idle_backoff(config.idle_backoff())
            .build()
    }

    fn trigger(&self) -> Box<dyn CheckpointTrigger> {
        match self.checkpoints {
            Some(interval) => Box::new(IntervalCheckpoints::new(interval)),
            None => Box::new(NoCheckpoints),
        }
    }
}

#[async_trait]
impl ExecutionEnvironment for LocalEnvironment {
    async fn submit(&self, graph: JobGraph, name: &str) -> Result<JobHandle, EngineError> {
        let job_id = JobId(self.next_job_id.fetch_add(1, Ordering::Relaxed));
        let (cancel_tx, cancel_rx) = flume::bounded(1);
        let (done_tx, done_rx) = flume::bounded(1);

        let worker = Worker {
            job_name: name.to_owned(),
            graph,
            trigger: self.trigger(),
            idle_backoff: self.idle_backoff,
            cancel: cancel_rx,
        };
        std::thread::Builder::new()
            .name(format!("{name}-{job_id}"))
            .spawn(move || {
                let result = worker.run();
                if let Err(e) = &result {
                    error!("Job {job_id} failed: {e}");
                }
                // the handle may already be gone, which is fine
                let _ = done_tx.send(result);
            })
            .map_err(|e| EngineError::Spawn(name.to_owned(), e))?;

        info!("Submitted job {name} as {job_id}");
        Ok(JobHandle::new(job_id, name.to_owned(), cancel_tx, done_rx))
    }
}

struct Worker {
    job_name: String,
    graph: JobGraph,
    trigger: Box<dyn CheckpointTrigger>,
    idle_backoff: Duration,
    cancel: flume::Receiver<()>,
}

impl Worker {
    fn run(mut self) -> Result<JobSummary, JobError> {
        let span = tracing::info_span!("job", name = %self.job_name);
        let _span_guard = span.enter();

        let (source, sink) = self.graph.into_parts();
        let source_name = source.name().to_owned();
        let sink_name = sink.name().to_owned();
        let mut source = source
            .open()
            .map_err(|e| JobError::OpenSource(source_name.clone(), e))?;
        let mut sink = sink
            .open()
            .map_err(|e| JobError::OpenSink(sink_name.clone(), e))?;
        info!("Running {source_name} -> {sink_name}");

        let mut summary = JobSummary {
            events: 0,
            checkpoints: 0,
            cancelled: false,
        };
        loop {
            if self.cancel.try_recv().is_ok() {
                info!("Job cancelled");
                summary.cancelled = true;
                break;
            }
            if !Self::step(source.as_mut(), sink.as_mut(), &source_name, &sink_name)? {
                if source.is_finished() {
                    debug!("Source {source_name} is finished");
                    break;
                }
                std::thread::sleep(self.idle_backoff);
            } else {
                summary.events += 1;
            }
            if self.trigger.should_trigger() {
                Self::checkpoint(source.as_mut(), sink.as_mut(), &source_name, &sink_name)?;
                summary.checkpoints += 1;
                debug!("Checkpoint {} after {} events", summary.checkpoints, summary.events);
            }
        }

        Self::checkpoint(source.as_mut(), sink.as_mut(), &source_name, &sink_name)?;
        summary.checkpoints += 1;
        source.suspend();
        sink.close()
            .map_err(|e| JobError::Write(sink_name.clone(), e))?;
        info!(
            "Job ended after {} events and {} checkpoints",
            summary.events, summary.checkpoints
        );
        Ok(summary)
    }

    /// Checkpoint the sink, then let the source commit what the sink holds
    fn checkpoint(
        source: &mut dyn EventSource,
        sink: &mut dyn EventSink,
        source_name: &str,
        sink_name: &str,
    ) -> Result<(), JobError> {
        sink.checkpoint()
            .map_err(|e| JobError::Checkpoint(sink_name.to_owned(), e))?;
        source
            .checkpoint()
            .map_err(|e| JobError::Commit(source_name.to_owned(), e))
    }

    /// Move a single event, returns false if the source had nothing to give
    fn step(
        source: &mut dyn EventSource,
        sink: &mut dyn EventSink,
        source_name: &str,
        sink_name: &str,
    ) -> Result<bool, JobError> {
        let payload = source
            .poll()
            .map_err(|e| JobError::Read(source_name.to_owned(), e))?;
        match payload {
            Some(payload) => {
                sink.sink(payload)
                    .map_err(|e| JobError::Write(sink_name.to_owned(), e))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
