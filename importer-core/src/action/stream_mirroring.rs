use async_trait::async_trait;
use tracing::info;

use super::{create_stream, Action, ActionContext, SubmitError};
use crate::{
    config::{AppConfiguration, ConfigError, StreamConfig},
    job::StreamMirroringJob,
    runtime::JobHandle,
    store::StoreError,
};

/// Mirrors one stream into another
pub struct StreamMirroringAction {
    job: StreamMirroringJob,
    output: StreamConfig,
    context: ActionContext,
}

impl StreamMirroringAction {
    /// Action type name
    pub const NAME: &'static str = "stream-mirroring";

    /// Create the action, validating the stream parameters up front
    pub fn new(config: AppConfiguration, context: ActionContext) -> Result<Self, ConfigError> {
        config.stream_config("input")?;
        let output = config.stream_config("output")?;
        Ok(Self {
            job: StreamMirroringJob::new(config, context.clone(), Self::NAME),
            output,
            context,
        })
    }

    /// [super::ActionConstructor] for the registry
    pub fn create(
        config: AppConfiguration,
        context: ActionContext,
    ) -> Result<Box<dyn Action>, ConfigError> {
        Ok(Box::new(Self::new(config, context)?))
    }
}

#[async_trait]
impl Action for StreamMirroringAction {
    fn config(&self) -> &AppConfiguration {
        self.job.config()
    }

    fn job_name(&self) -> String {
        self.job.job_name()
    }

    async fn commit_metadata_changes(&self) -> Result<(), StoreError> {
        info!("output stream: {:?}", self.output);
        let store = self.context.connector.connect(self.output.stream.controller())?;
        create_stream(store.as_ref(), &self.output).await
    }

    async fn submit_job(&self) -> Result<JobHandle, SubmitError> {
        self.job.submit_job().await
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use super::*;
    use crate::{
        action::{create_action_submit_job, ActionRegistry},
        config::ConfigError,
        job::{EventRouter, DEFAULT_ROUTING_KEY},
        runtime::{
            EngineError, ExecutionEnvironment, JobGraph, LocalEnvironment, SinkSpec, SourceSpec,
        },
        store::{MemoryConnector, MemoryStore, StreamMetadata, StreamPolicy, WriterMode},
        stream::{StreamCut, StreamRef},
        ImporterError,
    };

    /// Records the specs of submitted graphs and runs them locally
    #[derive(Default)]
    struct RecordingEnvironment {
        submitted: Mutex<Vec<(String, SourceSpec, SinkSpec)>>,
        local: Option<LocalEnvironment>,
    }

    #[async_trait]
    impl ExecutionEnvironment for RecordingEnvironment {
        async fn submit(&self, graph: JobGraph, name: &str) -> Result<JobHandle, EngineError> {
            self.submitted.lock().unwrap().push((
                name.to_owned(),
                graph.source().spec().clone(),
                graph.sink().spec().clone(),
            ));
            match &self.local {
                Some(local) => local.submit(graph, name).await,
                None => {
                    LocalEnvironment::builder()
                        .checkpoints(Duration::from_millis(5))
                        .idle_backoff(Duration::from_millis(1))
                        .build()
                        .submit(graph, name)
                        .await
                }
            }
        }
    }

    fn stream(name: &str) -> StreamRef {
        StreamRef::parse(name, "tcp://localhost:9090").unwrap()
    }

    fn config(ordered: bool, start_at_tail: bool) -> AppConfiguration {
        AppConfiguration::from_iter([
            ("action-type", "stream-mirroring".to_owned()),
            ("input-stream", "scope/in".to_owned()),
            ("input-startAtTail", start_at_tail.to_string()),
            ("isStreamOrdered", ordered.to_string()),
            ("output-stream", "scope/out".to_owned()),
        ])
    }

    fn registry() -> ActionRegistry {
        ActionRegistry::new().register(StreamMirroringAction::NAME, StreamMirroringAction::create)
    }

    async fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .create_stream(&stream("scope/in"), &StreamPolicy { partitions: 2 })
            .await
            .unwrap();
        for i in 0..10u8 {
            store.append(&stream("scope/in"), None, &[i]).unwrap();
        }
        store
    }

    fn context(store: &MemoryStore, env: Arc<RecordingEnvironment>) -> ActionContext {
        ActionContext::new(Arc::new(MemoryConnector::new(store.clone())), env)
    }

    #[tokio::test]
    async fn commit_metadata_changes_is_idempotent() {
        let store = MemoryStore::new();
        let ctx = context(&store, Arc::default());
        let action = registry().create(config(true, false), ctx).unwrap();
        action.commit_metadata_changes().await.unwrap();
        action.commit_metadata_changes().await.unwrap();
        assert_eq!(store.create_stream_calls(), 2);
        assert_eq!(store.stream_count(), 1);
        assert_eq!(store.partition_count(&stream("scope/out")), Some(1));
    }

    #[tokio::test]
    async fn commit_metadata_changes_fails_when_unreachable() {
        let store = MemoryStore::new();
        store.set_reachable(false);
        let action = registry()
            .create(config(true, false), context(&store, Arc::default()))
            .unwrap();
        let err = action.commit_metadata_changes().await.unwrap_err();
        assert!(matches!(err, StoreError::Unreachable { .. }));
    }

    #[tokio::test]
    async fn unknown_action_type() {
        let store = MemoryStore::new();
        let mut params = config(true, false).params().clone();
        params.insert("action-type".to_owned(), "teleport".to_owned());
        let result = registry().create(AppConfiguration::new(params), context(&store, Arc::default()));
        assert!(matches!(result, Err(ConfigError::UnknownAction(t)) if t == "teleport"));
    }

    #[tokio::test]
    async fn missing_output_is_rejected_at_creation() {
        let store = MemoryStore::new();
        let config = AppConfiguration::from_iter([
            ("action-type", "stream-mirroring"),
            ("input-stream", "scope/in"),
        ]);
        let result = registry().create(config, context(&store, Arc::default()));
        assert!(matches!(result, Err(ConfigError::MissingParam(k)) if k == "output-stream"));
    }

    #[tokio::test]
    async fn invalid_output_partitions_are_a_config_error() {
        let store = MemoryStore::new();
        let mut params = config(true, false).params().clone();
        params.insert("output-partitions".to_owned(), "0".to_owned());
        let result = registry().create(AppConfiguration::new(params), context(&store, Arc::default()));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidParam { key, .. }) if key == "output-partitions"
        ));
        assert_eq!(store.create_stream_calls(), 0);
    }

    #[tokio::test]
    async fn commit_uses_output_partitions() {
        let store = MemoryStore::new();
        let mut params = config(true, false).params().clone();
        params.insert("output-partitions".to_owned(), "4".to_owned());
        let action = registry()
            .create(AppConfiguration::new(params), context(&store, Arc::default()))
            .unwrap();
        action.commit_metadata_changes().await.unwrap();
        assert_eq!(store.partition_count(&stream("scope/out")), Some(4));
    }

    /// scope/in from the earliest position to scope/out, ordered
    #[tokio::test]
    async fn end_to_end_ordered_mirroring() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let store = seeded_store().await;
        let env = Arc::new(RecordingEnvironment::default());
        let handle = create_action_submit_job(
            &registry(),
            config(true, false),
            context(&store, env.clone()),
            true,
        )
        .await
        .unwrap();
        assert_eq!(handle.job_name(), "stream-mirroring");

        let submitted = env.submitted.lock().unwrap().clone();
        assert_eq!(submitted.len(), 1);
        let (name, source, sink) = &submitted[0];
        assert_eq!(name, "stream-mirroring");
        assert_eq!(
            source,
            &SourceSpec::Stream {
                stream: stream("scope/in"),
                start: StreamCut::from_positions([(0, 0), (1, 0)]),
                end: StreamCut::Unbounded,
            }
        );
        assert_eq!(sink.stream, stream("scope/out"));
        assert_eq!(sink.router, EventRouter::Fixed(DEFAULT_ROUTING_KEY.to_owned()));
        assert_eq!(sink.mode, WriterMode::ExactlyOnce);

        // the job copies everything and keeps running until cancelled
        let out = stream("scope/out");
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while store.events(&out).len() < 10 && std::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!handle.is_finished());
        handle.cancel();
        let summary = handle.wait().await.unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.events, 10);
        let events = store.events(&out);
        assert_eq!(events.len(), 10);
        assert!(events
            .iter()
            .all(|e| e.routing_key.as_deref() == Some(DEFAULT_ROUTING_KEY)));
    }

    #[tokio::test]
    async fn start_at_tail_skips_existing_events() {
        let store = seeded_store().await;
        let env = Arc::new(RecordingEnvironment {
            local: Some(
                LocalEnvironment::builder()
                    .checkpoints(Duration::from_millis(2))
                    .idle_backoff(Duration::from_millis(1))
                    .build(),
            ),
            ..Default::default()
        });
        let mut params = config(false, true).params().clone();
        params.insert("job-name".to_owned(), "tailing".to_owned());
        let handle = create_action_submit_job(
            &registry(),
            AppConfiguration::new(params),
            context(&store, env.clone()),
            true,
        )
        .await
        .unwrap();
        assert_eq!(handle.job_name(), "tailing");

        let (_, source, sink) = env.submitted.lock().unwrap()[0].clone();
        assert!(matches!(source, SourceSpec::Stream { start, .. } if start == StreamCut::from_positions([(0, 5), (1, 5)])));
        assert_eq!(sink.router, EventRouter::Unrouted);

        store.append(&stream("scope/in"), None, b"new").unwrap();
        let out = stream("scope/out");
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while store.events(&out).is_empty() && std::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        handle.cancel();
        handle.wait().await.unwrap();
        let events = store.events(&out);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload, b"new".to_vec());
        assert_eq!(events[0].routing_key, None);
    }

    #[tokio::test]
    async fn unreachable_input_is_a_submission_failure() {
        let store = MemoryStore::new();
        store
            .create_stream(&stream("scope/out"), &StreamPolicy::default())
            .await
            .unwrap();
        store.set_reachable(false);
        let env = Arc::new(RecordingEnvironment::default());
        let err = create_action_submit_job(
            &registry(),
            config(true, false),
            context(&store, env.clone()),
            false,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ImporterError::Submit(e) if e.job_name() == "stream-mirroring"));
        assert!(env.submitted.lock().unwrap().is_empty());
    }
}
