use async_trait::async_trait;
use data_importer::{
    action::{create_stream, Action, ActionContext, SubmitError},
    config::{AppConfiguration, ConfigError, StreamConfig},
    error::BoxError,
    job::{stream_sink, EventRouter, IS_STREAM_ORDERED, ROUTING_KEY},
    runtime::{EventSource, JobGraph, JobHandle, SinkSpec, SourceNode, SourceSpec},
    store::{StoreError, WriterMode},
};
use tracing::info;

use crate::KafkaSource;

/// Topic to read
pub const INPUT_TOPIC: &str = "input-topic";
/// Comma separated bootstrap servers of the input topic
pub const INPUT_BROKERS: &str = "input-brokers";
/// Consumer group of the input, defaults to the job name
pub const INPUT_GROUP_ID: &str = "input-groupId";
/// Start at the latest instead of the earliest record if the group has no
/// committed offsets
pub const INPUT_START_AT_TAIL: &str = "input-startAtTail";

/// Continuously copy a Kafka topic into a stream.
/// Record payloads are copied as opaque bytes, keys and headers are dropped.
pub struct KafkaMirroringAction {
    config: AppConfiguration,
    output: StreamConfig,
    context: ActionContext,
}

impl KafkaMirroringAction {
    /// Action type name
    pub const NAME: &'static str = "kafka-stream-mirroring";

    /// Create the action, validating the input and output parameters up front
    pub fn new(config: AppConfiguration, context: ActionContext) -> Result<Self, ConfigError> {
        let output = config.stream_config("output")?;
        let action = Self {
            config,
            output,
            context,
        };
        action.source()?;
        Ok(action)
    }

    /// [data_importer::action::ActionConstructor] for the registry
    pub fn create(
        config: AppConfiguration,
        context: ActionContext,
    ) -> Result<Box<dyn Action>, ConfigError> {
        Ok(Box::new(Self::new(config, context)?))
    }

    /// The configured input topic
    pub fn source(&self) -> Result<KafkaSource, ConfigError> {
        let topic = self.config.require(INPUT_TOPIC)?;
        let brokers = self.config.require(INPUT_BROKERS)?;
        if brokers.split(',').all(|b| b.trim().is_empty()) {
            return Err(ConfigError::InvalidParam {
                key: INPUT_BROKERS.to_owned(),
                value: brokers.to_owned(),
                reason: "at least one broker is required".to_owned(),
            });
        }
        let group_id = self
            .config
            .get_str(INPUT_GROUP_ID)
            .map(str::to_owned)
            .unwrap_or_else(|| self.job_name());
        let auto_offset_reset = if self.config.get_bool(INPUT_START_AT_TAIL, false)? {
            "latest"
        } else {
            "earliest"
        };
        Ok(KafkaSource::builder()
            .broker(brokers)
            .topic(topic)
            .group_id(group_id)
            .auto_offset_reset(auto_offset_reset)
            .build())
    }

    async fn submit_inner(&self, job_name: &str) -> Result<JobHandle, BoxError> {
        let source = self.source()?;
        let output = self.output.clone();
        let ordered = self.config.get_bool(IS_STREAM_ORDERED, true)?;
        info!("isStreamOrdered: {ordered}");
        let router = EventRouter::new(ordered, self.config.get_str(ROUTING_KEY).map(str::to_owned));

        let output_store = self.context.connector.connect(output.stream.controller())?;
        let writer_id = format!("{job_name}-{}", output.stream.scoped_name());
        let sink = stream_sink(
            output_store,
            SinkSpec {
                stream: output.stream,
                router,
                mode: WriterMode::ExactlyOnce,
            },
            writer_id,
        );

        let spec = SourceSpec::External {
            kind: "kafka".to_owned(),
            description: format!("topic {} on {}", source.topic(), source.brokers()),
        };
        let source = SourceNode::new(
            "kafka-reader",
            format!("Kafka reader from {}", source.topic()),
            spec,
            move || {
                let reader = source
                    .open()
                    .map_err(|e| e.into_store_error(&source.brokers()))?;
                Ok(Box::new(reader) as Box<dyn EventSource>)
            },
        );
        info!("Executing {job_name} job");
        Ok(self
            .context
            .environment
            .submit(JobGraph::new(source, sink), job_name)
            .await?)
    }
}

#[async_trait]
impl Action for KafkaMirroringAction {
    fn config(&self) -> &AppConfiguration {
        &self.config
    }

    fn job_name(&self) -> String {
        self.config.job_name(Self::NAME)
    }

    async fn commit_metadata_changes(&self) -> Result<(), StoreError> {
        info!("output stream: {:?}", self.output);
        let store = self.context.connector.connect(self.output.stream.controller())?;
        create_stream(store.as_ref(), &self.output).await
    }

    async fn submit_job(&self) -> Result<JobHandle, SubmitError> {
        let job_name = self.job_name();
        self.submit_inner(&job_name)
            .await
            .map_err(|source| SubmitError::new(job_name, source))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use data_importer::{
        action::ActionRegistry,
        job::DEFAULT_ROUTING_KEY,
        runtime::{EngineError, ExecutionEnvironment},
        store::{MemoryConnector, MemoryStore},
        stream::StreamRef,
    };

    use super::*;

    /// Refuses every job
    #[derive(Default)]
    struct RejectingEnvironment;

    #[async_trait]
    impl ExecutionEnvironment for RejectingEnvironment {
        async fn submit(&self, _graph: JobGraph, _name: &str) -> Result<JobHandle, EngineError> {
            Err(EngineError::Spawn(
                "recorded".to_owned(),
                std::io::Error::other("not executed in tests"),
            ))
        }
    }

    fn config() -> AppConfiguration {
        AppConfiguration::from_iter([
            ("action-type", KafkaMirroringAction::NAME),
            ("input-topic", "orders"),
            ("input-brokers", "kafka-1:9092,kafka-2:9092"),
            ("output-stream", "scope/orders"),
        ])
    }

    fn context(env: Arc<RejectingEnvironment>) -> ActionContext {
        ActionContext::new(Arc::new(MemoryConnector::new(MemoryStore::new())), env)
    }

    #[test]
    fn source_from_config() {
        let action = KafkaMirroringAction::new(config(), context(Arc::default())).unwrap();
        let source = action.source().unwrap();
        assert_eq!(source.topic(), "orders");
        assert_eq!(source.brokers(), "kafka-1:9092,kafka-2:9092");
        assert_eq!(source.group_id(), KafkaMirroringAction::NAME);
        assert_eq!(source.auto_offset_reset(), "earliest");
    }

    #[test]
    fn start_at_tail_reads_latest() {
        let mut params = config().params().clone();
        params.insert(INPUT_START_AT_TAIL.to_owned(), "true".to_owned());
        params.insert(INPUT_GROUP_ID.to_owned(), "importers".to_owned());
        let action =
            KafkaMirroringAction::new(AppConfiguration::new(params), context(Arc::default()))
                .unwrap();
        let source = action.source().unwrap();
        assert_eq!(source.auto_offset_reset(), "latest");
        assert_eq!(source.group_id(), "importers");
    }

    #[test]
    fn missing_topic_is_rejected() {
        let mut params = config().params().clone();
        params.remove(INPUT_TOPIC);
        let result =
            KafkaMirroringAction::new(AppConfiguration::new(params), context(Arc::default()));
        assert!(matches!(result, Err(ConfigError::MissingParam(k)) if k == INPUT_TOPIC));
    }

    #[test]
    fn empty_brokers_are_rejected() {
        let mut params = config().params().clone();
        params.insert(INPUT_BROKERS.to_owned(), " , ".to_owned());
        let result =
            KafkaMirroringAction::new(AppConfiguration::new(params), context(Arc::default()));
        assert!(matches!(result, Err(ConfigError::InvalidParam { key, .. }) if key == INPUT_BROKERS));
    }

    #[tokio::test]
    async fn submit_failure_names_the_job() {
        let registry = ActionRegistry::new()
            .register(KafkaMirroringAction::NAME, KafkaMirroringAction::create);
        let env = Arc::new(RejectingEnvironment::default());
        let action = registry.create(config(), context(env.clone())).unwrap();
        let err = action.submit_job().await.unwrap_err();
        assert_eq!(err.job_name(), KafkaMirroringAction::NAME);
    }

    #[tokio::test]
    async fn graph_reads_topic_and_writes_stream() {
        struct Capture(Mutex<Option<(SourceSpec, SinkSpec)>>);

        #[async_trait]
        impl ExecutionEnvironment for Capture {
            async fn submit(&self, graph: JobGraph, name: &str) -> Result<JobHandle, EngineError> {
                *self.0.lock().unwrap() =
                    Some((graph.source().spec().clone(), graph.sink().spec().clone()));
                Err(EngineError::Spawn(
                    name.to_owned(),
                    std::io::Error::other("not executed in tests"),
                ))
            }
        }

        let env = Arc::new(Capture(Mutex::new(None)));
        let ctx = ActionContext::new(Arc::new(MemoryConnector::new(MemoryStore::new())), env.clone());
        let action = KafkaMirroringAction::new(config(), ctx).unwrap();
        assert!(action.submit_job().await.is_err());

        let (source, sink) = env.0.lock().unwrap().clone().unwrap();
        assert_eq!(
            source,
            SourceSpec::External {
                kind: "kafka".to_owned(),
                description: "topic orders on kafka-1:9092,kafka-2:9092".to_owned(),
            }
        );
        assert_eq!(
            sink.stream,
            StreamRef::parse("scope/orders", "tcp://localhost:9090").unwrap()
        );
        assert_eq!(sink.router, EventRouter::Fixed(DEFAULT_ROUTING_KEY.to_owned()));
        assert_eq!(sink.mode, WriterMode::ExactlyOnce);
    }
}
