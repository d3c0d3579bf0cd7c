use std::{collections::BTreeMap, collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use bon::Builder;
use data_importer::{
    runtime::EventSource,
    store::{
        EventWriter, StoreConnector, StoreError, StreamMetadata, StreamPolicy, StreamStore,
        WriterConfig,
    },
    stream::{Offset, Partition, StreamCut, StreamRef},
};
use kafka_store_builder::SetAtLeastOneBroker;
use rdkafka::{
    admin::{AdminClient, AdminOptions, NewTopic, TopicReplication},
    client::DefaultClientContext,
    config::ClientConfig,
    consumer::{BaseConsumer, Consumer},
    types::RDKafkaErrorCode,
};
use tracing::debug;
use url::Url;

use crate::{KafkaStoreError, KafkaStreamReader, KafkaStreamWriter};

/// Port used when a controller URI does not name one
const DEFAULT_KAFKA_PORT: u16 = 9092;

/// Name of the topic holding `stream`
pub fn topic_name(stream: &StreamRef) -> String {
    format!("{}.{}", stream.scope(), stream.stream())
}

/// Bootstrap server of a `tcp://host:port` or `kafka://host:port` controller URI
pub fn bootstrap_server(controller: &Url) -> Result<String, KafkaStoreError> {
    let unsupported = || KafkaStoreError::UnsupportedController(controller.to_string());
    if !matches!(controller.scheme(), "tcp" | "kafka") {
        return Err(unsupported());
    }
    let host = controller.host_str().ok_or_else(unsupported)?;
    let port = controller.port().unwrap_or(DEFAULT_KAFKA_PORT);
    Ok(format!("{host}:{port}"))
}

/// A [StreamStore] keeping every stream in a Kafka topic.
///
/// Kafka has no scopes, the scope of a stream only becomes part of its topic
/// name (see [topic_name]). Custom
/// [rdkafka configuration](https://github.com/confluentinc/librdkafka/blob/master/CONFIGURATION.md)
/// applied to every client of the store can be provided by calling
/// `.conf(key, value)`.
///
/// ```
/// use data_importer_kafka::KafkaStore;
///
/// let store = KafkaStore::builder()
///     .broker("localhost:9092") // at least one broker must be provided
///     .replication_factor(3)
///     .conf("security.protocol", "ssl")
///     .build();
/// ```
#[derive(Builder, Debug, Clone)]
#[builder(on(String, into))]
pub struct KafkaStore {
    #[builder(field)]
    kafka_config: HashMap<String, String>,
    #[builder(field)]
    brokers: Vec<String>,
    /// this is a workaround to check if at least one broker was provided
    #[builder(overwritable, setters(vis = "", name = "at_least_one_broker"))]
    _at_least_one_broker: (),
    /// Replication factor of created topics
    #[builder(default = 1)]
    replication_factor: i32,
    /// Timeout for metadata requests, admin operations and transactions
    #[builder(default = Duration::from_secs(10))]
    operation_timeout: Duration,
    /// Time a reader blocks waiting for the next record
    #[builder(default = Duration::from_millis(100))]
    poll_timeout: Duration,
}

impl<S: kafka_store_builder::State> KafkaStoreBuilder<S> {
    /// Provide an additional config for all Kafka clients of this store.
    /// Note that `bootstrap.servers` is ignored, use [Self::broker] instead.
    pub fn conf(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.kafka_config.insert(key.into(), value.into());
        self
    }
    /// Add a broker to bootstrap from
    pub fn broker(mut self, url: impl Into<String>) -> KafkaStoreBuilder<SetAtLeastOneBroker<S>> {
        self.brokers.push(url.into());
        self.at_least_one_broker(())
    }
}

impl KafkaStore {
    /// Comma separated bootstrap servers
    pub fn bootstrap_servers(&self) -> String {
        self.brokers.join(",")
    }

    pub(crate) fn poll_timeout(&self) -> Duration {
        self.poll_timeout
    }

    pub(crate) fn operation_timeout(&self) -> Duration {
        self.operation_timeout
    }

    pub(crate) fn client_config(&self) -> ClientConfig {
        let mut kafka_conf = ClientConfig::new();
        for (k, v) in self.kafka_config.iter() {
            kafka_conf.set(k, v);
        }
        kafka_conf.set("bootstrap.servers", self.bootstrap_servers());
        kafka_conf
    }

    fn store_error(&self, err: KafkaStoreError) -> StoreError {
        err.into_store_error(&self.bootstrap_servers())
    }

    /// Partitions of `topic`, failing if the topic does not exist
    pub(crate) fn partitions(
        &self,
        consumer: &BaseConsumer,
        topic: &str,
    ) -> Result<Vec<Partition>, KafkaStoreError> {
        let metadata = consumer
            .fetch_metadata(Some(topic), self.operation_timeout)
            .map_err(|e| KafkaStoreError::FetchMetadata(topic.to_owned(), e))?;
        // a single topic was requested
        let Some(topic_meta) = metadata.topics().first() else {
            return Err(KafkaStoreError::TopicNotFound(topic.to_owned()));
        };
        if topic_meta.error().is_some() || topic_meta.partitions().is_empty() {
            return Err(KafkaStoreError::TopicNotFound(topic.to_owned()));
        }
        Ok(topic_meta.partitions().iter().map(|p| p.id()).collect())
    }

    /// Low and high watermark of every partition of `topic`
    fn watermarks(&self, topic: &str) -> Result<BTreeMap<Partition, (Offset, Offset)>, KafkaStoreError> {
        let consumer: BaseConsumer = self
            .client_config()
            .create()
            .map_err(KafkaStoreError::CreateClient)?;
        self.partitions(&consumer, topic)?
            .into_iter()
            .map(|partition| {
                consumer
                    .fetch_watermarks(topic, partition, self.operation_timeout)
                    .map(|marks| (partition, marks))
                    .map_err(|source| KafkaStoreError::FetchWatermarks {
                        topic: topic.to_owned(),
                        partition,
                        source,
                    })
            })
            .collect()
    }

    async fn fetch_watermarks(
        &self,
        stream: &StreamRef,
    ) -> Result<BTreeMap<Partition, (Offset, Offset)>, StoreError> {
        let store = self.clone();
        let topic = topic_name(stream);
        tokio::task::spawn_blocking(move || store.watermarks(&topic))
            .await
            .map_err(StoreError::backend)?
            .map_err(|e| self.store_error(e))
    }
}

#[async_trait]
impl StreamMetadata for KafkaStore {
    async fn create_scope(&self, scope: &str) -> Result<bool, StoreError> {
        debug!("Kafka has no scopes, {scope} is only used as topic name prefix");
        Ok(false)
    }

    async fn create_stream(
        &self,
        stream: &StreamRef,
        policy: &StreamPolicy,
    ) -> Result<bool, StoreError> {
        let topic = topic_name(stream);
        let admin: AdminClient<DefaultClientContext> = self
            .client_config()
            .create()
            .map_err(|e| self.store_error(KafkaStoreError::CreateClient(e)))?;
        let new_topic = NewTopic::new(
            &topic,
            policy.partitions,
            TopicReplication::Fixed(self.replication_factor),
        );
        let options = AdminOptions::new()
            .operation_timeout(Some(self.operation_timeout))
            .request_timeout(Some(self.operation_timeout));
        let results = admin
            .create_topics([&new_topic], &options)
            .await
            .map_err(|e| self.store_error(KafkaStoreError::Admin(e)))?;

        let mut created = false;
        for result in results {
            match result {
                Ok(name) => {
                    debug!("Created topic {name}");
                    created = true;
                }
                Err((_, RDKafkaErrorCode::TopicAlreadyExists)) => {}
                Err((name, code)) => {
                    return Err(self.store_error(KafkaStoreError::CreateTopic(name, code)))
                }
            }
        }
        Ok(created)
    }

    async fn head_cut(&self, stream: &StreamRef) -> Result<StreamCut, StoreError> {
        let marks = self.fetch_watermarks(stream).await?;
        Ok(StreamCut::from_positions(
            marks.into_iter().map(|(partition, (low, _))| (partition, low)),
        ))
    }

    async fn tail_cut(&self, stream: &StreamRef) -> Result<StreamCut, StoreError> {
        let marks = self.fetch_watermarks(stream).await?;
        Ok(StreamCut::from_positions(
            marks.into_iter().map(|(partition, (_, high))| (partition, high)),
        ))
    }
}

impl StreamStore for KafkaStore {
    fn reader(
        &self,
        stream: &StreamRef,
        start: &StreamCut,
        end: &StreamCut,
    ) -> Result<Box<dyn EventSource>, StoreError> {
        let reader = KafkaStreamReader::open(self, topic_name(stream), start, end)
            .map_err(|e| self.store_error(e))?;
        Ok(Box::new(reader))
    }

    fn writer(
        &self,
        stream: &StreamRef,
        config: &WriterConfig,
    ) -> Result<Box<dyn EventWriter>, StoreError> {
        let writer = KafkaStreamWriter::open(self, topic_name(stream), config)
            .map_err(|e| self.store_error(e))?;
        Ok(Box::new(writer))
    }
}

/// Opens a [KafkaStore] for every `tcp://` or `kafka://` controller URI,
/// using the host and port of the URI as bootstrap server.
#[derive(Builder, Debug, Clone)]
#[builder(on(String, into))]
pub struct KafkaConnector {
    #[builder(field)]
    kafka_config: HashMap<String, String>,
    /// Replication factor of created topics
    #[builder(default = 1)]
    replication_factor: i32,
    /// Time a reader blocks waiting for the next record
    #[builder(default = Duration::from_millis(100))]
    poll_timeout: Duration,
}

impl<S: kafka_connector_builder::State> KafkaConnectorBuilder<S> {
    /// Provide an additional config for all Kafka clients of connected stores
    pub fn conf(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.kafka_config.insert(key.into(), value.into());
        self
    }
}

impl StoreConnector for KafkaConnector {
    fn connect(&self, controller: &Url) -> Result<Arc<dyn StreamStore>, StoreError> {
        let broker = bootstrap_server(controller).map_err(|e| e.into_store_error(controller.as_str()))?;
        let mut builder = KafkaStore::builder()
            .broker(broker)
            .replication_factor(self.replication_factor)
            .poll_timeout(self.poll_timeout);
        for (k, v) in self.kafka_config.iter() {
            builder = builder.conf(k, v);
        }
        Ok(Arc::new(builder.build()))
    }
}

/// Doctests to assert some bad builders do not compile
/// see: https://stackoverflow.com/a/55327334
/// this should not compile because the broker is missing
/// ```compile_fail
/// use data_importer_kafka::KafkaStore;
/// KafkaStore::builder()
/// .replication_factor(3)
/// .build();
/// ```
struct _CompileTests;

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(name: &str) -> StreamRef {
        StreamRef::parse(name, "tcp://localhost:9092").unwrap()
    }

    #[test]
    fn topic_joins_scope_and_stream() {
        assert_eq!(topic_name(&stream("examples/my-stream")), "examples.my-stream");
    }

    #[test]
    fn bootstrap_from_controller() {
        let url = Url::parse("tcp://broker-1:9093").unwrap();
        assert_eq!(bootstrap_server(&url).unwrap(), "broker-1:9093");
        let url = Url::parse("kafka://broker-1").unwrap();
        assert_eq!(bootstrap_server(&url).unwrap(), "broker-1:9092");
    }

    #[test]
    fn unsupported_controller() {
        let url = Url::parse("http://broker-1:9093").unwrap();
        assert!(matches!(
            bootstrap_server(&url),
            Err(KafkaStoreError::UnsupportedController(_))
        ));
        let err = KafkaConnector::builder()
            .build()
            .connect(&url)
            .err()
            .unwrap();
        assert!(matches!(err, StoreError::UnsupportedController(_)));
    }

    #[test]
    fn test_store_builder() {
        let store = KafkaStore::builder()
            .broker("foo.com:9092")
            .broker("bar.com:9092")
            .conf("log_level", "3")
            .build();
        assert_eq!(store.bootstrap_servers(), "foo.com:9092,bar.com:9092");
        let conf = store.client_config();
        assert_eq!(conf.get("bootstrap.servers"), Some("foo.com:9092,bar.com:9092"));
        assert_eq!(conf.get("log_level"), Some("3"));
    }

    #[test]
    fn connector_passes_config() {
        let connector = KafkaConnector::builder()
            .replication_factor(3)
            .conf("security.protocol", "ssl")
            .build();
        assert_eq!(connector.replication_factor, 3);
        // connecting does not talk to the brokers yet
        assert!(connector
            .connect(&Url::parse("tcp://localhost:9092").unwrap())
            .is_ok());
    }

    #[tokio::test]
    #[ignore = "needs a Kafka broker on localhost:9092"]
    async fn create_stream_against_broker() {
        let store = KafkaStore::builder().broker("localhost:9092").build();
        let stream = stream("importer-test/created");
        store
            .create_stream(&stream, &StreamPolicy { partitions: 2 })
            .await
            .unwrap();
        assert!(!store
            .create_stream(&stream, &StreamPolicy { partitions: 2 })
            .await
            .unwrap());
        let tail = store.tail_cut(&stream).await.unwrap();
        assert!(tail.offset(0).is_some());
        assert!(tail.offset(1).is_some());
    }
}
