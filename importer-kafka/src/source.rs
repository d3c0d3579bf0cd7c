use std::collections::HashMap;
use std::time::Duration;

use kafka_source_builder::SetAtLeastOneBroker;

use bon::Builder;
use data_importer::runtime::EventSource;
use data_importer::store::StoreError;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, CommitMode, Consumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::Message as _;
use tracing::warn;

use crate::KafkaStoreError;

/// Reads all records of a Kafka topic as a member of a consumer group.
/// NOTE: Records with an empty payload are not emitted to the stream.
///
/// Offsets are never committed automatically. The consumer group offsets
/// only advance when the job checkpoints, after the sink made the records
/// durable, so a restarted job continues from its last checkpoint.
///
/// # Usage
///
/// The source can be instantiated using the builder.
/// Custom [rdkafka configuration](https://github.com/confluentinc/librdkafka/blob/master/CONFIGURATION.md)
/// can be provided by calling `.conf(key, value)`.
///
/// ```
/// use data_importer_kafka::KafkaSource;
///
/// let kafka_source = KafkaSource::builder()
///     .broker("mybroker.com") // at least one broker must be provided
///     .broker("myotherbroker.com")
///     .topic("pets")
///     .group_id("my-group-id")
///     .auto_offset_reset("latest")
///     .conf("log_level", "3") // additional custom config
///     .conf("security.protocol", "ssl")
///     .build();
/// ```
#[derive(Builder, Debug, Clone)]
#[builder(on(String, into))]
pub struct KafkaSource {
    #[builder(field)]
    kafka_config: HashMap<String, String>,
    #[builder(field)]
    brokers: Vec<String>,
    /// this is a workaround to check if at least one broker was provided
    #[builder(overwritable, setters(vis = "", name = "at_least_one_broker"))]
    _at_least_one_broker: (),
    topic: String,
    group_id: String,
    auto_offset_reset: String,
    /// Time a poll blocks waiting for the next record
    #[builder(default = Duration::from_millis(100))]
    poll_timeout: Duration,
}

impl<S: kafka_source_builder::State> KafkaSourceBuilder<S> {
    /// Provide an additional config for the Kafka consumer.
    /// Note that `bootstrap.servers`, `group.id` and `auto.offset.reset` configs are
    /// ignored. Use the respective builder methods to supply these.
    /// `enable.auto.commit` is always disabled.
    pub fn conf(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.kafka_config.insert(key.into(), value.into());
        self
    }
    /// Add a broker URL to consume from
    pub fn broker(mut self, url: impl Into<String>) -> KafkaSourceBuilder<SetAtLeastOneBroker<S>> {
        self.brokers.push(url.into());
        self.at_least_one_broker(())
    }
}

impl KafkaSource {
    /// Topic read by this source
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Comma separated bootstrap servers
    pub fn brokers(&self) -> String {
        self.brokers.join(",")
    }

    /// Consumer group the source commits its offsets for
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// Where a group without committed offsets starts reading
    pub fn auto_offset_reset(&self) -> &str {
        &self.auto_offset_reset
    }

    fn client_config(&self) -> ClientConfig {
        let mut kafka_conf = ClientConfig::new();
        for (k, v) in self.kafka_config.iter() {
            kafka_conf.set(k, v);
        }
        kafka_conf
            .set("group.id", &self.group_id)
            .set("bootstrap.servers", self.brokers())
            .set("auto.offset.reset", &self.auto_offset_reset)
            .set("enable.auto.commit", "false");
        kafka_conf
    }

    /// Connect to the brokers and subscribe to the topic
    pub fn open(&self) -> Result<KafkaTopicReader, KafkaStoreError> {
        let consumer: BaseConsumer = self
            .client_config()
            .create()
            .map_err(KafkaStoreError::CreateClient)?;
        consumer
            .subscribe(&[self.topic.as_str()])
            .map_err(KafkaStoreError::TopicPartition)?;
        Ok(KafkaTopicReader {
            consumer,
            brokers: self.brokers(),
            poll_timeout: self.poll_timeout,
            uncommitted: false,
        })
    }
}

/// Subscription of a [KafkaSource].
/// This type can not be constructed directly, use [KafkaSource::open] instead.
pub struct KafkaTopicReader {
    consumer: BaseConsumer,
    brokers: String,
    poll_timeout: Duration,
    /// records were polled since the last commit
    uncommitted: bool,
}

impl KafkaTopicReader {
    /// Commit the offsets of every record polled so far
    fn commit(&mut self) -> Result<(), KafkaStoreError> {
        if !self.uncommitted {
            return Ok(());
        }
        match self.consumer.commit_consumer_state(CommitMode::Sync) {
            Ok(()) | Err(KafkaError::ConsumerCommit(RDKafkaErrorCode::NoOffset)) => {
                self.uncommitted = false;
                Ok(())
            }
            Err(e) => Err(KafkaStoreError::Commit(e)),
        }
    }
}

impl EventSource for KafkaTopicReader {
    fn poll(&mut self) -> Result<Option<Vec<u8>>, StoreError> {
        let Some(result) = self.consumer.poll(self.poll_timeout) else {
            return Ok(None);
        };
        let msg = result.map_err(|e| KafkaStoreError::Poll(e).into_store_error(&self.brokers))?;
        self.uncommitted = true;
        Ok(msg.payload().map(<[u8]>::to_vec))
    }

    #[inline(always)]
    fn is_finished(&mut self) -> bool {
        false // kafka is unbounded
    }

    fn checkpoint(&mut self) -> Result<(), StoreError> {
        self.commit().map_err(|e| e.into_store_error(&self.brokers))
    }

    fn suspend(&mut self) {
        if self.uncommitted {
            warn!("Leaving consumer group with uncommitted records, they will be read again");
        }
        self.consumer.unsubscribe();
    }
}

/// Doctests to assert some bad builders do not compile
/// see: https://stackoverflow.com/a/55327334
/// this should not compile because the broker is missing
/// ```compile_fail
/// use data_importer_kafka::KafkaSource;
/// KafkaSource::builder()
/// .topic("foobar")
/// .group_id("groupid")
/// .auto_offset_reset("earliest")
/// .build();
/// ```
/// missing topic
/// ```compile_fail
/// use data_importer_kafka::KafkaSource;
/// KafkaSource::builder()
/// .group_id("groupid")
/// .auto_offset_reset("earliest")
/// .broker("broker.com")
/// .build();
/// ```
struct _CompileTests;

#[cfg(test)]
mod tests {
    use super::KafkaSource;

    #[test]
    fn test_builder() {
        let source = KafkaSource::builder()
            .topic("foobar")
            .group_id("groupid")
            .auto_offset_reset("earliest")
            .broker("foo.com")
            .broker("bar.com")
            .conf("log_level", "3")
            .build();
        assert_eq!(source.brokers(), "foo.com,bar.com");
        let conf = source.client_config();
        assert_eq!(conf.get("group.id"), Some("groupid"));
        assert_eq!(conf.get("auto.offset.reset"), Some("earliest"));
        assert_eq!(conf.get("log_level"), Some("3"));
        assert_eq!(conf.get("enable.auto.commit"), Some("false"));
    }

    #[test]
    fn auto_commit_can_not_be_enabled() {
        let source = KafkaSource::builder()
            .topic("foobar")
            .group_id("groupid")
            .auto_offset_reset("earliest")
            .broker("foo.com")
            .conf("enable.auto.commit", "true")
            .build();
        assert_eq!(
            source.client_config().get("enable.auto.commit"),
            Some("false")
        );
    }
}
