use std::{collections::BTreeMap, time::Duration};

use data_importer::{
    runtime::EventSource,
    store::StoreError,
    stream::{Offset, Partition, StreamCut},
};
use rdkafka::{
    consumer::{BaseConsumer, Consumer},
    Message as _, TopicPartitionList,
};
use tracing::debug;

use crate::{KafkaStore, KafkaStoreError};

/// Reads the range between two cuts of a stream topic.
/// Only committed records are returned. Records with an empty payload are
/// skipped.
pub struct KafkaStreamReader {
    consumer: BaseConsumer,
    topic: String,
    brokers: String,
    end: StreamCut,
    /// next offset to read of every partition, if known
    next: BTreeMap<Partition, Option<Offset>>,
    poll_timeout: Duration,
}

impl KafkaStreamReader {
    pub(crate) fn open(
        store: &KafkaStore,
        topic: String,
        start: &StreamCut,
        end: &StreamCut,
    ) -> Result<Self, KafkaStoreError> {
        let mut kafka_conf = store.client_config();
        kafka_conf
            .set("group.id", format!("data-importer-{topic}"))
            .set("enable.auto.commit", "false")
            .set("isolation.level", "read_committed");
        let consumer: BaseConsumer = kafka_conf
            .create()
            .map_err(KafkaStoreError::CreateClient)?;

        let partitions = store.partitions(&consumer, &topic)?;
        let mut topic_partitions = TopicPartitionList::with_capacity(partitions.len());
        let mut next = BTreeMap::new();
        for partition in partitions {
            let offset = start.offset(partition);
            let kafka_offset = offset.map_or(rdkafka::Offset::Beginning, rdkafka::Offset::Offset);
            topic_partitions
                .add_partition_offset(&topic, partition, kafka_offset)
                .map_err(KafkaStoreError::TopicPartition)?;
            next.insert(partition, offset);
        }
        consumer
            .assign(&topic_partitions)
            .map_err(KafkaStoreError::TopicPartition)?;
        debug!("Reading {topic} from {start} to {end}");

        Ok(Self {
            consumer,
            topic,
            brokers: store.bootstrap_servers(),
            end: end.clone(),
            next,
            poll_timeout: store.poll_timeout(),
        })
    }

    fn pause(&self, partition: Partition) -> Result<(), KafkaStoreError> {
        let mut tpl = TopicPartitionList::with_capacity(1);
        tpl.add_partition(&self.topic, partition);
        self.consumer
            .pause(&tpl)
            .map_err(KafkaStoreError::TopicPartition)
    }

    /// Next offset of `partition` as seen by the consumer. This also skips
    /// transaction markers which never show up as records.
    fn position(&self, partition: Partition) -> Option<Offset> {
        let consumer_position = self.consumer.position().ok().and_then(|positions| {
            match positions.find_partition(&self.topic, partition)?.offset() {
                rdkafka::Offset::Offset(offset) => Some(offset),
                _ => None,
            }
        });
        consumer_position.or_else(|| self.next.get(&partition).copied().flatten())
    }
}

impl EventSource for KafkaStreamReader {
    fn poll(&mut self) -> Result<Option<Vec<u8>>, StoreError> {
        let Some(result) = self.consumer.poll(self.poll_timeout) else {
            return Ok(None);
        };
        let msg = result
            .map_err(|e| KafkaStoreError::Poll(e).into_store_error(&self.brokers))?;
        let (partition, offset) = (msg.partition(), msg.offset());
        if self.end.offset(partition).is_some_and(|end| offset >= end) {
            // past the end cut, stop fetching this partition
            self.pause(partition)
                .map_err(|e| e.into_store_error(&self.brokers))?;
            return Ok(None);
        }
        self.next.insert(partition, Some(offset + 1));
        Ok(msg.payload().map(<[u8]>::to_vec))
    }

    fn is_finished(&mut self) -> bool {
        if !self.end.is_bounded() {
            return false;
        }
        self.next.keys().all(|partition| {
            match (self.end.offset(*partition), self.position(*partition)) {
                (Some(end), Some(position)) => position >= end,
                _ => false,
            }
        })
    }

    fn suspend(&mut self) {
        if let Err(e) = self.consumer.unassign() {
            debug!("Error unassigning {}: {e}", self.topic);
        }
    }
}
