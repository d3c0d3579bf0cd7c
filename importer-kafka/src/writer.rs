use std::time::{Duration, Instant};

use data_importer::store::{EventWriter, StoreError, WriterConfig, WriterMode};
use rdkafka::{
    error::KafkaError,
    producer::{BaseProducer, BaseRecord, Producer, PurgeConfig},
    types::RDKafkaErrorCode,
};
use tracing::{debug, warn};

use crate::{KafkaStore, KafkaStoreError};

/// Time to wait for queue space when the local producer queue is full
const QUEUE_FULL_BACKOFF: Duration = Duration::from_millis(100);

/// Appends events to a stream topic.
///
/// In [WriterMode::ExactlyOnce] every checkpoint commits a Kafka transaction,
/// the writer id doubles as `transactional.id` so a restarted job fences off
/// its earlier incarnation. In [WriterMode::AtLeastOnce] a checkpoint flushes
/// the producer.
pub struct KafkaStreamWriter {
    producer: BaseProducer,
    topic: String,
    brokers: String,
    mode: WriterMode,
    timeout: Duration,
}

impl KafkaStreamWriter {
    pub(crate) fn open(
        store: &KafkaStore,
        topic: String,
        config: &WriterConfig,
    ) -> Result<Self, KafkaStoreError> {
        let mut kafka_conf = store.client_config();
        kafka_conf.set("acks", "all");
        if config.mode == WriterMode::ExactlyOnce {
            kafka_conf
                .set("enable.idempotence", "true")
                .set("transactional.id", &config.writer_id);
        }
        let producer: BaseProducer = kafka_conf
            .create()
            .map_err(KafkaStoreError::CreateClient)?;
        let timeout = store.operation_timeout();
        if config.mode == WriterMode::ExactlyOnce {
            producer
                .init_transactions(timeout)
                .map_err(KafkaStoreError::Transaction)?;
            producer
                .begin_transaction()
                .map_err(KafkaStoreError::Transaction)?;
        }
        debug!("Writing {topic} as {} ({})", config.writer_id, config.mode);
        Ok(Self {
            producer,
            topic,
            brokers: store.bootstrap_servers(),
            mode: config.mode,
            timeout,
        })
    }

    fn send(&self, routing_key: Option<&str>, payload: &[u8]) -> Result<(), KafkaStoreError> {
        loop {
            let mut record = BaseRecord::<str, [u8]>::to(&self.topic).payload(payload);
            if let Some(key) = routing_key {
                record = record.key(key);
            }
            match self.producer.send(record) {
                Ok(()) => break,
                Err((KafkaError::MessageProduction(RDKafkaErrorCode::QueueFull), _)) => {
                    self.producer.poll(QUEUE_FULL_BACKOFF);
                }
                Err((e, _)) => return Err(KafkaStoreError::Send(e)),
            }
        }
        self.producer.poll(Duration::default());
        Ok(())
    }

    /// Drop every write which is not committed yet and abort the open
    /// transaction
    fn abort(&self) -> Result<(), KafkaStoreError> {
        self.producer.purge(PurgeConfig::default().queue().inflight());
        // delivery reports of purged records have to be served before aborting
        let deadline = Instant::now() + self.timeout;
        while self.producer.in_flight_count() > 0 && Instant::now() < deadline {
            self.producer.poll(Duration::from_millis(10));
        }
        self.producer
            .abort_transaction(self.timeout)
            .map_err(KafkaStoreError::Transaction)
    }

    fn commit(&self) -> Result<(), KafkaStoreError> {
        match self.mode {
            WriterMode::ExactlyOnce => {
                self.producer
                    .commit_transaction(self.timeout)
                    .map_err(KafkaStoreError::Transaction)?;
                self.producer
                    .begin_transaction()
                    .map_err(KafkaStoreError::Transaction)
            }
            WriterMode::AtLeastOnce => self
                .producer
                .flush(self.timeout)
                .map_err(KafkaStoreError::Flush),
        }
    }
}

impl EventWriter for KafkaStreamWriter {
    fn write(&mut self, routing_key: Option<&str>, payload: &[u8]) -> Result<(), StoreError> {
        self.send(routing_key, payload)
            .map_err(|e| e.into_store_error(&self.brokers))
    }

    fn checkpoint(&mut self) -> Result<(), StoreError> {
        self.commit().map_err(|e| e.into_store_error(&self.brokers))
    }

    fn close(&mut self) -> Result<(), StoreError> {
        let result = match self.mode {
            // everything up to the final checkpoint is committed already
            WriterMode::ExactlyOnce => self.abort(),
            WriterMode::AtLeastOnce => self
                .producer
                .flush(self.timeout)
                .map_err(KafkaStoreError::Flush),
        };
        if let Err(e) = &result {
            warn!("Error closing writer of {}: {e}", self.topic);
        }
        result.map_err(|e| e.into_store_error(&self.brokers))
    }
}
