use data_importer::store::StoreError;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use thiserror::Error;

/// Possible errors which can occur talking to Kafka
#[derive(Debug, Error)]
pub enum KafkaStoreError {
    #[error("Failed to create Kafka client")]
    CreateClient(#[source] KafkaError),
    #[error("Failed to fetch metadata of topic {0} from Kafka broker")]
    FetchMetadata(String, #[source] KafkaError),
    #[error("Topic {0} does not exist")]
    TopicNotFound(String),
    #[error("Failed to fetch watermarks of partition {partition} of topic {topic}")]
    FetchWatermarks {
        topic: String,
        partition: i32,
        #[source]
        source: KafkaError,
    },
    #[error("Failed to create topic {0}: {1}")]
    CreateTopic(String, RDKafkaErrorCode),
    #[error("Kafka admin operation failed")]
    Admin(#[source] KafkaError),
    #[error("Could not assign topic-partitions to consumer")]
    TopicPartition(#[source] KafkaError),
    #[error("Error polling Kafka consumer")]
    Poll(#[source] KafkaError),
    #[error("Failed to send message")]
    Send(#[source] KafkaError),
    #[error("Failed to commit consumer offsets")]
    Commit(#[source] KafkaError),
    #[error("Failed to flush producer")]
    Flush(#[source] KafkaError),
    #[error("Kafka transaction failed")]
    Transaction(#[source] KafkaError),
    #[error("Unsupported controller URI {0}, expected tcp://host:port or kafka://host:port")]
    UnsupportedController(String),
}

impl KafkaStoreError {
    fn code(&self) -> Option<RDKafkaErrorCode> {
        match self {
            KafkaStoreError::CreateTopic(_, code) => Some(*code),
            KafkaStoreError::CreateClient(e)
            | KafkaStoreError::FetchMetadata(_, e)
            | KafkaStoreError::FetchWatermarks { source: e, .. }
            | KafkaStoreError::Admin(e)
            | KafkaStoreError::TopicPartition(e)
            | KafkaStoreError::Poll(e)
            | KafkaStoreError::Send(e)
            | KafkaStoreError::Flush(e)
            | KafkaStoreError::Commit(e)
            | KafkaStoreError::Transaction(e) => match e {
                // admin results carry their code outside of rdkafka_error_code
                KafkaError::AdminOp(code) => Some(*code),
                e => e.rdkafka_error_code(),
            },
            KafkaStoreError::TopicNotFound(_) | KafkaStoreError::UnsupportedController(_) => None,
        }
    }

    /// True if the brokers could not be reached at all
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self.code(),
            Some(
                RDKafkaErrorCode::AllBrokersDown
                    | RDKafkaErrorCode::BrokerTransportFailure
                    | RDKafkaErrorCode::OperationTimedOut
                    | RDKafkaErrorCode::RequestTimedOut
                    | RDKafkaErrorCode::Resolve
            )
        )
    }

    /// Convert into the error type of the store interface. `endpoint` names
    /// the brokers the failed operation talked to.
    pub fn into_store_error(self, endpoint: &str) -> StoreError {
        match self {
            KafkaStoreError::TopicNotFound(topic) => StoreError::StreamNotFound(topic),
            KafkaStoreError::UnsupportedController(uri) => StoreError::UnsupportedController(uri),
            err if err.is_connectivity() => StoreError::Unreachable {
                endpoint: endpoint.to_owned(),
                source: Box::new(err),
            },
            err => StoreError::backend(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_are_connectivity_failures() {
        let err = KafkaStoreError::FetchMetadata(
            "scope.stream".to_owned(),
            KafkaError::MetadataFetch(RDKafkaErrorCode::OperationTimedOut),
        );
        assert!(err.is_connectivity());
        assert!(matches!(
            err.into_store_error("localhost:9092"),
            StoreError::Unreachable { endpoint, .. } if endpoint == "localhost:9092"
        ));
    }

    #[test]
    fn timed_out_admin_operation_is_unreachable() {
        let err = KafkaStoreError::Admin(KafkaError::AdminOp(RDKafkaErrorCode::OperationTimedOut));
        assert!(err.is_connectivity());
        assert!(matches!(
            err.into_store_error("127.0.0.1:1"),
            StoreError::Unreachable { .. }
        ));
    }

    #[test]
    fn rejected_topic_is_a_backend_failure() {
        let err = KafkaStoreError::CreateTopic(
            "scope.stream".to_owned(),
            RDKafkaErrorCode::InvalidReplicationFactor,
        );
        assert!(!err.is_connectivity());
        assert!(matches!(
            err.into_store_error("localhost:9092"),
            StoreError::Backend(_)
        ));
    }

    #[test]
    fn missing_topic_is_a_missing_stream() {
        let err = KafkaStoreError::TopicNotFound("scope.stream".to_owned());
        assert!(matches!(
            err.into_store_error("localhost:9092"),
            StoreError::StreamNotFound(t) if t == "scope.stream"
        ));
    }
}
