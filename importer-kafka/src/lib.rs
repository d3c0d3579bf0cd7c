//! Kafka bindings of the data importer.
//!
//! [KafkaStore] stores every stream of the importer as a Kafka topic named
//! `<scope>.<stream>`, [KafkaConnector] opens such stores from controller
//! URIs. [KafkaSource] reads arbitrary topics and backs the
//! [KafkaMirroringAction] which copies a topic into a stream.
mod action;
mod error;
mod reader;
mod source;
mod store;
mod writer;

pub use action::KafkaMirroringAction;
pub use error::KafkaStoreError;
pub use reader::KafkaStreamReader;
pub use source::{KafkaSource, KafkaTopicReader};
pub use store::{bootstrap_server, topic_name, KafkaConnector, KafkaStore};
pub use writer::KafkaStreamWriter;
