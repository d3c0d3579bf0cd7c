//! Interface of the log-storage system jobs read from and write to.
//!
//! A [StreamStore] offers a metadata service (creating scopes and streams,
//! resolving cuts) and the data plane (bounded readers, keyed writers). Stores
//! are obtained through a [StoreConnector] from a stream's controller URI.
use std::{fmt::Display, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

use crate::{
    error::BoxError,
    runtime::EventSource,
    stream::{StreamCut, StreamRef},
};

pub mod memory;

pub use memory::{MemoryConnector, MemoryStore};

/// Settings applied when a stream is created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamPolicy {
    /// Number of partitions of a newly created stream
    pub partitions: i32,
}

impl Default for StreamPolicy {
    fn default() -> Self {
        Self { partitions: 1 }
    }
}

/// Durability mode of a writer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriterMode {
    /// Writes become visible immediately, a retried write may be visible twice
    AtLeastOnce,
    /// Writes become visible at the next checkpoint, retried writes are never
    /// visible twice
    #[default]
    ExactlyOnce,
}

impl Display for WriterMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriterMode::AtLeastOnce => f.write_str("AT_LEAST_ONCE"),
            WriterMode::ExactlyOnce => f.write_str("EXACTLY_ONCE"),
        }
    }
}

/// Settings of a single writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterConfig {
    /// Durability mode
    pub mode: WriterMode,
    /// Stable identity of the writer, used to fence transactions of
    /// earlier incarnations of the same job
    pub writer_id: String,
}

/// Metadata service of the store
#[async_trait]
pub trait StreamMetadata: Send + Sync {
    /// Create a scope if it does not exist yet.
    /// Returns `true` if the scope was created by this call.
    async fn create_scope(&self, scope: &str) -> Result<bool, StoreError>;

    /// Create a stream if it does not exist yet.
    /// Returns `true` if the stream was created by this call.
    async fn create_stream(
        &self,
        stream: &StreamRef,
        policy: &StreamPolicy,
    ) -> Result<bool, StoreError>;

    /// Cut at the earliest retained event of every partition
    async fn head_cut(&self, stream: &StreamRef) -> Result<StreamCut, StoreError>;

    /// Cut after the last written event of every partition
    async fn tail_cut(&self, stream: &StreamRef) -> Result<StreamCut, StoreError>;
}

/// A log-storage system holding streams
pub trait StreamStore: StreamMetadata + 'static {
    /// Open a reader returning the events from `start` up to `end`
    fn reader(
        &self,
        stream: &StreamRef,
        start: &StreamCut,
        end: &StreamCut,
    ) -> Result<Box<dyn EventSource>, StoreError>;

    /// Open a writer appending to the given stream
    fn writer(
        &self,
        stream: &StreamRef,
        config: &WriterConfig,
    ) -> Result<Box<dyn EventWriter>, StoreError>;
}

/// Appends events to a single stream
pub trait EventWriter: Send {
    /// Append a single event. Events with the same routing key land in the
    /// same partition in write order, events without a key may land in any
    /// partition.
    fn write(&mut self, routing_key: Option<&str>, payload: &[u8]) -> Result<(), StoreError>;

    /// Make all writes so far durable and visible
    fn checkpoint(&mut self) -> Result<(), StoreError>;

    /// Release the writer. Writes after the last checkpoint may be discarded.
    fn close(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Opens stores by controller URI
pub trait StoreConnector: Send + Sync {
    /// Connect to the store behind the given controller
    fn connect(&self, controller: &Url) -> Result<Arc<dyn StreamStore>, StoreError>;
}

/// Errors reported by a stream store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Could not reach stream store at {endpoint}")]
    Unreachable {
        endpoint: String,
        #[source]
        source: BoxError,
    },
    #[error("Stream {0} does not exist")]
    StreamNotFound(String),
    #[error("Unsupported controller URI {0}")]
    UnsupportedController(String),
    #[error("Stream store operation failed")]
    Backend(#[source] BoxError),
}

impl StoreError {
    /// Wrap any backend failure
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend(Box::new(err))
    }
}
