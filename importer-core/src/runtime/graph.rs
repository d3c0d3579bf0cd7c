use std::fmt::Debug;

use super::{EventSink, EventSource};
use crate::{
    job::EventRouter,
    store::{StoreError, WriterMode},
    stream::{StreamCut, StreamRef},
};

type SourceFactory = Box<dyn FnOnce() -> Result<Box<dyn EventSource>, StoreError> + Send>;
type SinkFactory = Box<dyn FnOnce() -> Result<Box<dyn EventSink>, StoreError> + Send>;

/// What a source node reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    /// A range of a stream in the stream store
    Stream {
        /// Stream being read
        stream: StreamRef,
        /// First position to read
        start: StreamCut,
        /// Position to stop at
        end: StreamCut,
    },
    /// Any other system, e.g. a Kafka topic
    External {
        /// Kind of the external system
        kind: String,
        /// Human readable description of what is read
        description: String,
    },
}

/// What a sink node writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkSpec {
    /// Stream being written
    pub stream: StreamRef,
    /// Routing applied to every event
    pub router: EventRouter,
    /// Durability mode of the writer
    pub mode: WriterMode,
}

/// The source of a job. The source is opened lazily by the environment
/// executing the job.
pub struct SourceNode {
    uid: String,
    name: String,
    spec: SourceSpec,
    factory: SourceFactory,
}

impl SourceNode {
    /// Create a node which opens its source by calling `factory`
    pub fn new<F>(uid: impl Into<String>, name: impl Into<String>, spec: SourceSpec, factory: F) -> Self
    where
        F: FnOnce() -> Result<Box<dyn EventSource>, StoreError> + Send + 'static,
    {
        Self {
            uid: uid.into(),
            name: name.into(),
            spec,
            factory: Box::new(factory),
        }
    }

    /// Stable identifier of this node within the job
    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Display name of this node
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Description of what this node reads
    pub fn spec(&self) -> &SourceSpec {
        &self.spec
    }

    /// Open the source
    pub fn open(self) -> Result<Box<dyn EventSource>, StoreError> {
        (self.factory)()
    }
}

impl Debug for SourceNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceNode")
            .field("uid", &self.uid)
            .field("name", &self.name)
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

/// The sink of a job, opened lazily like [SourceNode]
pub struct SinkNode {
    uid: String,
    name: String,
    spec: SinkSpec,
    factory: SinkFactory,
}

impl SinkNode {
    /// Create a node which opens its sink by calling `factory`
    pub fn new<F>(uid: impl Into<String>, name: impl Into<String>, spec: SinkSpec, factory: F) -> Self
    where
        F: FnOnce() -> Result<Box<dyn EventSink>, StoreError> + Send + 'static,
    {
        Self {
            uid: uid.into(),
            name: name.into(),
            spec,
            factory: Box::new(factory),
        }
    }

    /// Stable identifier of this node within the job
    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Display name of this node
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Description of what this node writes
    pub fn spec(&self) -> &SinkSpec {
        &self.spec
    }

    /// Open the sink
    pub fn open(self) -> Result<Box<dyn EventSink>, StoreError> {
        (self.factory)()
    }
}

impl Debug for SinkNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkNode")
            .field("uid", &self.uid)
            .field("name", &self.name)
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

/// A job: every event of the source is written to the sink
#[derive(Debug)]
pub struct JobGraph {
    source: SourceNode,
    sink: SinkNode,
}

impl JobGraph {
    /// Wire a source to a sink
    pub fn new(source: SourceNode, sink: SinkNode) -> Self {
        Self { source, sink }
    }

    /// The source of this job
    pub fn source(&self) -> &SourceNode {
        &self.source
    }

    /// The sink of this job
    pub fn sink(&self) -> &SinkNode {
        &self.sink
    }

    /// Split the graph into its nodes
    pub fn into_parts(self) -> (SourceNode, SinkNode) {
        (self.source, self.sink)
    }
}
