use std::sync::Arc;

use super::{EventRouter, JobDescriptor};
use crate::{
    runtime::{EventSink, SinkNode, SinkSpec, SourceNode, SourceSpec},
    store::{EventWriter, StoreError, StreamStore, WriterConfig},
};

/// Source reading the input range of the descriptor from `store`
pub fn stream_source(store: Arc<dyn StreamStore>, descriptor: &JobDescriptor) -> SourceNode {
    let stream = descriptor.input().clone();
    let start = descriptor.start_cut().clone();
    let end = descriptor.end_cut().clone();
    let spec = SourceSpec::Stream {
        stream: stream.clone(),
        start: start.clone(),
        end: end.clone(),
    };
    SourceNode::new(
        "stream-reader",
        format!("Stream reader from {stream}"),
        spec,
        move || store.reader(&stream, &start, &end),
    )
}

/// Sink writing to the stream of `spec` in `store`, routing every event
/// with the router of `spec`
pub fn stream_sink(
    store: Arc<dyn StreamStore>,
    spec: SinkSpec,
    writer_id: impl Into<String>,
) -> SinkNode {
    let stream = spec.stream.clone();
    let router = spec.router.clone();
    let config = WriterConfig {
        mode: spec.mode,
        writer_id: writer_id.into(),
    };
    SinkNode::new(
        "stream-writer",
        format!("Stream writer to {stream}"),
        spec,
        move || {
            let writer = store.writer(&stream, &config)?;
            Ok(Box::new(StreamSink::new(writer, router)) as Box<dyn EventSink>)
        },
    )
}

/// Writes every event to a stream, keyed by its router
pub struct StreamSink {
    writer: Box<dyn EventWriter>,
    router: EventRouter,
}

impl StreamSink {
    /// Route all events through `router` into `writer`
    pub fn new(writer: Box<dyn EventWriter>, router: EventRouter) -> Self {
        Self { writer, router }
    }
}

impl EventSink for StreamSink {
    fn sink(&mut self, payload: Vec<u8>) -> Result<(), StoreError> {
        self.writer.write(self.router.routing_key(), &payload)
    }

    fn checkpoint(&mut self) -> Result<(), StoreError> {
        self.writer.checkpoint()
    }

    fn close(&mut self) -> Result<(), StoreError> {
        self.writer.close()
    }
}
