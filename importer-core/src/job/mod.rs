//! Jobs: resolving what to read, assembling the descriptor and wiring the
//! graph handed to the execution environment.
mod cut_resolver;
mod descriptor;
mod mirroring;
mod operators;

pub use cut_resolver::CutResolver;
pub use descriptor::{EventRouter, JobDescriptor, DEFAULT_ROUTING_KEY};
pub use mirroring::{StreamMirroringJob, IS_STREAM_ORDERED, ROUTING_KEY};
pub use operators::{stream_sink, stream_source, StreamSink};
