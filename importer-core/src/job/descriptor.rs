use bon::bon;

use crate::{
    config::ConfigError,
    runtime::SinkSpec,
    store::WriterMode,
    stream::{StreamCut, StreamRef},
};

/// Routing key attached to every event of an ordered job unless a key is
/// configured explicitly
pub const DEFAULT_ROUTING_KEY: &str = "data-importer";

/// How written events are assigned to partitions of the output stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventRouter {
    /// Every event carries the same key, so all events land in one partition
    /// in write order
    Fixed(String),
    /// No key, the store may spread events over partitions without any
    /// ordering between them
    Unrouted,
}

impl EventRouter {
    /// Router of an ordered or unordered job. `routing_key` is only used
    /// when `ordered` is set and defaults to [DEFAULT_ROUTING_KEY].
    pub fn new(ordered: bool, routing_key: Option<String>) -> Self {
        if ordered {
            EventRouter::Fixed(routing_key.unwrap_or_else(|| DEFAULT_ROUTING_KEY.to_owned()))
        } else {
            EventRouter::Unrouted
        }
    }

    /// Routing key for the next event
    pub fn routing_key(&self) -> Option<&str> {
        match self {
            EventRouter::Fixed(key) => Some(key),
            EventRouter::Unrouted => None,
        }
    }
}

/// Everything the execution environment needs to run one mirroring job.
///
/// An unordered descriptor gives no ordering guarantee between events, jobs
/// whose consumers depend on event order must be ordered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDescriptor {
    input: StreamRef,
    start_cut: StreamCut,
    end_cut: StreamCut,
    output: StreamRef,
    router: EventRouter,
    writer_mode: WriterMode,
}

#[bon]
impl JobDescriptor {
    /// Assemble a descriptor.
    ///
    /// Fails with [ConfigError::CutOrder] if `start_cut` does not precede
    /// `end_cut`. `routing_key` is only used when `ordered` is set and
    /// defaults to [DEFAULT_ROUTING_KEY].
    #[builder]
    pub fn new(
        input: StreamRef,
        #[builder(default)] start_cut: StreamCut,
        #[builder(default)] end_cut: StreamCut,
        output: StreamRef,
        #[builder(default = true)] ordered: bool,
        routing_key: Option<String>,
        #[builder(default)] writer_mode: WriterMode,
    ) -> Result<Self, ConfigError> {
        if !start_cut.precedes(&end_cut) {
            return Err(ConfigError::CutOrder {
                start: start_cut.to_string(),
                end: end_cut.to_string(),
            });
        }
        Ok(Self {
            input,
            start_cut,
            end_cut,
            output,
            router: EventRouter::new(ordered, routing_key),
            writer_mode,
        })
    }

    /// Stream to read from
    pub fn input(&self) -> &StreamRef {
        &self.input
    }

    /// First position to read
    pub fn start_cut(&self) -> &StreamCut {
        &self.start_cut
    }

    /// Position to stop reading at
    pub fn end_cut(&self) -> &StreamCut {
        &self.end_cut
    }

    /// Stream to write to
    pub fn output(&self) -> &StreamRef {
        &self.output
    }

    /// True if all events are written with one routing key
    pub fn is_ordered(&self) -> bool {
        matches!(self.router, EventRouter::Fixed(_))
    }

    /// Routing of written events
    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    /// Durability mode of the writer
    pub fn writer_mode(&self) -> WriterMode {
        self.writer_mode
    }

    /// What the sink of this job writes
    pub fn sink_spec(&self) -> SinkSpec {
        SinkSpec {
            stream: self.output.clone(),
            router: self.router.clone(),
            mode: self.writer_mode,
        }
    }
}
