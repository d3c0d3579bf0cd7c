use tracing::debug;

use crate::{
    store::{StoreError, StreamMetadata},
    stream::{StreamCut, StreamRef},
};

/// Decides where a job starts and stops reading its input stream.
///
/// Start and end are resolved independently. Jobs either replay everything
/// retained or tail the stream, and never stop on their own.
pub struct CutResolver<'a, M: ?Sized> {
    metadata: &'a M,
}

impl<'a, M> CutResolver<'a, M>
where
    M: StreamMetadata + ?Sized,
{
    /// Create a resolver querying the given metadata service
    pub fn new(metadata: &'a M) -> Self {
        Self { metadata }
    }

    /// Resolve the start of the read.
    ///
    /// With `start_at_tail` only events written after this call are read,
    /// otherwise reading starts at the earliest retained event. Failing to
    /// reach the metadata service is returned as is.
    pub async fn resolve_start_cut(
        &self,
        stream: &StreamRef,
        start_at_tail: bool,
    ) -> Result<StreamCut, StoreError> {
        let cut = if start_at_tail {
            self.metadata.tail_cut(stream).await?
        } else {
            self.metadata.head_cut(stream).await?
        };
        debug!("Start cut of {stream} (startAtTail={start_at_tail}): {cut}");
        Ok(cut)
    }

    /// Resolve the end of the read, which is always unbounded
    pub fn resolve_end_cut(&self, stream: &StreamRef) -> StreamCut {
        debug!("End cut of {stream}: {}", StreamCut::Unbounded);
        StreamCut::Unbounded
    }
}
