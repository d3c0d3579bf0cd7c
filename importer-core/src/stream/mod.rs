//! Identification of streams and positions within them
mod cut;
mod reference;

pub use cut::{Offset, Partition, StreamCut};
pub use reference::StreamRef;
