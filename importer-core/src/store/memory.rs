//! A stream store living entirely in memory.
//!
//! Mainly useful to run jobs in unit tests and to inspect what they wrote.
//! The store can be cloned freely, all clones share the same streams.
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    hash::{DefaultHasher, Hash, Hasher},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use url::Url;

use super::{
    EventWriter, StoreConnector, StoreError, StreamMetadata, StreamPolicy, StreamStore,
    WriterConfig, WriterMode,
};
use crate::{
    runtime::EventSource,
    stream::{Offset, Partition, StreamCut, StreamRef},
};

/// An event as it was stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEvent {
    /// Routing key the event was written with
    pub routing_key: Option<String>,
    /// Opaque event payload
    pub payload: Vec<u8>,
}

#[derive(Default)]
struct Inner {
    unreachable: bool,
    scopes: HashSet<String>,
    streams: HashMap<String, Vec<Vec<StoredEvent>>>,
    create_scope_calls: usize,
    create_stream_calls: usize,
}

/// In-memory [StreamStore]
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the store becoming unreachable (or reachable again).
    /// While unreachable every operation fails with [StoreError::Unreachable].
    pub fn set_reachable(&self, reachable: bool) {
        self.lock().unreachable = !reachable;
    }

    /// Number of times `create_scope` was called
    pub fn create_scope_calls(&self) -> usize {
        self.lock().create_scope_calls
    }

    /// Number of times `create_stream` was called
    pub fn create_stream_calls(&self) -> usize {
        self.lock().create_stream_calls
    }

    /// Number of streams in this store
    pub fn stream_count(&self) -> usize {
        self.lock().streams.len()
    }

    /// Number of partitions of a stream, `None` if it does not exist
    pub fn partition_count(&self, stream: &StreamRef) -> Option<usize> {
        self.lock()
            .streams
            .get(&stream.scoped_name())
            .map(Vec::len)
    }

    /// All visible events of a stream, ordered by partition and offset
    pub fn events(&self, stream: &StreamRef) -> Vec<StoredEvent> {
        self.lock()
            .streams
            .get(&stream.scoped_name())
            .map(|parts| parts.iter().flatten().cloned().collect())
            .unwrap_or_default()
    }

    /// Append an event directly, bypassing any writer
    pub fn append(
        &self,
        stream: &StreamRef,
        routing_key: Option<&str>,
        payload: &[u8],
    ) -> Result<(), StoreError> {
        let mut inner = self.reachable()?;
        let parts = inner
            .streams
            .get_mut(&stream.scoped_name())
            .ok_or_else(|| StoreError::StreamNotFound(stream.scoped_name()))?;
        let partition = match routing_key {
            Some(key) => partition_for_key(key, parts.len()),
            None => parts.iter().enumerate().min_by_key(|(_, p)| p.len()).map_or(0, |(i, _)| i),
        };
        parts[partition].push(StoredEvent {
            routing_key: routing_key.map(str::to_owned),
            payload: payload.to_vec(),
        });
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reachable(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        let inner = self.lock();
        if inner.unreachable {
            return Err(unreachable());
        }
        Ok(inner)
    }

    fn cut(&self, stream: &StreamRef, head: bool) -> Result<StreamCut, StoreError> {
        let inner = self.reachable()?;
        let parts = inner
            .streams
            .get(&stream.scoped_name())
            .ok_or_else(|| StoreError::StreamNotFound(stream.scoped_name()))?;
        Ok(StreamCut::from_positions(parts.iter().enumerate().map(
            |(i, events)| {
                let offset = if head { 0 } else { events.len() as Offset };
                (i as Partition, offset)
            },
        )))
    }
}

fn unreachable() -> StoreError {
    StoreError::Unreachable {
        endpoint: "memory".to_owned(),
        source: Box::new(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "memory store is marked unreachable",
        )),
    }
}

fn partition_for_key(key: &str, partitions: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % partitions as u64) as usize
}

#[async_trait]
impl StreamMetadata for MemoryStore {
    async fn create_scope(&self, scope: &str) -> Result<bool, StoreError> {
        let mut inner = self.reachable()?;
        inner.create_scope_calls += 1;
        Ok(inner.scopes.insert(scope.to_owned()))
    }

    async fn create_stream(
        &self,
        stream: &StreamRef,
        policy: &StreamPolicy,
    ) -> Result<bool, StoreError> {
        let mut inner = self.reachable()?;
        inner.create_stream_calls += 1;
        if inner.streams.contains_key(&stream.scoped_name()) {
            return Ok(false);
        }
        let partitions = usize::try_from(policy.partitions.max(1)).unwrap_or(1);
        inner
            .streams
            .insert(stream.scoped_name(), vec![Vec::new(); partitions]);
        Ok(true)
    }

    async fn head_cut(&self, stream: &StreamRef) -> Result<StreamCut, StoreError> {
        self.cut(stream, true)
    }

    async fn tail_cut(&self, stream: &StreamRef) -> Result<StreamCut, StoreError> {
        self.cut(stream, false)
    }
}

impl StreamStore for MemoryStore {
    fn reader(
        &self,
        stream: &StreamRef,
        start: &StreamCut,
        end: &StreamCut,
    ) -> Result<Box<dyn EventSource>, StoreError> {
        let inner = self.reachable()?;
        let parts = inner
            .streams
            .get(&stream.scoped_name())
            .ok_or_else(|| StoreError::StreamNotFound(stream.scoped_name()))?;
        let positions = (0..parts.len() as Partition)
            .map(|p| (p, start.offset(p).unwrap_or(0)))
            .collect();
        Ok(Box::new(MemoryReader {
            store: self.clone(),
            stream: stream.scoped_name(),
            positions,
            end: end.clone(),
        }))
    }

    fn writer(
        &self,
        stream: &StreamRef,
        config: &WriterConfig,
    ) -> Result<Box<dyn EventWriter>, StoreError> {
        let inner = self.reachable()?;
        if !inner.streams.contains_key(&stream.scoped_name()) {
            return Err(StoreError::StreamNotFound(stream.scoped_name()));
        }
        Ok(Box::new(MemoryWriter {
            store: self.clone(),
            stream: stream.clone(),
            mode: config.mode,
            pending: Vec::new(),
        }))
    }
}

struct MemoryReader {
    store: MemoryStore,
    stream: String,
    // next offset to read per partition
    positions: BTreeMap<Partition, Offset>,
    end: StreamCut,
}

impl EventSource for MemoryReader {
    fn poll(&mut self) -> Result<Option<Vec<u8>>, StoreError> {
        let inner = self.store.reachable()?;
        let parts = inner
            .streams
            .get(&self.stream)
            .ok_or_else(|| StoreError::StreamNotFound(self.stream.clone()))?;
        for (partition, next) in self.positions.iter_mut() {
            if self.end.offset(*partition).is_some_and(|end| *next >= end) {
                continue;
            }
            let event = usize::try_from(*next)
                .ok()
                .and_then(|idx| parts.get(*partition as usize)?.get(idx));
            if let Some(event) = event {
                *next += 1;
                return Ok(Some(event.payload.clone()));
            }
        }
        Ok(None)
    }

    fn is_finished(&mut self) -> bool {
        self.end.is_bounded()
            && self
                .positions
                .iter()
                .all(|(p, next)| self.end.offset(*p).is_some_and(|end| *next >= end))
    }
}

struct MemoryWriter {
    store: MemoryStore,
    stream: StreamRef,
    mode: WriterMode,
    pending: Vec<(Option<String>, Vec<u8>)>,
}

impl EventWriter for MemoryWriter {
    fn write(&mut self, routing_key: Option<&str>, payload: &[u8]) -> Result<(), StoreError> {
        match self.mode {
            WriterMode::AtLeastOnce => self.store.append(&self.stream, routing_key, payload),
            WriterMode::ExactlyOnce => {
                self.pending
                    .push((routing_key.map(str::to_owned), payload.to_vec()));
                Ok(())
            }
        }
    }

    fn checkpoint(&mut self) -> Result<(), StoreError> {
        for (key, payload) in self.pending.drain(..) {
            self.store.append(&self.stream, key.as_deref(), &payload)?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), StoreError> {
        self.pending.clear();
        Ok(())
    }
}

/// Connector which hands out the same [MemoryStore] for every controller
#[derive(Clone, Default)]
pub struct MemoryConnector {
    store: MemoryStore,
}

impl MemoryConnector {
    /// Create a connector for the given store
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }
}

impl StoreConnector for MemoryConnector {
    fn connect(&self, _controller: &Url) -> Result<Arc<dyn StreamStore>, StoreError> {
        Ok(Arc::new(self.store.clone()))
    }
}
