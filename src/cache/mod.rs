//! Read-through caches over the catalog's JSON file.
//!
//! ## Architecture
//!
//! - `ItemCache` keeps the parsed items plus a lowercased name per item,
//!   validated against the file's mtime on every call
//! - Concurrent stale callers are collapsed into one read by `SingleFlight`
//! - Appends publish a new snapshot, then queue a job on the `WriteQueue`.
//!   Each job writes the items already on disk plus its own item, so a
//!   failed append never reaches the file through a later one
//! - `StatsCache` derives aggregates from its own parse of the same file

mod single_flight;
mod stats;
mod write_queue;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::oneshot;

use crate::data_path::DataPath;
use crate::debug_log::{self, TimedOp};
use crate::error::{StoreError, StoreResult};
use crate::query::{self, ListQuery};
use crate::storage::StoreFs;
use crate::types::{CachedItem, Item, ItemKey, Page};

pub use single_flight::SingleFlight;
pub use stats::{DEFAULT_AVERAGE_FIELD, StatsCache};
pub use write_queue::{WriteAck, WriteQueue};

/// Immutable view of the item collection as of one load or write.
///
/// Never mutated once published; every change replaces the whole snapshot.
/// The first `durable` items are known to be on disk. The rest are queued
/// appends, in the same order as their jobs in the write queue.
#[derive(Debug)]
pub struct Snapshot {
    pub items: Arc<[CachedItem]>,
    pub path: PathBuf,
    pub modified: SystemTime,
    durable: usize,
}

impl Snapshot {
    /// True when `path` has a queued append waiting on this snapshot.
    fn awaits_write(&self, path: &Path) -> bool {
        self.path == path && self.durable < self.items.len()
    }
}

#[derive(Default)]
struct State {
    snapshot: Option<Arc<Snapshot>>,
    /// Bumped on every publish so a load can tell it raced one
    generation: u64,
    /// Queued writes not yet on disk. While non-zero the in-memory snapshot
    /// is ahead of the file and must not be replaced by a reload.
    pending_writes: usize,
}

struct Inner {
    fs: Arc<dyn StoreFs>,
    data_path: DataPath,
    state: Mutex<State>,
    loads: SingleFlight<PathBuf, StoreResult<Arc<Snapshot>>>,
    writes: WriteQueue,
}

/// Item cache with mtime validation, coalesced loads and serialized writes.
///
/// Cheap to clone; clones share one snapshot, one load registry and one
/// write queue.
#[derive(Clone)]
pub struct ItemCache {
    inner: Arc<Inner>,
}

impl ItemCache {
    /// Must be called from within a tokio runtime (the write queue spawns its consumer).
    pub fn new(data_path: DataPath, fs: Arc<dyn StoreFs>) -> Self {
        Self {
            inner: Arc::new(Inner {
                writes: WriteQueue::spawn(Arc::clone(&fs)),
                fs,
                data_path,
                state: Mutex::new(State::default()),
                loads: SingleFlight::new(),
            }),
        }
    }

    /// Current snapshot, reloading it first if the backing file changed.
    pub async fn snapshot(&self) -> StoreResult<Arc<Snapshot>> {
        let path = self.inner.data_path.resolve();

        if let Some(ahead) = self.inner.unflushed(&path) {
            debug_log::log("ITEMS", "HIT", "writes pending, serving in-memory snapshot");
            return Ok(ahead);
        }

        match self.inner.fs.modified(&path).await {
            Ok(modified) => {
                if let Some(current) = self.inner.current()
                    && current.path == path
                    && current.modified == modified
                {
                    debug_log::log("ITEMS", "HIT", &path.display().to_string());
                    return Ok(current);
                }
            }
            // The snapshot is left alone; a failing read below is what gets reported.
            Err(e) => {
                debug_log::log("ITEMS", "STAT FAILED", &format!("{}: {e}", path.display()));
            }
        }

        let inner = Arc::clone(&self.inner);
        let key = path.clone();
        let (flight, started) = self.inner.loads.run(key, move || inner.load(path));
        if !started {
            debug_log::log("ITEMS", "ATTACH", "joining in-flight load");
        }
        flight.await
    }

    /// Filter and paginate the current snapshot.
    pub async fn query(&self, query: &ListQuery) -> StoreResult<Page> {
        let snapshot = self.snapshot().await?;
        Ok(query::run(&snapshot.items, query))
    }

    /// First item whose id equals `key`.
    pub async fn find(&self, key: &ItemKey) -> StoreResult<Item> {
        let snapshot = self.snapshot().await?;
        query::find(&snapshot.items, key).ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    /// Append a new item and wait until it is on disk.
    ///
    /// The item is `{"id": <uuid>, "name": ..., ...payload}`, so an `id` in
    /// the payload replaces the generated one. Ids are not checked for
    /// uniqueness.
    pub async fn append(&self, payload: Map<String, Value>) -> StoreResult<Item> {
        let name = match payload.get("name").and_then(Value::as_str) {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => {
                return Err(StoreError::Validation(
                    "\"name\" is required and must be a non-empty string".to_string(),
                ));
            }
        };

        let item = build_item(name, payload);
        let (path, ack) = loop {
            let base = self.snapshot().await?;
            if let Some(queued) = self.inner.enqueue_append(base, &item)? {
                break queued;
            }
            debug_log::log("ITEMS", "RETRY", "queued appends failed under us, reloading");
        };

        match ack.await {
            Ok(Ok(_)) => Ok(item),
            Ok(Err(e)) => Err(StoreError::storage(&path, e)),
            Err(_) => Err(StoreError::storage(
                &path,
                io::Error::other("write queue dropped the request"),
            )),
        }
    }
}

impl Inner {
    /// Publish `item` on top of the latest snapshot and queue its write.
    ///
    /// Returns `None` when `base` still carried queued appends that have
    /// since failed and been dropped; the caller must start over from disk.
    fn enqueue_append(
        self: &Arc<Self>,
        base: Arc<Snapshot>,
        item: &Item,
    ) -> StoreResult<Option<(PathBuf, oneshot::Receiver<WriteAck>)>> {
        let mut state = self.state.lock();
        // Build on whatever is published now, which may already include
        // items appended since `base` was returned.
        let current = match &state.snapshot {
            Some(published) if published.path == base.path => Arc::clone(published),
            _ if base.durable == base.items.len() => base,
            _ => return Ok(None),
        };

        let mut items = current.items.to_vec();
        items.push(CachedItem::new(item.clone()));

        state.generation += 1;
        state.snapshot = Some(Arc::new(Snapshot {
            items: items.into(),
            path: current.path.clone(),
            modified: current.modified,
            durable: current.durable,
        }));

        let render = {
            let inner = Arc::clone(self);
            let path = current.path.clone();
            move || inner.render_write(&path)
        };
        let on_done = {
            let inner = Arc::clone(self);
            let path = current.path.clone();
            move |result: &WriteAck| inner.finish_write(&path, result)
        };
        match self.writes.submit(current.path.clone(), render, on_done) {
            Ok(ack) => {
                state.pending_writes += 1;
                Ok(Some((current.path.clone(), ack)))
            }
            Err(closed) => {
                let path = current.path.clone();
                state.snapshot = Some(current);
                Err(StoreError::storage(&path, io::Error::other(closed)))
            }
        }
    }

    fn current(&self) -> Option<Arc<Snapshot>> {
        self.state.lock().snapshot.clone()
    }

    fn unflushed(&self, path: &Path) -> Option<Arc<Snapshot>> {
        let state = self.state.lock();
        if state.pending_writes == 0 {
            return None;
        }
        state.snapshot.clone().filter(|s| s.path == path)
    }

    async fn load(self: Arc<Self>, path: PathBuf) -> StoreResult<Arc<Snapshot>> {
        let _timer = TimedOp::start("ITEMS", "load", path.display().to_string());
        let seen_generation = self.state.lock().generation;

        let mut raw = self
            .fs
            .read(&path)
            .await
            .map_err(|e| StoreError::storage(&path, e))?;
        let items: Vec<CachedItem> = parse_records(&path, &mut raw)?
            .into_iter()
            .map(CachedItem::new)
            .collect();
        // Stat again: a write may have landed between the first stat and the read.
        let modified = self
            .fs
            .modified(&path)
            .await
            .map_err(|e| StoreError::storage(&path, e))?;

        let mut state = self.state.lock();
        if (state.generation != seen_generation || state.pending_writes > 0)
            && let Some(newer) = &state.snapshot
            && newer.path == path
        {
            // An append published while we were reading; its state is newer than the file.
            return Ok(Arc::clone(newer));
        }
        state.generation += 1;
        let snapshot = Arc::new(Snapshot {
            durable: items.len(),
            items: items.into(),
            path,
            modified,
        });
        state.snapshot = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// Bytes for the oldest queued append: the durable items plus that one.
    ///
    /// Runs on the write queue once every earlier job has finished, so
    /// appends that failed before it are already gone from the snapshot.
    fn render_write(&self, path: &Path) -> io::Result<Vec<u8>> {
        let state = self.state.lock();
        let snapshot = state
            .snapshot
            .as_ref()
            .filter(|s| s.awaits_write(path))
            .ok_or_else(|| io::Error::other("snapshot was replaced before its write ran"))?;
        encode_items(&snapshot.items[..=snapshot.durable])
    }

    /// Bookkeeping once the oldest queued append has been written, or not.
    ///
    /// On success its item joins the durable prefix and the post-write mtime
    /// is recorded. On failure the item is removed, so neither readers nor
    /// later jobs see it. Once nothing else is queued after a failure the
    /// snapshot is dropped: the file may be half-written and the next read
    /// has to go back to disk.
    fn finish_write(&self, path: &Path, result: &WriteAck) {
        let mut state = self.state.lock();
        state.pending_writes = state.pending_writes.saturating_sub(1);

        let Some(current) = state.snapshot.clone().filter(|s| s.awaits_write(path)) else {
            return;
        };
        match result {
            Ok(modified) => {
                state.snapshot = Some(Arc::new(Snapshot {
                    items: Arc::clone(&current.items),
                    path: current.path.clone(),
                    modified: *modified,
                    durable: current.durable + 1,
                }));
            }
            Err(_) if state.pending_writes == 0 => state.snapshot = None,
            Err(_) => {
                let mut items = current.items.to_vec();
                items.remove(current.durable);
                state.generation += 1;
                state.snapshot = Some(Arc::new(Snapshot {
                    items: items.into(),
                    path: current.path.clone(),
                    modified: current.modified,
                    durable: current.durable,
                }));
            }
        }
    }
}

fn build_item(name: String, payload: Map<String, Value>) -> Item {
    let mut fields = Map::with_capacity(payload.len() + 2);
    fields.insert(
        "id".to_string(),
        Value::String(uuid::Uuid::new_v4().to_string()),
    );
    fields.insert("name".to_string(), Value::String(name));
    for (key, value) in payload {
        fields.insert(key, value);
    }
    Item::from_fields(fields)
}

fn encode_items(items: &[CachedItem]) -> io::Result<Vec<u8>> {
    let records: Vec<&Item> = items.iter().map(CachedItem::item).collect();
    Ok(serde_json::to_vec_pretty(&records)?)
}

/// Parse the backing file as a JSON array of objects.
pub(crate) fn parse_records(path: &Path, raw: &mut [u8]) -> StoreResult<Vec<Item>> {
    let document: Value = simd_json::serde::from_slice(raw)
        .map_err(|e| StoreError::malformed(path, format!("invalid JSON: {e}")))?;

    let Value::Array(records) = document else {
        return Err(StoreError::malformed(path, "top-level value is not an array"));
    };

    records
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            Item::from_value(record).ok_or_else(|| {
                StoreError::malformed(path, format!("record {index} is not an object"))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests;
