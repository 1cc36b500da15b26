//! # In-Memory Engine
//!
//! The native engine: an ordered in-memory store with snapshot isolation
//! and a single-writer discipline.
//!
//! ## Snapshot Model
//!
//! The committed state is a map of bucket name to `Arc<BTreeMap>`. A
//! transaction clones that map at `begin` — an `Arc` clone per bucket, not
//! a data copy — and owns its view from then on:
//!
//! - readers never block and never observe later commits;
//! - a writer takes the engine-wide writer mutex for the life of the
//!   transaction (this is what enforces "at most one writable transaction
//!   outstanding"), mutates private copies via `Arc::make_mut`
//!   (copy-on-write per touched bucket), and publishes the whole snapshot
//!   at commit;
//! - rollback just drops the private snapshot, and `Drop` rolls back
//!   uncommitted transactions, so no failure path can leak half a commit.
//!
//! ## Cursors
//!
//! A cursor captures the bucket `Arc` when opened and steps by re-seeking
//! past the last yielded key. The transaction may keep writing while the
//! cursor is open; the cursor keeps iterating the bucket as it was at
//! cursor creation, which is exactly what a scan-and-mutate stream
//! operator needs.

use super::{Engine, KvCursor, KvTransaction};
use crate::error::EngineError;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

type Store = BTreeMap<Vec<u8>, Vec<u8>>;
type Snapshot = BTreeMap<String, Arc<Store>>;

/// An ordered in-memory engine with snapshot isolation. Cloning the
/// handle shares the underlying store.
#[derive(Clone, Default)]
pub struct MemoryEngine {
    state: Arc<Mutex<Snapshot>>,
    writer: Arc<Mutex<()>>,
}

impl MemoryEngine {
    pub fn new() -> MemoryEngine {
        MemoryEngine::default()
    }
}

impl Engine for MemoryEngine {
    fn begin(&self, writable: bool) -> Result<Box<dyn KvTransaction>, EngineError> {
        // take the writer lock before snapshotting so the snapshot already
        // contains every previously committed write
        let writer_guard = writable.then(|| self.writer.lock_arc());
        let snapshot = self.state.lock().clone();
        Ok(Box::new(MemoryTransaction {
            state: Arc::clone(&self.state),
            snapshot,
            writer_guard,
        }))
    }
}

struct MemoryTransaction {
    state: Arc<Mutex<Snapshot>>,
    snapshot: Snapshot,
    // holding the guard for the life of the transaction is what enforces
    // the single-writer rule; dropping it releases the writer slot
    writer_guard: Option<ArcMutexGuard<RawMutex, ()>>,
}

impl MemoryTransaction {
    fn store(&self, bucket: &str) -> Result<&Arc<Store>, EngineError> {
        self.snapshot.get(bucket).ok_or(EngineError::NotFound)
    }

    fn store_mut(&mut self, bucket: &str) -> Result<&mut Store, EngineError> {
        if self.writer_guard.is_none() {
            return Err(EngineError::ReadOnly);
        }
        match self.snapshot.get_mut(bucket) {
            Some(store) => Ok(Arc::make_mut(store)),
            None => Err(EngineError::NotFound),
        }
    }
}

impl KvTransaction for MemoryTransaction {
    fn writable(&self) -> bool {
        self.writer_guard.is_some()
    }

    fn commit(mut self: Box<Self>) -> Result<(), EngineError> {
        if self.writer_guard.is_some() {
            *self.state.lock() = std::mem::take(&mut self.snapshot);
        }
        Ok(())
    }

    fn rollback(self: Box<Self>) {}

    fn create_bucket(&mut self, name: &str) -> Result<(), EngineError> {
        if self.writer_guard.is_none() {
            return Err(EngineError::ReadOnly);
        }
        if self.snapshot.contains_key(name) {
            return Err(EngineError::Conflict);
        }
        self.snapshot.insert(name.to_string(), Arc::new(Store::new()));
        Ok(())
    }

    fn drop_bucket(&mut self, name: &str) -> Result<(), EngineError> {
        if self.writer_guard.is_none() {
            return Err(EngineError::ReadOnly);
        }
        match self.snapshot.remove(name) {
            Some(_) => Ok(()),
            None => Err(EngineError::NotFound),
        }
    }

    fn bucket_exists(&self, name: &str) -> bool {
        self.snapshot.contains_key(name)
    }

    fn put(&mut self, bucket: &str, key: &[u8], value: &[u8]) -> Result<(), EngineError> {
        self.store_mut(bucket)?.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn get(&self, bucket: &str, key: &[u8]) -> Result<Option<Vec<u8>>, EngineError> {
        Ok(self.store(bucket)?.get(key).cloned())
    }

    fn delete(&mut self, bucket: &str, key: &[u8]) -> Result<(), EngineError> {
        match self.store_mut(bucket)?.remove(key) {
            Some(_) => Ok(()),
            None => Err(EngineError::NotFound),
        }
    }

    fn cursor(
        &self,
        bucket: &str,
        lower: Bound<Vec<u8>>,
        upper: Bound<Vec<u8>>,
        reverse: bool,
    ) -> Result<Box<dyn KvCursor>, EngineError> {
        let store = Arc::clone(self.store(bucket)?);
        Ok(Box::new(MemoryCursor {
            store,
            lower,
            upper,
            reverse,
            last: None,
            exhausted: false,
        }))
    }
}

struct MemoryCursor {
    store: Arc<Store>,
    lower: Bound<Vec<u8>>,
    upper: Bound<Vec<u8>>,
    reverse: bool,
    last: Option<Vec<u8>>,
    exhausted: bool,
}

fn bound_key(bound: &Bound<Vec<u8>>) -> Option<&Vec<u8>> {
    match bound {
        Bound::Included(k) | Bound::Excluded(k) => Some(k),
        Bound::Unbounded => None,
    }
}

/// True when no key can satisfy both bounds; `BTreeMap::range` panics on
/// inverted ranges, so they are detected up front.
fn range_is_empty(lower: &Bound<Vec<u8>>, upper: &Bound<Vec<u8>>) -> bool {
    match (bound_key(lower), bound_key(upper)) {
        (Some(l), Some(u)) => {
            if l > u {
                return true;
            }
            l == u
                && (matches!(lower, Bound::Excluded(_)) || matches!(upper, Bound::Excluded(_)))
        }
        _ => false,
    }
}

impl KvCursor for MemoryCursor {
    fn next(&mut self) -> Option<(Vec<u8>, Vec<u8>)> {
        if self.exhausted {
            return None;
        }
        let (lower, upper) = match &self.last {
            None => (self.lower.clone(), self.upper.clone()),
            Some(key) if !self.reverse => (Bound::Excluded(key.clone()), self.upper.clone()),
            Some(key) => (self.lower.clone(), Bound::Excluded(key.clone())),
        };
        if range_is_empty(&lower, &upper) {
            self.exhausted = true;
            return None;
        }
        let mut range = self.store.range((lower, upper));
        let entry = if self.reverse { range.next_back() } else { range.next() };
        match entry {
            Some((k, v)) => {
                self.last = Some(k.clone());
                Some((k.clone(), v.clone()))
            }
            None => {
                self.exhausted = true;
                None
            }
        }
    }
}
