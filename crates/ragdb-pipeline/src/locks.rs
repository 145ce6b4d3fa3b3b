//! Per-document async locks serializing ingest, repair and delete of the
//! same document. Different documents never contend.
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use ragdb_core::types::DocumentId;

type LockMap = Arc<Mutex<HashMap<DocumentId, Arc<AsyncMutex<()>>>>>;

#[derive(Default, Clone)]
pub struct DocLocks {
    map: LockMap,
}

pub struct DocGuard {
    guard: Option<OwnedMutexGuard<()>>,
    map: LockMap,
    doc_id: DocumentId,
}

impl DocLocks {
    pub fn new() -> Self { Self::default() }

    pub async fn lock(&self, doc_id: &str) -> DocGuard {
        let lock = {
            let mut map = self.map.lock();
            Arc::clone(map.entry(doc_id.to_string()).or_default())
        };
        let guard = lock.lock_owned().await;
        DocGuard { guard: Some(guard), map: Arc::clone(&self.map), doc_id: doc_id.to_string() }
    }

    /// Drop the entry for `doc_id` once nobody holds or awaits it.
    pub fn prune(&self, doc_id: &str) {
        let mut map = self.map.lock();
        if map.get(doc_id).is_some_and(|m| Arc::strong_count(m) == 1) {
            map.remove(doc_id);
        }
    }

    /// Number of documents with a live lock entry.
    pub fn len(&self) -> usize { self.map.lock().len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

impl Drop for DocGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut map = self.map.lock();
        // Only the map itself still references the mutex: nobody holds or awaits it.
        if map.get(&self.doc_id).is_some_and(|m| Arc::strong_count(m) == 1) {
            map.remove(&self.doc_id);
        }
    }
}
