//! In-process revisioned store.
//!
//! Keeps the change history since the last compaction so watches can be
//! replayed from any retained revision. History is capped at a retention
//! limit; older events are compacted away on commit. Cheap to clone; clones
//! share state.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tokio::sync::mpsc;

use crate::store::{
    ChangeEvent, EventKind, KeyValue, Revision, Snapshot, StoreClient, StoreError, WatchStream,
};

type WatchSender = mpsc::UnboundedSender<Result<ChangeEvent, StoreError>>;

#[derive(Debug)]
struct Entry {
    value: String,
    mod_revision: Revision,
}

struct Watcher {
    prefix: String,
    tx: WatchSender,
}

/// Events retained by [`MemoryStore::new`].
pub const DEFAULT_HISTORY_LIMIT: usize = 10_000;

struct Inner {
    revision: Revision,
    compacted: Revision,
    data: BTreeMap<String, Entry>,
    history: VecDeque<ChangeEvent>,
    history_limit: usize,
    watchers: Vec<Watcher>,
}

impl Inner {
    fn with_history_limit(history_limit: usize) -> Self {
        Self {
            revision: 0,
            compacted: 0,
            data: BTreeMap::new(),
            history: VecDeque::new(),
            history_limit: history_limit.max(1),
            watchers: Vec::new(),
        }
    }

    fn compact(&mut self, revision: Revision) {
        let revision = revision.min(self.revision);
        while self.history.front().is_some_and(|e| e.revision <= revision) {
            self.history.pop_front();
        }
        self.compacted = self.compacted.max(revision);
    }

    fn commit(&mut self, kind: EventKind, key: &str, value: Option<String>) -> Revision {
        self.revision += 1;
        let event = ChangeEvent {
            kind,
            key: key.to_string(),
            value,
            revision: self.revision,
        };

        self.watchers.retain(|w| {
            if !event.key.starts_with(&w.prefix) {
                return !w.tx.is_closed();
            }
            w.tx.send(Ok(event.clone())).is_ok()
        });
        self.history.push_back(event);
        if self.history.len() > self.history_limit {
            let excess = self.history.len() - self.history_limit;
            let through = self.history[excess - 1].revision;
            self.compact(through);
        }
        self.revision
    }
}

/// Switches used by tests to simulate an unhealthy store.
#[derive(Default)]
struct Faults {
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    puts: AtomicU64,
}

/// A thread-safe, in-memory [`StoreClient`].
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    faults: Arc<Faults>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store at revision 0 retaining [`DEFAULT_HISTORY_LIMIT`] events.
    pub fn new() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }

    /// Create an empty store retaining at most `limit` events (at least one).
    pub fn with_history_limit(limit: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::with_history_limit(limit))),
            faults: Arc::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write directly, bypassing fault injection and the write counter.
    pub fn insert(&self, key: &str, value: &str) -> Revision {
        let mut inner = self.lock();
        let kind = if inner.data.contains_key(key) {
            EventKind::Modify
        } else {
            EventKind::Create
        };
        let revision = inner.revision + 1;
        inner.data.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                mod_revision: revision,
            },
        );
        inner.commit(kind, key, Some(value.to_string()))
    }

    /// Delete directly. Removing an absent key commits nothing.
    pub fn remove(&self, key: &str) -> Revision {
        let mut inner = self.lock();
        if inner.data.remove(key).is_none() {
            return inner.revision;
        }
        inner.commit(EventKind::Delete, key, None)
    }

    /// Current value of `key`, if any.
    pub fn value(&self, key: &str) -> Option<String> {
        self.lock().data.get(key).map(|e| e.value.clone())
    }

    /// Revision of the most recent commit.
    pub fn current_revision(&self) -> Revision {
        self.lock().revision
    }

    /// Drop history up to and including `revision`.
    pub fn compact(&self, revision: Revision) {
        self.lock().compact(revision);
        tracing::debug!(revision, "memory store compacted");
    }

    /// Number of events currently retained for replay.
    pub fn history_len(&self) -> usize {
        self.lock().history.len()
    }

    /// Highest revision dropped from history.
    pub fn compacted_revision(&self) -> Revision {
        self.lock().compacted
    }

    /// Close every open watch stream, as a lost connection would.
    pub fn disconnect_watchers(&self) {
        let mut inner = self.lock();
        let dropped = inner.watchers.len();
        inner.watchers.clear();
        tracing::debug!(dropped, "memory store watchers disconnected");
    }

    /// Number of watch streams still attached.
    pub fn watcher_count(&self) -> usize {
        let mut inner = self.lock();
        inner.watchers.retain(|w| !w.tx.is_closed());
        inner.watchers.len()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.faults.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.faults.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of `put` calls received through [`StoreClient`], failed ones included.
    pub fn put_count(&self) -> u64 {
        self.faults.puts.load(Ordering::SeqCst)
    }

    fn check_writable(&self, key: &str) -> Result<(), StoreError> {
        if self.faults.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected {
                key: key.to_string(),
                reason: "writes disabled".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl StoreClient for MemoryStore {
    async fn get(&self, prefix: &str) -> Result<Snapshot, StoreError> {
        if self.faults.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("reads disabled".to_string()));
        }

        let inner = self.lock();
        let entries = inner
            .data
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, e)| KeyValue {
                key: k.clone(),
                value: e.value.clone(),
                mod_revision: e.mod_revision,
            })
            .collect();

        Ok(Snapshot {
            revision: inner.revision,
            entries,
        })
    }

    async fn put(&self, key: &str, value: &str) -> Result<Revision, StoreError> {
        self.faults.puts.fetch_add(1, Ordering::SeqCst);
        self.check_writable(key)?;
        Ok(self.insert(key, value))
    }

    async fn delete(&self, key: &str) -> Result<Revision, StoreError> {
        self.check_writable(key)?;
        Ok(self.remove(key))
    }

    async fn watch(
        &self,
        prefix: &str,
        start_revision: Revision,
    ) -> Result<WatchStream, StoreError> {
        if self.faults.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("reads disabled".to_string()));
        }

        let mut inner = self.lock();
        if start_revision > 0 && start_revision <= inner.compacted {
            return Err(StoreError::Compacted {
                requested: start_revision,
                compacted: inner.compacted,
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        if start_revision > 0 {
            for event in inner
                .history
                .iter()
                .filter(|e| e.revision >= start_revision && e.key.starts_with(prefix))
            {
                let _ = tx.send(Ok(event.clone()));
            }
        }
        inner.watchers.push(Watcher {
            prefix: prefix.to_string(),
            tx,
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_by_prefix() {
        let store = MemoryStore::new();
        store.insert("/cfg/global/a", "1");
        store.insert("/cfg/global/b", "2");
        store.insert("/cfg/other/c", "3");

        let snapshot = store.get("/cfg/global/").await.unwrap();
        assert_eq!(snapshot.revision, 3);
        let keys: Vec<_> = snapshot.entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["/cfg/global/a", "/cfg/global/b"]);
    }

    #[tokio::test]
    async fn test_watch_replays_from_revision() {
        let store = MemoryStore::new();
        store.insert("/p/a", "1");
        let rev = store.insert("/p/b", "2");
        store.insert("/p/a", "3");

        let mut stream = store.watch("/p/", rev).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.kind, EventKind::Create);
        assert_eq!(first.key, "/p/b");

        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.kind, EventKind::Modify);
        assert_eq!(second.value.as_deref(), Some("3"));

        store.remove("/p/b");
        let third = stream.next().await.unwrap().unwrap();
        assert_eq!(third.kind, EventKind::Delete);
        assert_eq!(third.value, None);
    }

    #[tokio::test]
    async fn test_watch_filters_prefix() {
        let store = MemoryStore::new();
        let mut stream = store.watch("/p/", 0).await.unwrap();
        store.insert("/q/x", "ignored");
        store.insert("/p/y", "seen");

        let event = stream.next().await.unwrap().unwrap();
        assert_eq!(event.key, "/p/y");
    }

    #[tokio::test]
    async fn test_remove_absent_commits_nothing() {
        let store = MemoryStore::new();
        store.insert("/p/a", "1");
        assert_eq!(store.remove("/p/missing"), 1);
        assert_eq!(store.current_revision(), 1);
    }

    #[tokio::test]
    async fn test_compacted_watch_rejected() {
        let store = MemoryStore::new();
        store.insert("/p/a", "1");
        store.insert("/p/a", "2");
        store.compact(2);

        let err = store.watch("/p/", 1).await.err().unwrap();
        assert_eq!(
            err,
            StoreError::Compacted {
                requested: 1,
                compacted: 2
            }
        );
        assert!(store.watch("/p/", 3).await.is_ok());
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let store = MemoryStore::with_history_limit(3);
        for i in 0..10 {
            store.insert("/p/a", &i.to_string());
        }
        assert_eq!(store.history_len(), 3);
        assert_eq!(store.compacted_revision(), 7);

        let err = store.watch("/p/", 7).await.err().unwrap();
        assert!(matches!(err, StoreError::Compacted { requested: 7, compacted: 7 }));

        let mut stream = store.watch("/p/", 8).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.revision, 8);
        assert_eq!(first.value.as_deref(), Some("7"));
    }

    #[tokio::test]
    async fn test_disconnect_ends_streams() {
        let store = MemoryStore::new();
        let mut stream = store.watch("/p/", 0).await.unwrap();
        assert_eq!(store.watcher_count(), 1);

        store.disconnect_watchers();
        assert!(stream.next().await.is_none());
        assert_eq!(store.watcher_count(), 0);
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        assert!(store.put("/p/a", "1").await.is_err());
        assert_eq!(store.put_count(), 1);
        assert_eq!(store.value("/p/a"), None);

        store.set_fail_writes(false);
        store.set_fail_reads(true);
        assert!(matches!(store.get("/p/").await, Err(StoreError::Unavailable(_))));
    }
}
