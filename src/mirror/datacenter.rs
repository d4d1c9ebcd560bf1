//! The config mirror: lifecycle, reads and write-through.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::MirrorSettings;
use crate::lifecycle::Shutdown;
use crate::mirror::error::{DecodeError, MirrorError, MirrorResult};
use crate::mirror::global::GlobalConfig;
use crate::mirror::keys::{last_segment, KeyLayout, KeyMapper};
use crate::mirror::state::SyncState;
use crate::mirror::sync::SyncTask;
use crate::mirror::unit::{validate_name, ConfigUnit};
use crate::observability::metrics;
use crate::resilience::ReconnectPolicy;
use crate::store::{ChangeEvent, EventKind, Revision, StoreClient, StoreError};

/// Supplies the configuration seeded into an empty mirror.
pub type DefaultsFn = Arc<dyn Fn() -> GlobalConfig + Send + Sync>;

/// Construction parameters for [`ConfigMirror`].
#[derive(Clone)]
pub struct MirrorOptions {
    /// Root of the config namespace; units live under `{storage_path}/global/`.
    pub storage_path: String,
    pub reconnect: ReconnectPolicy,
    pub key_to_name: KeyMapper,
    pub defaults: DefaultsFn,
}

impl MirrorOptions {
    pub fn new(storage_path: impl Into<String>) -> Self {
        Self {
            storage_path: storage_path.into(),
            reconnect: ReconnectPolicy::default(),
            key_to_name: Arc::new(last_segment),
            defaults: Arc::new(GlobalConfig::new),
        }
    }

    /// Options described by a settings file, `[defaults]` included.
    pub fn from_settings(settings: &MirrorSettings) -> Self {
        let defaults = settings.defaults.clone();
        Self::new(settings.store.storage_path.clone())
            .with_reconnect(ReconnectPolicy::from(&settings.sync))
            .with_defaults(move || {
                defaults
                    .iter()
                    .map(|(name, value)| ConfigUnit::new(name.clone(), value.clone()))
                    .collect()
            })
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn with_key_mapper<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.key_to_name = Arc::new(f);
        self
    }

    pub fn with_defaults<F>(mut self, f: F) -> Self
    where
        F: Fn() -> GlobalConfig + Send + Sync + 'static,
    {
        self.defaults = Arc::new(f);
        self
    }
}

impl fmt::Debug for MirrorOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MirrorOptions")
            .field("storage_path", &self.storage_path)
            .field("reconnect", &self.reconnect)
            .finish_non_exhaustive()
    }
}

/// State shared between the caller-facing mirror and its sync task.
pub(crate) struct Shared {
    pub(crate) store: Arc<dyn StoreClient>,
    pub(crate) layout: KeyLayout,
    pub(crate) key_to_name: KeyMapper,
    pub(crate) reconnect: ReconnectPolicy,
    pub(crate) config: GlobalConfig,
    state: watch::Sender<SyncState>,
}

impl Shared {
    pub(crate) fn publish(&self, state: SyncState) {
        metrics::record_ready(state.is_ready());
        self.state.send_replace(state);
    }

    /// Replace the local view with a fresh snapshot, returning its revision.
    ///
    /// Undecodable entries are skipped; whatever the mirror held for them is kept.
    pub(crate) async fn load_snapshot(&self) -> Result<Revision, StoreError> {
        let snapshot = self.store.get(self.layout.prefix()).await?;

        let mut seen = HashSet::with_capacity(snapshot.entries.len());
        for kv in &snapshot.entries {
            match self.decode_entry(&kv.key, kv.value.as_bytes()) {
                Ok(unit) => {
                    seen.insert(unit.name.clone());
                    self.config.upsert(unit);
                }
                Err(e) => {
                    tracing::warn!(key = %kv.key, error = %e, "Skipping undecodable config entry");
                    metrics::record_decode_error("snapshot");
                    seen.insert((self.key_to_name)(&kv.key));
                }
            }
        }
        let pruned = self.config.retain_names(&seen);
        metrics::record_config_units(self.config.len());

        tracing::info!(
            revision = snapshot.revision,
            entries = snapshot.entries.len(),
            pruned = pruned.len(),
            "Datacenter config snapshot loaded"
        );
        Ok(snapshot.revision)
    }

    /// Decode the unit stored under `key`.
    ///
    /// The unit must carry the name its key maps to; deletes are resolved
    /// through the key alone.
    fn decode_entry(&self, key: &str, payload: &[u8]) -> Result<ConfigUnit, DecodeError> {
        let unit = ConfigUnit::decode(payload)?;
        let key_name = (self.key_to_name)(key);
        if unit.name != key_name {
            return Err(DecodeError::NameMismatch {
                key_name,
                name: unit.name,
            });
        }
        Ok(unit)
    }

    /// Apply one change event. Never fails; bad payloads are logged and skipped.
    pub(crate) fn apply_event(&self, event: &ChangeEvent) {
        match event.kind {
            EventKind::Create | EventKind::Modify => {
                let Some(payload) = event.value.as_deref() else {
                    tracing::warn!(
                        key = %event.key,
                        revision = event.revision,
                        "Change event without value"
                    );
                    metrics::record_decode_error("watch");
                    return;
                };
                match self.decode_entry(&event.key, payload.as_bytes()) {
                    Ok(unit) => {
                        tracing::debug!(
                            name = %unit.name,
                            revision = event.revision,
                            "Config unit updated"
                        );
                        self.config.upsert(unit);
                    }
                    Err(e) => {
                        tracing::error!(
                            key = %event.key,
                            revision = event.revision,
                            error = %e,
                            "Parse config error"
                        );
                        metrics::record_decode_error("watch");
                        return;
                    }
                }
            }
            EventKind::Delete => {
                let name = (self.key_to_name)(&event.key);
                if self.config.remove(&name).is_some() {
                    tracing::debug!(name = %name, revision = event.revision, "Config unit removed");
                }
            }
        }
        metrics::record_event_applied(event.kind.as_str());
        metrics::record_config_units(self.config.len());
    }
}

enum Lifecycle {
    Created,
    Starting,
    Running {
        shutdown: Shutdown,
        task: Option<JoinHandle<()>>,
    },
    Stopped {
        task: Option<JoinHandle<()>>,
    },
}

/// In-process mirror of the datacenter config held in a replicated store.
///
/// `start` loads a snapshot and spawns a task that follows the store's change
/// feed from the snapshot's revision. Reads are served from memory; writes are
/// applied locally and then persisted, and rolled back if persisting fails.
///
/// Dropping the mirror cancels its sync task.
pub struct ConfigMirror {
    shared: Arc<Shared>,
    defaults: DefaultsFn,
    seeded: tokio::sync::Mutex<bool>,
    lifecycle: Mutex<Lifecycle>,
}

impl ConfigMirror {
    /// Create a mirror. No store I/O happens until [`start`](Self::start).
    pub fn new(store: Arc<dyn StoreClient>, options: MirrorOptions) -> Self {
        let (state, _) = watch::channel(SyncState::Idle);
        Self {
            shared: Arc::new(Shared {
                store,
                layout: KeyLayout::new(&options.storage_path),
                key_to_name: options.key_to_name,
                reconnect: options.reconnect,
                config: GlobalConfig::new(),
                state,
            }),
            defaults: options.defaults,
            seeded: tokio::sync::Mutex::new(false),
            lifecycle: Mutex::new(Lifecycle::Created),
        }
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load the current snapshot and start following the change feed.
    ///
    /// Returns once the snapshot is applied; the sync task keeps running in
    /// the background. A failed load leaves the mirror startable again.
    pub async fn start(&self) -> MirrorResult<()> {
        {
            let mut lifecycle = self.lifecycle();
            match *lifecycle {
                Lifecycle::Created => *lifecycle = Lifecycle::Starting,
                Lifecycle::Starting | Lifecycle::Running { .. } => {
                    return Err(MirrorError::AlreadyStarted)
                }
                Lifecycle::Stopped { .. } => return Err(MirrorError::Stopped),
            }
        }

        self.shared.publish(SyncState::Loading);
        let loaded = self.shared.load_snapshot().await;

        let mut lifecycle = self.lifecycle();
        if !matches!(*lifecycle, Lifecycle::Starting) {
            return Err(MirrorError::Stopped);
        }

        let revision = match loaded {
            Ok(revision) => revision,
            Err(e) => {
                tracing::error!(error = %e, "Load datacenter config error");
                *lifecycle = Lifecycle::Created;
                self.shared.publish(SyncState::Idle);
                return Err(e.into());
            }
        };

        let shutdown = Shutdown::new();
        self.shared.publish(SyncState::Synced { revision });
        let task = SyncTask::new(self.shared.clone(), shutdown.subscribe(), revision + 1);
        let handle = tokio::spawn(task.run());
        *lifecycle = Lifecycle::Running {
            shutdown,
            task: Some(handle),
        };

        tracing::info!(revision, "Datacenter config listener started");
        Ok(())
    }

    /// Signal the sync task to stop. Does not wait for it; see [`join`](Self::join).
    pub fn stop(&self) {
        let mut lifecycle = self.lifecycle();
        let previous = std::mem::replace(&mut *lifecycle, Lifecycle::Stopped { task: None });
        match previous {
            Lifecycle::Running { shutdown, task } => {
                shutdown.trigger();
                // A stale task has given up and publishes nothing further.
                let exited = task.as_ref().map(JoinHandle::is_finished).unwrap_or(true);
                if exited || matches!(self.state(), SyncState::Stale { .. }) {
                    self.shared.publish(SyncState::Stopped);
                }
                *lifecycle = Lifecycle::Stopped { task };
                tracing::info!("Datacenter config listener stop");
            }
            Lifecycle::Stopped { task } => *lifecycle = Lifecycle::Stopped { task },
            Lifecycle::Created | Lifecycle::Starting => self.shared.publish(SyncState::Stopped),
        }
    }

    /// Wait for the sync task to exit.
    ///
    /// Returns immediately if no task is running or it has already been joined.
    pub async fn join(&self) -> MirrorResult<()> {
        let task = match &mut *self.lifecycle() {
            Lifecycle::Running { task, .. } | Lifecycle::Stopped { task } => task.take(),
            Lifecycle::Created | Lifecycle::Starting => None,
        };

        if let Some(task) = task {
            task.await.map_err(|e| MirrorError::Join(e.to_string()))?;
        }
        if matches!(*self.lifecycle(), Lifecycle::Stopped { .. }) {
            self.shared.publish(SyncState::Stopped);
        }
        Ok(())
    }

    /// [`stop`](Self::stop) and [`join`](Self::join).
    pub async fn shutdown(&self) -> MirrorResult<()> {
        self.stop();
        self.join().await
    }

    /// Current readiness state.
    pub fn state(&self) -> SyncState {
        self.shared.state.borrow().clone()
    }

    /// Watch readiness changes, e.g. to detect a stale mirror.
    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.shared.state.subscribe()
    }

    pub fn is_ready(&self) -> bool {
        self.shared.state.borrow().is_ready()
    }

    /// Current value of a unit. `None` means absent.
    pub fn get(&self, name: &str) -> Option<ConfigUnit> {
        self.shared.config.get(name)
    }

    /// Number of units currently mirrored.
    pub fn unit_count(&self) -> usize {
        self.shared.config.len()
    }

    /// Snapshot of every unit.
    ///
    /// If the mirror is empty the default configuration is written through
    /// first. Seeding happens at most once, even under concurrent first reads.
    pub async fn get_all(&self) -> MirrorResult<GlobalConfig> {
        if self.shared.config.is_empty() {
            self.seed_defaults().await?;
        }
        Ok(self.shared.config.clone())
    }

    async fn seed_defaults(&self) -> MirrorResult<()> {
        let mut seeded = self.seeded.lock().await;
        if *seeded || !self.shared.config.is_empty() {
            return Ok(());
        }

        let defaults = (self.defaults)();
        tracing::info!(units = defaults.len(), "Seeding default datacenter config");
        if let Err(e) = self.put_all(&defaults).await {
            tracing::error!(error = %e, "Put datacenter config error");
            return Err(e);
        }
        *seeded = true;
        Ok(())
    }

    /// Write one unit through to the store.
    ///
    /// The unit is visible locally before the store write completes. If the
    /// write fails the previous value is restored, unless a newer value has
    /// replaced it in the meantime.
    pub async fn put(&self, unit: ConfigUnit) -> MirrorResult<Revision> {
        unit.validate()?;
        let payload = unit.encode()?;
        let key = self.shared.layout.key_for(&unit.name);

        let (stamp, previous) = self.shared.config.stamped_upsert(unit.clone());
        match self.shared.store.put(&key, &payload).await {
            Ok(revision) => {
                metrics::record_store_write("put", true);
                metrics::record_config_units(self.shared.config.len());
                tracing::debug!(name = %unit.name, revision, "Config unit persisted");
                Ok(revision)
            }
            Err(e) => {
                metrics::record_store_write("put", false);
                let restored = self.shared.config.restore(&unit.name, stamp, previous);
                if restored {
                    metrics::record_rollback("put");
                }
                tracing::error!(
                    name = %unit.name,
                    error = %e,
                    restored,
                    "Put datacenter config to store error"
                );
                Err(e.into())
            }
        }
    }

    /// Write every unit in `config`, in name order.
    ///
    /// Not atomic: every unit is attempted even after a failure, so some units
    /// may be persisted while others are not. Returns the first error.
    pub async fn put_all(&self, config: &GlobalConfig) -> MirrorResult<()> {
        let mut first_error = None;
        for unit in config.units() {
            let name = unit.name.clone();
            if let Err(e) = self.put(unit).await {
                tracing::warn!(name = %name, error = %e, "Config unit not written");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Delete a unit locally and in the store, returning what was removed.
    ///
    /// Deleting an absent unit is not an error. On store failure the removed
    /// unit is put back unless the name was re-created in the meantime.
    pub async fn delete(&self, name: &str) -> MirrorResult<Option<ConfigUnit>> {
        validate_name(name)?;
        let key = self.shared.layout.key_for(name);

        let removed = self.shared.config.remove(name);
        match self.shared.store.delete(&key).await {
            Ok(revision) => {
                metrics::record_store_write("delete", true);
                metrics::record_config_units(self.shared.config.len());
                tracing::debug!(name = %name, revision, "Config unit deleted");
                Ok(removed)
            }
            Err(e) => {
                metrics::record_store_write("delete", false);
                if let Some(removed) = removed {
                    if self.shared.config.restore_removed(removed) {
                        metrics::record_rollback("delete");
                    }
                }
                tracing::error!(
                    name = %name,
                    error = %e,
                    "Delete datacenter config from store error"
                );
                Err(e.into())
            }
        }
    }
}

impl fmt::Debug for ConfigMirror {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigMirror")
            .field("layout", &self.shared.layout)
            .field("units", &self.shared.config.len())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn mirror(store: &MemoryStore) -> ConfigMirror {
        ConfigMirror::new(Arc::new(store.clone()), MirrorOptions::new("/test"))
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let store = MemoryStore::new();
        let mirror = mirror(&store);
        let unit = ConfigUnit::new("timeout", "30");

        mirror.put(unit.clone()).await.unwrap();
        assert_eq!(mirror.get("timeout"), Some(unit.clone()));
        assert_eq!(
            store.value("/test/global/timeout"),
            Some(unit.encode().unwrap())
        );
    }

    #[tokio::test]
    async fn test_empty_name_rejected_before_io() {
        let store = MemoryStore::new();
        let mirror = mirror(&store);

        let err = mirror.put(ConfigUnit::new("", "x")).await.unwrap_err();
        assert!(matches!(err, MirrorError::Validation(_)));
        assert_eq!(store.put_count(), 0);
        assert!(mirror.get("").is_none());
    }

    #[tokio::test]
    async fn test_url_reserved_name_rejected_before_io() {
        let store = MemoryStore::new();
        let mirror = mirror(&store);

        for name in ["a?b", "a#b", "a%3Fb"] {
            let err = mirror.put(ConfigUnit::new(name, "x")).await.unwrap_err();
            assert!(matches!(err, MirrorError::Validation(_)), "{name}");
            assert!(matches!(mirror.delete(name).await, Err(MirrorError::Validation(_))));
        }
        assert_eq!(store.put_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_put_rolls_back() {
        let store = MemoryStore::new();
        let mirror = mirror(&store);
        mirror.put(ConfigUnit::new("timeout", "30")).await.unwrap();

        store.set_fail_writes(true);
        let err = mirror.put(ConfigUnit::new("timeout", "60")).await.unwrap_err();
        assert!(matches!(err, MirrorError::Store(StoreError::Rejected { .. })));
        assert_eq!(mirror.get("timeout").unwrap().value_str(), Some("30"));

        let err = mirror.put(ConfigUnit::new("fresh", "1")).await.unwrap_err();
        assert!(matches!(err, MirrorError::Store(_)));
        assert!(mirror.get("fresh").is_none());
    }

    #[tokio::test]
    async fn test_put_all_attempts_every_unit() {
        let store = MemoryStore::new();
        let mirror = mirror(&store);
        let config: GlobalConfig = [
            ConfigUnit::new("a", "1"),
            ConfigUnit::new("b", "2"),
            ConfigUnit::new("c", "3"),
        ]
        .into_iter()
        .collect();

        store.set_fail_writes(true);
        assert!(mirror.put_all(&config).await.is_err());
        assert_eq!(store.put_count(), 3);
        assert!(mirror.get("a").is_none());

        store.set_fail_writes(false);
        mirror.put_all(&config).await.unwrap();
        assert!(store.value("/test/global/c").is_some());
    }

    #[tokio::test]
    async fn test_delete_absent_is_ok() {
        let store = MemoryStore::new();
        let mirror = mirror(&store);
        assert_eq!(mirror.delete("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_failed_delete_restores_unit() {
        let store = MemoryStore::new();
        let mirror = mirror(&store);
        mirror.put(ConfigUnit::new("timeout", "30")).await.unwrap();

        store.set_fail_writes(true);
        assert!(mirror.delete("timeout").await.is_err());
        assert_eq!(mirror.get("timeout").unwrap().value_str(), Some("30"));
    }

    #[tokio::test]
    async fn test_start_twice_rejected() {
        let store = MemoryStore::new();
        let mirror = mirror(&store);
        mirror.start().await.unwrap();
        assert!(matches!(mirror.start().await, Err(MirrorError::AlreadyStarted)));

        mirror.shutdown().await.unwrap();
        assert!(matches!(mirror.start().await, Err(MirrorError::Stopped)));
    }

    #[tokio::test]
    async fn test_failed_load_can_retry() {
        let store = MemoryStore::new();
        let mirror = mirror(&store);

        store.set_fail_reads(true);
        assert!(matches!(mirror.start().await, Err(MirrorError::Store(_))));
        assert_eq!(mirror.state(), SyncState::Idle);

        store.set_fail_reads(false);
        mirror.start().await.unwrap();
        assert!(mirror.is_ready());
        mirror.shutdown().await.unwrap();
        assert_eq!(mirror.state(), SyncState::Stopped);
    }

    #[tokio::test]
    async fn test_stop_before_start() {
        let store = MemoryStore::new();
        let mirror = mirror(&store);
        mirror.stop();
        mirror.join().await.unwrap();
        assert_eq!(mirror.state(), SyncState::Stopped);
    }
}
