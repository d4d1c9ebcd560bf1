//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use config_mirror::mirror::{ConfigMirror, ConfigUnit, MirrorOptions};
use config_mirror::resilience::ReconnectPolicy;
use config_mirror::store::{MemoryStore, Revision, Snapshot, StoreClient, StoreError, WatchStream};

pub const STORAGE_PATH: &str = "/dc";

/// Store key of a unit under [`STORAGE_PATH`].
pub fn key(name: &str) -> String {
    format!("{STORAGE_PATH}/global/{name}")
}

pub fn encoded(name: &str, value: &str) -> String {
    ConfigUnit::new(name, value).encode().unwrap()
}

/// Options with fast reconnects so failure tests finish quickly.
pub fn test_options() -> MirrorOptions {
    MirrorOptions::new(STORAGE_PATH).with_reconnect(ReconnectPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
    })
}

pub fn mirror_over(store: &MemoryStore, options: MirrorOptions) -> ConfigMirror {
    ConfigMirror::new(Arc::new(store.clone()), options)
}

/// Poll `cond` until it holds, panicking after two seconds.
pub async fn wait_until<F>(what: &str, mut cond: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !cond() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Await `fut`, panicking if it takes longer than two seconds.
pub async fn within<T>(what: &str, fut: impl Future<Output = T>) -> T {
    match tokio::time::timeout(Duration::from_secs(2), fut).await {
        Ok(out) => out,
        Err(_) => panic!("timed out waiting for {what}"),
    }
}

/// A change applied to the store right after a snapshot is read.
pub enum Race {
    Put(String, String),
    Delete(String),
}

/// Store whose `get` lets writes land between the snapshot and the watch.
pub struct RacingStore {
    pub inner: MemoryStore,
    races: Mutex<Vec<Race>>,
}

impl RacingStore {
    pub fn new(inner: MemoryStore, races: Vec<Race>) -> Self {
        Self {
            inner,
            races: Mutex::new(races),
        }
    }
}

#[async_trait]
impl StoreClient for RacingStore {
    async fn get(&self, prefix: &str) -> Result<Snapshot, StoreError> {
        let snapshot = self.inner.get(prefix).await?;
        for race in self.races.lock().unwrap().drain(..) {
            match race {
                Race::Put(key, value) => {
                    self.inner.insert(&key, &value);
                }
                Race::Delete(key) => {
                    self.inner.remove(&key);
                }
            }
        }
        Ok(snapshot)
    }

    async fn put(&self, key: &str, value: &str) -> Result<Revision, StoreError> {
        self.inner.put(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<Revision, StoreError> {
        self.inner.delete(key).await
    }

    async fn watch(
        &self,
        prefix: &str,
        start_revision: Revision,
    ) -> Result<WatchStream, StoreError> {
        self.inner.watch(prefix, start_revision).await
    }
}
