//! Deterministic object sharding across exporter replicas.
//!
//! `owns(key) = xxh64(key) % total == shard`. The hash is seedless and
//! stable across restarts and architectures, so a fleet of replicas with
//! the same `total` partitions the key space exactly.
//!
//! [`ShardedListWatch`] applies the filter to list results and watch
//! streams, so objects owned by other replicas never reach the store.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::trace;
use xxhash_rust::xxh64::xxh64;

use crate::error::{BuildError, ListWatchError};
use crate::listwatch::{ListOptions, ListerWatcher, WatchStream};
use crate::types::{object_key, ObjectList, Resource, WatchEvent};

/// Whether replica `shard` of `total_shards` owns `key`.
///
/// `total_shards` of 0 or 1 disables sharding: every key is owned.
pub fn owns(key: &str, shard: u32, total_shards: u32) -> bool {
    if total_shards <= 1 {
        return true;
    }
    xxh64(key.as_bytes(), 0) % u64::from(total_shards) == u64::from(shard)
}

/// A validated `(shard, total)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sharding {
    shard: u32,
    total: u32,
}

impl Sharding {
    /// Validate a shard assignment. A total of 0 is treated as 1.
    pub fn new(shard: u32, total: u32) -> Result<Self, BuildError> {
        let total = total.max(1);
        if shard >= total {
            return Err(BuildError::InvalidShard { shard, total });
        }
        Ok(Self { shard, total })
    }

    /// Single-replica mode.
    pub fn disabled() -> Self {
        Self { shard: 0, total: 1 }
    }

    pub fn shard(&self) -> u32 {
        self.shard
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn is_enabled(&self) -> bool {
        self.total > 1
    }

    pub fn owns(&self, key: &str) -> bool {
        owns(key, self.shard, self.total)
    }

    /// Objects without a key are kept so the store can report them.
    fn keeps<T: Resource>(&self, obj: &T) -> bool {
        match object_key(obj) {
            Ok(key) => self.owns(&key),
            Err(_) => true,
        }
    }
}

impl Default for Sharding {
    fn default() -> Self {
        Self::disabled()
    }
}

/// ListerWatcher decorator that drops objects owned by other shards.
pub struct ShardedListWatch<T: Resource> {
    inner: Arc<dyn ListerWatcher<T>>,
    sharding: Sharding,
}

impl<T: Resource> ShardedListWatch<T> {
    pub fn new(inner: Arc<dyn ListerWatcher<T>>, sharding: Sharding) -> Self {
        Self { inner, sharding }
    }
}

#[async_trait]
impl<T: Resource> ListerWatcher<T> for ShardedListWatch<T> {
    async fn list(&self, opts: &ListOptions) -> Result<ObjectList<T>, ListWatchError> {
        let mut list = self.inner.list(opts).await?;
        if self.sharding.is_enabled() {
            let before = list.items.len();
            let sharding = self.sharding;
            list.items.retain(|obj| sharding.keeps(obj));
            trace!(
                shard = sharding.shard(),
                total = sharding.total(),
                kept = list.items.len(),
                dropped = before - list.items.len(),
                "sharded list"
            );
        }
        Ok(list)
    }

    async fn watch(&self, opts: &ListOptions) -> Result<WatchStream<T>, ListWatchError> {
        let stream = self.inner.watch(opts).await?;
        if !self.sharding.is_enabled() {
            return Ok(stream);
        }

        let sharding = self.sharding;
        Ok(stream
            .filter(move |event| {
                let keep = match event {
                    Ok(WatchEvent::Added(obj))
                    | Ok(WatchEvent::Modified(obj))
                    | Ok(WatchEvent::Deleted(obj)) => sharding.keeps(obj),
                    _ => true,
                };
                std::future::ready(keep)
            })
            .boxed())
    }
}
