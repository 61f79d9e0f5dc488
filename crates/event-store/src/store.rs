//! Metrics store: concurrent cache of rendered metrics per object.
//!
//! Every object is rendered once, when it is added or updated, into one
//! text chunk per metric family. Scrapes only concatenate the cached
//! chunks under a read lock.
//!
//! # Concurrency
//!
//! State lives behind a single `std::sync::RwLock`. Rendering happens
//! outside the lock; the write critical section is a map insert, remove,
//! or swap. A reader therefore sees either the old or the new rendering of
//! an object, never a mix.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, warn};

use event_metrics::{ComposedGenerator, FamilyHeader};

use crate::error::StoreError;
use crate::types::{object_key, Resource};

/// Keyed cache interface driven by a reflector.
pub trait Store<T>: Send + Sync {
    /// Insert or replace the entry for `obj`.
    fn add(&self, obj: &T) -> Result<(), StoreError>;

    /// Same as [`Store::add`]; the store never diffs old against new.
    fn update(&self, obj: &T) -> Result<(), StoreError>;

    /// Remove the entry for `obj`. Absent keys are not an error.
    fn delete(&self, obj: &T) -> Result<(), StoreError>;

    /// Discard every entry and rebuild from a full object list.
    ///
    /// Objects that fail to render are skipped; the rest are applied.
    fn replace(&self, objs: Vec<T>, resource_version: &str) -> Result<(), StoreError>;

    /// Snapshot of the current keys.
    fn list(&self) -> Vec<String>;

    /// Rendered text for one key.
    fn get(&self, key: &str) -> Option<String>;
}

/// Entries written by one reflector source.
#[derive(Default)]
struct Slice {
    /// Object key → one rendered chunk per family.
    by_key: BTreeMap<String, Vec<String>>,
    /// Resource version of the last full replace.
    resource_version: String,
}

#[derive(Default)]
struct Entries {
    /// Source name → its slice. The store's own [`Store`] impl writes to
    /// the `""` source.
    by_source: BTreeMap<String, Slice>,
}

impl Entries {
    fn keys(&self) -> impl Iterator<Item = &String> {
        self.by_source.values().flat_map(|slice| slice.by_key.keys())
    }

    fn find(&self, key: &str) -> Option<&Vec<String>> {
        self.by_source.values().find_map(|slice| slice.by_key.get(key))
    }
}

/// Rendered-metrics cache for one resource kind.
///
/// Several reflectors may feed one store, each through its own
/// [`StoreSlice`]. A replace only swaps the calling source's entries.
pub struct MetricsStore<T> {
    headers: Vec<FamilyHeader>,
    generator: ComposedGenerator<T>,
    entries: RwLock<Entries>,
}

impl<T: Resource> MetricsStore<T> {
    /// `headers[i]` must describe the family rendered at position `i` by
    /// `generator`.
    pub fn new(headers: Vec<FamilyHeader>, generator: ComposedGenerator<T>) -> Self {
        debug_assert_eq!(headers.len(), generator.len());
        Self {
            headers,
            generator,
            entries: RwLock::new(Entries::default()),
        }
    }

    /// A [`Store`] view that reads and writes only `source`'s entries.
    pub fn slice(self: &Arc<Self>, source: impl Into<String>) -> StoreSlice<T> {
        StoreSlice {
            store: Arc::clone(self),
            source: source.into(),
        }
    }

    pub fn headers(&self) -> &[FamilyHeader] {
        &self.headers
    }

    /// Number of entries across every source.
    pub fn len(&self) -> usize {
        self.read().by_source.values().map(|s| s.by_key.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resource version recorded by `source`'s last replace.
    pub fn resource_version(&self, source: &str) -> Option<String> {
        self.read()
            .by_source
            .get(source)
            .map(|slice| slice.resource_version.clone())
    }

    /// Append the header block followed by every entry, family by family.
    ///
    /// Headers are written even when no object currently exists.
    pub fn write_all(&self, out: &mut String) {
        let entries = self.read();
        for (i, header) in self.headers.iter().enumerate() {
            out.push_str(&header.render());
            for slice in entries.by_source.values() {
                for chunks in slice.by_key.values() {
                    if let Some(chunk) = chunks.get(i) {
                        out.push_str(chunk);
                    }
                }
            }
        }
    }

    /// Full exposition text for this store.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.write_all(&mut out);
        out
    }

    fn add_in(&self, source: &str, obj: &T) -> Result<(), StoreError> {
        let (key, chunks) = self.render_object(obj)?;
        self.write()
            .by_source
            .entry(source.to_string())
            .or_default()
            .by_key
            .insert(key, chunks);
        Ok(())
    }

    fn delete_in(&self, source: &str, obj: &T) -> Result<(), StoreError> {
        let key = object_key(obj)?;
        if let Some(slice) = self.write().by_source.get_mut(source) {
            slice.by_key.remove(&key);
        }
        Ok(())
    }

    fn replace_in(
        &self,
        source: &str,
        objs: Vec<T>,
        resource_version: &str,
    ) -> Result<(), StoreError> {
        let total = objs.len();
        let mut by_key = BTreeMap::new();
        for obj in &objs {
            match self.render_object(obj) {
                Ok((key, chunks)) => {
                    by_key.insert(key, chunks);
                }
                Err(e) => warn!(error = %e, source, "skipping object during replace"),
            }
        }

        let applied = by_key.len();
        self.write().by_source.insert(
            source.to_string(),
            Slice {
                by_key,
                resource_version: resource_version.to_string(),
            },
        );

        debug!(total, applied, source, %resource_version, "store replaced");
        Ok(())
    }

    fn render_object(&self, obj: &T) -> Result<(String, Vec<String>), StoreError> {
        let key = object_key(obj)?;
        match self.generator.render(obj) {
            Ok(chunks) => Ok((key, chunks)),
            Err(source) => Err(StoreError::Render { key, source }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Entries> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Entries> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Resource> Store<T> for MetricsStore<T> {
    fn add(&self, obj: &T) -> Result<(), StoreError> {
        self.add_in("", obj)
    }

    fn update(&self, obj: &T) -> Result<(), StoreError> {
        self.add(obj)
    }

    fn delete(&self, obj: &T) -> Result<(), StoreError> {
        self.delete_in("", obj)
    }

    fn replace(&self, objs: Vec<T>, resource_version: &str) -> Result<(), StoreError> {
        self.replace_in("", objs, resource_version)
    }

    fn list(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    fn get(&self, key: &str) -> Option<String> {
        self.read().find(key).map(|chunks| chunks.concat())
    }
}

/// One source's view of a shared [`MetricsStore`].
///
/// Writes land in the source's own entries; reads span the whole store.
pub struct StoreSlice<T> {
    store: Arc<MetricsStore<T>>,
    source: String,
}

impl<T> StoreSlice<T> {
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl<T: Resource> Store<T> for StoreSlice<T> {
    fn add(&self, obj: &T) -> Result<(), StoreError> {
        self.store.add_in(&self.source, obj)
    }

    fn update(&self, obj: &T) -> Result<(), StoreError> {
        self.add(obj)
    }

    fn delete(&self, obj: &T) -> Result<(), StoreError> {
        self.store.delete_in(&self.source, obj)
    }

    fn replace(&self, objs: Vec<T>, resource_version: &str) -> Result<(), StoreError> {
        self.store.replace_in(&self.source, objs, resource_version)
    }

    fn list(&self) -> Vec<String> {
        self.store.list()
    }

    fn get(&self, key: &str) -> Option<String> {
        self.store.get(key)
    }
}
