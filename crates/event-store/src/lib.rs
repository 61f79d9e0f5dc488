//! event-store: sharded, watch-driven metrics stores for cluster events.
//!
//! Turns a set of enabled resource kinds into independently running
//! metrics stores. Each store caches the rendered metrics of the events it
//! owns and is kept current by one reflector per watched namespace.
//!
//! # Architecture
//!
//! ```text
//! Builder::build()
//!   └── per enabled ResourceKind
//!         ├── filter + compose family generators (event-metrics)
//!         ├── MetricsStore            ← add / update / delete / replace
//!         └── per namespace
//!               └── Reflector (list → replace, watch → apply) via StoreSlice(ns)
//!                     └── ShardedListWatch
//!                           └── InstrumentedListerWatcher
//!                                 └── ListWatchFactory source
//! ```
//!
//! Scrapes call [`MetricsStore::render`] (or [`render_all`]) concurrently
//! with the reflectors.

pub mod builder;
pub mod error;
pub mod kinds;
pub mod listwatch;
pub mod reflector;
pub mod sharding;
pub mod store;
pub mod types;

pub use builder::{render_all, Builder, BuiltStores, ListWatchFactory};
pub use error::{BuildError, ListWatchError, StoreError};
pub use kinds::{available_resources, ResourceKind};
pub use listwatch::{
    InstrumentedListerWatcher, ListOptions, ListWatchMetrics, ListerWatcher, WatchStream,
};
pub use reflector::{Reflector, ReflectorConfig};
pub use sharding::{owns, ShardedListWatch, Sharding};
pub use store::{MetricsStore, Store, StoreSlice};
pub use types::{object_key, Bookmark, Event, ObjectList, ObjectMeta, ObjectReference, Resource, Status, WatchEvent};
