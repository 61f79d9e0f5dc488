//! Reflector: keeps a store synchronized with a list/watch source.
//!
//! The loop lists the full population, replaces the store with it, then
//! watches from the list's resource version and applies each change.
//! Expired resource versions and resync deadlines trigger a fresh list.
//! Transport failures, and watches that close at once without delivering a
//! frame, back off exponentially (1s → 30s). A healthy watch session resets
//! the backoff. Undecodable watch frames are logged and skipped.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::ListWatchError;
use crate::listwatch::{ListOptions, ListerWatcher};
use crate::store::Store;
use crate::types::{Resource, WatchEvent};

/// Timing knobs for a reflector.
#[derive(Debug, Clone)]
pub struct ReflectorConfig {
    /// Force a full relist this often. `None` disables periodic resync.
    pub resync_period: Option<Duration>,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Server-side timeout requested for each watch call. Must stay below
    /// 295 seconds.
    pub watch_timeout_secs: Option<u32>,
}

/// Shortest watch session that counts as healthy when it delivered nothing.
const MIN_WATCH_DURATION: Duration = Duration::from_secs(1);

impl Default for ReflectorConfig {
    fn default() -> Self {
        Self {
            resync_period: None,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            watch_timeout_secs: Some(290),
        }
    }
}

/// Why one list-and-watch cycle ended without an error.
#[derive(Debug, PartialEq, Eq)]
enum Cycle {
    Shutdown,
    Relist,
}

/// A single list-then-watch loop feeding one store.
pub struct Reflector<T: Resource> {
    name: String,
    lister_watcher: Arc<dyn ListerWatcher<T>>,
    store: Arc<dyn Store<T>>,
    config: ReflectorConfig,
}

impl<T: Resource> Reflector<T> {
    pub fn new(
        name: impl Into<String>,
        lister_watcher: Arc<dyn ListerWatcher<T>>,
        store: Arc<dyn Store<T>>,
        config: ReflectorConfig,
    ) -> Self {
        Self {
            name: name.into(),
            lister_watcher,
            store,
            config,
        }
    }

    /// Run until the shutdown signal fires (or its sender is dropped).
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(reflector = %self.name, "reflector started");
        let mut backoff = self.config.initial_backoff;

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.list_and_watch(&mut shutdown, &mut backoff).await {
                Ok(Cycle::Shutdown) => break,
                Ok(Cycle::Relist) => {
                    debug!(reflector = %self.name, "relisting");
                }
                Err(e) => {
                    warn!(
                        reflector = %self.name,
                        error = %e,
                        retry_in_ms = backoff.as_millis() as u64,
                        "list/watch failed"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = shutdown.changed() => break,
                    }
                    backoff = (backoff * 2).min(self.config.max_backoff);
                }
            }
        }

        info!(reflector = %self.name, "reflector stopped");
    }

    async fn list_and_watch(
        &self,
        shutdown: &mut watch::Receiver<bool>,
        backoff: &mut Duration,
    ) -> Result<Cycle, ListWatchError> {
        let list_opts = ListOptions::default();
        let list = tokio::select! {
            result = self.lister_watcher.list(&list_opts) => result?,
            _ = shutdown.changed() => return Ok(Cycle::Shutdown),
        };

        let mut resource_version = list.resource_version().to_string();
        let count = list.items.len();
        if let Err(e) = self.store.replace(list.items, &resource_version) {
            warn!(reflector = %self.name, error = %e, "store replace failed");
        }
        debug!(reflector = %self.name, count, %resource_version, "listed");

        let resync_at = self.config.resync_period.map(|p| Instant::now() + p);

        loop {
            let opts = ListOptions {
                resource_version: Some(resource_version.clone()),
                timeout_seconds: self.config.watch_timeout_secs,
                allow_watch_bookmarks: true,
            };
            let mut stream = tokio::select! {
                result = self.lister_watcher.watch(&opts) => match result {
                    Ok(stream) => stream,
                    Err(ListWatchError::Expired(_)) => return Ok(Cycle::Relist),
                    Err(e) => return Err(e),
                },
                _ = resync_timer(resync_at) => return Ok(Cycle::Relist),
                _ = shutdown.changed() => return Ok(Cycle::Shutdown),
            };
            let started = Instant::now();
            let mut applied = 0usize;

            loop {
                let next = tokio::select! {
                    next = stream.next() => next,
                    _ = resync_timer(resync_at) => return Ok(Cycle::Relist),
                    _ = shutdown.changed() => return Ok(Cycle::Shutdown),
                };

                match next {
                    None => break,
                    Some(Err(ListWatchError::Expired(_))) => return Ok(Cycle::Relist),
                    Some(Err(ListWatchError::Decode(e))) => {
                        warn!(reflector = %self.name, error = %e, "skipping undecodable watch frame");
                    }
                    Some(Err(e)) => return Err(e),
                    Some(Ok(WatchEvent::Error(status))) if status.code == 410 => {
                        return Ok(Cycle::Relist);
                    }
                    Some(Ok(WatchEvent::Error(status))) => {
                        return Err(ListWatchError::Status {
                            code: status.code,
                            message: status.message,
                        });
                    }
                    Some(Ok(event)) => {
                        self.apply(event, &mut resource_version);
                        applied += 1;
                    }
                }
            }

            // An empty watch shorter than MIN_WATCH_DURATION is a failure.
            if applied == 0 && started.elapsed() < MIN_WATCH_DURATION {
                return Err(ListWatchError::Transport(
                    "watch closed immediately without events".to_string(),
                ));
            }
            *backoff = self.config.initial_backoff;
            debug!(reflector = %self.name, applied, %resource_version, "watch closed; resuming");
        }
    }

    fn apply(&self, event: WatchEvent<T>, resource_version: &mut String) {
        let (result, obj_version) = match &event {
            WatchEvent::Added(obj) => (self.store.add(obj), version_of(obj)),
            WatchEvent::Modified(obj) => (self.store.update(obj), version_of(obj)),
            WatchEvent::Deleted(obj) => (self.store.delete(obj), version_of(obj)),
            WatchEvent::Bookmark(b) => (Ok(()), Some(b.resource_version.clone())),
            WatchEvent::Error(_) => return,
        };

        if let Err(e) = result {
            warn!(reflector = %self.name, error = %e, "skipping object");
        }
        if let Some(v) = obj_version {
            *resource_version = v;
        }
    }
}

fn version_of<T: Resource>(obj: &T) -> Option<String> {
    obj.metadata().resource_version.clone()
}

async fn resync_timer(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listwatch::WatchStream;
    use crate::types::{Event, ObjectList, ObjectMeta, Status};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingStore {
        ops: Mutex<Vec<String>>,
    }

    impl RecordingStore {
        fn ops(&self) -> Vec<String> {
            self.ops.lock().unwrap().clone()
        }
    }

    impl Store<Event> for RecordingStore {
        fn add(&self, obj: &Event) -> Result<(), crate::error::StoreError> {
            self.ops.lock().unwrap().push(format!("add {}", obj.message.as_deref().unwrap_or("")));
            Ok(())
        }
        fn update(&self, obj: &Event) -> Result<(), crate::error::StoreError> {
            self.ops.lock().unwrap().push(format!("update {}", obj.message.as_deref().unwrap_or("")));
            Ok(())
        }
        fn delete(&self, obj: &Event) -> Result<(), crate::error::StoreError> {
            self.ops.lock().unwrap().push(format!("delete {}", obj.message.as_deref().unwrap_or("")));
            Ok(())
        }
        fn replace(&self, objs: Vec<Event>, rv: &str) -> Result<(), crate::error::StoreError> {
            self.ops
                .lock()
                .unwrap()
                .push(format!("replace {} @{rv}", objs.len()));
            Ok(())
        }
        fn list(&self) -> Vec<String> {
            Vec::new()
        }
        fn get(&self, _key: &str) -> Option<String> {
            None
        }
    }

    fn event(message: &str, rv: &str) -> Event {
        Event {
            metadata: ObjectMeta {
                name: Some("e".to_string()),
                resource_version: Some(rv.to_string()),
                ..Default::default()
            },
            message: Some(message.to_string()),
            ..Default::default()
        }
    }

    /// Serves scripted watch sessions, then hangs.
    struct Scripted {
        lists: AtomicUsize,
        fail_lists: usize,
        sessions: Mutex<Vec<Vec<Result<WatchEvent<Event>, ListWatchError>>>>,
        watch_versions: Mutex<Vec<Option<String>>>,
    }

    impl Scripted {
        fn new(fail_lists: usize, sessions: Vec<Vec<Result<WatchEvent<Event>, ListWatchError>>>) -> Self {
            Self {
                lists: AtomicUsize::new(0),
                fail_lists,
                sessions: Mutex::new(sessions.into_iter().rev().collect()),
                watch_versions: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ListerWatcher<Event> for Scripted {
        async fn list(&self, _opts: &ListOptions) -> Result<ObjectList<Event>, ListWatchError> {
            let n = self.lists.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_lists {
                return Err(ListWatchError::Transport("refused".to_string()));
            }
            Ok(ObjectList::new(format!("{}", 10 + n), vec![event("listed", "1")]))
        }

        async fn watch(&self, opts: &ListOptions) -> Result<WatchStream<Event>, ListWatchError> {
            self.watch_versions
                .lock()
                .unwrap()
                .push(opts.resource_version.clone());
            let session = self.sessions.lock().unwrap().pop();
            match session {
                Some(frames) => Ok(futures_util::stream::iter(frames).boxed()),
                None => Ok(futures_util::stream::pending().boxed()),
            }
        }
    }

    async fn run_for(
        lw: Arc<Scripted>,
        store: Arc<RecordingStore>,
        config: ReflectorConfig,
        duration: Duration,
    ) {
        let (tx, rx) = watch::channel(false);
        let reflector = Reflector::<Event>::new("test", lw, store, config);
        let handle = tokio::spawn(reflector.run(rx));
        tokio::time::sleep(duration).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("reflector did not stop")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn lists_then_applies_watch_events() {
        let lw = Arc::new(Scripted::new(
            0,
            vec![vec![
                Ok(WatchEvent::Added(event("a", "11"))),
                Ok(WatchEvent::Modified(event("b", "12"))),
                Ok(WatchEvent::Deleted(event("c", "13"))),
            ]],
        ));
        let store = Arc::new(RecordingStore::default());
        run_for(lw.clone(), store.clone(), ReflectorConfig::default(), Duration::from_secs(1)).await;

        assert_eq!(
            store.ops(),
            vec!["replace 1 @10", "add a", "update b", "delete c"]
        );
        // Second watch resumes from the last applied version.
        let versions = lw.watch_versions.lock().unwrap().clone();
        assert_eq!(versions, vec![Some("10".to_string()), Some("13".to_string())]);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_watch_triggers_relist() {
        let lw = Arc::new(Scripted::new(
            0,
            vec![vec![
                Ok(WatchEvent::Added(event("a", "11"))),
                Ok(WatchEvent::Error(Status {
                    code: 410,
                    reason: "Expired".to_string(),
                    message: "too old".to_string(),
                })),
            ]],
        ));
        let store = Arc::new(RecordingStore::default());
        run_for(lw.clone(), store.clone(), ReflectorConfig::default(), Duration::from_secs(1)).await;

        assert_eq!(store.ops(), vec!["replace 1 @10", "add a", "replace 1 @11"]);
    }

    #[tokio::test(start_paused = true)]
    async fn undecodable_frame_is_skipped() {
        let lw = Arc::new(Scripted::new(
            0,
            vec![vec![
                Ok(WatchEvent::Added(event("a", "11"))),
                Err(ListWatchError::Decode("expected value at line 1".to_string())),
                Ok(WatchEvent::Added(event("b", "12"))),
            ]],
        ));
        let store = Arc::new(RecordingStore::default());
        run_for(lw.clone(), store.clone(), ReflectorConfig::default(), Duration::from_secs(1)).await;

        assert_eq!(store.ops(), vec!["replace 1 @10", "add a", "add b"]);
        assert_eq!(lw.lists.load(Ordering::SeqCst), 1);
        let versions = lw.watch_versions.lock().unwrap().clone();
        assert_eq!(versions, vec![Some("10".to_string()), Some("12".to_string())]);
    }

    /// Every watch ends at once with no frames.
    #[derive(Default)]
    struct ClosesAtOnce {
        lists: AtomicUsize,
        watches: AtomicUsize,
    }

    #[async_trait]
    impl ListerWatcher<Event> for ClosesAtOnce {
        async fn list(&self, _opts: &ListOptions) -> Result<ObjectList<Event>, ListWatchError> {
            self.lists.fetch_add(1, Ordering::SeqCst);
            Ok(ObjectList::new("1", Vec::new()))
        }

        async fn watch(&self, _opts: &ListOptions) -> Result<WatchStream<Event>, ListWatchError> {
            self.watches.fetch_add(1, Ordering::SeqCst);
            Ok(futures_util::stream::empty().boxed())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn immediately_closed_watch_backs_off() {
        let lw = Arc::new(ClosesAtOnce::default());
        let store = Arc::new(RecordingStore::default());
        let (tx, rx) = watch::channel(false);
        let reflector = Reflector::<Event>::new("closing", lw.clone(), store, ReflectorConfig::default());
        let handle = tokio::spawn(reflector.run(rx));

        // Watches at t=0, 1s, 3s and 7s; the next one is due at 15s.
        tokio::time::sleep(Duration::from_secs(10)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("reflector did not stop")
            .unwrap();

        assert_eq!(lw.watches.load(Ordering::SeqCst), 4);
        assert_eq!(lw.lists.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn list_failures_back_off_then_recover() {
        let lw = Arc::new(Scripted::new(2, Vec::new()));
        let store = Arc::new(RecordingStore::default());
        // Failures at t=0 and t=1s, success at t=3s.
        run_for(lw.clone(), store.clone(), ReflectorConfig::default(), Duration::from_secs(4)).await;

        assert_eq!(lw.lists.load(Ordering::SeqCst), 3);
        assert_eq!(store.ops(), vec!["replace 1 @12"]);
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_resync_relists() {
        let lw = Arc::new(Scripted::new(0, Vec::new()));
        let store = Arc::new(RecordingStore::default());
        let config = ReflectorConfig {
            resync_period: Some(Duration::from_secs(10)),
            ..Default::default()
        };
        run_for(lw.clone(), store.clone(), config, Duration::from_secs(25)).await;

        assert_eq!(store.ops().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_promptly_on_shutdown() {
        let lw = Arc::new(Scripted::new(0, Vec::new()));
        let store = Arc::new(RecordingStore::default());
        let (tx, rx) = watch::channel(false);
        let reflector = Reflector::<Event>::new("idle", lw, store, ReflectorConfig::default());
        let handle = tokio::spawn(reflector.run(rx));
        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_millis(100), handle)
            .await
            .expect("reflector should stop")
            .unwrap();
    }
}
