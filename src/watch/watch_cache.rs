//! In-memory mirror of the backing store fed by its event stream.
//!
//! Holds the current object per key plus the bounded [`EventLog`] of recent
//! mutations, both behind one lock so snapshots and history stay consistent.
//! Writers take the lock exclusively per event; interval readers take it shared
//! per window refill.

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::Event;
use super::EventLog;
use super::EventType;
use super::Fields;
use super::HistorySource;
use super::IntervalReader;
use super::PrevState;
use crate::invalidation_log_throttle;
use crate::CacheableObject;
use crate::Labels;
use crate::LogThrottle;
use crate::Object;
use crate::Result;
use crate::WatchCacheConfig;
use crate::WatchError;

/// Extracts the indexed labels and fields predicates are evaluated against.
pub type AttrFunc<T> = Arc<dyn Fn(&T) -> (Labels, Fields) + Send + Sync>;

/// Indexes object labels plus `metadata.name` and `metadata.namespace`.
pub fn default_attr_func<T: Object>() -> AttrFunc<T> {
    Arc::new(|object: &T| {
        let Some(meta) = object.meta() else {
            return (Labels::new(), Fields::new());
        };
        let mut fields = Fields::new();
        fields.insert("metadata.name".to_string(), meta.name.clone());
        fields.insert("metadata.namespace".to_string(), meta.namespace.clone());
        (meta.labels.clone(), fields)
    })
}

#[derive(Debug)]
struct StoreEntry<T: Object> {
    object: Arc<CacheableObject<T>>,
    labels: Labels,
    fields: Fields,
}

#[derive(Debug)]
pub(crate) struct CacheState<T: Object> {
    log: EventLog<T>,
    store: BTreeMap<String, StoreEntry<T>>,
    /// Highest revision observed, from events or progress notifications
    revision: u64,
    /// Revision of the last full `replace`
    list_revision: u64,
    /// Whether history lost events since the last `replace`
    evicted_since_replace: bool,
}

impl<T: Object> HistorySource<T> for RwLock<CacheState<T>> {
    fn copy_window(
        &self,
        cursor: u64,
        limit: u64,
        max: usize,
        out: &mut VecDeque<Arc<Event<T>>>,
    ) -> Result<usize> {
        self.read().log.copy_window(cursor, limit, max, out)
    }
}

pub struct WatchCache<T: Object> {
    state: Arc<RwLock<CacheState<T>>>,
    window_size: usize,
    attr_func: AttrFunc<T>,
    /// Handed to every object the cache wraps
    log_throttle: Arc<LogThrottle>,
    revision_tx: watch::Sender<u64>,
}

impl<T: Object> std::fmt::Debug for WatchCache<T> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("WatchCache")
            .field("revision", &state.revision)
            .field("objects", &state.store.len())
            .field("events", &state.log.len())
            .finish()
    }
}

impl<T: Object> WatchCache<T> {
    pub fn new(config: &WatchCacheConfig) -> Self {
        Self::with_attr_func(config, default_attr_func())
    }

    pub fn with_attr_func(
        config: &WatchCacheConfig,
        attr_func: AttrFunc<T>,
    ) -> Self {
        let (revision_tx, _) = watch::channel(0);
        Self {
            state: Arc::new(RwLock::new(CacheState {
                log: EventLog::new(config.capacity),
                store: BTreeMap::new(),
                revision: 0,
                list_revision: 0,
                evicted_since_replace: false,
            })),
            window_size: config.window_size,
            attr_func,
            log_throttle: invalidation_log_throttle(),
            revision_tx,
        }
    }

    /// Replaces the process-wide invalidation log throttle for wrapped objects.
    pub fn with_log_throttle(
        mut self,
        log_throttle: Arc<LogThrottle>,
    ) -> Self {
        self.log_throttle = log_throttle;
        self
    }

    fn wrap(
        &self,
        object: T,
    ) -> Result<CacheableObject<T>> {
        Ok(CacheableObject::new(object)?.with_log_throttle(self.log_throttle.clone()))
    }

    /// Current revision of the cache.
    pub fn revision(&self) -> u64 {
        self.state.read().revision
    }

    /// Index the next appended event will receive.
    pub fn next_index(&self) -> u64 {
        self.state.read().log.next_index()
    }

    /// Notifies on every revision change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision_tx.subscribe()
    }

    /// Replaces the whole content with a fresh list taken at `revision`.
    ///
    /// History is dropped: intervals positioned before the replacement fail with
    /// `Invalidated` on their next refill.
    pub fn replace(
        &self,
        objects: Vec<(String, T)>,
        revision: u64,
    ) -> Result<()> {
        let mut store = BTreeMap::new();
        for (key, object) in objects {
            let (labels, fields) = (self.attr_func)(&object);
            let object = Arc::new(self.wrap(object)?);
            store.insert(key, StoreEntry { object, labels, fields });
        }

        let mut state = self.state.write();
        debug!(
            objects = store.len(),
            revision,
            dropped_events = state.log.len(),
            "watch cache replaced"
        );
        state.store = store;
        state.log.clear();
        state.revision = revision;
        state.list_revision = revision;
        state.evicted_since_replace = false;
        drop(state);

        self.revision_tx.send_replace(revision);
        Ok(())
    }

    /// Records that `key` was created. The revision is the object's resource version.
    pub fn add(
        &self,
        key: &str,
        object: T,
    ) -> Result<Arc<Event<T>>> {
        self.process_put(key, object)
    }

    /// Records that `key` was modified. The revision is the object's resource version.
    pub fn update(
        &self,
        key: &str,
        object: T,
    ) -> Result<Arc<Event<T>>> {
        self.process_put(key, object)
    }

    fn process_put(
        &self,
        key: &str,
        object: T,
    ) -> Result<Arc<Event<T>>> {
        let (labels, fields) = (self.attr_func)(&object);
        let object = Arc::new(self.wrap(object)?);
        let revision = object.resource_version();

        let mut state = self.state.write();
        Self::check_revision(&state, revision)?;

        let prev = state
            .store
            .get(key)
            .map(|entry| PrevState::new(entry.object.clone(), entry.labels.clone(), entry.fields.clone()));
        let event_type = match prev {
            Some(_) => EventType::Modified,
            None => EventType::Added,
        };

        state.store.insert(
            key.to_string(),
            StoreEntry {
                object: object.clone(),
                labels: labels.clone(),
                fields: fields.clone(),
            },
        );
        let event = Arc::new(Event {
            event_type,
            key: key.to_string(),
            object,
            labels,
            fields,
            prev,
            revision,
        });
        Ok(self.append_locked(state, event))
    }

    /// Records that `key` was deleted at `revision`.
    ///
    /// The event carries the last known object stamped with `revision`. Returns
    /// `None` when the key was not cached; the revision still advances.
    pub fn delete(
        &self,
        key: &str,
        revision: u64,
    ) -> Result<Option<Arc<Event<T>>>> {
        let mut state = self.state.write();
        Self::check_revision(&state, revision)?;

        let Some(entry) = state.store.remove(key) else {
            warn!(key, revision, "delete of a key the watch cache never saw");
            state.revision = revision;
            drop(state);
            self.revision_tx.send_replace(revision);
            return Ok(None);
        };

        // Shares the stored object; the stamp below copies it privately.
        let object = CacheableObject::from_shared(entry.object.shared_object())?
            .with_log_throttle(self.log_throttle.clone());
        object.set_resource_version(revision);

        let event = Arc::new(Event {
            event_type: EventType::Deleted,
            key: key.to_string(),
            object: Arc::new(object),
            labels: entry.labels.clone(),
            fields: entry.fields.clone(),
            prev: Some(PrevState::new(entry.object, entry.labels, entry.fields)),
            revision,
        });
        Ok(Some(self.append_locked(state, event)))
    }

    /// Progress notification: the store reached `revision` without a relevant event.
    pub fn update_revision(
        &self,
        revision: u64,
    ) {
        let mut state = self.state.write();
        if revision <= state.revision {
            return;
        }
        state.revision = revision;
        drop(state);
        trace!(revision, "watch cache revision bumped");
        self.revision_tx.send_replace(revision);
    }

    fn check_revision(
        state: &CacheState<T>,
        revision: u64,
    ) -> Result<()> {
        if revision <= state.revision {
            return Err(WatchError::RevisionRegression {
                current: state.revision,
                incoming: revision,
            }
            .into());
        }
        Ok(())
    }

    fn append_locked(
        &self,
        mut state: parking_lot::RwLockWriteGuard<'_, CacheState<T>>,
        event: Arc<Event<T>>,
    ) -> Arc<Event<T>> {
        let revision = event.revision;
        if let Some(evicted) = state.log.append(event.clone()) {
            state.evicted_since_replace = true;
            trace!(revision = evicted.revision, "event evicted from history");
        }
        state.revision = revision;
        drop(state);

        trace!(key = %event.key, event_type = ?event.event_type, revision, "event appended");
        self.revision_tx.send_replace(revision);
        event
    }

    /// Current object stored under `key` and the cache revision.
    pub fn get(
        &self,
        key: &str,
    ) -> (Option<Arc<CacheableObject<T>>>, u64) {
        let state = self.state.read();
        (state.store.get(key).map(|e| e.object.clone()), state.revision)
    }

    /// Every object whose key starts with `prefix`, in key order, and the cache revision.
    pub fn list(
        &self,
        prefix: &str,
    ) -> (Vec<Arc<CacheableObject<T>>>, u64) {
        let state = self.state.read();
        let objects = state
            .store
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(_, entry)| entry.object.clone())
            .collect();
        (objects, state.revision)
    }

    /// Waits until the cache has observed `revision`, at most `timeout`.
    pub async fn wait_until_fresh(
        &self,
        revision: u64,
        timeout: Duration,
    ) -> Result<()> {
        let mut rx = self.revision_tx.subscribe();
        let fresh = tokio::time::timeout(timeout, rx.wait_for(|current| *current >= revision))
            .await
            .is_ok_and(|waited| waited.is_ok());
        if fresh {
            return Ok(());
        }
        Err(WatchError::NotFresh {
            revision,
            current: self.revision(),
            timeout,
        }
        .into())
    }

    /// Interval over every event newer than `revision`.
    ///
    /// Revision 0 means "current state": a snapshot with one `Added` event per
    /// stored object. Fails with `TooOldRevision` when events right after
    /// `revision` are no longer retained.
    pub fn interval_since(
        &self,
        revision: u64,
    ) -> Result<IntervalReader<T>> {
        let state = self.state.read();

        if revision == 0 {
            let events = state
                .store
                .iter()
                .map(|(key, entry)| {
                    Arc::new(Event {
                        event_type: EventType::Added,
                        key: key.clone(),
                        object: entry.object.clone(),
                        labels: entry.labels.clone(),
                        fields: entry.fields.clone(),
                        prev: None,
                        revision: state.revision,
                    })
                })
                .collect();
            return Ok(IntervalReader::snapshot(events, state.log.next_index()));
        }

        let oldest = match state.log.oldest_revision() {
            Some(oldest) if state.evicted_since_replace => oldest,
            _ => state.list_revision + 1,
        };
        if revision < oldest.saturating_sub(1) {
            return Err(WatchError::TooOldRevision {
                requested: revision,
                oldest: oldest - 1,
            }
            .into());
        }

        let start = state.log.first_index_after(revision);
        Ok(IntervalReader::new(
            self.state.clone(),
            start,
            state.log.next_index(),
            self.window_size,
        ))
    }

    /// Interval over history indices `[index, next_index)`.
    ///
    /// Validity of `index` is checked on the first read.
    pub fn interval_from_index(
        &self,
        index: u64,
    ) -> IntervalReader<T> {
        let limit = self.state.read().log.next_index();
        IntervalReader::new(self.state.clone(), index, limit.max(index), self.window_size)
    }
}
