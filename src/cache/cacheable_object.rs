//! Per-object serialization memoization shared across many consumers.
//!
//! A [`CacheableObject`] wraps exactly one domain object that is about to be fanned
//! out to several watchers. Each wire format is encoded at most once per instance:
//!
//! ```text
//! watcher A ─┐                        ┌─ format map (ArcSwap, lock-free load)
//! watcher B ─┼─ cache_encode("json") ─┤
//! watcher C ─┘                        └─ OnceCell ── encode() runs once ── bytes | error
//! ```
//!
//! Mutations go through conditional copy-on-write setters: an equal value is a
//! no-op; a different value deep-copies the wrapped object on first mutation and
//! drops every cached serialization.

use std::collections::HashMap;
use std::fmt::Debug;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use bytes::Bytes;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::trace;
use tracing::warn;

use super::encode_bincode;
use super::encode_json;
use super::invalidation_log_throttle;
use super::Annotations;
use super::Format;
use super::Labels;
use super::LogThrottle;
use super::Object;
use super::ObjectMeta;
use crate::metrics::CACHE_INVALIDATIONS;
use crate::metrics::ENCODE_CACHE_HITS;
use crate::metrics::ENCODE_CACHE_MISSES;
use crate::BoxError;
use crate::EncodeError;
use crate::Result;
use crate::SerializationError;

type SerializationResult = std::result::Result<Bytes, EncodeError>;
type SerializationCell = Arc<OnceCell<SerializationResult>>;
type SerializationsCache = HashMap<String, SerializationCell>;

/// Ownership of the wrapped object.
///
/// Moves from `Shared` to `Owned` once, on the first effective mutation, and
/// never goes back.
enum ObjectState<T> {
    /// Borrowed from the event source; must never be mutated in place
    Shared(Arc<T>),
    /// Private to this wrapper
    Owned(Arc<T>),
}

impl<T: Object> ObjectState<T> {
    fn object(&self) -> &Arc<T> {
        match self {
            ObjectState::Shared(object) | ObjectState::Owned(object) => object,
        }
    }

    fn meta(&self) -> Option<&ObjectMeta> {
        self.object().meta()
    }

    fn is_owned(&self) -> bool {
        matches!(self, ObjectState::Owned(_))
    }

    fn to_owned_mut(&mut self) -> &mut T {
        if let ObjectState::Shared(shared) = self {
            let copy = Arc::new(T::clone(shared));
            *self = ObjectState::Owned(copy);
        }
        match self {
            ObjectState::Shared(object) | ObjectState::Owned(object) => Arc::make_mut(object),
        }
    }
}

pub struct CacheableObject<T: Object> {
    object: RwLock<ObjectState<T>>,

    /// Format id -> memoization cell. Replaced wholesale, never mutated in place.
    serializations: ArcSwap<SerializationsCache>,

    /// Serializes writers of `serializations` (cache misses and invalidations)
    serializations_lock: Mutex<()>,

    log_throttle: Arc<LogThrottle>,
}

impl<T: Object> Debug for CacheableObject<T> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let state = self.object.read();
        f.debug_struct("CacheableObject")
            .field("meta", &state.meta())
            .field("deep_copied", &state.is_owned())
            .field("cached_formats", &self.serializations.load().len())
            .finish()
    }
}

impl<T: Object> CacheableObject<T> {
    /// Wraps an object the caller hands over; no copy is ever needed.
    pub fn new(object: T) -> Result<Self> {
        Self::with_state(ObjectState::Owned(Arc::new(object)))
    }

    /// Wraps an object that other readers still hold.
    ///
    /// The first effective mutation deep-copies it.
    pub fn from_shared(object: Arc<T>) -> Result<Self> {
        Self::with_state(ObjectState::Shared(object))
    }

    fn with_state(state: ObjectState<T>) -> Result<Self> {
        if state.meta().is_none() {
            return Err(SerializationError::MissingMetadata {
                type_name: std::any::type_name::<T>(),
            }
            .into());
        }

        Ok(Self {
            object: RwLock::new(state),
            serializations: ArcSwap::from_pointee(HashMap::new()),
            serializations_lock: Mutex::new(()),
            log_throttle: invalidation_log_throttle(),
        })
    }

    /// Replaces the process-wide invalidation log throttle.
    pub fn with_log_throttle(
        mut self,
        log_throttle: Arc<LogThrottle>,
    ) -> Self {
        self.log_throttle = log_throttle;
        self
    }

    /// Writes the `id` serialization of the object into `writer`.
    ///
    /// `encode` runs at most once per `id` for this instance, even under
    /// concurrent callers; everyone observes the same bytes or the same error.
    /// Failures are memoized as well and are not retried.
    pub fn cache_encode<F, E>(
        &self,
        id: &str,
        encode: F,
        writer: &mut dyn Write,
    ) -> Result<()>
    where
        F: FnOnce(&T, &mut Vec<u8>) -> std::result::Result<(), E>,
        E: Into<BoxError>,
    {
        let cell = self.serialization_cell(id);

        let mut computed = false;
        let result = cell.get_or_init(|| {
            computed = true;
            let object = self.object.read().object().clone();
            let mut buf = Vec::new();
            match encode(&object, &mut buf) {
                Ok(()) => Ok(Bytes::from(buf)),
                Err(e) => Err(EncodeError::new(id, e.into())),
            }
        });

        if computed {
            ENCODE_CACHE_MISSES.with_label_values(&[id]).inc();
        } else {
            ENCODE_CACHE_HITS.with_label_values(&[id]).inc();
        }

        match result {
            Ok(bytes) => {
                writer.write_all(bytes).map_err(SerializationError::from)?;
                Ok(())
            }
            Err(e) => Err(SerializationError::from(e.clone()).into()),
        }
    }

    /// Memoized encode into one of the built-in formats.
    pub fn encode(
        &self,
        format: Format,
        writer: &mut dyn Write,
    ) -> Result<()>
    where
        T: Serialize,
    {
        match format {
            Format::Json => self.cache_encode(format.id(), encode_json::<T>, writer),
            Format::Bincode => self.cache_encode(format.id(), encode_bincode::<T>, writer),
        }
    }

    fn serialization_cell(
        &self,
        id: &str,
    ) -> SerializationCell {
        if let Some(cell) = self.serializations.load().get(id) {
            return cell.clone();
        }

        let _guard = self.serializations_lock.lock();
        let current = self.serializations.load_full();
        if let Some(cell) = current.get(id) {
            return cell.clone();
        }

        let cell: SerializationCell = Arc::new(OnceCell::new());
        let mut next = SerializationsCache::clone(&current);
        next.insert(id.to_string(), cell.clone());
        self.serializations.store(Arc::new(next));
        trace!(format = id, "serialization cell created");
        cell
    }

    /// Drops every memoized serialization. Caller holds the object write lock.
    fn invalidate_cache_locked(
        &self,
        meta: Option<&ObjectMeta>,
    ) {
        let _guard = self.serializations_lock.lock();
        if self.serializations.load().is_empty() {
            return;
        }
        self.serializations.store(Arc::new(HashMap::new()));
        CACHE_INVALIDATIONS.inc();

        if self.log_throttle.should_log(Instant::now()) {
            warn!(
                object_type = std::any::type_name::<T>(),
                namespace = meta.map(|m| m.namespace.as_str()).unwrap_or_default(),
                name = meta.map(|m| m.name.as_str()).unwrap_or_default(),
                "Unexpected cache invalidation of already encoded object"
            );
        }
    }

    /// Applies `set` only if `get` differs from `value`.
    fn conditional_set<V, G, S>(
        &self,
        value: V,
        get: G,
        set: S,
    ) where
        V: PartialEq,
        G: Fn(&ObjectMeta) -> &V,
        S: FnOnce(&mut ObjectMeta, V),
    {
        if self.object.read().meta().map_or(true, |meta| get(meta) == &value) {
            return;
        }

        let mut state = self.object.write();
        if state.meta().map_or(true, |meta| get(meta) == &value) {
            return;
        }

        let object = state.to_owned_mut();
        self.invalidate_cache_locked(object.meta());
        if let Some(meta) = object.meta_mut() {
            set(meta, value);
        }
    }

    fn read_meta<R>(
        &self,
        f: impl FnOnce(&ObjectMeta) -> R,
    ) -> Option<R> {
        self.object.read().meta().map(f)
    }

    /// Returns a deep copy the caller fully owns.
    pub fn get_object(&self) -> T {
        T::clone(self.object.read().object())
    }

    /// Current object without copying. Must not be mutated by the holder.
    pub(crate) fn shared_object(&self) -> Arc<T> {
        self.object.read().object().clone()
    }

    /// Whether the wrapped object has been privately copied by a mutation.
    pub fn is_deep_copied(&self) -> bool {
        self.object.read().is_owned()
    }

    /// Format ids currently memoized.
    pub fn cached_formats(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.serializations.load().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn name(&self) -> String {
        self.read_meta(|m| m.name.clone()).unwrap_or_default()
    }

    pub fn namespace(&self) -> String {
        self.read_meta(|m| m.namespace.clone()).unwrap_or_default()
    }

    pub fn uid(&self) -> String {
        self.read_meta(|m| m.uid.clone()).unwrap_or_default()
    }

    pub fn resource_version(&self) -> u64 {
        self.read_meta(|m| m.resource_version).unwrap_or_default()
    }

    pub fn generation(&self) -> i64 {
        self.read_meta(|m| m.generation).unwrap_or_default()
    }

    pub fn labels(&self) -> Labels {
        self.read_meta(|m| m.labels.clone()).unwrap_or_default()
    }

    pub fn annotations(&self) -> Annotations {
        self.read_meta(|m| m.annotations.clone()).unwrap_or_default()
    }

    pub fn set_name(
        &self,
        name: String,
    ) {
        self.conditional_set(name, |m| &m.name, |m, v| m.name = v);
    }

    pub fn set_namespace(
        &self,
        namespace: String,
    ) {
        self.conditional_set(namespace, |m| &m.namespace, |m, v| m.namespace = v);
    }

    pub fn set_uid(
        &self,
        uid: String,
    ) {
        self.conditional_set(uid, |m| &m.uid, |m, v| m.uid = v);
    }

    pub fn set_resource_version(
        &self,
        resource_version: u64,
    ) {
        self.conditional_set(
            resource_version,
            |m| &m.resource_version,
            |m, v| m.resource_version = v,
        );
    }

    pub fn set_generation(
        &self,
        generation: i64,
    ) {
        self.conditional_set(generation, |m| &m.generation, |m, v| m.generation = v);
    }

    pub fn set_labels(
        &self,
        labels: Labels,
    ) {
        self.conditional_set(labels, |m| &m.labels, |m, v| m.labels = v);
    }

    pub fn set_annotations(
        &self,
        annotations: Annotations,
    ) {
        self.conditional_set(annotations, |m| &m.annotations, |m, v| m.annotations = v);
    }
}
