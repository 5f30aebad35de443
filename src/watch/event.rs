use std::collections::BTreeMap;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::CacheableObject;
use crate::Labels;
use crate::Object;

/// Indexed field values, e.g. `metadata.name`
pub type Fields = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Added,
    Modified,
    Deleted,
    /// Progress marker carrying only a revision
    Bookmark,
}

/// A mutation recorded in the event log. Immutable once appended.
#[derive(Debug)]
pub struct Event<T: Object> {
    pub event_type: EventType,
    pub key: String,
    /// Object after the mutation; for deletes, the last state stamped with the delete revision
    pub object: Arc<CacheableObject<T>>,
    pub labels: Labels,
    pub fields: Fields,
    /// State before the mutation with its indexed attributes
    pub prev: Option<PrevState<T>>,
    pub revision: u64,
}

#[derive(Debug)]
pub struct PrevState<T: Object> {
    pub object: Arc<CacheableObject<T>>,
    pub labels: Labels,
    pub fields: Fields,
    /// `object` stamped with the event revision, built on first use
    stamped: OnceCell<Arc<CacheableObject<T>>>,
}

impl<T: Object> PrevState<T> {
    pub fn new(
        object: Arc<CacheableObject<T>>,
        labels: Labels,
        fields: Fields,
    ) -> Self {
        Self {
            object,
            labels,
            fields,
            stamped: OnceCell::new(),
        }
    }

    /// The previous object carrying `revision` as its resource version.
    ///
    /// Built once per event; every caller shares the instance and therefore
    /// its serializations.
    pub fn stamped(
        &self,
        revision: u64,
    ) -> crate::Result<Arc<CacheableObject<T>>> {
        self.stamped
            .get_or_try_init(|| {
                let object = CacheableObject::from_shared(self.object.shared_object())?;
                object.set_resource_version(revision);
                Ok::<_, crate::Error>(Arc::new(object))
            })
            .cloned()
    }
}

/// What a watcher receives.
#[derive(Debug, Clone)]
pub struct WatchEvent<T: Object> {
    pub event_type: EventType,
    pub key: String,
    /// `None` only for bookmarks
    pub object: Option<Arc<CacheableObject<T>>>,
    pub revision: u64,
}

impl<T: Object> WatchEvent<T> {
    pub fn bookmark(revision: u64) -> Self {
        Self {
            event_type: EventType::Bookmark,
            key: String::new(),
            object: None,
            revision,
        }
    }

    pub(crate) fn from_event(
        event: &Event<T>,
        event_type: EventType,
        object: Arc<CacheableObject<T>>,
    ) -> Self {
        Self {
            event_type,
            key: event.key.clone(),
            object: Some(object),
            revision: event.revision,
        }
    }
}

/// Label and field equality selector
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Predicate {
    pub labels: Labels,
    pub fields: Fields,
}

impl Predicate {
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn is_everything(&self) -> bool {
        self.labels.is_empty() && self.fields.is_empty()
    }

    pub fn matches(
        &self,
        labels: &Labels,
        fields: &Fields,
    ) -> bool {
        self.labels.iter().all(|(k, v)| labels.get(k) == Some(v))
            && self.fields.iter().all(|(k, v)| fields.get(k) == Some(v))
    }
}
