use std::sync::Arc;

use futures::Stream;
use tokio::sync::watch;
use tracing::debug;
use tracing::trace;

use super::Event;
use super::EventType;
use super::IntervalReader;
use super::Predicate;
use super::WatchCache;
use super::WatchEvent;
use crate::Error;
use crate::Object;
use crate::Result;

#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    /// Deliver events newer than this revision; 0 starts from the current state
    pub start_revision: u64,
    pub key_prefix: String,
    pub predicate: Predicate,
    /// Emit `Bookmark` events when the revision moves without a matching event
    pub allow_bookmarks: bool,
}

/// Endless event stream over a [`WatchCache`].
///
/// Chains intervals: once one is drained, the watcher waits for the next
/// revision and continues from the drained interval's limit. Falling behind the
/// retained history fails with `WatchError::Invalidated`, after which the
/// watcher is spent. Dropping it cancels the watch.
pub struct Watcher<T: Object> {
    cache: Arc<WatchCache<T>>,
    interval: IntervalReader<T>,
    options: WatchOptions,
    revision_rx: watch::Receiver<u64>,
    /// Revision of the last delivered event or bookmark
    delivered_revision: u64,
}

impl<T: Object> std::fmt::Debug for Watcher<T> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("options", &self.options)
            .field("interval", &self.interval)
            .field("delivered_revision", &self.delivered_revision)
            .finish()
    }
}

impl<T: Object> Watcher<T> {
    pub fn new(
        cache: Arc<WatchCache<T>>,
        options: WatchOptions,
    ) -> Result<Self> {
        let revision_rx = cache.subscribe();
        let interval = cache.interval_since(options.start_revision)?;
        debug!(
            start_revision = options.start_revision,
            key_prefix = %options.key_prefix,
            snapshot = interval.is_snapshot(),
            "watcher started"
        );
        Ok(Self {
            delivered_revision: options.start_revision,
            cache,
            interval,
            options,
            revision_rx,
        })
    }

    /// Next event, waiting for one if the watcher has caught up.
    pub async fn next(&mut self) -> Result<WatchEvent<T>> {
        loop {
            let current = *self.revision_rx.borrow_and_update();

            if let Some(event) = self.try_next()? {
                return Ok(event);
            }

            if self.options.allow_bookmarks && current > self.delivered_revision {
                self.delivered_revision = current;
                return Ok(WatchEvent::bookmark(current));
            }

            if self.revision_rx.changed().await.is_err() {
                return Err(Error::Fatal("watch cache revision channel closed".into()));
            }
        }
    }

    /// Next event already in history, without waiting.
    pub fn try_next(&mut self) -> Result<Option<WatchEvent<T>>> {
        loop {
            match self.interval.next()? {
                Some(event) => {
                    if let Some(event) = self.convert(&event) {
                        self.delivered_revision = self.delivered_revision.max(event.revision);
                        return Ok(Some(event));
                    }
                }
                None => {
                    let resume = self.interval.resume_index();
                    if self.cache.next_index() <= resume {
                        return Ok(None);
                    }
                    trace!(resume_index = resume, "watcher continues with next interval");
                    self.interval = self.cache.interval_from_index(resume);
                }
            }
        }
    }

    /// Applies key and predicate filtering.
    ///
    /// A modification moving an object into the selection is delivered as
    /// `Added`, one moving it out as `Deleted`.
    fn convert(
        &self,
        event: &Event<T>,
    ) -> Option<WatchEvent<T>> {
        if self.options.start_revision > 0 && event.revision <= self.options.start_revision {
            return None;
        }
        if !event.key.starts_with(&self.options.key_prefix) {
            return None;
        }

        let predicate = &self.options.predicate;
        let current = predicate.matches(&event.labels, &event.fields);
        let previous = event
            .prev
            .as_ref()
            .map(|prev| predicate.matches(&prev.labels, &prev.fields));

        match (event.event_type, current, previous) {
            (EventType::Modified, true, Some(false)) => {
                Some(WatchEvent::from_event(event, EventType::Added, event.object.clone()))
            }
            (EventType::Modified, false, Some(true)) => {
                let object = event.prev.as_ref()?.stamped(event.revision).ok()?;
                Some(WatchEvent::from_event(event, EventType::Deleted, object))
            }
            (event_type, true, _) => Some(WatchEvent::from_event(event, event_type, event.object.clone())),
            _ => None,
        }
    }

    /// Turns the watcher into a stream that ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<WatchEvent<T>>> {
        futures::stream::unfold(Some(self), |watcher| async move {
            let mut watcher = watcher?;
            match watcher.next().await {
                Ok(event) => Some((Ok(event), Some(watcher))),
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

impl<T: Object> WatchCache<T> {
    /// Starts a watcher over this cache.
    pub fn watch(
        self: &Arc<Self>,
        options: WatchOptions,
    ) -> Result<Watcher<T>> {
        Watcher::new(self.clone(), options)
    }
}
