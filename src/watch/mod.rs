//! Watch serving out of a bounded event history.

mod event;
mod event_log;
mod interval;
mod watch_cache;
mod watcher;

pub use event::*;
pub use event_log::*;
pub use interval::*;
pub use watch_cache::*;
pub use watcher::*;
