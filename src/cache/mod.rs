//! Serialization cache for objects fanned out to many consumers.

mod cacheable_object;
mod encoding;
mod log_throttle;
mod object;

pub use cacheable_object::*;
pub use encoding::*;
pub use log_throttle::*;
pub use object::*;

#[cfg(test)]
mod cacheable_object_test;
