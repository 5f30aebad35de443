//! Amortizes backend lease grants across many TTL writes.

mod coordinator;

pub use coordinator::*;
