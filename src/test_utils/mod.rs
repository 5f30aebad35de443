//! the test_utils folder here will share utils or test components between unit
//! tests of different subsystems
mod common;
mod fixtures;

pub use common::*;
pub use fixtures::*;
