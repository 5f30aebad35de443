mod time_budget;

pub use time_budget::*;
