mod backend;
mod mem_backend;

pub use backend::*;
pub use mem_backend::*;
