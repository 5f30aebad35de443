use serde::Serialize;

use crate::constants::FORMAT_BINCODE;
use crate::constants::FORMAT_JSON;

/// Built-in wire formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Json,
    Bincode,
}

impl Format {
    /// Identifier the memoized serialization is stored under
    pub fn id(&self) -> &'static str {
        match self {
            Format::Json => FORMAT_JSON,
            Format::Bincode => FORMAT_BINCODE,
        }
    }
}

pub fn encode_json<T: Serialize>(
    object: &T,
    buf: &mut Vec<u8>,
) -> std::result::Result<(), serde_json::Error> {
    serde_json::to_writer(buf, object)
}

pub fn encode_bincode<T: Serialize>(
    object: &T,
    buf: &mut Vec<u8>,
) -> std::result::Result<(), bincode::Error> {
    bincode::serialize_into(buf, object)
}
