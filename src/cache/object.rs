use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

pub type Labels = BTreeMap<String, String>;
pub type Annotations = BTreeMap<String, String>;

/// Metadata every cacheable object exposes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub uid: String,
    /// Backing store revision of the last mutation
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default)]
    pub generation: i64,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub annotations: Annotations,
}

impl ObjectMeta {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }
}

/// Capability of a domain object to be served through the watch cache.
///
/// Objects that carry no metadata (status responses, list envelopes) return
/// `None`; such objects are rejected when wrapped into a
/// [`CacheableObject`](crate::CacheableObject).
///
/// Implementations must be consistent: `meta()` and `meta_mut()` either both
/// return `Some` or both return `None` for a given value.
pub trait Object: Clone + Send + Sync + 'static {
    fn meta(&self) -> Option<&ObjectMeta>;

    fn meta_mut(&mut self) -> Option<&mut ObjectMeta>;
}
