use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use crate::CacheableObject;
use crate::Event;
use crate::EventType;
use crate::Fields;
use crate::Labels;
use crate::Object;
use crate::ObjectMeta;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestPod {
    pub metadata: ObjectMeta,
    pub node_name: String,
}

impl Object for TestPod {
    fn meta(&self) -> Option<&ObjectMeta> {
        Some(&self.metadata)
    }

    fn meta_mut(&mut self) -> Option<&mut ObjectMeta> {
        Some(&mut self.metadata)
    }
}

/// Object without metadata, like a status response
#[derive(Debug, Clone, PartialEq)]
pub struct TestStatus {
    pub code: u16,
}

impl Object for TestStatus {
    fn meta(&self) -> Option<&ObjectMeta> {
        None
    }

    fn meta_mut(&mut self) -> Option<&mut ObjectMeta> {
        None
    }
}

pub fn pod(name: &str) -> TestPod {
    TestPod {
        metadata: ObjectMeta::new("default", name),
        node_name: "node-1".to_string(),
    }
}

pub fn pod_with_labels(
    name: &str,
    pairs: &[(&str, &str)],
) -> TestPod {
    let mut pod = pod(name);
    pod.metadata.labels = labels(pairs);
    pod
}

pub fn labels(pairs: &[(&str, &str)]) -> Labels {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect::<BTreeMap<_, _>>()
}

pub fn pod_key(name: &str) -> String {
    format!("/pods/default/{}", name)
}

/// Pod stamped with `revision`, as the backing store would return it
pub fn pod_at(
    name: &str,
    revision: u64,
) -> TestPod {
    let mut pod = pod(name);
    pod.metadata.resource_version = revision;
    pod
}

/// Standalone `Added` history event for `name` at `revision`
pub fn pod_event(
    name: &str,
    revision: u64,
) -> Arc<Event<TestPod>> {
    Arc::new(Event {
        event_type: EventType::Added,
        key: pod_key(name),
        object: Arc::new(CacheableObject::new(pod_at(name, revision)).unwrap()),
        labels: Labels::new(),
        fields: Fields::new(),
        prev: None,
        revision,
    })
}

pub fn revisions(events: &[Arc<Event<TestPod>>]) -> Vec<u64> {
    events.iter().map(|e| e.revision).collect()
}
