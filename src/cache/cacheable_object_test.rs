use std::io;
use std::io::Write;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Barrier;
use std::time::Duration;

use tracing_test::traced_test;

use super::*;
use crate::test_utils::labels;
use crate::test_utils::pod;
use crate::test_utils::pod_with_labels;
use crate::test_utils::TestPod;
use crate::test_utils::TestStatus;
use crate::Error;
use crate::SerializationError;

fn counting_encoder(
    calls: &Arc<AtomicUsize>
) -> impl FnOnce(&TestPod, &mut Vec<u8>) -> std::result::Result<(), io::Error> {
    let calls = calls.clone();
    move |pod: &TestPod, buf: &mut Vec<u8>| {
        calls.fetch_add(1, Ordering::SeqCst);
        buf.extend_from_slice(pod.metadata.name.as_bytes());
        buf.extend_from_slice(format!("@{}", pod.metadata.resource_version).as_bytes());
        Ok(())
    }
}

struct FailingWriter;

impl Write for FailingWriter {
    fn write(
        &mut self,
        _buf: &[u8],
    ) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_wrapping_object_without_metadata_is_rejected() {
    let result = CacheableObject::new(TestStatus { code: 500 });

    assert!(matches!(
        result,
        Err(Error::Serialization(SerializationError::MissingMetadata { .. }))
    ));
}

#[test]
fn test_cache_encode_runs_encoder_once_per_id() {
    let object = CacheableObject::new(pod("web-1")).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));

    let mut first = Vec::new();
    object.cache_encode("raw", counting_encoder(&calls), &mut first).unwrap();
    let mut second = Vec::new();
    object.cache_encode("raw", counting_encoder(&calls), &mut second).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(first, second);
    assert_eq!(first, b"web-1@0".to_vec());
}

#[test]
fn test_each_id_gets_its_own_cell() {
    let object = CacheableObject::new(pod("web-1")).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));

    object.cache_encode("a", counting_encoder(&calls), &mut Vec::new()).unwrap();
    object.cache_encode("b", counting_encoder(&calls), &mut Vec::new()).unwrap();
    object.cache_encode("a", counting_encoder(&calls), &mut Vec::new()).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(object.cached_formats(), vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn test_concurrent_callers_observe_single_encode() {
    let object = Arc::new(CacheableObject::new(pod("web-1")).unwrap());
    let calls = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(16));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let object = object.clone();
            let calls = calls.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                let mut out = Vec::new();
                object
                    .cache_encode(
                        "slow",
                        |pod: &TestPod, buf: &mut Vec<u8>| -> std::result::Result<(), io::Error> {
                            calls.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(Duration::from_millis(20));
                            buf.extend_from_slice(pod.metadata.name.as_bytes());
                            Ok(())
                        },
                        &mut out,
                    )
                    .unwrap();
                out
            })
        })
        .collect();

    let outputs: Vec<Vec<u8>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(outputs.iter().all(|o| o == b"web-1"));
}

#[test]
fn test_encode_failure_is_memoized() {
    let object = CacheableObject::new(pod("web-1")).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));

    let failing = |calls: Arc<AtomicUsize>| {
        move |_: &TestPod, _: &mut Vec<u8>| -> std::result::Result<(), io::Error> {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(io::Error::new(io::ErrorKind::InvalidData, "malformed"))
        }
    };

    let first = object.cache_encode("bad", failing(calls.clone()), &mut Vec::new());
    let second = object.cache_encode("bad", failing(calls.clone()), &mut Vec::new());

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    for result in [first, second] {
        match result {
            Err(Error::Serialization(SerializationError::Encode(e))) => {
                assert_eq!(&*e.format, "bad");
                assert!(e.to_string().contains("malformed"));
            }
            other => panic!("expected encode error, got {:?}", other),
        }
    }
}

#[test]
fn test_writer_failure_does_not_poison_cache() {
    let object = CacheableObject::new(pod("web-1")).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));

    let result = object.cache_encode("raw", counting_encoder(&calls), &mut FailingWriter);
    assert!(matches!(
        result,
        Err(Error::Serialization(SerializationError::Write(_)))
    ));

    let mut out = Vec::new();
    object.cache_encode("raw", counting_encoder(&calls), &mut out).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(out, b"web-1@0".to_vec());
}

#[test]
fn test_set_same_labels_keeps_cache_and_skips_copy() {
    let shared = Arc::new(pod_with_labels("web-1", &[("app", "web")]));
    let object = CacheableObject::from_shared(shared.clone()).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    object.cache_encode("raw", counting_encoder(&calls), &mut Vec::new()).unwrap();

    object.set_labels(labels(&[("app", "web")]));

    assert!(!object.is_deep_copied());
    assert_eq!(object.cached_formats(), vec!["raw".to_string()]);
    object.cache_encode("raw", counting_encoder(&calls), &mut Vec::new()).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_set_different_labels_copies_and_invalidates() {
    let shared = Arc::new(pod_with_labels("web-1", &[("app", "web")]));
    let object = CacheableObject::from_shared(shared.clone()).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    object.cache_encode("raw", counting_encoder(&calls), &mut Vec::new()).unwrap();

    object.set_labels(labels(&[("app", "api")]));

    assert!(object.is_deep_copied());
    assert!(object.cached_formats().is_empty());
    assert_eq!(object.labels(), labels(&[("app", "api")]));
    // The shared original is never touched
    assert_eq!(shared.metadata.labels, labels(&[("app", "web")]));

    object.cache_encode("raw", counting_encoder(&calls), &mut Vec::new()).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_resource_version_stamp_is_visible_to_next_encode() {
    let object = CacheableObject::from_shared(Arc::new(pod("web-1"))).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));

    let mut before = Vec::new();
    object.cache_encode("raw", counting_encoder(&calls), &mut before).unwrap();
    object.set_resource_version(42);
    let mut after = Vec::new();
    object.cache_encode("raw", counting_encoder(&calls), &mut after).unwrap();

    assert_eq!(before, b"web-1@0".to_vec());
    assert_eq!(after, b"web-1@42".to_vec());
    assert_eq!(object.resource_version(), 42);
}

#[test]
fn test_deep_copy_happens_once() {
    let object = CacheableObject::from_shared(Arc::new(pod("web-1"))).unwrap();

    object.set_generation(2);
    object.set_uid("uid-1".to_string());
    object.set_annotations(labels(&[("note", "x")]));

    assert!(object.is_deep_copied());
    assert_eq!(object.generation(), 2);
    assert_eq!(object.uid(), "uid-1");
    assert_eq!(object.annotations(), labels(&[("note", "x")]));
}

#[test]
fn test_get_object_returns_independent_copy() {
    let object = CacheableObject::new(pod("web-1")).unwrap();

    let mut copy = object.get_object();
    copy.metadata.name = "changed".to_string();
    copy.node_name = "node-9".to_string();

    assert_eq!(object.name(), "web-1");
    assert_eq!(object.get_object().node_name, "node-1");
}

#[test]
fn test_builtin_formats_encode_through_cache() {
    let object = CacheableObject::new(pod("web-1")).unwrap();

    let mut json = Vec::new();
    object.encode(Format::Json, &mut json).unwrap();
    let decoded: TestPod = serde_json::from_slice(&json).unwrap();
    assert_eq!(decoded, pod("web-1"));

    let mut bin = Vec::new();
    object.encode(Format::Bincode, &mut bin).unwrap();
    let decoded: TestPod = bincode::deserialize(&bin).unwrap();
    assert_eq!(decoded, pod("web-1"));

    assert_eq!(
        object.cached_formats(),
        vec![Format::Json.id().to_string(), Format::Bincode.id().to_string()]
    );
}

#[test]
#[traced_test]
fn test_unexpected_invalidation_log_is_rate_limited() {
    let throttle = Arc::new(LogThrottle::new(Duration::from_secs(3600)));
    let object = CacheableObject::new(pod("web-1"))
        .unwrap()
        .with_log_throttle(throttle);
    let calls = Arc::new(AtomicUsize::new(0));

    for version in 1..=3 {
        object.cache_encode("raw", counting_encoder(&calls), &mut Vec::new()).unwrap();
        object.set_resource_version(version);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    logs_assert(|lines: &[&str]| {
        let count = lines
            .iter()
            .filter(|line| line.contains("Unexpected cache invalidation"))
            .count();
        match count {
            1 => Ok(()),
            n => Err(format!("expected one invalidation log line, found {}", n)),
        }
    });
}

#[test]
#[traced_test]
fn test_invalidation_of_empty_cache_is_silent() {
    let throttle = Arc::new(LogThrottle::new(Duration::from_millis(1)));
    let object = CacheableObject::from_shared(Arc::new(pod("web-1")))
        .unwrap()
        .with_log_throttle(throttle);

    object.set_resource_version(7);

    assert!(object.is_deep_copied());
    assert!(!logs_contain("Unexpected cache invalidation"));
}
