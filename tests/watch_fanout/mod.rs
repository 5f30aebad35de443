use std::sync::Arc;

use d_watchcache::EventType;
use d_watchcache::Format;
use d_watchcache::WatchOptions;

use crate::common::deployment;
use crate::common::key;
use crate::common::start_cacher;
use crate::common::Deployment;
use crate::enable_logger;

#[tokio::test]
async fn test_many_watchers_share_one_encode_per_event() {
    enable_logger();
    let (cacher, _) = start_cacher(64).await;
    let mut watchers: Vec<_> = (0..8)
        .map(|_| cacher.watch(WatchOptions::default()).unwrap())
        .collect();

    cacher.create(&key("api"), deployment("api", 3), None).await.unwrap();

    let mut payloads = Vec::new();
    let mut objects = Vec::new();
    for watcher in watchers.iter_mut() {
        let event = watcher.next().await.unwrap();
        assert_eq!(event.event_type, EventType::Added);
        let object = event.object.unwrap();
        let mut out = Vec::new();
        object.encode(Format::Json, &mut out).unwrap();
        payloads.push(out);
        objects.push(object);
    }

    assert!(objects.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
    assert!(payloads.windows(2).all(|pair| pair[0] == pair[1]));
    let decoded: Deployment = serde_json::from_slice(&payloads[0]).unwrap();
    assert_eq!(decoded.metadata.resource_version, 1);
    assert_eq!(decoded.replicas, 3);
}

#[tokio::test]
async fn test_slow_watcher_is_invalidated_and_recovers_from_list() {
    enable_logger();
    let (cacher, _) = start_cacher(4).await;
    cacher.create(&key("api"), deployment("api", 1), None).await.unwrap();
    let mut slow = cacher
        .watch(WatchOptions {
            start_revision: 1,
            ..Default::default()
        })
        .unwrap();

    for replicas in 2..=7 {
        cacher
            .update(&key("api"), deployment("api", replicas), None, None)
            .await
            .unwrap();
    }

    let err = slow.next().await.unwrap_err();
    assert!(err.is_invalidated());

    // Restart from a full list, then resume watching from its revision
    let (objects, revision) = cacher.list("/deployments/", 0).await.unwrap();
    assert_eq!(revision, 7);
    assert_eq!(objects[0].get_object().replicas, 7);

    let mut resumed = cacher
        .watch(WatchOptions {
            start_revision: revision,
            ..Default::default()
        })
        .unwrap();
    cacher.delete(&key("api")).await.unwrap();

    let event = resumed.next().await.unwrap();
    assert_eq!((event.event_type, event.revision), (EventType::Deleted, 8));
    assert_eq!(event.object.unwrap().get_object().replicas, 7);
}

#[tokio::test]
async fn test_watch_with_stale_start_revision_is_rejected() {
    let (cacher, _) = start_cacher(2).await;
    for replicas in 1..=4 {
        cacher
            .update(&key("api"), deployment("api", replicas), None, None)
            .await
            .unwrap();
    }

    let err = cacher
        .watch(WatchOptions {
            start_revision: 1,
            ..Default::default()
        })
        .unwrap_err();

    assert!(err.is_invalidated());
}
