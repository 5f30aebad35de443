use std::time::Duration;

use d_watchcache::Backend;

use crate::common::deployment;
use crate::common::key;
use crate::common::start_cacher;

#[tokio::test(start_paused = true)]
async fn test_list_ahead_of_cache_uses_backend_once_budget_is_spent() {
    let (cacher, backend) = start_cacher(16).await;
    tokio::time::advance(Duration::from_secs(3)).await;
    // Bypasses the cacher, so the cache stays at revision 0
    backend.put(&key("api"), deployment("api", 2), None, None).await.unwrap();

    let started = tokio::time::Instant::now();
    let (objects, revision) = cacher.list("/deployments/", 1).await.unwrap();

    // Whole 100ms allowance spent waiting, then the backend answered
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert_eq!((objects.len(), revision), (1, 1));

    // Only what accrued during the first wait is left to spend
    let started = tokio::time::Instant::now();
    let (objects, _) = cacher.list("/deployments/", 1).await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(10));
    assert_eq!(objects.len(), 1);
    assert_eq!(cacher.revision(), 0);
}

#[tokio::test]
async fn test_list_at_or_below_cache_revision_is_served_from_memory() {
    let (cacher, backend) = start_cacher(16).await;
    cacher.create(&key("api"), deployment("api", 1), None).await.unwrap();
    backend.set_unavailable(true);

    let (objects, revision) = cacher.list("/deployments/", 1).await.unwrap();

    assert_eq!(revision, 1);
    assert_eq!(objects[0].name(), "api");
}
