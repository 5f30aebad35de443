use std::sync::Arc;

use d_watchcache::Cacher;
use d_watchcache::MemBackend;
use d_watchcache::Object;
use d_watchcache::ObjectMeta;
use d_watchcache::WatchCacheConfig;
use d_watchcache::WatchCacheNodeConfig;
use serde::Deserialize;
use serde::Serialize;

pub type TestCacher = Cacher<Deployment, MemBackend<Deployment>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub metadata: ObjectMeta,
    pub replicas: u32,
    pub image: String,
}

impl Object for Deployment {
    fn meta(&self) -> Option<&ObjectMeta> {
        Some(&self.metadata)
    }

    fn meta_mut(&mut self) -> Option<&mut ObjectMeta> {
        Some(&mut self.metadata)
    }
}

pub fn deployment(
    name: &str,
    replicas: u32,
) -> Deployment {
    Deployment {
        metadata: ObjectMeta::new("prod", name),
        replicas,
        image: format!("registry.local/{}:1.0", name),
    }
}

pub fn key(name: &str) -> String {
    format!("/deployments/prod/{}", name)
}

/// Cacher over a fresh in-memory backend with a small history
pub async fn start_cacher(capacity: usize) -> (Arc<TestCacher>, Arc<MemBackend<Deployment>>) {
    let backend = Arc::new(MemBackend::new());
    let config = WatchCacheNodeConfig {
        watch_cache: WatchCacheConfig {
            capacity,
            window_size: capacity.min(100),
        },
        ..Default::default()
    }
    .validate()
    .expect("valid config");

    let cacher = Arc::new(Cacher::new(backend.clone(), &config));
    cacher.init().await.expect("init cacher");
    (cacher, backend)
}
