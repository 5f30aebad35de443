use autometrics::prometheus_exporter;
use lazy_static::lazy_static;
use prometheus::exponential_buckets;
use prometheus::Encoder;
use prometheus::Histogram;
use prometheus::HistogramOpts;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::Opts;
use prometheus::Registry;
use tracing::warn;


lazy_static! {
    pub static ref CACHE_INVALIDATIONS: IntCounter = IntCounter::new(
        "cache_invalidations",
        "Number of times cached serializations were dropped by a mutation"
    )
    .expect("metric can not be created");

    pub static ref ENCODE_CACHE_HITS: IntCounterVec = IntCounterVec::new(
        Opts::new("encode_cache_hits", "Encodes served from a memoized serialization"),
        &["format"]
    )
    .expect("metric can not be created");

    pub static ref ENCODE_CACHE_MISSES: IntCounterVec = IntCounterVec::new(
        Opts::new("encode_cache_misses", "Encodes that ran the encode function"),
        &["format"]
    )
    .expect("metric can not be created");

    pub static ref LEASE_OBJECTS_ATTACHED: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "lease_objects_attached",
            "Number of objects attached to a lease when it was superseded"
        )
        .buckets(exponential_buckets(1.0, 2.0, 14).expect("valid buckets"))
    )
    .expect("metric can not be created");

    pub static ref LEASE_GRANTS: IntCounter = IntCounter::new(
        "lease_grants",
        "Number of leases requested from the backing store"
    )
    .expect("metric can not be created");

    pub static ref INVALIDATED_INTERVALS: IntCounter = IntCounter::new(
        "invalidated_watch_intervals",
        "Watch intervals that found their unread events evicted"
    )
    .expect("metric can not be created");

    pub static ref EVICTED_EVENTS: IntCounter = IntCounter::new(
        "evicted_history_events",
        "Events pushed out of the bounded history"
    )
    .expect("metric can not be created");
}

/// Registers every watch cache collector into `registry`.
pub fn register_custom_metrics(registry: &Registry) {
    registry
        .register(Box::new(CACHE_INVALIDATIONS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(ENCODE_CACHE_HITS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(ENCODE_CACHE_MISSES.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(LEASE_OBJECTS_ATTACHED.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(LEASE_GRANTS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(INVALIDATED_INTERVALS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(EVICTED_EVENTS.clone()))
        .expect("collector can be registered");
}

/// Renders `registry` followed by the autometrics function metrics, in the
/// prometheus text exposition format.
pub fn gather_metrics(registry: &Registry) -> String {
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        warn!("could not encode custom metrics: {}", e);
    };
    let mut res = match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            warn!("custom metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    };

    res.push_str(&get_metrics_body());
    res
}

/// Autometrics collected for instrumented functions
pub fn get_metrics_body() -> String {
    prometheus_exporter::encode_http_response().into_body()
}
