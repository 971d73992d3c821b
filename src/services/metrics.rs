//! Prometheus counters for the relay, exported by `GET /metrics`

use lazy_static::lazy_static;
use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};

lazy_static! {
    pub static ref RELAY_REQUESTS: IntCounterVec = register_int_counter_vec!(
        "relay_requests_total",
        "Relay requests received, by format and method",
        &["format", "method"]
    )
    .unwrap();
    pub static ref UPSTREAM_RETRIES: IntCounter = register_int_counter!(
        "relay_upstream_retries_total",
        "Upstream attempts repeated after a 406 soft block"
    )
    .unwrap();
    pub static ref UPSTREAM_TIMEOUTS: IntCounter = register_int_counter!(
        "relay_upstream_timeouts_total",
        "Upstream fetches that ran out of time"
    )
    .unwrap();
    pub static ref UPSTREAM_FAILURES: IntCounterVec = register_int_counter_vec!(
        "relay_upstream_failures_total",
        "Non-success upstream responses surfaced to clients, by status",
        &["status"]
    )
    .unwrap();
    pub static ref CLIENT_DISCONNECTS: IntCounter = register_int_counter!(
        "relay_client_disconnects_total",
        "Streams dropped by the client before the upstream body ended"
    )
    .unwrap();
    pub static ref MANIFESTS_REWRITTEN: IntCounter = register_int_counter!(
        "relay_manifests_rewritten_total",
        "HLS manifests rewritten to route segments through the relay"
    )
    .unwrap();
}
