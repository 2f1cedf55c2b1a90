//! Metric name and label definitions.
//!
//! Every metric beenbag records is named here so the exported surface is
//! documented in one place.

/// Spawn scheduler, claim, and expiry metrics
pub mod spawns {
    /// Number of guilds with a running spawn scheduler
    pub const SCHEDULERS_ACTIVE: &str = "beenbag_spawns_schedulers_active";
    /// Total encounters created
    pub const ENCOUNTERS_CREATED_TOTAL: &str = "beenbag_spawns_encounters_created_total";
    /// Total encounters won by a claimant
    pub const CLAIMS_TOTAL: &str = "beenbag_spawns_claims_total";
    /// Total claim attempts that lost the race to another resolver
    pub const CLAIM_RACES_LOST_TOTAL: &str = "beenbag_spawns_claim_races_lost_total";
    /// Total encounters that escaped unclaimed
    pub const EXPIRED_TOTAL: &str = "beenbag_spawns_expired_total";
    /// Total failed scheduler iterations
    pub const ITERATION_ERRORS_TOTAL: &str = "beenbag_spawns_iteration_errors_total";
    /// Seconds between encounter creation and a winning claim
    pub const TIME_TO_CLAIM_SECONDS: &str = "beenbag_spawns_time_to_claim_seconds";
}

/// Outward API gate metrics
pub mod gate {
    /// Total calls admitted through the gate
    pub const CALLS_TOTAL: &str = "beenbag_gate_calls_total";
    /// Calls currently holding a gate permit
    pub const IN_FLIGHT: &str = "beenbag_gate_in_flight";
    /// Total throttled responses observed
    pub const THROTTLED_TOTAL: &str = "beenbag_gate_throttled_total";
    /// Total calls that failed after exhausting retries
    pub const EXHAUSTED_TOTAL: &str = "beenbag_gate_exhausted_total";
    /// Seconds spent waiting for a permit
    pub const PERMIT_WAIT_SECONDS: &str = "beenbag_gate_permit_wait_seconds";
}

/// Direct-message outbox metrics
pub mod outbox {
    /// Total items enqueued
    pub const ENQUEUED_TOTAL: &str = "beenbag_outbox_enqueued_total";
    /// Total items delivered
    pub const DELIVERED_TOTAL: &str = "beenbag_outbox_delivered_total";
    /// Total items dropped after a failed delivery
    pub const DROPPED_TOTAL: &str = "beenbag_outbox_dropped_total";
    /// Items waiting in the queue
    pub const QUEUE_DEPTH: &str = "beenbag_outbox_queue_depth";
}

/// Gateway connection metrics
pub mod gateway {
    /// Total connection attempts
    pub const CONNECT_ATTEMPTS_TOTAL: &str = "beenbag_gateway_connect_attempts_total";
    /// Total sessions ended by a throttle response
    pub const THROTTLED_TOTAL: &str = "beenbag_gateway_throttled_total";
    /// Total sessions ended by a transient failure
    pub const TRANSIENT_FAILURES_TOTAL: &str = "beenbag_gateway_transient_failures_total";
    /// Inbound messages received
    pub const MESSAGES_RECEIVED_TOTAL: &str = "beenbag_gateway_messages_received_total";
}

/// Common label keys
pub mod labels {
    pub const OPERATION: &str = "operation";
    pub const OUTCOME: &str = "outcome";
}

/// Histogram bucket definitions
pub mod buckets {
    use once_cell::sync::Lazy;

    /// Short waits (permit acquisition), 1ms to 5 minutes
    pub static WAIT_SECONDS: Lazy<Vec<f64>> = Lazy::new(|| {
        vec![
            0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0,
        ]
    });

    /// Claim latency, spanning the longest stay of any rarity
    pub static CLAIM_SECONDS: Lazy<Vec<f64>> = Lazy::new(|| {
        vec![
            1.0, 2.5, 5.0, 10.0, 15.0, 30.0, 45.0, 60.0, 90.0, 120.0, 160.0, 180.0,
        ]
    });
}
