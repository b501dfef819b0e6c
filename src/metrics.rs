//! Prometheus metrics collection for palaverd.
//!
//! Production observability exposed on an HTTP endpoint. Tracks
//! connection health, relay throughput, drop decisions and hub entity
//! counts.

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

lazy_static! {
    /// Global Prometheus registry for all metrics.
    pub static ref REGISTRY: Registry = Registry::new();

    // ========================================================================
    // Counters (monotonic increasing)
    // ========================================================================

    /// Total event frames successfully queued to clients.
    pub static ref EVENTS_SENT: IntCounter = IntCounter::new(
        "hub_events_sent_total",
        "Total event frames queued to clients"
    ).unwrap();

    /// Total chat messages accepted and fanned out.
    pub static ref CHAT_MESSAGES: IntCounter = IntCounter::new(
        "hub_chat_messages_total",
        "Chat messages accepted"
    ).unwrap();

    /// Total voice audio frames relayed.
    pub static ref AUDIO_FRAMES_RELAYED: IntCounter = IntCounter::new(
        "hub_audio_frames_relayed_total",
        "Voice audio frames relayed"
    ).unwrap();

    /// Total screen frames relayed to viewers.
    pub static ref SCREEN_FRAMES_RELAYED: IntCounter = IntCounter::new(
        "hub_screen_frames_relayed_total",
        "Screen frames relayed"
    ).unwrap();

    /// Screen frames dropped by the sender-side bandwidth bucket.
    pub static ref SCREEN_FRAMES_DROPPED: IntCounter = IntCounter::new(
        "hub_screen_frames_dropped_total",
        "Screen frames dropped by upload ceiling"
    ).unwrap();

    /// Outbound frames dropped by slow-consumer backpressure.
    pub static ref OUTBOUND_DROPPED: IntCounter = IntCounter::new(
        "hub_outbound_frames_dropped_total",
        "Outbound frames dropped under backpressure"
    ).unwrap();

    /// Total text-path rate limit hits.
    pub static ref RATE_LIMITED: IntCounter = IntCounter::new(
        "hub_rate_limited_total",
        "Rate limit hits"
    ).unwrap();

    /// Failed authentication attempts.
    pub static ref AUTH_FAILURES: IntCounter = IntCounter::new(
        "hub_auth_failures_total",
        "Failed authentication attempts"
    ).unwrap();

    // ========================================================================
    // Gauges (can increase/decrease)
    // ========================================================================

    /// Currently open transport connections (any handshake state).
    pub static ref OPEN_CONNECTIONS: IntGauge = IntGauge::new(
        "hub_open_connections",
        "Open transport connections"
    ).unwrap();

    /// Users with at least one authenticated connection.
    pub static ref ONLINE_USERS: IntGauge = IntGauge::new(
        "hub_online_users",
        "Users with live connections"
    ).unwrap();

    /// Voice channels with at least one participant.
    pub static ref ACTIVE_VOICE_CHANNELS: IntGauge = IntGauge::new(
        "hub_active_voice_channels",
        "Active voice channels"
    ).unwrap();

    /// Open voice rooms.
    pub static ref ACTIVE_VOICE_ROOMS: IntGauge = IntGauge::new(
        "hub_active_voice_rooms",
        "Active voice rooms"
    ).unwrap();

    /// Live 1:1 calls (ringing or in progress).
    pub static ref ACTIVE_CALLS: IntGauge = IntGauge::new(
        "hub_active_calls",
        "Active 1:1 calls"
    ).unwrap();

    /// Live group calls.
    pub static ref ACTIVE_GROUP_CALLS: IntGauge = IntGauge::new(
        "hub_active_group_calls",
        "Active group calls"
    ).unwrap();
}

/// Initialize the Prometheus metrics registry.
///
/// Must be called once at server startup before any metrics are
/// recorded. Registration is idempotent per process because the statics
/// are only ever registered here.
pub fn init() {
    REGISTRY.register(Box::new(EVENTS_SENT.clone())).unwrap();
    REGISTRY.register(Box::new(CHAT_MESSAGES.clone())).unwrap();
    REGISTRY
        .register(Box::new(AUDIO_FRAMES_RELAYED.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(SCREEN_FRAMES_RELAYED.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(SCREEN_FRAMES_DROPPED.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(OUTBOUND_DROPPED.clone()))
        .unwrap();
    REGISTRY.register(Box::new(RATE_LIMITED.clone())).unwrap();
    REGISTRY.register(Box::new(AUTH_FAILURES.clone())).unwrap();
    REGISTRY
        .register(Box::new(OPEN_CONNECTIONS.clone()))
        .unwrap();
    REGISTRY.register(Box::new(ONLINE_USERS.clone())).unwrap();
    REGISTRY
        .register(Box::new(ACTIVE_VOICE_CHANNELS.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(ACTIVE_VOICE_ROOMS.clone()))
        .unwrap();
    REGISTRY.register(Box::new(ACTIVE_CALLS.clone())).unwrap();
    REGISTRY
        .register(Box::new(ACTIVE_GROUP_CALLS.clone()))
        .unwrap();
}

/// Render all registered metrics in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
