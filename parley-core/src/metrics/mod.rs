//! Metrics for observability
//!
//! Counters and gauges are recorded through the `metrics` facade at the call
//! sites; this module only registers descriptions. Without an installed
//! recorder every call is a no-op.

use metrics::{describe_counter, describe_gauge, Unit};

/// Initialize metrics with descriptions
pub fn init_metrics() {
    // Presence metrics
    describe_gauge!("presence.connections", Unit::Count, "Users with a live connection");
    describe_counter!("presence.connects.total", "Registered connections");
    describe_counter!("presence.disconnects.total", "Connections removed from the registry");

    // Invite metrics
    describe_counter!("invites.sent.total", "Friend requests created or reopened");
    describe_counter!("invites.queued.total", "Invites queued for an offline target");
    describe_counter!("invites.responses.total", "Friend requests accepted or declined");

    // Relay metrics
    describe_counter!("relay.messages.persisted", "Messages written to the store");
    describe_counter!("relay.messages.forwarded", "Messages forwarded to a live receiver");
    describe_counter!("relay.messages.failed", "Messages rejected or not persisted");
}

/// Metric names, for exporters and dashboards
pub const METRIC_NAMES: &[&str] = &[
    "presence.connections",
    "presence.connects.total",
    "presence.disconnects.total",
    "invites.sent.total",
    "invites.queued.total",
    "invites.responses.total",
    "relay.messages.persisted",
    "relay.messages.forwarded",
    "relay.messages.failed",
];
