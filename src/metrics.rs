//! Metric helpers for `amqpframe`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. Without the `metrics` feature
//! the helpers do nothing.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Name of the gauge tracking open connections.
pub const CONNECTIONS_ACTIVE: &str = "amqpframe_connections_active";
/// Name of the counter tracking frames read and written.
pub const FRAMES_TOTAL: &str = "amqpframe_frames_total";
/// Name of the counter tracking heartbeat frames sent.
pub const HEARTBEATS_SENT: &str = "amqpframe_heartbeats_sent_total";
/// Name of the counter tracking connection-fatal errors.
pub const ERRORS_TOTAL: &str = "amqpframe_errors_total";

/// Direction of frame processing.
#[derive(Clone, Copy, Debug)]
pub enum Direction {
    /// Frames read from the broker.
    Inbound,
    /// Frames written to the broker.
    Outbound,
}

impl Direction {
    /// Label value used for this direction.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Increment the open connections gauge.
pub fn inc_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).increment(1.0);
}

/// Decrement the open connections gauge.
pub fn dec_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a frame for the given direction.
pub fn inc_frames(direction: Direction) {
    #[cfg(feature = "metrics")]
    counter!(FRAMES_TOTAL, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Record a heartbeat frame sent.
pub fn inc_heartbeats_sent() {
    #[cfg(feature = "metrics")]
    counter!(HEARTBEATS_SENT).increment(1);
}

/// Record a connection-fatal error.
pub fn inc_errors() {
    #[cfg(feature = "metrics")]
    counter!(ERRORS_TOTAL).increment(1);
}
