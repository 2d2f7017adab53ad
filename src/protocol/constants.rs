//! Class identifiers and reply codes.

/// `connection` class.
pub const CLASS_CONNECTION: u16 = 10;
/// `channel` class.
pub const CLASS_CHANNEL: u16 = 20;
/// `exchange` class.
pub const CLASS_EXCHANGE: u16 = 40;
/// `queue` class.
pub const CLASS_QUEUE: u16 = 50;
/// `basic` class, the only class with content properties.
pub const CLASS_BASIC: u16 = 60;
/// `confirm` class.
pub const CLASS_CONFIRM: u16 = 85;
/// `tx` class.
pub const CLASS_TX: u16 = 90;

/// Default AMQP port.
pub const DEFAULT_PORT: u16 = 5672;
/// Default AMQP-over-TLS port.
pub const DEFAULT_TLS_PORT: u16 = 5671;

/// Highest channel number a peer may use.
pub const CHANNEL_MAX_LIMIT: u16 = u16::MAX;

/// AMQP reply codes carried by `connection.close` and `channel.close`.
pub mod reply_code {
    /// Normal completion.
    pub const REPLY_SUCCESS: u16 = 200;
    /// Message body too large for the broker.
    pub const CONTENT_TOO_LARGE: u16 = 311;
    /// Mandatory publish that no queue could take.
    pub const NO_ROUTE: u16 = 312;
    /// Immediate publish with no consumers.
    pub const NO_CONSUMERS: u16 = 313;
    /// Operator forced the connection closed.
    pub const CONNECTION_FORCED: u16 = 320;
    /// Unknown virtual host path.
    pub const INVALID_PATH: u16 = 402;
    /// Access denied.
    pub const ACCESS_REFUSED: u16 = 403;
    /// Entity does not exist.
    pub const NOT_FOUND: u16 = 404;
    /// Entity held exclusively by another connection.
    pub const RESOURCE_LOCKED: u16 = 405;
    /// Entity exists with different properties.
    pub const PRECONDITION_FAILED: u16 = 406;
    /// Malformed frame.
    pub const FRAME_ERROR: u16 = 501;
    /// Malformed method arguments.
    pub const SYNTAX_ERROR: u16 = 502;
    /// Method not valid in the current state.
    pub const COMMAND_INVALID: u16 = 503;
    /// Channel used incorrectly.
    pub const CHANNEL_ERROR: u16 = 504;
    /// Frame arrived out of sequence.
    pub const UNEXPECTED_FRAME: u16 = 505;
    /// Broker ran out of a resource.
    pub const RESOURCE_ERROR: u16 = 506;
    /// Operation not permitted.
    pub const NOT_ALLOWED: u16 = 530;
    /// Functionality not implemented.
    pub const NOT_IMPLEMENTED: u16 = 540;
    /// Internal error.
    pub const INTERNAL_ERROR: u16 = 541;

    /// Symbolic name of a reply code, if it is a known one.
    #[must_use]
    pub const fn name(code: u16) -> Option<&'static str> {
        Some(match code {
            REPLY_SUCCESS => "REPLY_SUCCESS",
            CONTENT_TOO_LARGE => "CONTENT_TOO_LARGE",
            NO_ROUTE => "NO_ROUTE",
            NO_CONSUMERS => "NO_CONSUMERS",
            CONNECTION_FORCED => "CONNECTION_FORCED",
            INVALID_PATH => "INVALID_PATH",
            ACCESS_REFUSED => "ACCESS_REFUSED",
            NOT_FOUND => "NOT_FOUND",
            RESOURCE_LOCKED => "RESOURCE_LOCKED",
            PRECONDITION_FAILED => "PRECONDITION_FAILED",
            FRAME_ERROR => "FRAME_ERROR",
            SYNTAX_ERROR => "SYNTAX_ERROR",
            COMMAND_INVALID => "COMMAND_INVALID",
            CHANNEL_ERROR => "CHANNEL_ERROR",
            UNEXPECTED_FRAME => "UNEXPECTED_FRAME",
            RESOURCE_ERROR => "RESOURCE_ERROR",
            NOT_ALLOWED => "NOT_ALLOWED",
            NOT_IMPLEMENTED => "NOT_IMPLEMENTED",
            INTERNAL_ERROR => "INTERNAL_ERROR",
            _ => return None,
        })
    }
}
