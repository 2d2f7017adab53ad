//! Canonical error, shutdown and result types for the crate.
//!
//! A connection or channel that has shut down keeps its [`ShutdownSignal`];
//! every later operation on it fails with [`Error::AlreadyClosed`] carrying
//! that same signal.

use std::{fmt, io, sync::Arc};

use crate::{
    codec::CodecError,
    command::AssemblyError,
    frame::FrameError,
    protocol::{
        method::{ChannelClose, ConnectionClose},
        reply_code,
    },
};

/// Why a connection or channel shut down.
#[derive(Clone, Debug)]
pub enum ShutdownReason {
    /// The application closed or aborted it.
    Application {
        /// Reply code sent to the broker.
        reply_code: u16,
        /// Reply text sent to the broker.
        reply_text: String,
    },
    /// The broker closed the connection.
    ConnectionException(ConnectionClose),
    /// The broker closed the channel.
    ChannelException(ChannelClose),
    /// The broker stopped sending frames.
    MissedHeartbeat,
    /// The peer closed the byte stream.
    EndOfStream,
    /// The byte stream failed.
    Io(Arc<io::Error>),
    /// The peer violated the protocol, or a frame could not be handled.
    Protocol(String),
}

impl ShutdownReason {
    /// Reply code associated with the reason, if it carries one.
    #[must_use]
    pub fn reply_code(&self) -> Option<u16> {
        match self {
            Self::Application { reply_code, .. } => Some(*reply_code),
            Self::ConnectionException(close) => Some(close.reply_code),
            Self::ChannelException(close) => Some(close.reply_code),
            _ => None,
        }
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Application {
                reply_code,
                reply_text,
            } => write!(f, "closed by application ({reply_code} {reply_text})"),
            Self::ConnectionException(close) => write!(
                f,
                "connection closed by broker ({} {}, method {}.{})",
                close.reply_code, close.reply_text, close.class_id, close.method_id
            ),
            Self::ChannelException(close) => write!(
                f,
                "channel closed by broker ({} {}, method {}.{})",
                close.reply_code, close.reply_text, close.class_id, close.method_id
            ),
            Self::MissedHeartbeat => f.write_str("missed heartbeats from broker"),
            Self::EndOfStream => f.write_str("peer closed the stream"),
            Self::Io(error) => write!(f, "transport error: {error}"),
            Self::Protocol(message) => write!(f, "protocol error: {message}"),
        }
    }
}

#[derive(Debug)]
struct SignalInner {
    hard_error: bool,
    initiated_by_application: bool,
    reason: ShutdownReason,
}

/// Cause of a shutdown, shared by every component the shutdown reaches.
///
/// Clones refer to the same signal; [`ShutdownSignal::same_as`] tells whether
/// two signals stem from one shutdown.
#[derive(Clone, Debug)]
pub struct ShutdownSignal(Arc<SignalInner>);

impl ShutdownSignal {
    /// A connection-level signal.
    #[must_use]
    pub fn connection(reason: ShutdownReason, initiated_by_application: bool) -> Self {
        Self::new(true, initiated_by_application, reason)
    }

    /// A channel-level signal.
    #[must_use]
    pub fn channel(reason: ShutdownReason, initiated_by_application: bool) -> Self {
        Self::new(false, initiated_by_application, reason)
    }

    fn new(hard_error: bool, initiated_by_application: bool, reason: ShutdownReason) -> Self {
        Self(Arc::new(SignalInner {
            hard_error,
            initiated_by_application,
            reason,
        }))
    }

    /// Whether the whole connection shut down, rather than one channel.
    #[must_use]
    pub fn is_hard_error(&self) -> bool { self.0.hard_error }

    /// Whether the application asked for the shutdown.
    #[must_use]
    pub fn is_initiated_by_application(&self) -> bool { self.0.initiated_by_application }

    /// Why the shutdown happened.
    #[must_use]
    pub fn reason(&self) -> &ShutdownReason { &self.0.reason }

    /// Reply code carried by the reason, if any.
    #[must_use]
    pub fn reply_code(&self) -> Option<u16> { self.0.reason.reply_code() }

    /// Whether both values are clones of one signal.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool { Arc::ptr_eq(&self.0, &other.0) }

    /// The `connection.close` to send to the broker for this signal.
    pub(crate) fn connection_close(&self) -> ConnectionClose {
        let (reply_code, reply_text) = match self.reason() {
            ShutdownReason::Application {
                reply_code,
                reply_text,
            } => (*reply_code, reply_text.clone()),
            ShutdownReason::Protocol(message) => (reply_code::INTERNAL_ERROR, message.clone()),
            ShutdownReason::MissedHeartbeat => {
                (reply_code::CONNECTION_FORCED, "missed heartbeats".to_owned())
            }
            other => (reply_code::INTERNAL_ERROR, other.to_string()),
        };
        ConnectionClose {
            reply_code,
            reply_text,
            class_id: 0,
            method_id: 0,
        }
    }
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scope = if self.0.hard_error {
            "connection"
        } else {
            "channel"
        };
        write!(f, "{scope} error: {}", self.0.reason)
    }
}

impl std::error::Error for ShutdownSignal {}

/// Errors returned by connection and channel operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The byte stream failed.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),

    /// The peer sent something the protocol does not allow here.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Connection negotiation failed.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The broker refused the credentials.
    #[error("authentication failed: {0}")]
    AuthenticationFailure(String),

    /// The broker closed the stream during negotiation without saying why.
    #[error("connection closed during negotiation; the credentials may have been refused")]
    PossibleAuthenticationFailure,

    /// The broker speaks another protocol version.
    #[error("broker offered AMQP {server_major}-{server_minor}, expected 0-9")]
    VersionMismatch {
        /// Major version from `connection.start`.
        server_major: u8,
        /// Minor version from `connection.start`.
        server_minor: u8,
    },

    /// The connection or channel has shut down.
    #[error("already closed: {0}")]
    AlreadyClosed(ShutdownSignal),

    /// A synchronous request is already outstanding on the channel.
    #[error("channel {channel} is awaiting a reply; cannot send {attempted} concurrently")]
    ChannelUse {
        /// Channel number.
        channel: u16,
        /// Method that was refused.
        attempted: &'static str,
    },

    /// A value cannot be represented on the wire.
    #[error("encoding error: {0}")]
    Encoding(#[from] CodecError),

    /// A wait exceeded its limit.
    #[error("timed out waiting for {0}")]
    TimedOut(&'static str),

    /// Every channel number up to channel-max is in use.
    #[error("no channel numbers available")]
    NoChannelsAvailable,

    /// The requested channel number is already allocated or out of range.
    #[error("channel number {0} is unavailable")]
    ChannelNumberInUse(u16),

    /// `basic_cancel` named a consumer tag the channel does not know.
    #[error("unknown consumer tag {0}")]
    UnknownConsumerTag(String),

    /// `wait_for_confirms` was called before `confirm_select`.
    #[error("channel {0} is not in confirm mode")]
    NotInConfirmMode(u16),
}

impl Error {
    /// The shutdown signal behind an [`Error::AlreadyClosed`].
    #[must_use]
    pub fn shutdown_signal(&self) -> Option<&ShutdownSignal> {
        match self {
            Self::AlreadyClosed(signal) => Some(signal),
            _ => None,
        }
    }
}

impl From<ShutdownSignal> for Error {
    fn from(signal: ShutdownSignal) -> Self { Self::AlreadyClosed(signal) }
}

impl From<AssemblyError> for Error {
    fn from(error: AssemblyError) -> Self {
        match error {
            AssemblyError::Codec(error) => Self::Encoding(error),
            other => Self::Protocol(other.to_string()),
        }
    }
}

impl From<FrameError> for Error {
    fn from(error: FrameError) -> Self {
        match error {
            FrameError::Io(error) => Self::Io(error),
            other => Self::Protocol(other.to_string()),
        }
    }
}

impl From<FrameError> for ShutdownReason {
    fn from(error: FrameError) -> Self {
        match error {
            FrameError::EndOfStream => Self::EndOfStream,
            FrameError::Io(error) => Self::Io(Arc::new(error)),
            other => Self::Protocol(other.to_string()),
        }
    }
}

impl From<Error> for ShutdownReason {
    fn from(error: Error) -> Self {
        match error {
            Error::Io(error) => Self::Io(Arc::new(error)),
            Error::AlreadyClosed(signal) => signal.reason().clone(),
            other => Self::Protocol(other.to_string()),
        }
    }
}

/// Result type used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Build the `channel.close` sent when the application closes a channel.
pub(crate) fn channel_close(reply_code: u16, reply_text: &str) -> ChannelClose {
    ChannelClose {
        reply_code,
        reply_text: reply_text.to_owned(),
        class_id: 0,
        method_id: 0,
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn broker_close(code: u16) -> ConnectionClose {
        ConnectionClose {
            reply_code: code,
            reply_text: "CONNECTION_FORCED".into(),
            class_id: 0,
            method_id: 0,
        }
    }

    #[test]
    fn clones_share_identity() {
        let signal = ShutdownSignal::connection(ShutdownReason::MissedHeartbeat, false);
        let other = ShutdownSignal::connection(ShutdownReason::MissedHeartbeat, false);
        assert!(signal.same_as(&signal.clone()));
        assert!(!signal.same_as(&other));
    }

    #[rstest]
    #[case::broker(ShutdownReason::ConnectionException(broker_close(320)), Some(320))]
    #[case::application(
        ShutdownReason::Application { reply_code: 200, reply_text: "bye".into() },
        Some(200)
    )]
    #[case::heartbeat(ShutdownReason::MissedHeartbeat, None)]
    fn reply_code_follows_reason(#[case] reason: ShutdownReason, #[case] code: Option<u16>) {
        assert_eq!(ShutdownSignal::connection(reason, false).reply_code(), code);
    }

    #[test]
    fn display_names_the_scope() {
        let signal = ShutdownSignal::channel(ShutdownReason::EndOfStream, false);
        assert_eq!(signal.to_string(), "channel error: peer closed the stream");
    }

    #[test]
    fn application_signal_becomes_close_method() {
        let signal = ShutdownSignal::connection(
            ShutdownReason::Application {
                reply_code: 200,
                reply_text: "Goodbye".into(),
            },
            true,
        );
        let close = signal.connection_close();
        assert_eq!((close.reply_code, close.reply_text.as_str()), (200, "Goodbye"));
    }

    #[test]
    fn frame_errors_map_to_reasons() {
        assert!(matches!(
            ShutdownReason::from(FrameError::EndOfStream),
            ShutdownReason::EndOfStream
        ));
        assert!(matches!(
            ShutdownReason::from(FrameError::BadFrameEnd { found: 0 }),
            ShutdownReason::Protocol(_)
        ));
    }
}
