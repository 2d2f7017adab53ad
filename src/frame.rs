//! AMQP frames and their wire codec.
//!
//! Every frame on the wire is laid out as
//!
//! ```text
//! +------+---------+---------+-----------------+-----------+
//! | type | channel |  size   |     payload     | frame-end |
//! |  u8  |   u16   |   u32   |   size octets   |   0xCE    |
//! +------+---------+---------+-----------------+-----------+
//! ```
//!
//! [`AmqpFrameCodec`] converts between this layout and [`Frame`] values for
//! use with `tokio_util`'s `FramedRead` and `FramedWrite`.

use std::io;

use bytes::Bytes;
use thiserror::Error;

mod codec;

pub use codec::AmqpFrameCodec;

/// Octet terminating every frame.
pub const FRAME_END: u8 = 0xCE;

/// Bytes preceding the payload: type, channel and size.
pub const FRAME_HEADER_SIZE: usize = 7;

/// Envelope bytes around each payload, header plus frame-end octet.
pub const FRAME_OVERHEAD: usize = FRAME_HEADER_SIZE + 1;

/// Smallest frame-max a peer may negotiate.
pub const FRAME_MIN_SIZE: u32 = 4096;

/// Upper bound on buffer space reserved ahead of data a peer has only
/// announced.
pub const MAX_PREALLOCATION: usize = 128 * 1024;

/// Protocol header opening every AMQP 0-9-1 connection.
pub const PROTOCOL_HEADER: [u8; 8] = *b"AMQP\x00\x00\x09\x01";

/// Frame type octet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    /// Carries one encoded method.
    Method = 1,
    /// Carries a content header.
    Header = 2,
    /// Carries a fragment of a content body.
    Body = 3,
    /// Empty liveness frame on channel 0.
    Heartbeat = 8,
}

impl FrameType {
    /// Parse a type octet.
    #[must_use]
    pub const fn from_octet(octet: u8) -> Option<Self> {
        match octet {
            1 => Some(Self::Method),
            2 => Some(Self::Header),
            3 => Some(Self::Body),
            8 => Some(Self::Heartbeat),
            _ => None,
        }
    }
}

/// A single frame received from or destined for the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    frame_type: FrameType,
    channel: u16,
    payload: Bytes,
}

impl Frame {
    /// Build a frame.
    #[must_use]
    pub fn new(frame_type: FrameType, channel: u16, payload: Bytes) -> Self {
        Self {
            frame_type,
            channel,
            payload,
        }
    }

    /// Build a heartbeat frame.
    #[must_use]
    pub fn heartbeat() -> Self { Self::new(FrameType::Heartbeat, 0, Bytes::new()) }

    /// Frame type.
    #[must_use]
    pub const fn frame_type(&self) -> FrameType { self.frame_type }

    /// Channel the frame belongs to.
    #[must_use]
    pub const fn channel(&self) -> u16 { self.channel }

    /// Payload bytes.
    #[must_use]
    pub const fn payload(&self) -> &Bytes { &self.payload }

    /// Consume the frame, returning its payload.
    #[must_use]
    pub fn into_payload(self) -> Bytes { self.payload }

    /// Size of the frame on the wire including its envelope.
    #[must_use]
    pub fn wire_len(&self) -> usize { self.payload.len() + FRAME_OVERHEAD }
}

/// Errors raised while framing or deframing the byte stream.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The underlying stream failed.
    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),

    /// The peer closed the stream on a frame boundary.
    #[error("peer closed the stream")]
    EndOfStream,

    /// A frame was not terminated by the frame-end octet.
    #[error("bad frame end octet {found:#04x}")]
    BadFrameEnd {
        /// Octet found where `0xCE` was expected.
        found: u8,
    },

    /// A frame carried a type octet outside the known set.
    #[error("unknown frame type {frame_type}")]
    UnknownFrameType {
        /// Type octet found on the wire.
        frame_type: u8,
    },

    /// A frame exceeded the negotiated frame-max.
    #[error("frame of {size} bytes exceeds frame-max {max}")]
    Oversized {
        /// Frame size including its envelope.
        size: usize,
        /// Negotiated frame-max.
        max: usize,
    },

    /// The peer closed the stream inside a frame header.
    #[error("premature EOF during header: {bytes_received} of {FRAME_HEADER_SIZE} bytes")]
    EofMidHeader {
        /// Header bytes received before EOF.
        bytes_received: usize,
    },

    /// The peer closed the stream inside a frame payload.
    #[error("premature EOF: {bytes_received} bytes of {expected} byte payload received")]
    EofMidFrame {
        /// Payload bytes received before EOF.
        bytes_received: usize,
        /// Payload size declared by the header.
        expected: usize,
    },
}

impl FrameError {
    /// Whether the error describes malformed input rather than a transport
    /// failure.
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::BadFrameEnd { .. } | Self::UnknownFrameType { .. } | Self::Oversized { .. }
        )
    }
}
