//! Commands: a method with its optional content.
//!
//! A [`Command`] is the unit of dispatch above the frame layer. Inbound
//! frames are folded into commands by a per-channel [`CommandAssembler`];
//! outbound commands are split into frames by [`Command::to_frames`].

use bytes::Bytes;
use thiserror::Error;

use crate::{
    codec::CodecError,
    frame::{FRAME_OVERHEAD, Frame, FrameType},
    protocol::{BasicProperties, ContentHeader, Method},
};

mod assembler;

pub use assembler::CommandAssembler;

/// Errors raised while assembling or splitting commands.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AssemblyError {
    /// A frame arrived that the current assembly state does not accept.
    #[error("unexpected {found:?} frame while expecting {expected}")]
    UnexpectedFrame {
        /// What the assembler was waiting for.
        expected: &'static str,
        /// Type of the offending frame.
        found: FrameType,
    },

    /// Body frames carried more bytes than the header announced.
    #[error("body frame of {received} bytes exceeds the {remaining} bytes outstanding")]
    BodyOverrun {
        /// Bytes still expected.
        remaining: u64,
        /// Bytes carried by the frame.
        received: usize,
    },

    /// A method or header payload failed to decode.
    #[error("malformed command: {0}")]
    Codec(#[from] CodecError),

    /// The negotiated frame-max cannot carry the command's method or header.
    #[error("frame-max {frame_max} cannot carry a {required} byte frame")]
    FrameTooLarge {
        /// Negotiated frame-max.
        frame_max: u32,
        /// Size of the frame that did not fit.
        required: usize,
    },
}

/// A method together with its content, if it carries any.
#[derive(Clone, Debug, PartialEq)]
pub struct Command {
    method: Method,
    content: Option<(ContentHeader, Bytes)>,
}

impl Command {
    /// A command without content.
    #[must_use]
    pub fn new(method: impl Into<Method>) -> Self {
        Self {
            method: method.into(),
            content: None,
        }
    }

    /// A content-bearing command.
    #[must_use]
    pub fn with_content(method: impl Into<Method>, properties: BasicProperties, body: Bytes) -> Self {
        let header = ContentHeader::basic(body.len() as u64, properties);
        Self::from_parts(method.into(), Some((header, body)))
    }

    pub(crate) fn from_parts(method: Method, content: Option<(ContentHeader, Bytes)>) -> Self {
        Self { method, content }
    }

    /// The command's method.
    #[must_use]
    pub fn method(&self) -> &Method { &self.method }

    /// The content header, if any.
    #[must_use]
    pub fn header(&self) -> Option<&ContentHeader> { self.content.as_ref().map(|(h, _)| h) }

    /// The content body; empty for commands without content.
    #[must_use]
    pub fn body(&self) -> Bytes {
        self.content
            .as_ref()
            .map_or_else(Bytes::new, |(_, body)| body.clone())
    }

    /// Split into method and content.
    #[must_use]
    pub fn into_parts(self) -> (Method, Option<(ContentHeader, Bytes)>) {
        (self.method, self.content)
    }

    /// Split into the frames that carry this command on `channel`.
    ///
    /// One method frame is followed, for content-bearing commands, by one
    /// header frame and as many body frames as the body needs, each no larger
    /// than `frame_max`. A `frame_max` of zero places the whole body in one
    /// frame.
    ///
    /// # Errors
    ///
    /// Returns [`AssemblyError::FrameTooLarge`] when the method or header
    /// frame alone exceeds `frame_max`, and [`AssemblyError::Codec`] when an
    /// argument cannot be encoded.
    pub fn to_frames(&self, channel: u16, frame_max: u32) -> Result<Vec<Frame>, AssemblyError> {
        let limit = frame_max as usize;
        let fits = |payload_len: usize| limit == 0 || payload_len + FRAME_OVERHEAD <= limit;
        let too_large = |payload_len: usize| AssemblyError::FrameTooLarge {
            frame_max,
            required: payload_len + FRAME_OVERHEAD,
        };

        let method = self.method.encode()?;
        if !fits(method.len()) {
            return Err(too_large(method.len()));
        }
        let mut frames = vec![Frame::new(FrameType::Method, channel, method)];

        let Some((header, body)) = &self.content else {
            return Ok(frames);
        };
        let header = header.encode()?;
        if !fits(header.len()) || (limit != 0 && limit <= FRAME_OVERHEAD && !body.is_empty()) {
            return Err(too_large(header.len()));
        }
        frames.push(Frame::new(FrameType::Header, channel, header));

        let chunk = if limit == 0 {
            body.len().max(1)
        } else {
            limit - FRAME_OVERHEAD
        };
        let mut offset = 0;
        while offset < body.len() {
            let end = (offset + chunk).min(body.len());
            frames.push(Frame::new(FrameType::Body, channel, body.slice(offset..end)));
            offset = end;
        }
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::protocol::method::{BasicPublish, QueueDeclare};

    fn publish(body: &'static [u8]) -> Command {
        Command::with_content(
            BasicPublish::default(),
            BasicProperties::default(),
            Bytes::from_static(body),
        )
    }

    #[test]
    fn method_only_command_is_one_frame() {
        let frames = Command::new(QueueDeclare::default())
            .to_frames(1, 4096)
            .expect("split");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].frame_type(), FrameType::Method);
    }

    #[test]
    fn empty_body_yields_header_only() {
        let frames = publish(b"").to_frames(1, 4096).expect("split");
        let types: Vec<_> = frames.iter().map(Frame::frame_type).collect();
        assert_eq!(types, vec![FrameType::Method, FrameType::Header]);
    }

    #[rstest]
    #[case(4096, 1)]
    #[case(58, 2)]
    #[case(32, 5)]
    #[case(0, 1)]
    fn body_is_split_by_frame_max(#[case] frame_max: u32, #[case] body_frames: usize) {
        let frames = publish(&[7; 100]).to_frames(1, frame_max).expect("split");
        let bodies: Vec<_> = frames
            .iter()
            .filter(|f| f.frame_type() == FrameType::Body)
            .collect();
        assert_eq!(bodies.len(), body_frames);
        assert_eq!(bodies.iter().map(|f| f.payload().len()).sum::<usize>(), 100);
        assert!(
            frames
                .iter()
                .all(|f| frame_max == 0 || f.wire_len() <= frame_max as usize)
        );
    }

    #[test]
    fn tiny_frame_max_is_rejected() {
        let err = publish(b"hello").to_frames(1, 12).expect_err("too small");
        assert!(matches!(err, AssemblyError::FrameTooLarge { frame_max: 12, .. }));
    }
}
