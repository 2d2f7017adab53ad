//! Reassembly of inbound frames into commands.

use bytes::{Bytes, BytesMut};

use super::{AssemblyError, Command};
use crate::{
    frame::{Frame, FrameType, MAX_PREALLOCATION},
    protocol::{ContentHeader, Method},
};

#[derive(Debug, Default)]
enum State {
    #[default]
    ExpectMethod,
    ExpectHeader(Method),
    ExpectBody {
        method: Method,
        header: ContentHeader,
        body: BytesMut,
        remaining: u64,
    },
}

/// Per-channel state machine folding `method [header body*]` frame
/// sequences into [`Command`]s.
///
/// After an error the assembler returns to waiting for a method frame; the
/// caller is expected to treat the error as fatal to the connection.
#[derive(Debug, Default)]
pub struct CommandAssembler {
    state: State,
}

impl CommandAssembler {
    /// Create an assembler waiting for a method frame.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Whether a partially assembled command is pending.
    #[must_use]
    pub fn is_idle(&self) -> bool { matches!(self.state, State::ExpectMethod) }

    /// Feed one frame, returning a command once it is complete.
    ///
    /// # Errors
    ///
    /// Fails when the frame type is not acceptable in the current state, when
    /// body frames overrun the announced size, or when a payload is malformed.
    pub fn handle_frame(&mut self, frame: Frame) -> Result<Option<Command>, AssemblyError> {
        let state = std::mem::take(&mut self.state);
        let frame_type = frame.frame_type();
        match (state, frame_type) {
            (State::ExpectMethod, FrameType::Method) => {
                let method = Method::decode(frame.into_payload())?;
                if method.has_content() {
                    self.state = State::ExpectHeader(method);
                    Ok(None)
                } else {
                    Ok(Some(Command::new(method)))
                }
            }
            (State::ExpectHeader(method), FrameType::Header) => {
                let header = ContentHeader::decode(frame.into_payload())?;
                if header.body_size == 0 {
                    return Ok(Some(Command::from_parts(method, Some((header, Bytes::new())))));
                }
                let remaining = header.body_size;
                let reserve = usize::try_from(remaining)
                    .map_or(MAX_PREALLOCATION, |size| size.min(MAX_PREALLOCATION));
                self.state = State::ExpectBody {
                    method,
                    header,
                    body: BytesMut::with_capacity(reserve),
                    remaining,
                };
                Ok(None)
            }
            (
                State::ExpectBody {
                    method,
                    header,
                    mut body,
                    remaining,
                },
                FrameType::Body,
            ) => {
                let payload = frame.into_payload();
                let received = payload.len();
                if received as u64 > remaining {
                    return Err(AssemblyError::BodyOverrun {
                        remaining,
                        received,
                    });
                }
                body.extend_from_slice(&payload);
                let remaining = remaining - received as u64;
                if remaining == 0 {
                    return Ok(Some(Command::from_parts(
                        method,
                        Some((header, body.freeze())),
                    )));
                }
                self.state = State::ExpectBody {
                    method,
                    header,
                    body,
                    remaining,
                };
                Ok(None)
            }
            (state, found) => Err(AssemblyError::UnexpectedFrame {
                expected: state.expecting(),
                found,
            }),
        }
    }
}

impl State {
    fn expecting(&self) -> &'static str {
        match self {
            Self::ExpectMethod => "method",
            Self::ExpectHeader(_) => "content header",
            Self::ExpectBody { .. } => "content body",
        }
    }
}
