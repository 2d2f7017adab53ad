//! `tokio_util` codec for AMQP frames.

use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::{
    FRAME_END,
    FRAME_HEADER_SIZE,
    FRAME_OVERHEAD,
    Frame,
    FrameError,
    FrameType,
    MAX_PREALLOCATION,
};

/// Encoder and decoder for [`Frame`] values.
///
/// Clones share one frame-max limit so the reader and writer halves of a
/// connection both observe the value negotiated during tuning. A limit of
/// zero accepts frames of any size.
#[derive(Clone, Debug, Default)]
pub struct AmqpFrameCodec {
    frame_max: Arc<AtomicU32>,
}

impl AmqpFrameCodec {
    /// Create a codec with the given frame-max.
    #[must_use]
    pub fn new(frame_max: u32) -> Self {
        Self {
            frame_max: Arc::new(AtomicU32::new(frame_max)),
        }
    }

    /// Current frame-max, zero meaning unlimited.
    #[must_use]
    pub fn frame_max(&self) -> u32 { self.frame_max.load(Ordering::Acquire) }

    /// Update the frame-max seen by every clone of this codec.
    pub fn set_frame_max(&self, frame_max: u32) {
        self.frame_max.store(frame_max, Ordering::Release);
    }

    fn check_size(&self, size: usize) -> Result<(), FrameError> {
        let max = self.frame_max() as usize;
        if max != 0 && size > max {
            return Err(FrameError::Oversized { size, max });
        }
        Ok(())
    }
}

impl Decoder for AmqpFrameCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(header) = src.get(..FRAME_HEADER_SIZE) else {
            return Ok(None);
        };
        let type_octet = header[0];
        let channel = u16::from_be_bytes([header[1], header[2]]);
        let size = u32::from_be_bytes([header[3], header[4], header[5], header[6]]) as usize;

        let frame_type = FrameType::from_octet(type_octet).ok_or(FrameError::UnknownFrameType {
            frame_type: type_octet,
        })?;
        self.check_size(size + FRAME_OVERHEAD)?;

        let total = size + FRAME_OVERHEAD;
        if src.len() < total {
            src.reserve((total - src.len()).min(MAX_PREALLOCATION));
            return Ok(None);
        }

        src.advance(FRAME_HEADER_SIZE);
        let payload = src.split_to(size).freeze();
        let end = src.get_u8();
        if end != FRAME_END {
            return Err(FrameError::BadFrameEnd { found: end });
        }
        Ok(Some(Frame::new(frame_type, channel, payload)))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None => Err(build_eof_error(src)),
        }
    }
}

/// Describe where in a frame the stream ended.
fn build_eof_error(src: &BytesMut) -> FrameError {
    let expected = src
        .get(3..FRAME_HEADER_SIZE)
        .and_then(|slice| <[u8; 4]>::try_from(slice).ok())
        .map(|bytes| u32::from_be_bytes(bytes) as usize);

    match expected {
        Some(expected) => FrameError::EofMidFrame {
            bytes_received: src.len().saturating_sub(FRAME_HEADER_SIZE),
            expected,
        },
        None => FrameError::EofMidHeader {
            bytes_received: src.len(),
        },
    }
}

impl Encoder<Frame> for AmqpFrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let wire_len = item.wire_len();
        self.check_size(wire_len)?;
        let size = u32::try_from(item.payload().len()).map_err(|_| FrameError::Oversized {
            size: wire_len,
            max: u32::MAX as usize,
        })?;
        dst.reserve(wire_len);
        dst.put_u8(item.frame_type() as u8);
        dst.put_u16(item.channel());
        dst.put_u32(size);
        dst.put_slice(item.payload());
        dst.put_u8(FRAME_END);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn codec() -> AmqpFrameCodec { AmqpFrameCodec::new(4096) }

    #[rstest]
    fn heartbeat_has_canonical_encoding(mut codec: AmqpFrameCodec) {
        let mut buf = BytesMut::new();
        codec.encode(Frame::heartbeat(), &mut buf).expect("encode");
        assert_eq!(buf.as_ref(), &[8, 0, 0, 0, 0, 0, 0, FRAME_END]);
    }

    #[rstest]
    fn decodes_across_partial_reads(mut codec: AmqpFrameCodec) {
        let frame = Frame::new(FrameType::Body, 3, Bytes::from_static(b"hello"));
        let mut wire = BytesMut::new();
        codec.encode(frame.clone(), &mut wire).expect("encode");

        let mut src = BytesMut::new();
        for chunk in wire.chunks(3) {
            assert!(src.len() < wire.len());
            if let Some(decoded) = codec.decode(&mut src).expect("partial decode") {
                panic!("decoded early: {decoded:?}");
            }
            src.extend_from_slice(chunk);
        }
        assert_eq!(codec.decode(&mut src).expect("decode"), Some(frame));
        assert!(src.is_empty());
    }

    #[rstest]
    fn rejects_bad_frame_end(mut codec: AmqpFrameCodec) {
        let mut src = BytesMut::from(&[1, 0, 1, 0, 0, 0, 1, 0xAA, 0x00][..]);
        assert!(matches!(
            codec.decode(&mut src),
            Err(FrameError::BadFrameEnd { found: 0x00 })
        ));
    }

    #[rstest]
    fn rejects_unknown_frame_type(mut codec: AmqpFrameCodec) {
        let mut src = BytesMut::from(&[9, 0, 0, 0, 0, 0, 0, FRAME_END][..]);
        assert!(matches!(
            codec.decode(&mut src),
            Err(FrameError::UnknownFrameType { frame_type: 9 })
        ));
    }

    #[rstest]
    fn oversized_frames_fail_both_ways(mut codec: AmqpFrameCodec) {
        let payload = Bytes::from(vec![0u8; 4096]);
        let mut buf = BytesMut::new();
        let err = codec
            .encode(Frame::new(FrameType::Body, 1, payload), &mut buf)
            .expect_err("oversized encode");
        assert!(matches!(err, FrameError::Oversized { size: 4104, max: 4096 }));

        let mut src = BytesMut::from(&[3, 0, 1, 0, 0, 0x10, 0x00][..]);
        assert!(matches!(
            codec.decode(&mut src),
            Err(FrameError::Oversized { .. })
        ));
    }

    #[test]
    fn announced_size_does_not_drive_reservation() {
        let mut codec = AmqpFrameCodec::new(0);
        let mut src = BytesMut::from(&[3, 0, 1, 0xFF, 0xFF, 0xFF, 0xFF][..]);
        assert!(codec.decode(&mut src).expect("partial frame").is_none());
        assert!(src.capacity() <= FRAME_HEADER_SIZE + MAX_PREALLOCATION + 64);
    }

    #[test]
    fn clones_share_frame_max() {
        let codec = AmqpFrameCodec::new(0);
        let reader = codec.clone();
        codec.set_frame_max(131_072);
        assert_eq!(reader.frame_max(), 131_072);
    }

    #[rstest]
    #[case::header(&[1, 0, 1][..], "header")]
    #[case::payload(&[1, 0, 1, 0, 0, 0, 4, 0xAA][..], "payload")]
    fn eof_inside_frame_is_reported(
        mut codec: AmqpFrameCodec,
        #[case] input: &[u8],
        #[case] region: &str,
    ) {
        let mut src = BytesMut::from(input);
        let err = codec.decode_eof(&mut src).expect_err("premature EOF");
        match region {
            "header" => assert!(matches!(err, FrameError::EofMidHeader { bytes_received: 3 })),
            _ => assert!(matches!(
                err,
                FrameError::EofMidFrame {
                    bytes_received: 1,
                    expected: 4
                }
            )),
        }
    }

    #[rstest]
    fn clean_eof_yields_none(mut codec: AmqpFrameCodec) {
        assert!(codec.decode_eof(&mut BytesMut::new()).expect("clean EOF").is_none());
    }
}
