//! Decoding of AMQP primitives from a method or header payload.

use bytes::{Buf, Bytes};

use super::{CodecError, Decimal, FieldTable, FieldValue, Timestamp};

/// Cursor over a payload that decodes AMQP primitives in order.
///
/// Consecutive `bit` arguments share octets: the first bit occupies the least
/// significant position of a fresh octet and each following bit the next one
/// up. Reading any non-bit value discards the rest of the current bit octet.
#[derive(Debug)]
pub struct ArgReader {
    buf: Bytes,
    bits: u8,
    bit_mask: u8,
}

impl ArgReader {
    /// Wrap a payload for decoding.
    #[must_use]
    pub fn new(buf: Bytes) -> Self {
        Self {
            buf,
            bits: 0,
            bit_mask: 0,
        }
    }

    /// Bytes left to decode.
    #[must_use]
    pub fn remaining(&self) -> usize { self.buf.remaining() }

    /// Fail if unread bytes remain.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::TrailingBytes`] when the payload was longer than
    /// the decoded arguments.
    pub fn finish(self) -> Result<(), CodecError> {
        match self.buf.remaining() {
            0 => Ok(()),
            extra => Err(CodecError::TrailingBytes { extra }),
        }
    }

    fn ensure(&self, needed: usize) -> Result<(), CodecError> {
        let available = self.buf.remaining();
        if available < needed {
            return Err(CodecError::Truncated { needed, available });
        }
        Ok(())
    }

    fn clear_bits(&mut self) { self.bit_mask = 0; }

    /// Read an unsigned octet.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Truncated`] on short input.
    pub fn read_octet(&mut self) -> Result<u8, CodecError> {
        self.clear_bits();
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    /// Read an unsigned 16-bit integer.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Truncated`] on short input.
    pub fn read_short(&mut self) -> Result<u16, CodecError> {
        self.clear_bits();
        self.ensure(2)?;
        Ok(self.buf.get_u16())
    }

    /// Read an unsigned 32-bit integer.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Truncated`] on short input.
    pub fn read_long(&mut self) -> Result<u32, CodecError> {
        self.clear_bits();
        self.ensure(4)?;
        Ok(self.buf.get_u32())
    }

    /// Read an unsigned 64-bit integer.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Truncated`] on short input.
    pub fn read_longlong(&mut self) -> Result<u64, CodecError> {
        self.clear_bits();
        self.ensure(8)?;
        Ok(self.buf.get_u64())
    }

    /// Read one packed bit.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Truncated`] when a new bit octet is needed but
    /// the input is exhausted.
    pub fn read_bit(&mut self) -> Result<bool, CodecError> {
        if self.bit_mask == 0 {
            self.ensure(1)?;
            self.bits = self.buf.get_u8();
            self.bit_mask = 0x01;
        }
        let value = self.bits & self.bit_mask != 0;
        self.bit_mask <<= 1;
        Ok(value)
    }

    /// Read a short string (octet length + UTF-8).
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Truncated`] or [`CodecError::InvalidUtf8`].
    pub fn read_shortstr(&mut self) -> Result<String, CodecError> {
        let len = usize::from(self.read_octet()?);
        self.ensure(len)?;
        let raw = self.buf.split_to(len);
        String::from_utf8(raw.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }

    /// Read a long string (32-bit length + opaque bytes).
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Truncated`] on short input.
    pub fn read_longstr(&mut self) -> Result<Bytes, CodecError> {
        let len = self.read_length()?;
        Ok(self.buf.split_to(len))
    }

    /// Read a timestamp (64-bit seconds).
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Truncated`] on short input.
    pub fn read_timestamp(&mut self) -> Result<Timestamp, CodecError> {
        self.read_longlong().map(|secs| Timestamp(secs.cast_signed()))
    }

    /// Read a field table.
    ///
    /// # Errors
    ///
    /// Fails on truncated input, unknown tags or malformed nested values.
    pub fn read_table(&mut self) -> Result<FieldTable, CodecError> {
        let len = self.read_length()?;
        let mut nested = Self::new(self.buf.split_to(len));
        let mut table = FieldTable::new();
        while nested.remaining() > 0 {
            let key = nested.read_shortstr()?;
            let value = nested.read_field_value()?;
            table.insert(key, value);
        }
        Ok(table)
    }

    fn read_array(&mut self) -> Result<Vec<FieldValue>, CodecError> {
        let len = self.read_length()?;
        let mut nested = Self::new(self.buf.split_to(len));
        let mut values = Vec::new();
        while nested.remaining() > 0 {
            values.push(nested.read_field_value()?);
        }
        Ok(values)
    }

    fn read_length(&mut self) -> Result<usize, CodecError> {
        let declared = self.read_long()? as usize;
        let available = self.buf.remaining();
        if declared > available {
            return Err(CodecError::NestedLengthOverflow {
                declared,
                available,
            });
        }
        Ok(declared)
    }

    /// Read a tagged field value.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnknownFieldTag`] for tags outside the supported
    /// set, or a decoding error for the value itself.
    pub fn read_field_value(&mut self) -> Result<FieldValue, CodecError> {
        let tag = self.read_octet()?;
        let value = match tag {
            b't' => FieldValue::Bool(self.read_octet()? != 0),
            b'b' => FieldValue::I8(i8::from_be_bytes([self.read_octet()?])),
            b's' => FieldValue::I16(self.read_short()?.cast_signed()),
            b'I' => FieldValue::I32(self.read_long()?.cast_signed()),
            b'l' => FieldValue::I64(self.read_longlong()?.cast_signed()),
            b'f' => FieldValue::F32(f32::from_bits(self.read_long()?)),
            b'd' => FieldValue::F64(f64::from_bits(self.read_longlong()?)),
            b'D' => {
                let scale = self.read_octet()?;
                let unscaled = self.read_long()?.cast_signed();
                FieldValue::Decimal(Decimal::new(scale, i64::from(unscaled)))
            }
            b'S' => FieldValue::LongString(self.read_longstr()?),
            b'T' => FieldValue::Timestamp(self.read_timestamp()?),
            b'F' => FieldValue::Table(self.read_table()?),
            b'A' => FieldValue::Array(self.read_array()?),
            b'x' => FieldValue::Bytes(self.read_longstr()?),
            b'V' => FieldValue::Void,
            other => return Err(CodecError::UnknownFieldTag { tag: other }),
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn bits_pack_from_least_significant() {
        let mut reader = ArgReader::new(Bytes::from_static(&[0b0000_0101, 0x00, 0x07]));
        assert!(reader.read_bit().expect("bit 0"));
        assert!(!reader.read_bit().expect("bit 1"));
        assert!(reader.read_bit().expect("bit 2"));
        assert_eq!(reader.read_short().expect("short after bits"), 7);
        reader.finish().expect("payload consumed");
    }

    #[rstest]
    #[case::short(&[0x00], 2)]
    #[case::long(&[0x00, 0x00, 0x01], 4)]
    fn reports_truncation(#[case] input: &'static [u8], #[case] needed: usize) {
        let mut reader = ArgReader::new(Bytes::from_static(input));
        let err = match needed {
            2 => reader.read_short().map(u32::from),
            _ => reader.read_long(),
        }
        .expect_err("truncated input");
        assert_eq!(
            err,
            CodecError::Truncated {
                needed,
                available: input.len()
            }
        );
    }

    #[test]
    fn rejects_unknown_tag() {
        // table of 6 bytes: key "k", tag 'Z', one payload byte
        let raw = [0, 0, 0, 4, 1, b'k', b'Z', 0];
        let mut reader = ArgReader::new(Bytes::copy_from_slice(&raw));
        assert_eq!(
            reader.read_table().expect_err("unknown tag"),
            CodecError::UnknownFieldTag { tag: b'Z' }
        );
    }

    #[test]
    fn nested_length_cannot_exceed_input() {
        let mut reader = ArgReader::new(Bytes::from_static(&[0, 0, 0, 9, 1, 2]));
        assert!(matches!(
            reader.read_longstr(),
            Err(CodecError::NestedLengthOverflow {
                declared: 9,
                available: 2
            })
        ));
    }
}
