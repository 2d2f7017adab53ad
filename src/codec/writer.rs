//! Encoding of AMQP primitives into a method or header payload.

use bytes::{BufMut, Bytes, BytesMut};

use super::{CodecError, FieldTable, FieldValue, Timestamp};

/// Accumulates encoded arguments into a payload buffer.
///
/// Bits are packed into a pending octet which is flushed by the next non-bit
/// write, when eight bits have been gathered, or by [`finish`](Self::finish).
#[derive(Debug, Default)]
pub struct ArgWriter {
    buf: BytesMut,
    bits: u8,
    bit_count: u8,
}

impl ArgWriter {
    /// Create an empty writer.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    fn flush_bits(&mut self) {
        if self.bit_count > 0 {
            self.buf.put_u8(self.bits);
            self.bits = 0;
            self.bit_count = 0;
        }
    }

    /// Flush pending bits and return the encoded payload.
    #[must_use]
    pub fn finish(mut self) -> Bytes {
        self.flush_bits();
        self.buf.freeze()
    }

    /// Write an unsigned octet.
    pub fn write_octet(&mut self, value: u8) {
        self.flush_bits();
        self.buf.put_u8(value);
    }

    /// Write an unsigned 16-bit integer.
    pub fn write_short(&mut self, value: u16) {
        self.flush_bits();
        self.buf.put_u16(value);
    }

    /// Write an unsigned 32-bit integer.
    pub fn write_long(&mut self, value: u32) {
        self.flush_bits();
        self.buf.put_u32(value);
    }

    /// Write an unsigned 64-bit integer.
    pub fn write_longlong(&mut self, value: u64) {
        self.flush_bits();
        self.buf.put_u64(value);
    }

    /// Append one packed bit.
    pub fn write_bit(&mut self, value: bool) {
        if self.bit_count == 8 {
            self.flush_bits();
        }
        if value {
            self.bits |= 1 << self.bit_count;
        }
        self.bit_count += 1;
    }

    /// Write a short string.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::ShortStringTooLong`] beyond 255 bytes.
    pub fn write_shortstr(&mut self, value: &str) -> Result<(), CodecError> {
        let len = u8::try_from(value.len())
            .map_err(|_| CodecError::ShortStringTooLong { len: value.len() })?;
        self.write_octet(len);
        self.buf.put_slice(value.as_bytes());
        Ok(())
    }

    /// Write a long string.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::LongValueTooLong`] if the length exceeds 32 bits.
    pub fn write_longstr(&mut self, value: &[u8]) -> Result<(), CodecError> {
        self.write_long(long_len(value.len())?);
        self.buf.put_slice(value);
        Ok(())
    }

    /// Write a timestamp as 64-bit seconds.
    pub fn write_timestamp(&mut self, value: Timestamp) { self.write_longlong(value.as_secs().cast_unsigned()); }

    /// Write a field table with its byte-length prefix.
    ///
    /// # Errors
    ///
    /// Fails if any key or value cannot be represented on the wire.
    pub fn write_table(&mut self, table: &FieldTable) -> Result<(), CodecError> {
        let mut nested = Self::new();
        for (key, value) in table.iter() {
            nested.write_shortstr(key)?;
            nested.write_field_value(value)?;
        }
        let body = nested.finish();
        self.write_longstr(&body)
    }

    /// Write a field table without its length prefix.
    ///
    /// Used by the `AMQPLAIN` SASL response, which carries the table entries
    /// directly inside a long string.
    ///
    /// # Errors
    ///
    /// Fails if any key or value cannot be represented on the wire.
    pub fn write_table_entries(&mut self, table: &FieldTable) -> Result<(), CodecError> {
        for (key, value) in table.iter() {
            self.write_shortstr(key)?;
            self.write_field_value(value)?;
        }
        Ok(())
    }

    fn write_array(&mut self, values: &[FieldValue]) -> Result<(), CodecError> {
        let mut nested = Self::new();
        for value in values {
            nested.write_field_value(value)?;
        }
        let body = nested.finish();
        self.write_longstr(&body)
    }

    /// Write a tagged field value.
    ///
    /// # Errors
    ///
    /// Fails for decimals outside the 32-bit range and oversized strings.
    pub fn write_field_value(&mut self, value: &FieldValue) -> Result<(), CodecError> {
        self.write_octet(value.tag());
        match value {
            FieldValue::Bool(v) => self.write_octet(u8::from(*v)),
            FieldValue::I8(v) => self.buf.put_i8(*v),
            FieldValue::I16(v) => self.buf.put_i16(*v),
            FieldValue::I32(v) => self.buf.put_i32(*v),
            FieldValue::I64(v) => self.buf.put_i64(*v),
            FieldValue::F32(v) => self.buf.put_f32(*v),
            FieldValue::F64(v) => self.buf.put_f64(*v),
            FieldValue::Decimal(d) => {
                let unscaled = d.wire_unscaled()?;
                self.buf.put_u8(d.scale());
                self.buf.put_i32(unscaled);
            }
            FieldValue::LongString(bytes) | FieldValue::Bytes(bytes) => {
                self.write_longstr(bytes)?;
            }
            FieldValue::Timestamp(ts) => self.write_timestamp(*ts),
            FieldValue::Table(table) => self.write_table(table)?,
            FieldValue::Array(values) => self.write_array(values)?,
            FieldValue::Void => {}
        }
        Ok(())
    }

    /// Append raw bytes without a length prefix.
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.flush_bits();
        self.buf.put_slice(bytes);
    }
}

fn long_len(len: usize) -> Result<u32, CodecError> {
    u32::try_from(len).map_err(|_| CodecError::LongValueTooLong { len })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::codec::Decimal;

    #[rstest]
    #[case(&[true], &[0x01])]
    #[case(&[false, true, true], &[0x06])]
    #[case(&[true; 9], &[0xFF, 0x01])]
    fn packs_bits_least_significant_first(#[case] bits: &[bool], #[case] expected: &[u8]) {
        let mut writer = ArgWriter::new();
        for bit in bits {
            writer.write_bit(*bit);
        }
        assert_eq!(writer.finish().as_ref(), expected);
    }

    #[test]
    fn non_bit_write_flushes_pending_bits() {
        let mut writer = ArgWriter::new();
        writer.write_bit(true);
        writer.write_short(0x0102);
        writer.write_bit(true);
        assert_eq!(writer.finish().as_ref(), &[0x01, 0x01, 0x02, 0x01]);
    }

    #[test]
    fn rejects_long_short_string() {
        let mut writer = ArgWriter::new();
        let long = "x".repeat(256);
        assert_eq!(
            writer.write_shortstr(&long),
            Err(CodecError::ShortStringTooLong { len: 256 })
        );
    }

    #[test]
    fn rejects_wide_decimal() {
        let mut writer = ArgWriter::new();
        let value = FieldValue::Decimal(Decimal::new(0, i64::from(i32::MAX) + 1));
        assert!(matches!(
            writer.write_field_value(&value),
            Err(CodecError::DecimalOutOfRange { .. })
        ));
    }

    #[test]
    fn timestamp_is_written_in_seconds() {
        let mut writer = ArgWriter::new();
        writer.write_timestamp(Timestamp(1_700_000_000));
        assert_eq!(writer.finish().as_ref(), &1_700_000_000u64.to_be_bytes());
    }

    #[test]
    fn pre_epoch_timestamp_is_twos_complement() {
        let mut writer = ArgWriter::new();
        writer.write_timestamp(Timestamp(-1));
        assert_eq!(writer.finish().as_ref(), &[0xFF; 8]);
    }

    #[test]
    fn table_layout_matches_wire_format() {
        let mut writer = ArgWriter::new();
        writer
            .write_table(&FieldTable::new().with("a", true))
            .expect("encode table");
        assert_eq!(
            writer.finish().as_ref(),
            &[0, 0, 0, 4, 1, b'a', b't', 1]
        );
    }
}
