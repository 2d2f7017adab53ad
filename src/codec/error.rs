//! Error types for the wire codec.
//!
//! Decoding failures describe malformed or truncated input; encoding failures
//! describe values that AMQP cannot represent on the wire.

use thiserror::Error;

/// Errors raised while reading or writing AMQP primitive values.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The input ended before the value was complete.
    #[error("truncated input: needed {needed} more bytes, {available} available")]
    Truncated {
        /// Bytes required to finish decoding the value.
        needed: usize,
        /// Bytes left in the input.
        available: usize,
    },

    /// A field-table or array entry carried a tag outside the known set.
    #[error("unknown field value tag {tag:#04x}")]
    UnknownFieldTag {
        /// Tag octet found on the wire.
        tag: u8,
    },

    /// A short string or table key was not valid UTF-8.
    #[error("short string is not valid UTF-8")]
    InvalidUtf8,

    /// A short string exceeded 255 bytes.
    #[error("short string of {len} bytes exceeds 255")]
    ShortStringTooLong {
        /// Length of the rejected string in bytes.
        len: usize,
    },

    /// A long string, table or array exceeded the 32-bit length prefix.
    #[error("value of {len} bytes exceeds the 32-bit length prefix")]
    LongValueTooLong {
        /// Length of the rejected value in bytes.
        len: usize,
    },

    /// A decimal's unscaled value does not fit in 32 bits.
    #[error("decimal unscaled value {unscaled} does not fit in 32 bits")]
    DecimalOutOfRange {
        /// Unscaled value that was rejected.
        unscaled: i64,
    },

    /// A nested table or array declared more bytes than the enclosing value.
    #[error("nested length {declared} exceeds the {available} bytes remaining")]
    NestedLengthOverflow {
        /// Length declared by the nested value's prefix.
        declared: usize,
        /// Bytes available for it.
        available: usize,
    },

    /// A method, header or frame payload carried trailing bytes.
    #[error("{extra} unexpected trailing bytes")]
    TrailingBytes {
        /// Number of bytes left unconsumed.
        extra: usize,
    },

    /// The (class, method) pair is not part of AMQP 0-9-1.
    #[error("unknown method {class_id}.{method_id}")]
    UnknownMethod {
        /// Class identifier from the method frame.
        class_id: u16,
        /// Method identifier from the method frame.
        method_id: u16,
    },

    /// A content header named a class without content properties.
    #[error("class {class_id} does not carry content")]
    UnknownContentClass {
        /// Class identifier from the header frame.
        class_id: u16,
    },
}
