//! Typed AMQP field values and field tables.

use std::{
    collections::BTreeMap,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use bytes::Bytes;

use super::CodecError;

/// Fixed-point decimal as carried by the `D` field tag.
///
/// The value is `unscaled / 10^scale`. Only unscaled values that fit in a
/// signed 32-bit integer can be written; wider values are kept so callers can
/// build them freely, and rejected when encoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Decimal {
    scale: u8,
    unscaled: i64,
}

impl Decimal {
    /// Build a decimal from its scale and unscaled value.
    ///
    /// ```
    /// use amqpframe::codec::Decimal;
    ///
    /// let price = Decimal::new(2, 1999);
    /// assert_eq!(price.scale(), 2);
    /// assert_eq!(price.unscaled(), 1999);
    /// ```
    #[must_use]
    pub const fn new(scale: u8, unscaled: i64) -> Self { Self { scale, unscaled } }

    /// Number of decimal places.
    #[must_use]
    pub const fn scale(&self) -> u8 { self.scale }

    /// Unscaled integer value.
    #[must_use]
    pub const fn unscaled(&self) -> i64 { self.unscaled }

    /// Return the unscaled value as the 32-bit integer written on the wire.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::DecimalOutOfRange`] if the value does not fit.
    pub fn wire_unscaled(&self) -> Result<i32, CodecError> {
        i32::try_from(self.unscaled).map_err(|_| CodecError::DecimalOutOfRange {
            unscaled: self.unscaled,
        })
    }
}

/// AMQP timestamp: whole seconds since the POSIX epoch, negative before it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Capture the current wall-clock time, truncated to seconds.
    #[must_use]
    pub fn now() -> Self { Self::from(SystemTime::now()) }

    /// Seconds since the epoch.
    #[must_use]
    pub const fn as_secs(self) -> i64 { self.0 }

    /// The instant this timestamp names, if the platform clock can hold it.
    #[must_use]
    pub fn to_system_time(self) -> Option<SystemTime> {
        let offset = Duration::from_secs(self.0.unsigned_abs());
        if self.0 >= 0 {
            UNIX_EPOCH.checked_add(offset)
        } else {
            UNIX_EPOCH.checked_sub(offset)
        }
    }
}

/// Instants are rounded down to whole seconds; values beyond the `i64`
/// range saturate.
impl From<SystemTime> for Timestamp {
    fn from(value: SystemTime) -> Self {
        match value.duration_since(UNIX_EPOCH) {
            Ok(after) => Self(i64::try_from(after.as_secs()).unwrap_or(i64::MAX)),
            Err(before) => {
                let before = before.duration();
                let secs = before.as_secs() + u64::from(before.subsec_nanos() > 0);
                Self(i64::try_from(secs).map_or(i64::MIN, i64::wrapping_neg))
            }
        }
    }
}

/// A single typed value stored in a field table or array.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    /// `t`: boolean octet.
    Bool(bool),
    /// `b`: signed 8-bit integer.
    I8(i8),
    /// `s`: signed 16-bit integer.
    I16(i16),
    /// `I`: signed 32-bit integer.
    I32(i32),
    /// `l`: signed 64-bit integer.
    I64(i64),
    /// `f`: IEEE-754 single precision.
    F32(f32),
    /// `d`: IEEE-754 double precision.
    F64(f64),
    /// `D`: scale octet followed by a signed 32-bit unscaled value.
    Decimal(Decimal),
    /// `S`: length-prefixed opaque bytes, usually UTF-8 text.
    LongString(Bytes),
    /// `T`: seconds since the epoch.
    Timestamp(Timestamp),
    /// `F`: nested table.
    Table(FieldTable),
    /// `A`: array of values.
    Array(Vec<FieldValue>),
    /// `x`: raw byte array.
    Bytes(Bytes),
    /// `V`: no value.
    Void,
}

impl FieldValue {
    /// Tag octet used for this value on the wire.
    #[must_use]
    pub const fn tag(&self) -> u8 {
        match self {
            Self::Bool(_) => b't',
            Self::I8(_) => b'b',
            Self::I16(_) => b's',
            Self::I32(_) => b'I',
            Self::I64(_) => b'l',
            Self::F32(_) => b'f',
            Self::F64(_) => b'd',
            Self::Decimal(_) => b'D',
            Self::LongString(_) => b'S',
            Self::Timestamp(_) => b'T',
            Self::Table(_) => b'F',
            Self::Array(_) => b'A',
            Self::Bytes(_) => b'x',
            Self::Void => b'V',
        }
    }

    /// View a long string value as UTF-8 text.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::LongString(bytes) => std::str::from_utf8(bytes).ok(),
            _ => None,
        }
    }

    /// View a boolean value.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// View a nested table.
    #[must_use]
    pub const fn as_table(&self) -> Option<&FieldTable> {
        match self {
            Self::Table(table) => Some(table),
            _ => None,
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self { Self::Bool(value) }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self { Self::I32(value) }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self { Self::I64(value) }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self { Self::LongString(Bytes::copy_from_slice(value.as_bytes())) }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self { Self::LongString(Bytes::from(value)) }
}

impl From<FieldTable> for FieldValue {
    fn from(value: FieldTable) -> Self { Self::Table(value) }
}

impl From<Timestamp> for FieldValue {
    fn from(value: Timestamp) -> Self { Self::Timestamp(value) }
}

/// AMQP field table: short-string keys mapped to typed values.
///
/// Keys are kept sorted so encoding is deterministic.
///
/// ```
/// use amqpframe::codec::{FieldTable, FieldValue};
///
/// let mut args = FieldTable::new();
/// args.insert("x-max-priority", 10);
/// assert_eq!(args.get("x-max-priority"), Some(&FieldValue::I32(10)));
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldTable(BTreeMap<String, FieldValue>);

impl FieldTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Insert a value, replacing any previous value under `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Builder-style variant of [`insert`](Self::insert).
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Look up a value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&FieldValue> { self.0.get(key) }

    /// Remove a value.
    pub fn remove(&mut self, key: &str) -> Option<FieldValue> { self.0.remove(key) }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize { self.0.len() }

    /// Whether the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// Iterate over entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Copy every entry of `other` into `self`, overwriting duplicates.
    pub fn merge(&mut self, other: &FieldTable) {
        for (key, value) in &other.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for FieldTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(2_147_483_647, true)]
    #[case(-2_147_483_648, true)]
    #[case(2_147_483_648, false)]
    #[case(-2_147_483_649, false)]
    fn decimal_wire_range(#[case] unscaled: i64, #[case] fits: bool) {
        assert_eq!(Decimal::new(3, unscaled).wire_unscaled().is_ok(), fits);
    }

    #[test]
    fn timestamp_truncates_to_seconds() {
        let time = UNIX_EPOCH + Duration::from_millis(1_500);
        assert_eq!(Timestamp::from(time), Timestamp(1));
    }

    #[rstest]
    #[case::whole_seconds(Duration::from_secs(90), Timestamp(-90))]
    #[case::rounds_down(Duration::from_millis(1_500), Timestamp(-2))]
    fn pre_epoch_times_are_negative(#[case] before: Duration, #[case] expected: Timestamp) {
        let time = UNIX_EPOCH - before;
        assert_eq!(Timestamp::from(time), expected);
    }

    #[test]
    fn negative_timestamp_maps_back_before_the_epoch() {
        let time = Timestamp(-86_400).to_system_time().expect("representable");
        assert_eq!(UNIX_EPOCH.duration_since(time).ok(), Some(Duration::from_secs(86_400)));
    }

    #[test]
    fn merge_overwrites_existing_keys() {
        let mut base = FieldTable::new().with("a", 1).with("b", true);
        base.merge(&FieldTable::new().with("a", "two"));
        assert_eq!(base.get("a").and_then(FieldValue::as_str), Some("two"));
        assert_eq!(base.get("b").and_then(FieldValue::as_bool), Some(true));
    }
}
