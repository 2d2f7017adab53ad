//! Content headers and `basic` content properties.
//!
//! A content header names the content class, the total body size and a
//! sparse property list. Presence is signalled by a 16-bit flag word whose
//! bits are assigned from bit 15 downwards in property order; bit 0 announces
//! a further flag word.

use bytes::Bytes;

use super::constants::CLASS_BASIC;
use crate::codec::{ArgReader, ArgWriter, CodecError, FieldTable, Timestamp};

const FLAG_CONTINUATION: u16 = 1;

const CONTENT_TYPE: u16 = 1 << 15;
const CONTENT_ENCODING: u16 = 1 << 14;
const HEADERS: u16 = 1 << 13;
const DELIVERY_MODE: u16 = 1 << 12;
const PRIORITY: u16 = 1 << 11;
const CORRELATION_ID: u16 = 1 << 10;
const REPLY_TO: u16 = 1 << 9;
const EXPIRATION: u16 = 1 << 8;
const MESSAGE_ID: u16 = 1 << 7;
const TIMESTAMP: u16 = 1 << 6;
const KIND: u16 = 1 << 5;
const USER_ID: u16 = 1 << 4;
const APP_ID: u16 = 1 << 3;
const CLUSTER_ID: u16 = 1 << 2;

/// Delivery mode asking the broker to keep the message in memory only.
pub const DELIVERY_MODE_TRANSIENT: u8 = 1;
/// Delivery mode asking the broker to persist the message.
pub const DELIVERY_MODE_PERSISTENT: u8 = 2;

/// Properties carried by `basic` content.
///
/// ```
/// use amqpframe::protocol::BasicProperties;
///
/// let props = BasicProperties::default()
///     .with_content_type("application/json")
///     .with_delivery_mode(2);
/// assert_eq!(props.content_type.as_deref(), Some("application/json"));
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BasicProperties {
    /// MIME content type.
    pub content_type: Option<String>,
    /// MIME content encoding.
    pub content_encoding: Option<String>,
    /// Application headers.
    pub headers: Option<FieldTable>,
    /// 1 for transient, 2 for persistent.
    pub delivery_mode: Option<u8>,
    /// Priority from 0 to 9.
    pub priority: Option<u8>,
    /// Correlation identifier for request/reply.
    pub correlation_id: Option<String>,
    /// Reply queue.
    pub reply_to: Option<String>,
    /// Per-message TTL in milliseconds, as text.
    pub expiration: Option<String>,
    /// Application message identifier.
    pub message_id: Option<String>,
    /// Creation time.
    pub timestamp: Option<Timestamp>,
    /// Application message type.
    pub kind: Option<String>,
    /// Authenticated publishing user.
    pub user_id: Option<String>,
    /// Publishing application.
    pub app_id: Option<String>,
    /// Deprecated cluster identifier.
    pub cluster_id: Option<String>,
}

impl BasicProperties {
    /// Set the content type.
    #[must_use]
    pub fn with_content_type(mut self, value: impl Into<String>) -> Self {
        self.content_type = Some(value.into());
        self
    }

    /// Set the content encoding.
    #[must_use]
    pub fn with_content_encoding(mut self, value: impl Into<String>) -> Self {
        self.content_encoding = Some(value.into());
        self
    }

    /// Set the application headers.
    #[must_use]
    pub fn with_headers(mut self, value: FieldTable) -> Self {
        self.headers = Some(value);
        self
    }

    /// Set the delivery mode.
    #[must_use]
    pub fn with_delivery_mode(mut self, value: u8) -> Self {
        self.delivery_mode = Some(value);
        self
    }

    /// Set the priority.
    #[must_use]
    pub fn with_priority(mut self, value: u8) -> Self {
        self.priority = Some(value);
        self
    }

    /// Set the correlation identifier.
    #[must_use]
    pub fn with_correlation_id(mut self, value: impl Into<String>) -> Self {
        self.correlation_id = Some(value.into());
        self
    }

    /// Set the reply queue.
    #[must_use]
    pub fn with_reply_to(mut self, value: impl Into<String>) -> Self {
        self.reply_to = Some(value.into());
        self
    }

    /// Set the expiration.
    #[must_use]
    pub fn with_expiration(mut self, value: impl Into<String>) -> Self {
        self.expiration = Some(value.into());
        self
    }

    /// Set the message identifier.
    #[must_use]
    pub fn with_message_id(mut self, value: impl Into<String>) -> Self {
        self.message_id = Some(value.into());
        self
    }

    /// Set the timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, value: Timestamp) -> Self {
        self.timestamp = Some(value);
        self
    }

    /// Set the message type.
    #[must_use]
    pub fn with_kind(mut self, value: impl Into<String>) -> Self {
        self.kind = Some(value.into());
        self
    }

    /// Set the user identifier.
    #[must_use]
    pub fn with_user_id(mut self, value: impl Into<String>) -> Self {
        self.user_id = Some(value.into());
        self
    }

    /// Set the application identifier.
    #[must_use]
    pub fn with_app_id(mut self, value: impl Into<String>) -> Self {
        self.app_id = Some(value.into());
        self
    }

    /// Set the cluster id.
    #[must_use]
    pub fn with_cluster_id(mut self, value: impl Into<String>) -> Self {
        self.cluster_id = Some(value.into());
        self
    }

    fn flags(&self) -> u16 {
        let mut flags = 0;
        let mut set = |present: bool, bit: u16| {
            if present {
                flags |= bit;
            }
        };
        set(self.content_type.is_some(), CONTENT_TYPE);
        set(self.content_encoding.is_some(), CONTENT_ENCODING);
        set(self.headers.is_some(), HEADERS);
        set(self.delivery_mode.is_some(), DELIVERY_MODE);
        set(self.priority.is_some(), PRIORITY);
        set(self.correlation_id.is_some(), CORRELATION_ID);
        set(self.reply_to.is_some(), REPLY_TO);
        set(self.expiration.is_some(), EXPIRATION);
        set(self.message_id.is_some(), MESSAGE_ID);
        set(self.timestamp.is_some(), TIMESTAMP);
        set(self.kind.is_some(), KIND);
        set(self.user_id.is_some(), USER_ID);
        set(self.app_id.is_some(), APP_ID);
        set(self.cluster_id.is_some(), CLUSTER_ID);
        flags
    }

    fn write(&self, w: &mut ArgWriter) -> Result<(), CodecError> {
        w.write_short(self.flags());
        write_opt_str(w, self.content_type.as_deref())?;
        write_opt_str(w, self.content_encoding.as_deref())?;
        if let Some(headers) = &self.headers {
            w.write_table(headers)?;
        }
        if let Some(mode) = self.delivery_mode {
            w.write_octet(mode);
        }
        if let Some(priority) = self.priority {
            w.write_octet(priority);
        }
        write_opt_str(w, self.correlation_id.as_deref())?;
        write_opt_str(w, self.reply_to.as_deref())?;
        write_opt_str(w, self.expiration.as_deref())?;
        write_opt_str(w, self.message_id.as_deref())?;
        if let Some(ts) = self.timestamp {
            w.write_timestamp(ts);
        }
        write_opt_str(w, self.kind.as_deref())?;
        write_opt_str(w, self.user_id.as_deref())?;
        write_opt_str(w, self.app_id.as_deref())?;
        write_opt_str(w, self.cluster_id.as_deref())
    }

    fn read(r: &mut ArgReader) -> Result<Self, CodecError> {
        let flags = r.read_short()?;
        let mut word = flags;
        while word & FLAG_CONTINUATION != 0 {
            // no basic property lives beyond the first word
            word = r.read_short()?;
        }
        let has = |bit: u16| flags & bit != 0;
        let str_if = |r: &mut ArgReader, bit: u16| -> Result<Option<String>, CodecError> {
            if has(bit) { r.read_shortstr().map(Some) } else { Ok(None) }
        };
        Ok(Self {
            content_type: str_if(r, CONTENT_TYPE)?,
            content_encoding: str_if(r, CONTENT_ENCODING)?,
            headers: if has(HEADERS) { Some(r.read_table()?) } else { None },
            delivery_mode: if has(DELIVERY_MODE) { Some(r.read_octet()?) } else { None },
            priority: if has(PRIORITY) { Some(r.read_octet()?) } else { None },
            correlation_id: str_if(r, CORRELATION_ID)?,
            reply_to: str_if(r, REPLY_TO)?,
            expiration: str_if(r, EXPIRATION)?,
            message_id: str_if(r, MESSAGE_ID)?,
            timestamp: if has(TIMESTAMP) { Some(r.read_timestamp()?) } else { None },
            kind: str_if(r, KIND)?,
            user_id: str_if(r, USER_ID)?,
            app_id: str_if(r, APP_ID)?,
            cluster_id: str_if(r, CLUSTER_ID)?,
        })
    }
}

fn write_opt_str(w: &mut ArgWriter, value: Option<&str>) -> Result<(), CodecError> {
    match value {
        Some(value) => w.write_shortstr(value),
        None => Ok(()),
    }
}

/// Payload of a content header frame.
#[derive(Clone, Debug, PartialEq)]
pub struct ContentHeader {
    /// Content class; always `basic` for this client.
    pub class_id: u16,
    /// Total body size in bytes.
    pub body_size: u64,
    /// Content properties.
    pub properties: BasicProperties,
}

impl ContentHeader {
    /// Header for a `basic` message of `body_size` bytes.
    #[must_use]
    pub fn basic(body_size: u64, properties: BasicProperties) -> Self {
        Self {
            class_id: CLASS_BASIC,
            body_size,
            properties,
        }
    }

    /// Encode into a header-frame payload.
    ///
    /// # Errors
    ///
    /// Fails if a property cannot be represented on the wire.
    pub fn encode(&self) -> Result<Bytes, CodecError> {
        let mut w = ArgWriter::new();
        w.write_short(self.class_id);
        // weight, unused
        w.write_short(0);
        w.write_longlong(self.body_size);
        self.properties.write(&mut w)?;
        Ok(w.finish())
    }

    /// Decode a header-frame payload.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnknownContentClass`] for classes other than
    /// `basic`, or a decoding error for malformed properties.
    pub fn decode(payload: Bytes) -> Result<Self, CodecError> {
        let mut r = ArgReader::new(payload);
        let class_id = r.read_short()?;
        if class_id != CLASS_BASIC {
            return Err(CodecError::UnknownContentClass { class_id });
        }
        r.read_short()?;
        let body_size = r.read_longlong()?;
        let properties = BasicProperties::read(&mut r)?;
        r.finish()?;
        Ok(Self {
            class_id,
            body_size,
            properties,
        })
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn empty_properties_have_no_flags() {
        let header = ContentHeader::basic(5, BasicProperties::default());
        assert_eq!(
            header.encode().expect("encode").as_ref(),
            &[0, 60, 0, 0, 0, 0, 0, 0, 0, 0, 0, 5, 0, 0]
        );
    }

    #[rstest]
    #[case::content_type(BasicProperties::default().with_content_type("text/plain"), 0x8000)]
    #[case::delivery_mode(BasicProperties::default().with_delivery_mode(2), 0x1000)]
    #[case::timestamp(BasicProperties::default().with_timestamp(Timestamp(9)), 0x0040)]
    #[case::app_id(BasicProperties::default().with_app_id("svc"), 0x0008)]
    #[case::cluster_id(BasicProperties::default().with_cluster_id("rabbit@a"), 0x0004)]
    fn flag_bits_follow_property_order(#[case] props: BasicProperties, #[case] flags: u16) {
        let payload = ContentHeader::basic(0, props).encode().expect("encode");
        assert_eq!(u16::from_be_bytes([payload[12], payload[13]]), flags);
    }

    #[test]
    fn full_properties_round_trip() {
        let props = BasicProperties::default()
            .with_content_type("application/json")
            .with_content_encoding("gzip")
            .with_headers(FieldTable::new().with("trace", "abc"))
            .with_delivery_mode(DELIVERY_MODE_PERSISTENT)
            .with_priority(5)
            .with_correlation_id("c-1")
            .with_reply_to("replies")
            .with_expiration("60000")
            .with_message_id("m-1")
            .with_timestamp(Timestamp(1_700_000_000))
            .with_kind("order.created")
            .with_user_id("guest")
            .with_app_id("shop")
            .with_cluster_id("east");
        let header = ContentHeader::basic(1024, props);
        let decoded = ContentHeader::decode(header.encode().expect("encode")).expect("decode");
        assert_eq!(decoded, header);
    }

    #[test]
    fn continuation_words_are_skipped() {
        let raw = [0, 60, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0x80, 0x01, 0x00, 0x00, 1, b'x'];
        let header = ContentHeader::decode(Bytes::copy_from_slice(&raw)).expect("decode");
        assert_eq!(header.properties.content_type.as_deref(), Some("x"));
    }

    #[test]
    fn non_basic_class_is_rejected() {
        let raw = [0, 50, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(
            ContentHeader::decode(Bytes::copy_from_slice(&raw)),
            Err(CodecError::UnknownContentClass { class_id: 50 })
        );
    }
}
