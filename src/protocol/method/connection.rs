//! `connection` class methods, exchanged on channel 0.

use bytes::Bytes;

use super::{MethodArgs, MethodId, empty_args};
use crate::{
    codec::{ArgReader, ArgWriter, CodecError, FieldTable},
    protocol::constants::CLASS_CONNECTION,
};

/// `connection.start`: the server's opening offer.
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectionStart {
    /// Protocol major version.
    pub version_major: u8,
    /// Protocol minor version.
    pub version_minor: u8,
    /// Server product, version and capabilities.
    pub server_properties: FieldTable,
    /// Space-separated SASL mechanism names.
    pub mechanisms: Bytes,
    /// Space-separated message locales.
    pub locales: Bytes,
}

impl ConnectionStart {
    /// Iterate over the offered SASL mechanism names.
    pub fn mechanism_names(&self) -> impl Iterator<Item = &str> {
        std::str::from_utf8(&self.mechanisms)
            .unwrap_or_default()
            .split_ascii_whitespace()
    }
}

impl MethodArgs for ConnectionStart {
    const ID: MethodId = MethodId::new(CLASS_CONNECTION, 10);
    const NAME: &'static str = "connection.start";

    fn write_args(&self, w: &mut ArgWriter) -> Result<(), CodecError> {
        w.write_octet(self.version_major);
        w.write_octet(self.version_minor);
        w.write_table(&self.server_properties)?;
        w.write_longstr(&self.mechanisms)?;
        w.write_longstr(&self.locales)
    }

    fn read_args(r: &mut ArgReader) -> Result<Self, CodecError> {
        Ok(Self {
            version_major: r.read_octet()?,
            version_minor: r.read_octet()?,
            server_properties: r.read_table()?,
            mechanisms: r.read_longstr()?,
            locales: r.read_longstr()?,
        })
    }
}

/// `connection.start-ok`: client properties and the initial SASL response.
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectionStartOk {
    /// Client product, version and capabilities.
    pub client_properties: FieldTable,
    /// Selected SASL mechanism.
    pub mechanism: String,
    /// Initial SASL response.
    pub response: Bytes,
    /// Selected locale.
    pub locale: String,
}

impl MethodArgs for ConnectionStartOk {
    const ID: MethodId = MethodId::new(CLASS_CONNECTION, 11);
    const NAME: &'static str = "connection.start-ok";

    fn write_args(&self, w: &mut ArgWriter) -> Result<(), CodecError> {
        w.write_table(&self.client_properties)?;
        w.write_shortstr(&self.mechanism)?;
        w.write_longstr(&self.response)?;
        w.write_shortstr(&self.locale)
    }

    fn read_args(r: &mut ArgReader) -> Result<Self, CodecError> {
        Ok(Self {
            client_properties: r.read_table()?,
            mechanism: r.read_shortstr()?,
            response: r.read_longstr()?,
            locale: r.read_shortstr()?,
        })
    }
}

/// `connection.secure`: a SASL challenge.
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectionSecure {
    /// Challenge data.
    pub challenge: Bytes,
}

impl MethodArgs for ConnectionSecure {
    const ID: MethodId = MethodId::new(CLASS_CONNECTION, 20);
    const NAME: &'static str = "connection.secure";

    fn write_args(&self, w: &mut ArgWriter) -> Result<(), CodecError> {
        w.write_longstr(&self.challenge)
    }

    fn read_args(r: &mut ArgReader) -> Result<Self, CodecError> {
        Ok(Self {
            challenge: r.read_longstr()?,
        })
    }
}

/// `connection.secure-ok`: answer to a SASL challenge.
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectionSecureOk {
    /// Response data.
    pub response: Bytes,
}

impl MethodArgs for ConnectionSecureOk {
    const ID: MethodId = MethodId::new(CLASS_CONNECTION, 21);
    const NAME: &'static str = "connection.secure-ok";

    fn write_args(&self, w: &mut ArgWriter) -> Result<(), CodecError> {
        w.write_longstr(&self.response)
    }

    fn read_args(r: &mut ArgReader) -> Result<Self, CodecError> {
        Ok(Self {
            response: r.read_longstr()?,
        })
    }
}

/// `connection.tune`: the server's proposed limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectionTune {
    /// Highest channel number, zero for no limit.
    pub channel_max: u16,
    /// Largest frame in bytes, zero for no limit.
    pub frame_max: u32,
    /// Heartbeat interval in seconds, zero to disable.
    pub heartbeat: u16,
}

impl MethodArgs for ConnectionTune {
    const ID: MethodId = MethodId::new(CLASS_CONNECTION, 30);
    const NAME: &'static str = "connection.tune";

    fn write_args(&self, w: &mut ArgWriter) -> Result<(), CodecError> {
        w.write_short(self.channel_max);
        w.write_long(self.frame_max);
        w.write_short(self.heartbeat);
        Ok(())
    }

    fn read_args(r: &mut ArgReader) -> Result<Self, CodecError> {
        Ok(Self {
            channel_max: r.read_short()?,
            frame_max: r.read_long()?,
            heartbeat: r.read_short()?,
        })
    }
}

/// `connection.tune-ok`: the limits the client settled on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectionTuneOk {
    /// Negotiated channel-max.
    pub channel_max: u16,
    /// Negotiated frame-max.
    pub frame_max: u32,
    /// Negotiated heartbeat interval.
    pub heartbeat: u16,
}

impl MethodArgs for ConnectionTuneOk {
    const ID: MethodId = MethodId::new(CLASS_CONNECTION, 31);
    const NAME: &'static str = "connection.tune-ok";

    fn write_args(&self, w: &mut ArgWriter) -> Result<(), CodecError> {
        w.write_short(self.channel_max);
        w.write_long(self.frame_max);
        w.write_short(self.heartbeat);
        Ok(())
    }

    fn read_args(r: &mut ArgReader) -> Result<Self, CodecError> {
        Ok(Self {
            channel_max: r.read_short()?,
            frame_max: r.read_long()?,
            heartbeat: r.read_short()?,
        })
    }
}

/// `connection.open`: select the virtual host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionOpen {
    /// Virtual host name.
    pub virtual_host: String,
}

impl MethodArgs for ConnectionOpen {
    const ID: MethodId = MethodId::new(CLASS_CONNECTION, 40);
    const NAME: &'static str = "connection.open";

    fn write_args(&self, w: &mut ArgWriter) -> Result<(), CodecError> {
        w.write_shortstr(&self.virtual_host)?;
        // capabilities and insist, both reserved
        w.write_shortstr("")?;
        w.write_bit(false);
        Ok(())
    }

    fn read_args(r: &mut ArgReader) -> Result<Self, CodecError> {
        let virtual_host = r.read_shortstr()?;
        r.read_shortstr()?;
        r.read_bit()?;
        Ok(Self { virtual_host })
    }
}

/// `connection.open-ok`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectionOpenOk {
    /// Reserved field historically listing cluster peers.
    pub known_hosts: String,
}

impl MethodArgs for ConnectionOpenOk {
    const ID: MethodId = MethodId::new(CLASS_CONNECTION, 41);
    const NAME: &'static str = "connection.open-ok";

    fn write_args(&self, w: &mut ArgWriter) -> Result<(), CodecError> {
        w.write_shortstr(&self.known_hosts)
    }

    fn read_args(r: &mut ArgReader) -> Result<Self, CodecError> {
        Ok(Self {
            known_hosts: r.read_shortstr()?,
        })
    }
}

/// `connection.close`: either peer ends the connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionClose {
    /// Reply code, see [`reply_code`](crate::protocol::reply_code).
    pub reply_code: u16,
    /// Human-readable reason.
    pub reply_text: String,
    /// Class of the method that caused the close, or zero.
    pub class_id: u16,
    /// Method that caused the close, or zero.
    pub method_id: u16,
}

impl MethodArgs for ConnectionClose {
    const ID: MethodId = MethodId::new(CLASS_CONNECTION, 50);
    const NAME: &'static str = "connection.close";

    fn write_args(&self, w: &mut ArgWriter) -> Result<(), CodecError> {
        w.write_short(self.reply_code);
        w.write_shortstr(&self.reply_text)?;
        w.write_short(self.class_id);
        w.write_short(self.method_id);
        Ok(())
    }

    fn read_args(r: &mut ArgReader) -> Result<Self, CodecError> {
        Ok(Self {
            reply_code: r.read_short()?,
            reply_text: r.read_shortstr()?,
            class_id: r.read_short()?,
            method_id: r.read_short()?,
        })
    }
}

/// `connection.close-ok`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConnectionCloseOk;
empty_args!(ConnectionCloseOk, CLASS_CONNECTION, 51, "connection.close-ok");

/// `connection.blocked`: the broker stopped reading from this connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionBlocked {
    /// Why the connection is blocked.
    pub reason: String,
}

impl MethodArgs for ConnectionBlocked {
    const ID: MethodId = MethodId::new(CLASS_CONNECTION, 60);
    const NAME: &'static str = "connection.blocked";

    fn write_args(&self, w: &mut ArgWriter) -> Result<(), CodecError> {
        w.write_shortstr(&self.reason)
    }

    fn read_args(r: &mut ArgReader) -> Result<Self, CodecError> {
        Ok(Self {
            reason: r.read_shortstr()?,
        })
    }
}

/// `connection.unblocked`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConnectionUnblocked;
empty_args!(ConnectionUnblocked, CLASS_CONNECTION, 61, "connection.unblocked");
