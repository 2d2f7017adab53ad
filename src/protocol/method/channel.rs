//! `channel` class methods.

use super::{MethodArgs, MethodId, empty_args};
use crate::{
    codec::{ArgReader, ArgWriter, CodecError},
    protocol::constants::CLASS_CHANNEL,
};

/// `channel.open`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChannelOpen;

impl MethodArgs for ChannelOpen {
    const ID: MethodId = MethodId::new(CLASS_CHANNEL, 10);
    const NAME: &'static str = "channel.open";

    fn write_args(&self, w: &mut ArgWriter) -> Result<(), CodecError> { w.write_shortstr("") }

    fn read_args(r: &mut ArgReader) -> Result<Self, CodecError> {
        r.read_shortstr()?;
        Ok(Self)
    }
}

/// `channel.open-ok`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChannelOpenOk;

impl MethodArgs for ChannelOpenOk {
    const ID: MethodId = MethodId::new(CLASS_CHANNEL, 11);
    const NAME: &'static str = "channel.open-ok";

    fn write_args(&self, w: &mut ArgWriter) -> Result<(), CodecError> { w.write_longstr(&[]) }

    fn read_args(r: &mut ArgReader) -> Result<Self, CodecError> {
        r.read_longstr()?;
        Ok(Self)
    }
}

/// `channel.flow`: pause or resume content flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelFlow {
    /// Whether the peer may send content.
    pub active: bool,
}

impl MethodArgs for ChannelFlow {
    const ID: MethodId = MethodId::new(CLASS_CHANNEL, 20);
    const NAME: &'static str = "channel.flow";

    fn write_args(&self, w: &mut ArgWriter) -> Result<(), CodecError> {
        w.write_bit(self.active);
        Ok(())
    }

    fn read_args(r: &mut ArgReader) -> Result<Self, CodecError> {
        Ok(Self {
            active: r.read_bit()?,
        })
    }
}

/// `channel.flow-ok`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelFlowOk {
    /// Flow state now in effect.
    pub active: bool,
}

impl MethodArgs for ChannelFlowOk {
    const ID: MethodId = MethodId::new(CLASS_CHANNEL, 21);
    const NAME: &'static str = "channel.flow-ok";

    fn write_args(&self, w: &mut ArgWriter) -> Result<(), CodecError> {
        w.write_bit(self.active);
        Ok(())
    }

    fn read_args(r: &mut ArgReader) -> Result<Self, CodecError> {
        Ok(Self {
            active: r.read_bit()?,
        })
    }
}

/// `channel.close`: either peer ends the channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelClose {
    /// Reply code, see [`reply_code`](crate::protocol::reply_code).
    pub reply_code: u16,
    /// Human-readable reason.
    pub reply_text: String,
    /// Class of the method that caused the close, or zero.
    pub class_id: u16,
    /// Method that caused the close, or zero.
    pub method_id: u16,
}

impl MethodArgs for ChannelClose {
    const ID: MethodId = MethodId::new(CLASS_CHANNEL, 40);
    const NAME: &'static str = "channel.close";

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

/// `channel.close-ok`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChannelCloseOk;
empty_args!(ChannelCloseOk, CLASS_CHANNEL, 41, "channel.close-ok");
