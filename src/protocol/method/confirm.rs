//! `confirm` class methods.

use super::{MethodArgs, MethodId, empty_args};
use crate::{
    codec::{ArgReader, ArgWriter, CodecError},
    protocol::constants::CLASS_CONFIRM,
};

/// `confirm.select`: enable publisher confirms on the channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConfirmSelect {
    /// Do not send `select-ok`.
    pub no_wait: bool,
}

impl MethodArgs for ConfirmSelect {
    const ID: MethodId = MethodId::new(CLASS_CONFIRM, 10);
    const NAME: &'static str = "confirm.select";

    fn write_args(&self, w: &mut ArgWriter) -> Result<(), CodecError> {
        w.write_bit(self.no_wait);
        Ok(())
    }

    fn read_args(r: &mut ArgReader) -> Result<Self, CodecError> {
        Ok(Self {
            no_wait: r.read_bit()?,
        })
    }
}

/// `confirm.select-ok`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConfirmSelectOk;
empty_args!(ConfirmSelectOk, CLASS_CONFIRM, 11, "confirm.select-ok");
