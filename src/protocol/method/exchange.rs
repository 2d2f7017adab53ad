//! `exchange` class methods.

use super::{MethodArgs, MethodId, empty_args};
use crate::{
    codec::{ArgReader, ArgWriter, CodecError, FieldTable},
    protocol::constants::CLASS_EXCHANGE,
};

/// `exchange.declare`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExchangeDeclare {
    /// Exchange name.
    pub exchange: String,
    /// Exchange type such as `direct`, `fanout`, `topic` or `headers`.
    pub kind: String,
    /// Only check that the exchange exists.
    pub passive: bool,
    /// Survive broker restarts.
    pub durable: bool,
    /// Delete once the last binding is removed.
    pub auto_delete: bool,
    /// Reject direct publishes.
    pub internal: bool,
    /// Do not send `declare-ok`.
    pub no_wait: bool,
    /// Implementation-specific arguments.
    pub arguments: FieldTable,
}

impl MethodArgs for ExchangeDeclare {
    const ID: MethodId = MethodId::new(CLASS_EXCHANGE, 10);
    const NAME: &'static str = "exchange.declare";

    fn write_args(&self, w: &mut ArgWriter) -> Result<(), CodecError> {
        w.write_short(0);
        w.write_shortstr(&self.exchange)?;
        w.write_shortstr(&self.kind)?;
        w.write_bit(self.passive);
        w.write_bit(self.durable);
        w.write_bit(self.auto_delete);
        w.write_bit(self.internal);
        w.write_bit(self.no_wait);
        w.write_table(&self.arguments)
    }

    fn read_args(r: &mut ArgReader) -> Result<Self, CodecError> {
        r.read_short()?;
        Ok(Self {
            exchange: r.read_shortstr()?,
            kind: r.read_shortstr()?,
            passive: r.read_bit()?,
            durable: r.read_bit()?,
            auto_delete: r.read_bit()?,
            internal: r.read_bit()?,
            no_wait: r.read_bit()?,
            arguments: r.read_table()?,
        })
    }
}

/// `exchange.declare-ok`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExchangeDeclareOk;
empty_args!(ExchangeDeclareOk, CLASS_EXCHANGE, 11, "exchange.declare-ok");

/// `exchange.delete`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExchangeDelete {
    /// Exchange name.
    pub exchange: String,
    /// Only delete when the exchange has no bindings.
    pub if_unused: bool,
    /// Do not send `delete-ok`.
    pub no_wait: bool,
}

impl MethodArgs for ExchangeDelete {
    const ID: MethodId = MethodId::new(CLASS_EXCHANGE, 20);
    const NAME: &'static str = "exchange.delete";

    fn write_args(&self, w: &mut ArgWriter) -> Result<(), CodecError> {
        w.write_short(0);
        w.write_shortstr(&self.exchange)?;
        w.write_bit(self.if_unused);
        w.write_bit(self.no_wait);
        Ok(())
    }

    fn read_args(r: &mut ArgReader) -> Result<Self, CodecError> {
        r.read_short()?;
        Ok(Self {
            exchange: r.read_shortstr()?,
            if_unused: r.read_bit()?,
            no_wait: r.read_bit()?,
        })
    }
}

/// `exchange.delete-ok`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExchangeDeleteOk;
empty_args!(ExchangeDeleteOk, CLASS_EXCHANGE, 21, "exchange.delete-ok");

/// `exchange.bind`: route from `source` into `destination`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExchangeBind {
    /// Exchange receiving routed messages.
    pub destination: String,
    /// Exchange messages are routed from.
    pub source: String,
    /// Binding key.
    pub routing_key: String,
    /// Do not send `bind-ok`.
    pub no_wait: bool,
    /// Binding arguments.
    pub arguments: FieldTable,
}

impl MethodArgs for ExchangeBind {
    const ID: MethodId = MethodId::new(CLASS_EXCHANGE, 30);
    const NAME: &'static str = "exchange.bind";

    fn write_args(&self, w: &mut ArgWriter) -> Result<(), CodecError> {
        write_binding(w, &self.destination, &self.source, &self.routing_key, self.no_wait, &self.arguments)
    }

    fn read_args(r: &mut ArgReader) -> Result<Self, CodecError> {
        r.read_short()?;
        Ok(Self {
            destination: r.read_shortstr()?,
            source: r.read_shortstr()?,
            routing_key: r.read_shortstr()?,
            no_wait: r.read_bit()?,
            arguments: r.read_table()?,
        })
    }
}

/// `exchange.bind-ok`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExchangeBindOk;
empty_args!(ExchangeBindOk, CLASS_EXCHANGE, 31, "exchange.bind-ok");

/// `exchange.unbind`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExchangeUnbind {
    /// Exchange receiving routed messages.
    pub destination: String,
    /// Exchange messages are routed from.
    pub source: String,
    /// Binding key.
    pub routing_key: String,
    /// Do not send `unbind-ok`.
    pub no_wait: bool,
    /// Binding arguments.
    pub arguments: FieldTable,
}

impl MethodArgs for ExchangeUnbind {
    const ID: MethodId = MethodId::new(CLASS_EXCHANGE, 40);
    const NAME: &'static str = "exchange.unbind";

    fn write_args(&self, w: &mut ArgWriter) -> Result<(), CodecError> {
        write_binding(w, &self.destination, &self.source, &self.routing_key, self.no_wait, &self.arguments)
    }

    fn read_args(r: &mut ArgReader) -> Result<Self, CodecError> {
        r.read_short()?;
        Ok(Self {
            destination: r.read_shortstr()?,
            source: r.read_shortstr()?,
            routing_key: r.read_shortstr()?,
            no_wait: r.read_bit()?,
            arguments: r.read_table()?,
        })
    }
}

/// `exchange.unbind-ok`, numbered 51 by the protocol.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExchangeUnbindOk;
empty_args!(ExchangeUnbindOk, CLASS_EXCHANGE, 51, "exchange.unbind-ok");

fn write_binding(
    w: &mut ArgWriter,
    destination: &str,
    source: &str,
    routing_key: &str,
    no_wait: bool,
    arguments: &FieldTable,
) -> Result<(), CodecError> {
    w.write_short(0);
    w.write_shortstr(destination)?;
    w.write_shortstr(source)?;
    w.write_shortstr(routing_key)?;
    w.write_bit(no_wait);
    w.write_table(arguments)
}
