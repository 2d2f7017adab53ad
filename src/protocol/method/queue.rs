//! `queue` class methods.

use super::{MethodArgs, MethodId, empty_args};
use crate::{
    codec::{ArgReader, ArgWriter, CodecError, FieldTable},
    protocol::constants::CLASS_QUEUE,
};

/// `queue.declare`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueueDeclare {
    /// Queue name, empty to let the broker choose one.
    pub queue: String,
    /// Only check that the queue exists.
    pub passive: bool,
    /// Survive broker restarts.
    pub durable: bool,
    /// Restrict to this connection and delete when it closes.
    pub exclusive: bool,
    /// Delete once the last consumer is cancelled.
    pub auto_delete: bool,
    /// Do not send `declare-ok`.
    pub no_wait: bool,
    /// Implementation-specific arguments.
    pub arguments: FieldTable,
}

impl MethodArgs for QueueDeclare {
    const ID: MethodId = MethodId::new(CLASS_QUEUE, 10);
    const NAME: &'static str = "queue.declare";

    fn write_args(&self, w: &mut ArgWriter) -> Result<(), CodecError> {
        w.write_short(0);
        w.write_shortstr(&self.queue)?;
        w.write_bit(self.passive);
        w.write_bit(self.durable);
        w.write_bit(self.exclusive);
        w.write_bit(self.auto_delete);
        w.write_bit(self.no_wait);
        w.write_table(&self.arguments)
    }

    fn read_args(r: &mut ArgReader) -> Result<Self, CodecError> {
        r.read_short()?;
        Ok(Self {
            queue: r.read_shortstr()?,
            passive: r.read_bit()?,
            durable: r.read_bit()?,
            exclusive: r.read_bit()?,
            auto_delete: r.read_bit()?,
            no_wait: r.read_bit()?,
            arguments: r.read_table()?,
        })
    }
}

/// `queue.declare-ok`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueueDeclareOk {
    /// Queue name, as chosen by the broker for server-named queues.
    pub queue: String,
    /// Messages ready in the queue.
    pub message_count: u32,
    /// Active consumers on the queue.
    pub consumer_count: u32,
}

impl MethodArgs for QueueDeclareOk {
    const ID: MethodId = MethodId::new(CLASS_QUEUE, 11);
    const NAME: &'static str = "queue.declare-ok";

    fn write_args(&self, w: &mut ArgWriter) -> Result<(), CodecError> {
        w.write_shortstr(&self.queue)?;
        w.write_long(self.message_count);
        w.write_long(self.consumer_count);
        Ok(())
    }

    fn read_args(r: &mut ArgReader) -> Result<Self, CodecError> {
        Ok(Self {
            queue: r.read_shortstr()?,
            message_count: r.read_long()?,
            consumer_count: r.read_long()?,
        })
    }
}

/// `queue.bind`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueueBind {
    /// Queue to bind.
    pub queue: String,
    /// Exchange to bind to.
    pub exchange: String,
    /// Binding key.
    pub routing_key: String,
    /// Do not send `bind-ok`.
    pub no_wait: bool,
    /// Binding arguments.
    pub arguments: FieldTable,
}

impl MethodArgs for QueueBind {
    const ID: MethodId = MethodId::new(CLASS_QUEUE, 20);
    const NAME: &'static str = "queue.bind";

    fn write_args(&self, w: &mut ArgWriter) -> Result<(), CodecError> {
        w.write_short(0);
        w.write_shortstr(&self.queue)?;
        w.write_shortstr(&self.exchange)?;
        w.write_shortstr(&self.routing_key)?;
        w.write_bit(self.no_wait);
        w.write_table(&self.arguments)
    }

    fn read_args(r: &mut ArgReader) -> Result<Self, CodecError> {
        r.read_short()?;
        Ok(Self {
            queue: r.read_shortstr()?,
            exchange: r.read_shortstr()?,
            routing_key: r.read_shortstr()?,
            no_wait: r.read_bit()?,
            arguments: r.read_table()?,
        })
    }
}

/// `queue.bind-ok`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueBindOk;
empty_args!(QueueBindOk, CLASS_QUEUE, 21, "queue.bind-ok");

/// `queue.purge`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueuePurge {
    /// Queue to purge.
    pub queue: String,
    /// Do not send `purge-ok`.
    pub no_wait: bool,
}

impl MethodArgs for QueuePurge {
    const ID: MethodId = MethodId::new(CLASS_QUEUE, 30);
    const NAME: &'static str = "queue.purge";

    fn write_args(&self, w: &mut ArgWriter) -> Result<(), CodecError> {
        w.write_short(0);
        w.write_shortstr(&self.queue)?;
        w.write_bit(self.no_wait);
        Ok(())
    }

    fn read_args(r: &mut ArgReader) -> Result<Self, CodecError> {
        r.read_short()?;
        Ok(Self {
            queue: r.read_shortstr()?,
            no_wait: r.read_bit()?,
        })
    }
}

/// `queue.purge-ok`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueuePurgeOk {
    /// Messages removed.
    pub message_count: u32,
}

impl MethodArgs for QueuePurgeOk {
    const ID: MethodId = MethodId::new(CLASS_QUEUE, 31);
    const NAME: &'static str = "queue.purge-ok";

    fn write_args(&self, w: &mut ArgWriter) -> Result<(), CodecError> {
        w.write_long(self.message_count);
        Ok(())
    }

    fn read_args(r: &mut ArgReader) -> Result<Self, CodecError> {
        Ok(Self {
            message_count: r.read_long()?,
        })
    }
}

/// `queue.delete`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueueDelete {
    /// Queue to delete.
    pub queue: String,
    /// Only delete when the queue has no consumers.
    pub if_unused: bool,
    /// Only delete when the queue has no messages.
    pub if_empty: bool,
    /// Do not send `delete-ok`.
    pub no_wait: bool,
}

impl MethodArgs for QueueDelete {
    const ID: MethodId = MethodId::new(CLASS_QUEUE, 40);
    const NAME: &'static str = "queue.delete";

    fn write_args(&self, w: &mut ArgWriter) -> Result<(), CodecError> {
        w.write_short(0);
        w.write_shortstr(&self.queue)?;
        w.write_bit(self.if_unused);
        w.write_bit(self.if_empty);
        w.write_bit(self.no_wait);
        Ok(())
    }

    fn read_args(r: &mut ArgReader) -> Result<Self, CodecError> {
        r.read_short()?;
        Ok(Self {
            queue: r.read_shortstr()?,
            if_unused: r.read_bit()?,
            if_empty: r.read_bit()?,
            no_wait: r.read_bit()?,
        })
    }
}

/// `queue.delete-ok`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueDeleteOk {
    /// Messages deleted with the queue.
    pub message_count: u32,
}

impl MethodArgs for QueueDeleteOk {
    const ID: MethodId = MethodId::new(CLASS_QUEUE, 41);
    const NAME: &'static str = "queue.delete-ok";

    fn write_args(&self, w: &mut ArgWriter) -> Result<(), CodecError> {
        w.write_long(self.message_count);
        Ok(())
    }

    fn read_args(r: &mut ArgReader) -> Result<Self, CodecError> {
        Ok(Self {
            message_count: r.read_long()?,
        })
    }
}

/// `queue.unbind`; always answered with `unbind-ok`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueueUnbind {
    /// Queue to unbind.
    pub queue: String,
    /// Exchange to unbind from.
    pub exchange: String,
    /// Binding key.
    pub routing_key: String,
    /// Binding arguments.
    pub arguments: FieldTable,
}

impl MethodArgs for QueueUnbind {
    const ID: MethodId = MethodId::new(CLASS_QUEUE, 50);
    const NAME: &'static str = "queue.unbind";

    fn write_args(&self, w: &mut ArgWriter) -> Result<(), CodecError> {
        w.write_short(0);
        w.write_shortstr(&self.queue)?;
        w.write_shortstr(&self.exchange)?;
        w.write_shortstr(&self.routing_key)?;
        w.write_table(&self.arguments)
    }

    fn read_args(r: &mut ArgReader) -> Result<Self, CodecError> {
        r.read_short()?;
        Ok(Self {
            queue: r.read_shortstr()?,
            exchange: r.read_shortstr()?,
            routing_key: r.read_shortstr()?,
            arguments: r.read_table()?,
        })
    }
}

/// `queue.unbind-ok`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueUnbindOk;
empty_args!(QueueUnbindOk, CLASS_QUEUE, 51, "queue.unbind-ok");
