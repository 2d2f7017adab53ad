//! `basic` class methods.

use super::{MethodArgs, MethodId, empty_args};
use crate::{
    codec::{ArgReader, ArgWriter, CodecError, FieldTable},
    protocol::constants::CLASS_BASIC,
};

/// `basic.qos`: limit unacknowledged deliveries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BasicQos {
    /// Byte window, zero for no limit.
    pub prefetch_size: u32,
    /// Message window, zero for no limit.
    pub prefetch_count: u16,
    /// Apply to the whole connection rather than each consumer.
    pub global: bool,
}

impl MethodArgs for BasicQos {
    const ID: MethodId = MethodId::new(CLASS_BASIC, 10);
    const NAME: &'static str = "basic.qos";

    fn write_args(&self, w: &mut ArgWriter) -> Result<(), CodecError> {
        w.write_long(self.prefetch_size);
        w.write_short(self.prefetch_count);
        w.write_bit(self.global);
        Ok(())
    }

    fn read_args(r: &mut ArgReader) -> Result<Self, CodecError> {
        Ok(Self {
            prefetch_size: r.read_long()?,
            prefetch_count: r.read_short()?,
            global: r.read_bit()?,
        })
    }
}

/// `basic.qos-ok`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BasicQosOk;
empty_args!(BasicQosOk, CLASS_BASIC, 11, "basic.qos-ok");

/// `basic.consume`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BasicConsume {
    /// Queue to consume from.
    pub queue: String,
    /// Consumer tag, empty to let the broker assign one.
    pub consumer_tag: String,
    /// Skip messages published on this connection.
    pub no_local: bool,
    /// Deliveries need no acknowledgement.
    pub no_ack: bool,
    /// Request exclusive access to the queue.
    pub exclusive: bool,
    /// Do not send `consume-ok`.
    pub no_wait: bool,
    /// Consumer arguments such as `x-priority`.
    pub arguments: FieldTable,
}

impl MethodArgs for BasicConsume {
    const ID: MethodId = MethodId::new(CLASS_BASIC, 20);
    const NAME: &'static str = "basic.consume";

    fn write_args(&self, w: &mut ArgWriter) -> Result<(), CodecError> {
        w.write_short(0);
        w.write_shortstr(&self.queue)?;
        w.write_shortstr(&self.consumer_tag)?;
        w.write_bit(self.no_local);
        w.write_bit(self.no_ack);
        w.write_bit(self.exclusive);
        w.write_bit(self.no_wait);
        w.write_table(&self.arguments)
    }

    fn read_args(r: &mut ArgReader) -> Result<Self, CodecError> {
        r.read_short()?;
        Ok(Self {
            queue: r.read_shortstr()?,
            consumer_tag: r.read_shortstr()?,
            no_local: r.read_bit()?,
            no_ack: r.read_bit()?,
            exclusive: r.read_bit()?,
            no_wait: r.read_bit()?,
            arguments: r.read_table()?,
        })
    }
}

/// `basic.consume-ok`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BasicConsumeOk {
    /// Tag identifying the new consumer.
    pub consumer_tag: String,
}

impl MethodArgs for BasicConsumeOk {
    const ID: MethodId = MethodId::new(CLASS_BASIC, 21);
    const NAME: &'static str = "basic.consume-ok";

    fn write_args(&self, w: &mut ArgWriter) -> Result<(), CodecError> {
        w.write_shortstr(&self.consumer_tag)
    }

    fn read_args(r: &mut ArgReader) -> Result<Self, CodecError> {
        Ok(Self {
            consumer_tag: r.read_shortstr()?,
        })
    }
}

/// `basic.cancel`, sent by the client or by a broker supporting
/// consumer cancel notifications.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BasicCancel {
    /// Consumer to cancel.
    pub consumer_tag: String,
    /// Do not send `cancel-ok`.
    pub no_wait: bool,
}

impl MethodArgs for BasicCancel {
    const ID: MethodId = MethodId::new(CLASS_BASIC, 30);
    const NAME: &'static str = "basic.cancel";

    fn write_args(&self, w: &mut ArgWriter) -> Result<(), CodecError> {
        w.write_shortstr(&self.consumer_tag)?;
        w.write_bit(self.no_wait);
        Ok(())
    }

    fn read_args(r: &mut ArgReader) -> Result<Self, CodecError> {
        Ok(Self {
            consumer_tag: r.read_shortstr()?,
            no_wait: r.read_bit()?,
        })
    }
}

/// `basic.cancel-ok`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BasicCancelOk {
    /// Consumer that was cancelled.
    pub consumer_tag: String,
}

impl MethodArgs for BasicCancelOk {
    const ID: MethodId = MethodId::new(CLASS_BASIC, 31);
    const NAME: &'static str = "basic.cancel-ok";

    fn write_args(&self, w: &mut ArgWriter) -> Result<(), CodecError> {
        w.write_shortstr(&self.consumer_tag)
    }

    fn read_args(r: &mut ArgReader) -> Result<Self, CodecError> {
        Ok(Self {
            consumer_tag: r.read_shortstr()?,
        })
    }
}

/// `basic.publish`; followed by content.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BasicPublish {
    /// Target exchange, empty for the default exchange.
    pub exchange: String,
    /// Routing key.
    pub routing_key: String,
    /// Return the message if it cannot be routed.
    pub mandatory: bool,
    /// Return the message if it cannot be delivered at once.
    pub immediate: bool,
}

impl MethodArgs for BasicPublish {
    const ID: MethodId = MethodId::new(CLASS_BASIC, 40);
    const NAME: &'static str = "basic.publish";

    fn write_args(&self, w: &mut ArgWriter) -> Result<(), CodecError> {
        w.write_short(0);
        w.write_shortstr(&self.exchange)?;
        w.write_shortstr(&self.routing_key)?;
        w.write_bit(self.mandatory);
        w.write_bit(self.immediate);
        Ok(())
    }

    fn read_args(r: &mut ArgReader) -> Result<Self, CodecError> {
        r.read_short()?;
        Ok(Self {
            exchange: r.read_shortstr()?,
            routing_key: r.read_shortstr()?,
            mandatory: r.read_bit()?,
            immediate: r.read_bit()?,
        })
    }
}

/// `basic.return`: an unroutable message sent back; followed by content.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BasicReturn {
    /// Reason code.
    pub reply_code: u16,
    /// Reason text.
    pub reply_text: String,
    /// Exchange the message was published to.
    pub exchange: String,
    /// Routing key used when publishing.
    pub routing_key: String,
}

impl MethodArgs for BasicReturn {
    const ID: MethodId = MethodId::new(CLASS_BASIC, 50);
    const NAME: &'static str = "basic.return";

    fn write_args(&self, w: &mut ArgWriter) -> Result<(), CodecError> {
        w.write_short(self.reply_code);
        w.write_shortstr(&self.reply_text)?;
        w.write_shortstr(&self.exchange)?;
        w.write_shortstr(&self.routing_key)
    }

    fn read_args(r: &mut ArgReader) -> Result<Self, CodecError> {
        Ok(Self {
            reply_code: r.read_short()?,
            reply_text: r.read_shortstr()?,
            exchange: r.read_shortstr()?,
            routing_key: r.read_shortstr()?,
        })
    }
}

/// `basic.deliver`: a message pushed to a consumer; followed by content.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BasicDeliver {
    /// Receiving consumer.
    pub consumer_tag: String,
    /// Channel-scoped tag for acknowledgement.
    pub delivery_tag: u64,
    /// The message was delivered before.
    pub redelivered: bool,
    /// Exchange the message was published to.
    pub exchange: String,
    /// Routing key used when publishing.
    pub routing_key: String,
}

impl MethodArgs for BasicDeliver {
    const ID: MethodId = MethodId::new(CLASS_BASIC, 60);
    const NAME: &'static str = "basic.deliver";

    fn write_args(&self, w: &mut ArgWriter) -> Result<(), CodecError> {
        w.write_shortstr(&self.consumer_tag)?;
        w.write_longlong(self.delivery_tag);
        w.write_bit(self.redelivered);
        w.write_shortstr(&self.exchange)?;
        w.write_shortstr(&self.routing_key)
    }

    fn read_args(r: &mut ArgReader) -> Result<Self, CodecError> {
        Ok(Self {
            consumer_tag: r.read_shortstr()?,
            delivery_tag: r.read_longlong()?,
            redelivered: r.read_bit()?,
            exchange: r.read_shortstr()?,
            routing_key: r.read_shortstr()?,
        })
    }
}

/// `basic.get`: fetch one message synchronously.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BasicGet {
    /// Queue to fetch from.
    pub queue: String,
    /// The message needs no acknowledgement.
    pub no_ack: bool,
}

impl MethodArgs for BasicGet {
    const ID: MethodId = MethodId::new(CLASS_BASIC, 70);
    const NAME: &'static str = "basic.get";

    fn write_args(&self, w: &mut ArgWriter) -> Result<(), CodecError> {
        w.write_short(0);
        w.write_shortstr(&self.queue)?;
        w.write_bit(self.no_ack);
        Ok(())
    }

    fn read_args(r: &mut ArgReader) -> Result<Self, CodecError> {
        r.read_short()?;
        Ok(Self {
            queue: r.read_shortstr()?,
            no_ack: r.read_bit()?,
        })
    }
}

/// `basic.get-ok`; followed by content.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BasicGetOk {
    /// Channel-scoped tag for acknowledgement.
    pub delivery_tag: u64,
    /// The message was delivered before.
    pub redelivered: bool,
    /// Exchange the message was published to.
    pub exchange: String,
    /// Routing key used when publishing.
    pub routing_key: String,
    /// Messages left in the queue.
    pub message_count: u32,
}

impl MethodArgs for BasicGetOk {
    const ID: MethodId = MethodId::new(CLASS_BASIC, 71);
    const NAME: &'static str = "basic.get-ok";

    fn write_args(&self, w: &mut ArgWriter) -> Result<(), CodecError> {
        w.write_longlong(self.delivery_tag);
        w.write_bit(self.redelivered);
        w.write_shortstr(&self.exchange)?;
        w.write_shortstr(&self.routing_key)?;
        w.write_long(self.message_count);
        Ok(())
    }

    fn read_args(r: &mut ArgReader) -> Result<Self, CodecError> {
        Ok(Self {
            delivery_tag: r.read_longlong()?,
            redelivered: r.read_bit()?,
            exchange: r.read_shortstr()?,
            routing_key: r.read_shortstr()?,
            message_count: r.read_long()?,
        })
    }
}

/// `basic.get-empty`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BasicGetEmpty;

impl MethodArgs for BasicGetEmpty {
    const ID: MethodId = MethodId::new(CLASS_BASIC, 72);
    const NAME: &'static str = "basic.get-empty";

    fn write_args(&self, w: &mut ArgWriter) -> Result<(), CodecError> { w.write_shortstr("") }

    fn read_args(r: &mut ArgReader) -> Result<Self, CodecError> {
        r.read_shortstr()?;
        Ok(Self)
    }
}

/// `basic.ack`: sent by consumers, and by the broker in confirm mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BasicAck {
    /// Delivery or publish sequence number.
    pub delivery_tag: u64,
    /// Also cover every earlier tag.
    pub multiple: bool,
}

impl MethodArgs for BasicAck {
    const ID: MethodId = MethodId::new(CLASS_BASIC, 80);
    const NAME: &'static str = "basic.ack";

    fn write_args(&self, w: &mut ArgWriter) -> Result<(), CodecError> {
        w.write_longlong(self.delivery_tag);
        w.write_bit(self.multiple);
        Ok(())
    }

    fn read_args(r: &mut ArgReader) -> Result<Self, CodecError> {
        Ok(Self {
            delivery_tag: r.read_longlong()?,
            multiple: r.read_bit()?,
        })
    }
}

/// `basic.reject`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BasicReject {
    /// Delivery to reject.
    pub delivery_tag: u64,
    /// Put the message back on the queue.
    pub requeue: bool,
}

impl MethodArgs for BasicReject {
    const ID: MethodId = MethodId::new(CLASS_BASIC, 90);
    const NAME: &'static str = "basic.reject";

    fn write_args(&self, w: &mut ArgWriter) -> Result<(), CodecError> {
        w.write_longlong(self.delivery_tag);
        w.write_bit(self.requeue);
        Ok(())
    }

    fn read_args(r: &mut ArgReader) -> Result<Self, CodecError> {
        Ok(Self {
            delivery_tag: r.read_longlong()?,
            requeue: r.read_bit()?,
        })
    }
}

/// `basic.recover`: redeliver unacknowledged messages.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BasicRecover {
    /// Requeue instead of redelivering to the same consumer.
    pub requeue: bool,
}

impl MethodArgs for BasicRecover {
    const ID: MethodId = MethodId::new(CLASS_BASIC, 110);
    const NAME: &'static str = "basic.recover";

    fn write_args(&self, w: &mut ArgWriter) -> Result<(), CodecError> {
        w.write_bit(self.requeue);
        Ok(())
    }

    fn read_args(r: &mut ArgReader) -> Result<Self, CodecError> {
        Ok(Self {
            requeue: r.read_bit()?,
        })
    }
}

/// `basic.recover-ok`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BasicRecoverOk;
empty_args!(BasicRecoverOk, CLASS_BASIC, 111, "basic.recover-ok");

/// `basic.nack`: negative acknowledgement.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BasicNack {
    /// Delivery or publish sequence number.
    pub delivery_tag: u64,
    /// Also cover every earlier tag.
    pub multiple: bool,
    /// Put the messages back on the queue.
    pub requeue: bool,
}

impl MethodArgs for BasicNack {
    const ID: MethodId = MethodId::new(CLASS_BASIC, 120);
    const NAME: &'static str = "basic.nack";

    fn write_args(&self, w: &mut ArgWriter) -> Result<(), CodecError> {
        w.write_longlong(self.delivery_tag);
        w.write_bit(self.multiple);
        w.write_bit(self.requeue);
        Ok(())
    }

    fn read_args(r: &mut ArgReader) -> Result<Self, CodecError> {
        Ok(Self {
            delivery_tag: r.read_longlong()?,
            multiple: r.read_bit()?,
            requeue: r.read_bit()?,
        })
    }
}
