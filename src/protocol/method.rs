//! Typed AMQP 0-9-1 methods and their registry.
//!
//! Each method is a plain struct implementing [`MethodArgs`]; the [`Method`]
//! enum ties them together and answers the registry questions the channel
//! layer asks of every command: does it carry content, and which replies
//! complete it when sent as a request.

use bytes::Bytes;

use crate::codec::{ArgReader, ArgWriter, CodecError};

mod basic;
mod channel;
mod confirm;
mod connection;
mod exchange;
mod queue;
mod tx;

pub use basic::*;
pub use channel::*;
pub use confirm::*;
pub use connection::*;
pub use exchange::*;
pub use queue::*;
pub use tx::*;

/// A `(class-id, method-id)` pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId {
    /// Class identifier.
    pub class_id: u16,
    /// Method identifier within the class.
    pub method_id: u16,
}

impl MethodId {
    /// Build a method identifier.
    #[must_use]
    pub const fn new(class_id: u16, method_id: u16) -> Self {
        Self {
            class_id,
            method_id,
        }
    }
}

impl std::fmt::Display for MethodId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.class_id, self.method_id)
    }
}

/// Argument encoding for a single method.
pub trait MethodArgs: Sized {
    /// Identifier written before the arguments.
    const ID: MethodId;
    /// Dotted name, for example `queue.declare`.
    const NAME: &'static str;

    /// Encode the arguments, excluding the method identifier.
    ///
    /// # Errors
    ///
    /// Fails if an argument cannot be represented on the wire.
    fn write_args(&self, writer: &mut ArgWriter) -> Result<(), CodecError>;

    /// Decode the arguments, excluding the method identifier.
    ///
    /// # Errors
    ///
    /// Fails on malformed or truncated input.
    fn read_args(reader: &mut ArgReader) -> Result<Self, CodecError>;
}

/// Implement [`MethodArgs`] for a method without arguments.
macro_rules! empty_args {
    ($ty:ident, $class:expr, $method:expr, $name:literal) => {
        impl $crate::protocol::method::MethodArgs for $ty {
            const ID: $crate::protocol::method::MethodId =
                $crate::protocol::method::MethodId::new($class, $method);
            const NAME: &'static str = $name;

            fn write_args(
                &self,
                _writer: &mut $crate::codec::ArgWriter,
            ) -> Result<(), $crate::codec::CodecError> {
                Ok(())
            }

            fn read_args(
                _reader: &mut $crate::codec::ArgReader,
            ) -> Result<Self, $crate::codec::CodecError> {
                Ok(Self)
            }
        }
    };
}
pub(crate) use empty_args;

macro_rules! methods {
    ($($variant:ident($ty:ident)),+ $(,)?) => {
        /// Any AMQP 0-9-1 method this client sends or understands.
        #[derive(Clone, Debug, PartialEq)]
        pub enum Method {
            $(
                #[doc = concat!("See [`", stringify!($ty), "`].")]
                $variant($ty),
            )+
        }

        impl Method {
            /// Class and method identifier.
            #[must_use]
            pub const fn id(&self) -> MethodId {
                match self {
                    $(Self::$variant(_) => <$ty as MethodArgs>::ID,)+
                }
            }

            /// Dotted method name.
            #[must_use]
            pub const fn name(&self) -> &'static str {
                match self {
                    $(Self::$variant(_) => <$ty as MethodArgs>::NAME,)+
                }
            }

            /// Encode the method into a method-frame payload.
            ///
            /// # Errors
            ///
            /// Fails if an argument cannot be represented on the wire.
            pub fn encode(&self) -> Result<Bytes, CodecError> {
                let mut writer = ArgWriter::new();
                let id = self.id();
                writer.write_short(id.class_id);
                writer.write_short(id.method_id);
                match self {
                    $(Self::$variant(args) => args.write_args(&mut writer)?,)+
                }
                Ok(writer.finish())
            }

            /// Decode a method-frame payload.
            ///
            /// # Errors
            ///
            /// Returns [`CodecError::UnknownMethod`] for identifiers outside
            /// the registry, or a decoding error for malformed arguments.
            pub fn decode(payload: Bytes) -> Result<Self, CodecError> {
                let mut reader = ArgReader::new(payload);
                let class_id = reader.read_short()?;
                let method_id = reader.read_short()?;
                let id = MethodId::new(class_id, method_id);
                let method = $(if id == <$ty as MethodArgs>::ID {
                    Self::$variant(<$ty as MethodArgs>::read_args(&mut reader)?)
                } else)+ {
                    return Err(CodecError::UnknownMethod { class_id, method_id });
                };
                reader.finish()?;
                Ok(method)
            }
        }

        $(impl From<$ty> for Method {
            fn from(value: $ty) -> Self { Self::$variant(value) }
        })+

        $(impl TryFrom<Method> for $ty {
            type Error = Method;

            fn try_from(value: Method) -> Result<Self, Method> {
                match value {
                    Method::$variant(args) => Ok(args),
                    other => Err(other),
                }
            }
        })+
    };
}

methods! {
    ConnectionStart(ConnectionStart),
    ConnectionStartOk(ConnectionStartOk),
    ConnectionSecure(ConnectionSecure),
    ConnectionSecureOk(ConnectionSecureOk),
    ConnectionTune(ConnectionTune),
    ConnectionTuneOk(ConnectionTuneOk),
    ConnectionOpen(ConnectionOpen),
    ConnectionOpenOk(ConnectionOpenOk),
    ConnectionClose(ConnectionClose),
    ConnectionCloseOk(ConnectionCloseOk),
    ConnectionBlocked(ConnectionBlocked),
    ConnectionUnblocked(ConnectionUnblocked),
    ChannelOpen(ChannelOpen),
    ChannelOpenOk(ChannelOpenOk),
    ChannelFlow(ChannelFlow),
    ChannelFlowOk(ChannelFlowOk),
    ChannelClose(ChannelClose),
    ChannelCloseOk(ChannelCloseOk),
    ExchangeDeclare(ExchangeDeclare),
    ExchangeDeclareOk(ExchangeDeclareOk),
    ExchangeDelete(ExchangeDelete),
    ExchangeDeleteOk(ExchangeDeleteOk),
    ExchangeBind(ExchangeBind),
    ExchangeBindOk(ExchangeBindOk),
    ExchangeUnbind(ExchangeUnbind),
    ExchangeUnbindOk(ExchangeUnbindOk),
    QueueDeclare(QueueDeclare),
    QueueDeclareOk(QueueDeclareOk),
    QueueBind(QueueBind),
    QueueBindOk(QueueBindOk),
    QueuePurge(QueuePurge),
    QueuePurgeOk(QueuePurgeOk),
    QueueDelete(QueueDelete),
    QueueDeleteOk(QueueDeleteOk),
    QueueUnbind(QueueUnbind),
    QueueUnbindOk(QueueUnbindOk),
    BasicQos(BasicQos),
    BasicQosOk(BasicQosOk),
    BasicConsume(BasicConsume),
    BasicConsumeOk(BasicConsumeOk),
    BasicCancel(BasicCancel),
    BasicCancelOk(BasicCancelOk),
    BasicPublish(BasicPublish),
    BasicReturn(BasicReturn),
    BasicDeliver(BasicDeliver),
    BasicGet(BasicGet),
    BasicGetOk(BasicGetOk),
    BasicGetEmpty(BasicGetEmpty),
    BasicAck(BasicAck),
    BasicReject(BasicReject),
    BasicRecover(BasicRecover),
    BasicRecoverOk(BasicRecoverOk),
    BasicNack(BasicNack),
    ConfirmSelect(ConfirmSelect),
    ConfirmSelectOk(ConfirmSelectOk),
    TxSelect(TxSelect),
    TxSelectOk(TxSelectOk),
    TxCommit(TxCommit),
    TxCommitOk(TxCommitOk),
    TxRollback(TxRollback),
    TxRollbackOk(TxRollbackOk),
}

const NO_REPLY: &[MethodId] = &[];

impl Method {
    /// Whether a content header and body follow this method.
    #[must_use]
    pub const fn has_content(&self) -> bool {
        matches!(
            self,
            Self::BasicPublish(_) | Self::BasicReturn(_) | Self::BasicDeliver(_) | Self::BasicGetOk(_)
        )
    }

    /// Replies that complete this method when sent as a request.
    ///
    /// Empty for responses, asynchronous methods and requests sent with
    /// `no-wait`.
    #[must_use]
    pub fn expected_replies(&self) -> &'static [MethodId] {
        match self {
            Self::ConnectionStartOk(_) | Self::ConnectionSecureOk(_) => {
                &[ConnectionSecure::ID, ConnectionTune::ID]
            }
            Self::ConnectionOpen(_) => &[ConnectionOpenOk::ID],
            Self::ConnectionClose(_) => &[ConnectionCloseOk::ID],
            Self::ChannelOpen(_) => &[ChannelOpenOk::ID],
            Self::ChannelFlow(_) => &[ChannelFlowOk::ID],
            Self::ChannelClose(_) => &[ChannelCloseOk::ID],
            Self::ExchangeDeclare(m) if !m.no_wait => &[ExchangeDeclareOk::ID],
            Self::ExchangeDelete(m) if !m.no_wait => &[ExchangeDeleteOk::ID],
            Self::ExchangeBind(m) if !m.no_wait => &[ExchangeBindOk::ID],
            Self::ExchangeUnbind(m) if !m.no_wait => &[ExchangeUnbindOk::ID],
            Self::QueueDeclare(m) if !m.no_wait => &[QueueDeclareOk::ID],
            Self::QueueBind(m) if !m.no_wait => &[QueueBindOk::ID],
            Self::QueuePurge(m) if !m.no_wait => &[QueuePurgeOk::ID],
            Self::QueueDelete(m) if !m.no_wait => &[QueueDeleteOk::ID],
            Self::QueueUnbind(_) => &[QueueUnbindOk::ID],
            Self::BasicQos(_) => &[BasicQosOk::ID],
            Self::BasicConsume(m) if !m.no_wait => &[BasicConsumeOk::ID],
            Self::BasicCancel(m) if !m.no_wait => &[BasicCancelOk::ID],
            Self::BasicGet(_) => &[BasicGetOk::ID, BasicGetEmpty::ID],
            Self::BasicRecover(_) => &[BasicRecoverOk::ID],
            Self::ConfirmSelect(m) if !m.no_wait => &[ConfirmSelectOk::ID],
            Self::TxSelect(_) => &[TxSelectOk::ID],
            Self::TxCommit(_) => &[TxCommitOk::ID],
            Self::TxRollback(_) => &[TxRollbackOk::ID],
            _ => NO_REPLY,
        }
    }

    /// Whether sending this method waits for a reply.
    #[must_use]
    pub fn is_synchronous_request(&self) -> bool { !self.expected_replies().is_empty() }

    /// Whether this method completes a request with the given replies.
    #[must_use]
    pub fn answers(&self, expected: &[MethodId]) -> bool { expected.contains(&self.id()) }
}

#[cfg(test)]
mod tests;
