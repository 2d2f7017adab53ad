//! Consumer callbacks and the values they receive.
//!
//! A [`Consumer`] is registered with
//! [`Channel::basic_consume`](crate::channel::Channel::basic_consume). Its
//! callbacks run on the connection's consumer work pool, one at a time per
//! channel and in the order the driver received the corresponding methods.

use async_trait::async_trait;
use bytes::Bytes;

use crate::{error::ShutdownSignal, exception::BoxError, protocol::BasicProperties};

/// Result returned by application callbacks.
pub type CallbackResult = Result<(), BoxError>;

/// Routing information attached to a delivered or fetched message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Envelope {
    /// Channel-scoped tag used to acknowledge the message.
    pub delivery_tag: u64,
    /// Whether the message was delivered before and not acknowledged.
    pub redelivered: bool,
    /// Exchange the message was published to.
    pub exchange: String,
    /// Routing key the message was published with.
    pub routing_key: String,
}

/// A message pushed to a consumer.
#[derive(Clone, Debug)]
pub struct Delivery {
    /// Routing information.
    pub envelope: Envelope,
    /// Content properties.
    pub properties: BasicProperties,
    /// Message body.
    pub body: Bytes,
}

/// A message fetched with `basic.get`.
#[derive(Clone, Debug)]
pub struct GetResponse {
    /// Routing information.
    pub envelope: Envelope,
    /// Content properties.
    pub properties: BasicProperties,
    /// Message body.
    pub body: Bytes,
    /// Messages left in the queue after this one.
    pub message_count: u32,
}

/// Application callbacks for one consumer registration.
///
/// Only [`handle_delivery`](Consumer::handle_delivery) must be provided.
/// Returning an error or panicking hands the failure to the connection's
/// [`ExceptionHandler`](crate::exception::ExceptionHandler).
#[async_trait]
pub trait Consumer: Send + Sync + 'static {
    /// The broker confirmed the registration.
    async fn handle_consume_ok(&self, consumer_tag: &str) -> CallbackResult {
        let _ = consumer_tag;
        Ok(())
    }

    /// The registration was cancelled by the application.
    async fn handle_cancel_ok(&self, consumer_tag: &str) -> CallbackResult {
        let _ = consumer_tag;
        Ok(())
    }

    /// The broker cancelled the registration, for example because the queue
    /// was deleted.
    async fn handle_cancel(&self, consumer_tag: &str) -> CallbackResult {
        let _ = consumer_tag;
        Ok(())
    }

    /// The channel or connection shut down.
    async fn handle_shutdown_signal(
        &self,
        consumer_tag: &str,
        signal: &ShutdownSignal,
    ) -> CallbackResult {
        let _ = (consumer_tag, signal);
        Ok(())
    }

    /// A `basic.recover` issued on the channel completed.
    async fn handle_recover_ok(&self, consumer_tag: &str) -> CallbackResult {
        let _ = consumer_tag;
        Ok(())
    }

    /// A message arrived.
    async fn handle_delivery(&self, consumer_tag: &str, delivery: Delivery) -> CallbackResult;
}
