//! Handling of failures raised by application callbacks.
//!
//! The connection never lets an error from user code escape into the
//! driver. Failing or panicking consumers and listeners are reported to the
//! connection's [`ExceptionHandler`], which decides what to do with the
//! offending channel or connection.

use log::{error, warn};

use crate::{
    channel::Channel,
    connection::Connection,
    error::ShutdownReason,
    protocol::reply_code,
};

/// Boxed error returned by application callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure of one application callback.
#[derive(Debug, thiserror::Error)]
pub enum CallbackError {
    /// The callback returned an error.
    #[error("callback failed: {0}")]
    Failed(#[source] BoxError),
    /// The callback panicked.
    #[error("callback panicked: {0}")]
    Panicked(String),
}

/// Receives failures the connection cannot report through a return value.
///
/// Every method runs on the consumer work pool, never on the connection
/// driver, so implementations may call back into channel operations.
pub trait ExceptionHandler: Send + Sync + 'static {
    /// The driver hit a fatal error other than the broker closing the stream.
    fn handle_unexpected_connection_driver_error(
        &self,
        connection: &Connection,
        reason: &ShutdownReason,
    );

    /// A return listener failed.
    fn handle_return_listener_error(&self, channel: &Channel, error: &CallbackError);

    /// A confirm listener failed.
    fn handle_confirm_listener_error(&self, channel: &Channel, error: &CallbackError);

    /// A flow listener failed.
    fn handle_flow_listener_error(&self, channel: &Channel, error: &CallbackError);

    /// A blocked listener failed.
    fn handle_blocked_listener_error(&self, connection: &Connection, error: &CallbackError);

    /// A shutdown listener failed.
    fn handle_shutdown_listener_error(&self, error: &CallbackError) {
        warn!("shutdown listener failed: {error}");
    }

    /// A consumer callback failed.
    fn handle_consumer_error(
        &self,
        channel: &Channel,
        error: &CallbackError,
        consumer_tag: &str,
        method_name: &str,
    );

    /// A delivery arrived for a consumer tag with no registered consumer and
    /// the channel has no default consumer. The delivery has been dropped.
    fn handle_unknown_consumer(&self, channel: &Channel, consumer_tag: &str, delivery_tag: u64);
}

/// Logs every failure and closes channels whose callbacks fail with
/// `INTERNAL_ERROR`.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultExceptionHandler;

impl DefaultExceptionHandler {
    fn close_channel(channel: &Channel, what: &str, error: &CallbackError) {
        warn!(
            "closing channel {} after {what} failure: {error}",
            channel.channel_number()
        );
        let channel = channel.clone();
        let text = format!("closed due to {what} failure");
        tokio::spawn(async move {
            channel.abort_with(reply_code::INTERNAL_ERROR, &text).await;
        });
    }
}

impl ExceptionHandler for DefaultExceptionHandler {
    fn handle_unexpected_connection_driver_error(
        &self,
        connection: &Connection,
        reason: &ShutdownReason,
    ) {
        error!("connection driver failed: peer={connection}, reason={reason}");
    }

    fn handle_return_listener_error(&self, channel: &Channel, error: &CallbackError) {
        Self::close_channel(channel, "return listener", error);
    }

    fn handle_confirm_listener_error(&self, channel: &Channel, error: &CallbackError) {
        Self::close_channel(channel, "confirm listener", error);
    }

    fn handle_flow_listener_error(&self, channel: &Channel, error: &CallbackError) {
        Self::close_channel(channel, "flow listener", error);
    }

    fn handle_blocked_listener_error(&self, connection: &Connection, error: &CallbackError) {
        warn!("blocked listener failed: peer={connection}, error={error}");
    }

    fn handle_consumer_error(
        &self,
        channel: &Channel,
        error: &CallbackError,
        consumer_tag: &str,
        method_name: &str,
    ) {
        let what = format!("consumer {consumer_tag} {method_name}");
        Self::close_channel(channel, &what, error);
    }

    fn handle_unknown_consumer(&self, channel: &Channel, consumer_tag: &str, delivery_tag: u64) {
        warn!(
            "dropped delivery {delivery_tag} on channel {} for unknown consumer {consumer_tag}",
            channel.channel_number()
        );
    }
}
