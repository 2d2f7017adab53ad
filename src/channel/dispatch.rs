//! Inbound command handling, run by the connection driver.
//!
//! Nothing here calls application code directly: consumer callbacks and
//! listeners are queued on the channel's work queue so that they may issue
//! channel operations of their own.

use std::{future::Future, sync::Arc};

use bytes::Bytes;
use futures::FutureExt;
use tracing::{debug, warn};

use super::{
    Channel,
    listeners::{ConfirmEvent, ListenerSet, ReturnedMessage},
    state::{ChannelInner, Lifecycle, PendingAction},
};
use crate::{
    command::Command,
    consumer::{CallbackResult, Consumer, Delivery, Envelope},
    error::{ShutdownReason, ShutdownSignal},
    exception::{CallbackError, ExceptionHandler},
    frame::Frame,
    panic::{guard, guard_async},
    protocol::{
        ContentHeader,
        Method,
        method::{BasicCancel, BasicCancelOk, BasicDeliver, BasicReturn, ChannelClose, ChannelCloseOk, ChannelFlowOk},
    },
};

/// A consumer callback queued for the work pool.
pub(crate) enum ConsumerEvent {
    ConsumeOk,
    CancelOk,
    Cancel,
    RecoverOk,
    Delivery(Delivery),
}

impl ConsumerEvent {
    fn method_name(&self) -> &'static str {
        match self {
            Self::ConsumeOk => "handle_consume_ok",
            Self::CancelOk => "handle_cancel_ok",
            Self::Cancel => "handle_cancel",
            Self::RecoverOk => "handle_recover_ok",
            Self::Delivery(_) => "handle_delivery",
        }
    }

    async fn deliver(self, consumer: &dyn Consumer, consumer_tag: &str) -> CallbackResult {
        match self {
            Self::ConsumeOk => consumer.handle_consume_ok(consumer_tag).await,
            Self::CancelOk => consumer.handle_cancel_ok(consumer_tag).await,
            Self::Cancel => consumer.handle_cancel(consumer_tag).await,
            Self::RecoverOk => consumer.handle_recover_ok(consumer_tag).await,
            Self::Delivery(delivery) => consumer.handle_delivery(consumer_tag, delivery).await,
        }
    }
}

fn missing_content(method: &str) -> ShutdownReason {
    ShutdownReason::Protocol(format!("{method} arrived without content"))
}

impl Channel {
    /// Feed one inbound frame and handle the command it completes, if any.
    ///
    /// # Errors
    ///
    /// Returns the reason to shut the connection down when the frame breaks
    /// the protocol or a required reply cannot be written.
    pub(crate) async fn handle_frame(&self, frame: Frame) -> Result<(), ShutdownReason> {
        match self.inner.assemble(frame)? {
            Some(command) => self.handle_command(command).await,
            None => Ok(()),
        }
    }

    async fn handle_command(&self, command: Command) -> Result<(), ShutdownReason> {
        let lifecycle = self.inner.state().lifecycle;
        let (method, content) = command.into_parts();
        if let Method::ChannelClose(close) = method {
            return self.handle_broker_close(close, lifecycle).await;
        }
        if matches!(lifecycle, Lifecycle::Closing | Lifecycle::Closed) {
            if matches!(method, Method::ChannelCloseOk(_)) {
                return self.complete_rpc(Command::from_parts(method, content));
            }
            debug!(
                channel = self.inner.number(),
                method = method.name(),
                "discarding command on closing channel"
            );
            return Ok(());
        }
        match method {
            Method::BasicDeliver(deliver) => {
                let (header, body) = content.ok_or_else(|| missing_content("basic.deliver"))?;
                self.handle_deliver(deliver, header, body);
                Ok(())
            }
            Method::BasicReturn(returned) => {
                let (header, body) = content.ok_or_else(|| missing_content("basic.return"))?;
                self.handle_return(returned, header, body);
                Ok(())
            }
            Method::BasicAck(ack) => {
                self.handle_confirm(ConfirmEvent::Ack {
                    delivery_tag: ack.delivery_tag,
                    multiple: ack.multiple,
                });
                Ok(())
            }
            Method::BasicNack(nack) => {
                self.handle_confirm(ConfirmEvent::Nack {
                    delivery_tag: nack.delivery_tag,
                    multiple: nack.multiple,
                });
                Ok(())
            }
            Method::ChannelFlow(flow) => self.handle_flow(flow.active).await,
            Method::BasicCancel(cancel) => self.handle_server_cancel(cancel).await,
            other => self.complete_rpc(Command::from_parts(other, content)),
        }
    }

    async fn handle_broker_close(
        &self,
        close: ChannelClose,
        lifecycle: Lifecycle,
    ) -> Result<(), ShutdownReason> {
        if lifecycle == Lifecycle::Closing {
            debug!(
                channel = self.inner.number(),
                reply_code = close.reply_code,
                "close crossed ours; awaiting channel.close-ok"
            );
            return self
                .quiescing_transmit(ChannelCloseOk)
                .await
                .map_err(ShutdownReason::from);
        }
        debug!(
            channel = self.inner.number(),
            reply_code = close.reply_code,
            reply_text = %close.reply_text,
            "channel closed by broker"
        );
        let signal = ShutdownSignal::channel(ShutdownReason::ChannelException(close), false);
        self.process_shutdown(&signal, Lifecycle::Closed);
        let sent = self.quiescing_transmit(ChannelCloseOk).await;
        self.release();
        sent.map_err(ShutdownReason::from)
    }

    /// Hand a reply to the waiting request and apply its follow-up work.
    pub(crate) fn complete_rpc(&self, command: Command) -> Result<(), ShutdownReason> {
        let pending = self
            .inner
            .state()
            .active_rpc
            .take_if(|continuation| continuation.accepts(command.method()));
        let Some(mut continuation) = pending else {
            return Err(ShutdownReason::Protocol(format!(
                "unexpected {} on channel {}",
                command.method().name(),
                self.inner.number()
            )));
        };
        let consumer_tag = match command.method() {
            Method::BasicConsumeOk(ok) => Some(ok.consumer_tag.clone()),
            Method::BasicCancelOk(ok) => Some(ok.consumer_tag.clone()),
            _ => None,
        };
        // Consumer registration must be visible before the caller resumes.
        self.apply(continuation.take_action(), consumer_tag);
        continuation.complete(command);
        Ok(())
    }

    fn apply(&self, action: PendingAction, consumer_tag: Option<String>) {
        match (action, consumer_tag) {
            (PendingAction::Consume(consumer), Some(tag)) => {
                self.inner
                    .state()
                    .consumers
                    .insert(tag.clone(), consumer.clone());
                self.dispatch_consumer(consumer, tag, ConsumerEvent::ConsumeOk);
            }
            (PendingAction::Cancel, Some(tag)) => {
                let removed = self.inner.state().consumers.remove(&tag);
                if let Some(consumer) = removed {
                    self.dispatch_consumer(consumer, tag, ConsumerEvent::CancelOk);
                }
            }
            (PendingAction::Recover, _) => {
                let mut consumers: Vec<_> = self
                    .inner
                    .state()
                    .consumers
                    .iter()
                    .map(|(tag, consumer)| (tag.clone(), consumer.clone()))
                    .collect();
                consumers.sort_by(|(a, _), (b, _)| a.cmp(b));
                for (tag, consumer) in consumers {
                    self.dispatch_consumer(consumer, tag, ConsumerEvent::RecoverOk);
                }
            }
            _ => {}
        }
    }

    fn handle_deliver(&self, deliver: BasicDeliver, header: ContentHeader, body: Bytes) {
        let BasicDeliver {
            consumer_tag,
            delivery_tag,
            redelivered,
            exchange,
            routing_key,
        } = deliver;
        let delivery = Delivery {
            envelope: Envelope {
                delivery_tag,
                redelivered,
                exchange,
                routing_key,
            },
            properties: header.properties,
            body,
        };
        let consumer = {
            let state = self.inner.state();
            state
                .consumers
                .get(&consumer_tag)
                .or(state.default_consumer.as_ref())
                .cloned()
        };
        if let Some(consumer) = consumer {
            self.dispatch_consumer(consumer, consumer_tag, ConsumerEvent::Delivery(delivery));
            return;
        }
        debug!(
            channel = self.inner.number(),
            consumer_tag = %consumer_tag,
            delivery_tag,
            "no consumer for delivery"
        );
        let channel = self.clone();
        self.enqueue(async move {
            channel
                .core
                .exception_handler
                .handle_unknown_consumer(&channel, &consumer_tag, delivery_tag);
        });
    }

    fn handle_return(&self, returned: BasicReturn, header: ContentHeader, body: Bytes) {
        if self.inner.return_listeners.is_empty() {
            debug!(
                channel = self.inner.number(),
                reply_code = returned.reply_code,
                "returned message with no listener"
            );
            return;
        }
        let message = ReturnedMessage {
            reply_code: returned.reply_code,
            reply_text: returned.reply_text,
            exchange: returned.exchange,
            routing_key: returned.routing_key,
            properties: header.properties,
            body,
        };
        self.run_listeners(
            |inner| &inner.return_listeners,
            message,
            |listener, message| listener(message),
            |handler, channel, error| handler.handle_return_listener_error(channel, error),
        );
    }

    fn handle_confirm(&self, event: ConfirmEvent) {
        let (delivery_tag, multiple, acked) = match event {
            ConfirmEvent::Ack {
                delivery_tag,
                multiple,
            } => (delivery_tag, multiple, true),
            ConfirmEvent::Nack {
                delivery_tag,
                multiple,
            } => (delivery_tag, multiple, false),
        };
        {
            let mut state = self.inner.state();
            if state.confirm_mode {
                state.confirms.resolve(delivery_tag, multiple, acked);
            } else {
                warn!(
                    channel = self.inner.number(),
                    delivery_tag, "confirm received outside confirm mode"
                );
            }
        }
        self.inner.confirm_signal.notify_waiters();
        if !self.inner.confirm_listeners.is_empty() {
            self.run_listeners(
                |inner| &inner.confirm_listeners,
                event,
                |listener, event| listener(*event),
                |handler, channel, error| handler.handle_confirm_listener_error(channel, error),
            );
        }
    }

    async fn handle_flow(&self, active: bool) -> Result<(), ShutdownReason> {
        self.inner.state().flow_active = active;
        debug!(channel = self.inner.number(), active, "channel.flow");
        self.quiescing_transmit(ChannelFlowOk { active })
            .await
            .map_err(ShutdownReason::from)?;
        if !self.inner.flow_listeners.is_empty() {
            self.run_listeners(
                |inner| &inner.flow_listeners,
                active,
                |listener, active| listener(*active),
                |handler, channel, error| handler.handle_flow_listener_error(channel, error),
            );
        }
        Ok(())
    }

    async fn handle_server_cancel(&self, cancel: BasicCancel) -> Result<(), ShutdownReason> {
        let BasicCancel {
            consumer_tag,
            no_wait,
        } = cancel;
        let removed = self.inner.state().consumers.remove(&consumer_tag);
        debug!(
            channel = self.inner.number(),
            consumer_tag = %consumer_tag,
            "consumer cancelled by broker"
        );
        if !no_wait {
            self.quiescing_transmit(BasicCancelOk {
                consumer_tag: consumer_tag.clone(),
            })
            .await
            .map_err(ShutdownReason::from)?;
        }
        if let Some(consumer) = removed {
            self.dispatch_consumer(consumer, consumer_tag, ConsumerEvent::Cancel);
        }
        Ok(())
    }

    /// Queue a consumer callback; failures go to the exception handler.
    pub(crate) fn dispatch_consumer(
        &self,
        consumer: Arc<dyn Consumer>,
        consumer_tag: String,
        event: ConsumerEvent,
    ) {
        let channel = self.clone();
        self.enqueue(async move {
            let method_name = event.method_name();
            if let Err(error) = guard_async(event.deliver(consumer.as_ref(), &consumer_tag)).await {
                channel.core.exception_handler.handle_consumer_error(
                    &channel,
                    &error,
                    &consumer_tag,
                    method_name,
                );
            }
        });
    }

    /// Queue a job running every listener of one kind with `event`.
    fn run_listeners<F, E>(
        &self,
        select: fn(&ChannelInner) -> &ListenerSet<F>,
        event: E,
        invoke: fn(&F, &E) -> CallbackResult,
        report: fn(&dyn ExceptionHandler, &Channel, &CallbackError),
    ) where
        F: ?Sized + Send + Sync + 'static,
        E: Send + 'static,
    {
        let channel = self.clone();
        self.enqueue(async move {
            let handler = channel.core.exception_handler.clone();
            for listener in select(&channel.inner).snapshot() {
                if let Err(error) = guard(|| invoke(listener.as_ref(), &event)) {
                    report(handler.as_ref(), &channel, &error);
                }
            }
        });
    }

    pub(crate) fn enqueue(&self, job: impl Future<Output = ()> + Send + 'static) {
        self.core
            .work
            .submit(&self.inner.queue, Box::new(move || job.boxed()));
    }
}
