//! Channels multiplexed over one connection.
//!
//! A [`Channel`] is a cheap, cloneable handle. Every clone refers to the same
//! channel state, which the connection's channel manager owns until the
//! channel closes. Synchronous operations hold the channel's single RPC slot
//! for their duration; starting a second one concurrently is refused with
//! [`Error::ChannelUse`].

use std::{fmt, sync::Arc, time::Duration};

use bytes::Bytes;
use futures::FutureExt;
use tokio::time::Instant;

mod confirms;
mod dispatch;
mod listeners;
mod rpc;
mod state;

pub use confirms::ConfirmOutcome;
use dispatch::ConsumerEvent;
pub use listeners::{
    BlockedEvent,
    BlockedListener,
    ConfirmEvent,
    ConfirmListener,
    FlowListener,
    ListenerId,
    ReturnListener,
    ReturnedMessage,
    ShutdownListener,
};
pub(crate) use listeners::ListenerSet;
pub(crate) use rpc::{expect_reply, unexpected_reply};
pub use state::Lifecycle;
pub(crate) use state::ChannelInner;
use state::PendingAction;

use crate::{
    command::Command,
    connection::{Connection, ConnectionCore},
    consumer::{CallbackResult, Consumer, Envelope, GetResponse},
    error::{self, Error, Result, ShutdownReason, ShutdownSignal},
    panic::{guard, guard_async},
    protocol::{
        BasicProperties,
        Method,
        method::{
            BasicAck,
            BasicCancel,
            BasicConsume,
            BasicGet,
            BasicNack,
            BasicPublish,
            BasicQos,
            BasicRecover,
            BasicReject,
            ChannelFlow,
            ChannelOpen,
            ConfirmSelect,
            ExchangeBind,
            ExchangeDeclare,
            ExchangeDelete,
            ExchangeUnbind,
            QueueBind,
            QueueDeclare,
            QueueDeclareOk,
            QueueDelete,
            QueuePurge,
            QueueUnbind,
            TxCommit,
            TxRollback,
            TxSelect,
        },
        reply_code,
    },
};

/// Handle to one AMQP channel.
#[derive(Clone)]
pub struct Channel {
    core: Arc<ConnectionCore>,
    inner: Arc<ChannelInner>,
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("number", &self.inner.number())
            .field("lifecycle", &self.inner.state().lifecycle)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel {}", self.inner.number())
    }
}

impl Channel {
    pub(crate) fn new(core: Arc<ConnectionCore>, inner: Arc<ChannelInner>) -> Self {
        Self { core, inner }
    }

    /// The channel number on the connection.
    #[must_use]
    pub fn channel_number(&self) -> u16 { self.inner.number() }

    /// The connection this channel belongs to.
    #[must_use]
    pub fn connection(&self) -> Connection { Connection::from_core(self.core.clone()) }

    /// Whether the channel still accepts operations.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.inner.state().shutdown_cause.is_none() && self.core.ensure_open().is_ok()
    }

    /// Why the channel shut down, once it has.
    #[must_use]
    pub fn close_reason(&self) -> Option<ShutdownSignal> { self.inner.shutdown_cause() }

    /// Sequence number the next publish will get in confirm mode.
    #[must_use]
    pub fn next_publish_seq_no(&self) -> u64 {
        let state = self.inner.state();
        if state.confirm_mode {
            state.confirms.next_publish_seq()
        } else {
            0
        }
    }

    /// Publishes awaiting a confirm.
    #[must_use]
    pub fn unconfirmed_count(&self) -> usize { self.inner.state().confirms.unconfirmed_count() }

    /// Whether the broker last asked the channel to be active.
    #[must_use]
    pub fn is_flow_active(&self) -> bool { self.inner.state().flow_active }

    /// Receive deliveries addressed to consumer tags with no registration.
    pub fn set_default_consumer(&self, consumer: Option<Arc<dyn Consumer>>) {
        self.inner.state().default_consumer = consumer;
    }

    /// Register a listener for messages returned by the broker.
    pub fn add_return_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ReturnedMessage) -> CallbackResult + Send + Sync + 'static,
    {
        self.inner.return_listeners.add(Arc::new(listener))
    }

    /// Remove a return listener; returns whether it was registered.
    pub fn remove_return_listener(&self, id: ListenerId) -> bool {
        self.inner.return_listeners.remove(id)
    }

    /// Register a listener for publisher confirms.
    pub fn add_confirm_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(ConfirmEvent) -> CallbackResult + Send + Sync + 'static,
    {
        self.inner.confirm_listeners.add(Arc::new(listener))
    }

    /// Remove a confirm listener; returns whether it was registered.
    pub fn remove_confirm_listener(&self, id: ListenerId) -> bool {
        self.inner.confirm_listeners.remove(id)
    }

    /// Register a listener for `channel.flow` requests from the broker.
    pub fn add_flow_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(bool) -> CallbackResult + Send + Sync + 'static,
    {
        self.inner.flow_listeners.add(Arc::new(listener))
    }

    /// Remove a flow listener; returns whether it was registered.
    pub fn remove_flow_listener(&self, id: ListenerId) -> bool {
        self.inner.flow_listeners.remove(id)
    }

    /// Register a listener fired once when the channel shuts down.
    pub fn add_shutdown_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ShutdownSignal) -> CallbackResult + Send + Sync + 'static,
    {
        self.inner.shutdown_listeners.add(Arc::new(listener))
    }

    /// Remove a shutdown listener; returns whether it was registered.
    pub fn remove_shutdown_listener(&self, id: ListenerId) -> bool {
        self.inner.shutdown_listeners.remove(id)
    }

    /// Perform the `channel.open` exchange.
    pub(crate) async fn open(&self) -> Result<()> {
        self.rpc(ChannelOpen).await?;
        self.inner.state().lifecycle = Lifecycle::Open;
        Ok(())
    }

    /// Record `signal` as the channel's shutdown cause and queue the final
    /// callbacks.
    ///
    /// Any outstanding request fails with `signal`. Returns `false` if the
    /// channel had already shut down, in which case only the lifecycle may
    /// advance to `next`.
    pub(crate) fn process_shutdown(&self, signal: &ShutdownSignal, next: Lifecycle) -> bool {
        let consumers = {
            let mut state = self.inner.state();
            if state.shutdown_cause.is_some() {
                if next == Lifecycle::Closed {
                    state.lifecycle = Lifecycle::Closed;
                }
                None
            } else {
                state.shutdown_cause = Some(signal.clone());
                state.lifecycle = next;
                let mut consumers: Vec<_> = state.consumers.drain().collect();
                consumers.sort_by(|(a, _), (b, _)| a.cmp(b));
                Some(consumers)
            }
        };
        self.inner.fail_rpc(signal);
        let Some(consumers) = consumers else {
            return false;
        };
        self.inner.confirm_signal.notify_waiters();

        let channel = self.clone();
        let signal = signal.clone();
        self.core.work.submit_final(
            &self.inner.queue,
            Box::new(move || {
                async move {
                    let handler = channel.core.exception_handler.clone();
                    for (tag, consumer) in consumers {
                        let notified = guard_async(consumer.handle_shutdown_signal(&tag, &signal)).await;
                        if let Err(error) = notified {
                            handler.handle_consumer_error(
                                &channel,
                                &error,
                                &tag,
                                "handle_shutdown_signal",
                            );
                        }
                    }
                    for listener in channel.inner.shutdown_listeners.snapshot() {
                        if let Err(error) = guard(|| listener(&signal)) {
                            handler.handle_shutdown_listener_error(&error);
                        }
                    }
                }
                .boxed()
            }),
        );
        true
    }

    /// Return the channel number to the manager and retire the work queue.
    pub(crate) fn release(&self) {
        self.core.manager.release(&self.inner);
        self.core
            .work
            .unregister(self.inner.number(), &self.inner.queue);
    }

    /// Close the channel with `200 OK`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyClosed`] if the channel had already shut down
    /// and [`Error::TimedOut`] if the broker does not confirm the close within
    /// the connection's closing timeout.
    pub async fn close(&self) -> Result<()> {
        self.close_with(reply_code::REPLY_SUCCESS, "OK").await
    }

    /// Close the channel with the given reply code and text.
    ///
    /// # Errors
    ///
    /// See [`Channel::close`].
    pub async fn close_with(&self, reply_code: u16, reply_text: &str) -> Result<()> {
        self.close_inner(reply_code, reply_text).await
    }

    /// Close the channel with `200 OK`, ignoring failures.
    pub async fn abort(&self) { self.abort_with(reply_code::REPLY_SUCCESS, "OK").await; }

    /// Close the channel with the given reply code and text, ignoring
    /// failures.
    pub async fn abort_with(&self, reply_code: u16, reply_text: &str) {
        if let Err(error) = self.close_inner(reply_code, reply_text).await {
            tracing::debug!(channel = self.inner.number(), %error, "abort swallowed error");
        }
    }

    async fn close_inner(&self, reply_code: u16, reply_text: &str) -> Result<()> {
        let signal = ShutdownSignal::channel(
            ShutdownReason::Application {
                reply_code,
                reply_text: reply_text.to_owned(),
            },
            true,
        );
        if !self.process_shutdown(&signal, Lifecycle::Closing) {
            return Err(self.closed_error());
        }
        let exchange = async {
            self.core.ensure_open()?;
            let close = error::channel_close(reply_code, reply_text);
            let reply = self.rpc_with(close.into(), PendingAction::None, true);
            match tokio::time::timeout(self.core.config.closing_timeout_value(), reply).await {
                Ok(reply) => reply.map(drop),
                Err(_) => Err(Error::TimedOut("channel.close-ok")),
            }
        };
        let outcome = exchange.await;
        self.inner.state().lifecycle = Lifecycle::Closed;
        self.release();
        outcome
    }

    /// Declare an exchange.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::AlreadyClosed`] if the broker refuses the
    /// declaration, for example with `PRECONDITION_FAILED` when the exchange
    /// exists with another type.
    pub async fn exchange_declare(&self, declare: ExchangeDeclare) -> Result<()> {
        self.call(declare).await.map(drop)
    }

    /// Check that an exchange exists without creating it.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::AlreadyClosed`] carrying `NOT_FOUND` if it does
    /// not.
    pub async fn exchange_declare_passive(&self, exchange: &str) -> Result<()> {
        self.exchange_declare(ExchangeDeclare {
            exchange: exchange.to_owned(),
            passive: true,
            ..ExchangeDeclare::default()
        })
        .await
    }

    /// Delete an exchange.
    ///
    /// # Errors
    ///
    /// Fails if the channel has shut down or the broker refuses.
    pub async fn exchange_delete(&self, delete: ExchangeDelete) -> Result<()> {
        self.call(delete).await.map(drop)
    }

    /// Bind one exchange to another.
    ///
    /// # Errors
    ///
    /// Fails if the channel has shut down or the broker refuses.
    pub async fn exchange_bind(&self, bind: ExchangeBind) -> Result<()> {
        self.call(bind).await.map(drop)
    }

    /// Remove an exchange-to-exchange binding.
    ///
    /// # Errors
    ///
    /// Fails if the channel has shut down or the broker refuses.
    pub async fn exchange_unbind(&self, unbind: ExchangeUnbind) -> Result<()> {
        self.call(unbind).await.map(drop)
    }

    /// Declare a queue. An empty name asks the broker to generate one.
    ///
    /// With `no_wait` set nothing is awaited and the returned counts are zero.
    ///
    /// # Errors
    ///
    /// Fails if the channel has shut down or the broker refuses.
    pub async fn queue_declare(&self, declare: QueueDeclare) -> Result<QueueDeclareOk> {
        let queue = declare.queue.clone();
        match self.call(declare).await? {
            Some(reply) => expect_reply!(reply, QueueDeclareOk),
            None => Ok(QueueDeclareOk {
                queue,
                message_count: 0,
                consumer_count: 0,
            }),
        }
    }

    /// Check that a queue exists without creating it.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::AlreadyClosed`] carrying `NOT_FOUND` if it does
    /// not.
    pub async fn queue_declare_passive(&self, queue: &str) -> Result<QueueDeclareOk> {
        self.queue_declare(QueueDeclare {
            queue: queue.to_owned(),
            passive: true,
            ..QueueDeclare::default()
        })
        .await
    }

    /// Bind a queue to an exchange.
    ///
    /// # Errors
    ///
    /// Fails if the channel has shut down or the broker refuses.
    pub async fn queue_bind(&self, bind: QueueBind) -> Result<()> { self.call(bind).await.map(drop) }

    /// Remove a queue binding.
    ///
    /// # Errors
    ///
    /// Fails if the channel has shut down or the broker refuses.
    pub async fn queue_unbind(&self, unbind: QueueUnbind) -> Result<()> {
        self.call(unbind).await.map(drop)
    }

    /// Remove every ready message from a queue; returns how many were purged.
    ///
    /// # Errors
    ///
    /// Fails if the channel has shut down or the broker refuses.
    pub async fn queue_purge(&self, purge: QueuePurge) -> Result<u32> {
        match self.call(purge).await? {
            Some(reply) => expect_reply!(reply, QueuePurgeOk).map(|ok| ok.message_count),
            None => Ok(0),
        }
    }

    /// Delete a queue; returns how many messages it held.
    ///
    /// # Errors
    ///
    /// Fails if the channel has shut down or the broker refuses.
    pub async fn queue_delete(&self, delete: QueueDelete) -> Result<u32> {
        match self.call(delete).await? {
            Some(reply) => expect_reply!(reply, QueueDeleteOk).map(|ok| ok.message_count),
            None => Ok(0),
        }
    }

    /// Limit unacknowledged deliveries.
    ///
    /// # Errors
    ///
    /// Fails if the channel has shut down or the broker refuses.
    pub async fn basic_qos(&self, prefetch_size: u32, prefetch_count: u16, global: bool) -> Result<()> {
        self.rpc(BasicQos {
            prefetch_size,
            prefetch_count,
            global,
        })
        .await
        .map(drop)
    }

    /// Start a consumer; returns its consumer tag.
    ///
    /// An empty tag asks the broker to assign one, which requires awaiting
    /// `basic.consume-ok`; a `no_wait` consume must therefore name its tag.
    ///
    /// # Errors
    ///
    /// Fails if the channel has shut down, the broker refuses, or a `no_wait`
    /// consume has no tag.
    pub async fn basic_consume(
        &self,
        consume: BasicConsume,
        consumer: Arc<dyn Consumer>,
    ) -> Result<String> {
        if !consume.no_wait {
            let reply = self
                .rpc_with(consume.into(), PendingAction::Consume(consumer), false)
                .await?;
            return expect_reply!(reply, BasicConsumeOk).map(|ok| ok.consumer_tag);
        }
        if consume.consumer_tag.is_empty() {
            return Err(Error::Protocol(
                "a no-wait basic.consume must name its consumer tag".to_owned(),
            ));
        }
        let tag = consume.consumer_tag.clone();
        {
            let mut state = self.inner.state();
            state.ensure_open()?;
            state.consumers.insert(tag.clone(), consumer.clone());
        }
        if let Err(error) = self.transmit(Command::new(consume)).await {
            self.inner.state().consumers.remove(&tag);
            return Err(error);
        }
        self.dispatch_consumer(consumer, tag.clone(), ConsumerEvent::ConsumeOk);
        Ok(tag)
    }

    /// Cancel a consumer and await `basic.cancel-ok`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownConsumerTag`] if no consumer is registered
    /// under `consumer_tag`.
    pub async fn basic_cancel(&self, consumer_tag: &str) -> Result<()> {
        if !self.inner.state().consumers.contains_key(consumer_tag) {
            return Err(Error::UnknownConsumerTag(consumer_tag.to_owned()));
        }
        let cancel = BasicCancel {
            consumer_tag: consumer_tag.to_owned(),
            no_wait: false,
        };
        self.rpc_with(cancel.into(), PendingAction::Cancel, false)
            .await
            .map(drop)
    }

    /// Publish a message.
    ///
    /// In confirm mode the publish is assigned the next sequence number
    /// before it is written; publishes from one task reach the wire in call
    /// order.
    ///
    /// # Errors
    ///
    /// Fails if the channel has shut down or the frames cannot be written.
    pub async fn basic_publish(
        &self,
        publish: BasicPublish,
        properties: BasicProperties,
        body: impl Into<Bytes>,
    ) -> Result<()> {
        let command = Command::with_content(publish, properties, body.into());
        let _ordered = self.inner.publish_lock.lock().await;
        let seq = {
            let mut state = self.inner.state();
            state.ensure_open()?;
            if state.confirm_mode {
                Some(state.confirms.record_publish())
            } else {
                None
            }
        };
        let sent = self.transmit(command).await;
        if sent.is_err()
            && let Some(seq) = seq
        {
            self.inner.state().confirms.forget(seq);
        }
        sent
    }

    /// Fetch one message, or `None` if the queue is empty.
    ///
    /// # Errors
    ///
    /// Fails if the channel has shut down or the broker refuses.
    pub async fn basic_get(&self, queue: &str, no_ack: bool) -> Result<Option<GetResponse>> {
        let reply = self
            .rpc(BasicGet {
                queue: queue.to_owned(),
                no_ack,
            })
            .await?;
        match reply.into_parts() {
            (Method::BasicGetOk(ok), Some((header, body))) => Ok(Some(GetResponse {
                envelope: Envelope {
                    delivery_tag: ok.delivery_tag,
                    redelivered: ok.redelivered,
                    exchange: ok.exchange,
                    routing_key: ok.routing_key,
                },
                properties: header.properties,
                body,
                message_count: ok.message_count,
            })),
            (Method::BasicGetEmpty(_), _) => Ok(None),
            (other, _) => Err(rpc::unexpected_reply(&other)),
        }
    }

    /// Acknowledge one delivery, or every delivery up to `delivery_tag` when
    /// `multiple` is set.
    ///
    /// # Errors
    ///
    /// Fails if the channel has shut down.
    pub async fn basic_ack(&self, delivery_tag: u64, multiple: bool) -> Result<()> {
        self.transmit(Command::new(BasicAck {
            delivery_tag,
            multiple,
        }))
        .await
    }

    /// Reject one or more deliveries.
    ///
    /// # Errors
    ///
    /// Fails if the channel has shut down.
    pub async fn basic_nack(&self, delivery_tag: u64, multiple: bool, requeue: bool) -> Result<()> {
        self.transmit(Command::new(BasicNack {
            delivery_tag,
            multiple,
            requeue,
        }))
        .await
    }

    /// Reject one delivery.
    ///
    /// # Errors
    ///
    /// Fails if the channel has shut down.
    pub async fn basic_reject(&self, delivery_tag: u64, requeue: bool) -> Result<()> {
        self.transmit(Command::new(BasicReject {
            delivery_tag,
            requeue,
        }))
        .await
    }

    /// Ask the broker to redeliver unacknowledged messages.
    ///
    /// Every registered consumer is told once `basic.recover-ok` arrives.
    ///
    /// # Errors
    ///
    /// Fails if the channel has shut down or the broker refuses.
    pub async fn basic_recover(&self, requeue: bool) -> Result<()> {
        self.rpc_with(
            BasicRecover { requeue }.into(),
            PendingAction::Recover,
            false,
        )
        .await
        .map(drop)
    }

    /// Put the channel in transaction mode.
    ///
    /// # Errors
    ///
    /// Fails if the channel has shut down or the broker refuses.
    pub async fn tx_select(&self) -> Result<()> {
        self.rpc(TxSelect).await?;
        self.inner.state().tx_mode = true;
        Ok(())
    }

    /// Commit the current transaction.
    ///
    /// # Errors
    ///
    /// Fails if the channel has shut down or is not in transaction mode.
    pub async fn tx_commit(&self) -> Result<()> { self.rpc(TxCommit).await.map(drop) }

    /// Abandon the current transaction.
    ///
    /// # Errors
    ///
    /// Fails if the channel has shut down or is not in transaction mode.
    pub async fn tx_rollback(&self) -> Result<()> { self.rpc(TxRollback).await.map(drop) }

    /// Whether [`Channel::tx_select`] succeeded on this channel.
    #[must_use]
    pub fn is_transactional(&self) -> bool { self.inner.state().tx_mode }

    /// Put the channel in publisher-confirm mode.
    ///
    /// # Errors
    ///
    /// Fails if the channel has shut down, or is transactional.
    pub async fn confirm_select(&self) -> Result<()> {
        self.rpc(ConfirmSelect { no_wait: false }).await?;
        self.inner.state().confirm_mode = true;
        Ok(())
    }

    /// Ask the broker to stop (`false`) or resume (`true`) deliveries;
    /// returns the state the broker confirmed.
    ///
    /// # Errors
    ///
    /// Fails if the channel has shut down.
    pub async fn flow(&self, active: bool) -> Result<bool> {
        let reply = self.rpc(ChannelFlow { active }).await?;
        expect_reply!(reply, ChannelFlowOk).map(|ok| ok.active)
    }

    /// Wait until every publish is confirmed, a nack arrives, or `timeout`
    /// elapses.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInConfirmMode`] before [`Channel::confirm_select`],
    /// and [`Error::AlreadyClosed`] if the channel shuts down while waiting.
    pub async fn wait_for_confirms(&self, timeout: Duration) -> Result<ConfirmOutcome> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.inner.confirm_signal.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut state = self.inner.state();
                state.ensure_open()?;
                if !state.confirm_mode {
                    return Err(Error::NotInConfirmMode(self.inner.number()));
                }
                if let Some(outcome) = state.confirms.settle() {
                    return Ok(outcome);
                }
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(ConfirmOutcome::TimedOut);
            }
        }
    }
}
