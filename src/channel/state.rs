//! Per-channel state shared between the driver and channel handles.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use tokio::sync::{Notify, oneshot};

use super::{
    confirms::ConfirmTracker,
    listeners::{ConfirmListener, FlowListener, ListenerSet, ReturnListener, ShutdownListener},
};
use crate::{
    command::{Command, CommandAssembler},
    consumer::Consumer,
    error::{Error, Result, ShutdownReason, ShutdownSignal},
    frame::Frame,
    panic::lock,
    protocol::{Method, MethodId},
    work_pool::WorkQueue,
};

/// Where a channel is in its open/close exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    /// `channel.open` sent, awaiting `channel.open-ok`.
    Opening,
    /// Usable.
    Open,
    /// `channel.close` sent, awaiting `channel.close-ok`.
    Closing,
    /// Shut down.
    Closed,
}

/// Work to perform in the driver when a reply completes an RPC, before any
/// later frame on the channel is processed.
pub(crate) enum PendingAction {
    None,
    /// Register the consumer under the tag from `basic.consume-ok`.
    Consume(Arc<dyn Consumer>),
    /// Unregister the consumer named by `basic.cancel-ok`.
    Cancel,
    /// Tell every consumer about `basic.recover-ok`.
    Recover,
}

pub(crate) type Reply = std::result::Result<Command, ShutdownSignal>;

/// The single outstanding synchronous request of a channel.
pub(crate) struct Continuation {
    serial: u64,
    expected: &'static [MethodId],
    action: PendingAction,
    reply: oneshot::Sender<Reply>,
}

impl Continuation {
    pub(crate) fn accepts(&self, method: &Method) -> bool { method.answers(self.expected) }

    /// Detach the follow-up work so it can be applied before the caller
    /// observes the reply.
    pub(crate) fn take_action(&mut self) -> PendingAction {
        std::mem::replace(&mut self.action, PendingAction::None)
    }

    pub(crate) fn complete(self, command: Command) { let _ = self.reply.send(Ok(command)); }

    pub(crate) fn fail(self, signal: ShutdownSignal) {
        let _ = self.reply.send(Err(signal));
    }
}

/// Receiving end of an installed continuation.
#[derive(Debug)]
pub(crate) struct PendingReply {
    serial: u64,
    pub(crate) receiver: oneshot::Receiver<Reply>,
}

/// Mutable channel state, guarded by one mutex.
pub(crate) struct ChannelState {
    pub(crate) lifecycle: Lifecycle,
    pub(crate) active_rpc: Option<Continuation>,
    rpc_serial: u64,
    pub(crate) consumers: HashMap<String, Arc<dyn Consumer>>,
    pub(crate) default_consumer: Option<Arc<dyn Consumer>>,
    pub(crate) confirm_mode: bool,
    pub(crate) confirms: ConfirmTracker,
    pub(crate) tx_mode: bool,
    pub(crate) flow_active: bool,
    pub(crate) shutdown_cause: Option<ShutdownSignal>,
}

impl ChannelState {
    fn new(lifecycle: Lifecycle) -> Self {
        Self {
            lifecycle,
            active_rpc: None,
            rpc_serial: 0,
            consumers: HashMap::new(),
            default_consumer: None,
            confirm_mode: false,
            confirms: ConfirmTracker::default(),
            tx_mode: false,
            flow_active: true,
            shutdown_cause: None,
        }
    }

    /// Fail unless the channel accepts new operations.
    pub(crate) fn ensure_open(&self) -> Result<()> {
        match &self.shutdown_cause {
            Some(signal) => Err(Error::AlreadyClosed(signal.clone())),
            None => Ok(()),
        }
    }
}

/// Channel state owned by the channel manager and shared with handles.
pub(crate) struct ChannelInner {
    number: u16,
    state: Mutex<ChannelState>,
    assembler: Mutex<CommandAssembler>,
    pub(crate) publish_lock: tokio::sync::Mutex<()>,
    pub(crate) confirm_signal: Notify,
    pub(crate) queue: Arc<WorkQueue>,
    pub(crate) return_listeners: ListenerSet<ReturnListener>,
    pub(crate) confirm_listeners: ListenerSet<ConfirmListener>,
    pub(crate) flow_listeners: ListenerSet<FlowListener>,
    pub(crate) shutdown_listeners: ListenerSet<ShutdownListener>,
}

impl ChannelInner {
    pub(crate) fn new(number: u16, lifecycle: Lifecycle, queue: Arc<WorkQueue>) -> Self {
        Self {
            number,
            state: Mutex::new(ChannelState::new(lifecycle)),
            assembler: Mutex::new(CommandAssembler::new()),
            publish_lock: tokio::sync::Mutex::new(()),
            confirm_signal: Notify::new(),
            queue,
            return_listeners: ListenerSet::default(),
            confirm_listeners: ListenerSet::default(),
            flow_listeners: ListenerSet::default(),
            shutdown_listeners: ListenerSet::default(),
        }
    }

    pub(crate) fn number(&self) -> u16 { self.number }

    pub(crate) fn state(&self) -> MutexGuard<'_, ChannelState> { lock(&self.state) }

    /// Feed one inbound frame to the channel's assembler.
    pub(crate) fn assemble(&self, frame: Frame) -> std::result::Result<Option<Command>, ShutdownReason> {
        lock(&self.assembler)
            .handle_frame(frame)
            .map_err(|error| ShutdownReason::Protocol(format!("channel {}: {error}", self.number)))
    }

    /// Install a continuation awaiting one of `expected`.
    ///
    /// Unless `quiescing` is set the channel must not have shut down. The
    /// slot must be empty: a second concurrent request is refused with
    /// [`Error::ChannelUse`].
    pub(crate) fn install_continuation(
        &self,
        attempted: &'static str,
        expected: &'static [MethodId],
        action: PendingAction,
        quiescing: bool,
    ) -> Result<PendingReply> {
        let mut state = self.state();
        if !quiescing {
            state.ensure_open()?;
        }
        if state.active_rpc.is_some() {
            return Err(Error::ChannelUse {
                channel: self.number,
                attempted,
            });
        }
        state.rpc_serial += 1;
        let serial = state.rpc_serial;
        let (reply, receiver) = oneshot::channel();
        state.active_rpc = Some(Continuation {
            serial,
            expected,
            action,
            reply,
        });
        Ok(PendingReply { serial, receiver })
    }

    /// Drop the continuation after its request failed to reach the wire.
    ///
    /// The slot is left alone once it holds a later request's continuation.
    pub(crate) fn abandon_continuation(&self, pending: &PendingReply) {
        let mut state = self.state();
        if state
            .active_rpc
            .as_ref()
            .is_some_and(|continuation| continuation.serial == pending.serial)
        {
            state.active_rpc = None;
        }
    }

    /// Fail the outstanding request, if any, with `signal`.
    pub(crate) fn fail_rpc(&self, signal: &ShutdownSignal) {
        let pending = self.state().active_rpc.take();
        if let Some(continuation) = pending {
            continuation.fail(signal.clone());
        }
    }

    pub(crate) fn shutdown_cause(&self) -> Option<ShutdownSignal> { self.state().shutdown_cause.clone() }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;
    use crate::{
        protocol::{
            MethodArgs,
            method::{QueueDeclare, QueueDeclareOk},
        },
    };

    #[fixture]
    fn inner() -> ChannelInner {
        ChannelInner::new(7, Lifecycle::Open, Arc::new(WorkQueue::default()))
    }

    const DECLARE_OK: &[MethodId] = &[QueueDeclareOk::ID];

    #[rstest]
    fn second_rpc_is_refused(inner: ChannelInner) {
        let _first = inner
            .install_continuation("queue.declare", DECLARE_OK, PendingAction::None, false)
            .expect("first");
        let err = inner
            .install_continuation("queue.declare", DECLARE_OK, PendingAction::None, false)
            .expect_err("second");
        assert!(matches!(err, Error::ChannelUse { channel: 7, .. }));
    }

    #[rstest]
    #[tokio::test]
    async fn failing_the_rpc_delivers_the_signal(inner: ChannelInner) {
        let pending = inner
            .install_continuation("queue.declare", DECLARE_OK, PendingAction::None, false)
            .expect("install");
        let signal = ShutdownSignal::channel(ShutdownReason::EndOfStream, false);
        inner.fail_rpc(&signal);
        let reply = pending.receiver.await.expect("sent");
        assert!(reply.is_err_and(|received| received.same_as(&signal)));
        assert!(inner.state().active_rpc.is_none());
    }

    #[rstest]
    fn abandoning_a_replaced_continuation_keeps_the_new_one(inner: ChannelInner) {
        let stale = inner
            .install_continuation("queue.declare", DECLARE_OK, PendingAction::None, false)
            .expect("install");
        inner.fail_rpc(&ShutdownSignal::channel(ShutdownReason::EndOfStream, false));
        let _close = inner
            .install_continuation("channel.close", DECLARE_OK, PendingAction::None, true)
            .expect("close installed");

        inner.abandon_continuation(&stale);
        assert!(inner.state().active_rpc.is_some());
    }

    #[rstest]
    fn abandoning_the_current_continuation_frees_the_slot(inner: ChannelInner) {
        let pending = inner
            .install_continuation("queue.declare", DECLARE_OK, PendingAction::None, false)
            .expect("install");
        inner.abandon_continuation(&pending);
        assert!(inner.state().active_rpc.is_none());
    }

    #[rstest]
    fn closed_channel_refuses_unless_quiescing(inner: ChannelInner) {
        inner.state().shutdown_cause = Some(ShutdownSignal::channel(
            ShutdownReason::MissedHeartbeat,
            false,
        ));
        assert!(matches!(
            inner.install_continuation("queue.declare", DECLARE_OK, PendingAction::None, false),
            Err(Error::AlreadyClosed(_))
        ));
        assert!(
            inner
                .install_continuation("channel.close", DECLARE_OK, PendingAction::None, true)
                .is_ok()
        );
    }

    #[test]
    fn continuation_accepts_expected_reply() {
        let (reply, _receiver) = oneshot::channel();
        let continuation = Continuation {
            serial: 1,
            expected: DECLARE_OK,
            action: PendingAction::None,
            reply,
        };
        assert!(continuation.accepts(&QueueDeclareOk::default().into()));
        assert!(!continuation.accepts(&QueueDeclare::default().into()));
    }
}
