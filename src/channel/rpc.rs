//! Request/reply plumbing shared by every channel operation.
//!
//! A synchronous request installs a continuation in the channel's single
//! RPC slot, writes the method and awaits the reply the driver routes back.
//! Asynchronous methods are simply transmitted.

use std::future::Future;

use tokio::sync::oneshot;

use super::{
    Channel,
    state::{PendingAction, Reply},
};
use crate::{
    command::Command,
    error::{Error, Result},
    protocol::{Method, MethodId},
};

/// Unwrap the expected reply variant from a completed RPC.
macro_rules! expect_reply {
    ($command:expr, $variant:ident) => {
        match $command.into_parts() {
            ($crate::protocol::Method::$variant(reply), _) => Ok(reply),
            (other, _) => Err($crate::channel::unexpected_reply(&other)),
        }
    };
}
pub(crate) use expect_reply;

pub(crate) fn unexpected_reply(method: &Method) -> Error {
    Error::Protocol(format!("unexpected reply {}", method.name()))
}

impl Channel {
    /// Send a synchronous request and await its reply.
    pub(crate) async fn rpc(&self, method: impl Into<Method>) -> Result<Command> {
        self.rpc_with(method.into(), PendingAction::None, false).await
    }

    /// Send a synchronous request whose reply triggers `action` in the driver.
    ///
    /// With `quiescing` set the request is sent even though the channel has
    /// started shutting down; only `channel.close` uses this.
    pub(crate) async fn rpc_with(
        &self,
        method: Method,
        action: PendingAction,
        quiescing: bool,
    ) -> Result<Command> {
        if !quiescing {
            self.core.ensure_open()?;
        }
        let pending = self.inner.install_continuation(
            method.name(),
            method.expected_replies(),
            action,
            quiescing,
        )?;
        if let Err(error) = self.core.send(self.inner.number(), &Command::new(method)).await {
            self.inner.abandon_continuation(&pending);
            return Err(error);
        }
        self.await_reply(pending.receiver).await
    }

    /// Send a synchronous request after shutdown has begun.
    pub(crate) async fn quiescing_rpc(&self, method: impl Into<Method>) -> Result<Command> {
        self.rpc_with(method.into(), PendingAction::None, true).await
    }

    /// Await a method the peer sends unprompted once `trigger` has run, as
    /// `connection.start` follows the protocol header.
    pub(crate) async fn expect_after(
        &self,
        attempted: &'static str,
        expected: &'static [MethodId],
        trigger: impl Future<Output = Result<()>>,
    ) -> Result<Command> {
        let pending =
            self.inner
                .install_continuation(attempted, expected, PendingAction::None, false)?;
        if let Err(error) = trigger.await {
            self.inner.abandon_continuation(&pending);
            return Err(error);
        }
        self.await_reply(pending.receiver).await
    }

    async fn await_reply(&self, receiver: oneshot::Receiver<Reply>) -> Result<Command> {
        match receiver.await {
            Ok(Ok(command)) => Ok(command),
            Ok(Err(signal)) => Err(Error::AlreadyClosed(signal)),
            Err(_) => Err(self.closed_error()),
        }
    }

    /// The error reported once the channel stopped answering.
    pub(crate) fn closed_error(&self) -> Error {
        self.inner.shutdown_cause().map_or_else(
            || Error::Protocol(format!("channel {} dropped its reply", self.inner.number())),
            Error::AlreadyClosed,
        )
    }

    /// Send a command that expects no reply.
    pub(crate) async fn transmit(&self, command: Command) -> Result<()> {
        self.core.ensure_open()?;
        self.inner.state().ensure_open()?;
        self.core.send(self.inner.number(), &command).await
    }

    /// Send a method regardless of shutdown state, as the close handshake
    /// requires.
    pub(crate) async fn quiescing_transmit(&self, method: impl Into<Method>) -> Result<()> {
        self.core
            .send(self.inner.number(), &Command::new(method))
            .await
    }

    /// Send `method` and await its reply if it has one.
    ///
    /// Requests sent with `no-wait` return `None` once written.
    pub(crate) async fn call(&self, method: impl Into<Method>) -> Result<Option<Command>> {
        let method = method.into();
        if method.is_synchronous_request() {
            self.rpc_with(method, PendingAction::None, false)
                .await
                .map(Some)
        } else {
            self.transmit(Command::new(method)).await.map(|()| None)
        }
    }
}
