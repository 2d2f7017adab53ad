//! Connection shutdown.
//!
//! Whatever starts it, shutdown installs one [`ShutdownSignal`] on the
//! connection, fails every outstanding request with it and closes every
//! channel. Later attempts observe the installed signal instead.

use std::{sync::Arc, sync::atomic::Ordering, time::Duration};

use log::info;

use super::{Connection, ConnectionCore, ConnectionState};
use crate::{
    error::{Error, Result, ShutdownReason, ShutdownSignal},
    metrics,
    panic::{guard, lock},
    protocol::reply_code,
};

impl ConnectionCore {
    /// Install `signal` and propagate it to every channel.
    ///
    /// Returns the installed signal, or the one an earlier shutdown
    /// installed.
    pub(crate) fn shutdown(self: &Arc<Self>, signal: ShutdownSignal) -> Result<ShutdownSignal, ShutdownSignal> {
        {
            let mut state = lock(&self.state);
            if let Some(existing) = &state.shutdown {
                return Err(existing.clone());
            }
            state.shutdown = Some(signal.clone());
            state.lifecycle = ConnectionState::Quiescing;
        }
        tracing::debug!(peer = %self.peer, %signal, "connection shutting down");
        self.manager
            .handle_signal(self, &signal, self.config.shutdown_grace_value());
        Ok(signal)
    }

    /// The installed signal, installing one built from `reason` if none is.
    pub(crate) fn shutdown_with(self: &Arc<Self>, reason: ShutdownReason) -> ShutdownSignal {
        self.shutdown(ShutdownSignal::connection(reason, false))
            .unwrap_or_else(|existing| existing)
    }

    pub(super) fn set_broker_initiated(&self) { lock(&self.state).broker_initiated = true; }

    pub(super) fn broker_initiated(&self) -> bool { lock(&self.state).broker_initiated }

    /// Give up on a connection whose negotiation failed.
    pub(super) async fn abandon(self: &Arc<Self>, error: &Error) {
        let reason = match error {
            Error::AlreadyClosed(signal) => signal.reason().clone(),
            other => ShutdownReason::Protocol(other.to_string()),
        };
        self.shutdown_with(reason);
        self.transport_close.cancel();
        self.finished.cancelled().await;
    }

    /// Final bookkeeping once the driver has stopped reading.
    pub(super) async fn finish(self: &Arc<Self>) {
        let limit = self.config.closing_timeout_value();
        match tokio::time::timeout(limit, self.writer.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => tracing::debug!(%error, "transport shutdown failed"),
            Err(_) => tracing::debug!("transport shutdown timed out"),
        }
        let signal = self.shutdown_with(ShutdownReason::EndOfStream);
        self.channel0.fail_rpc(&signal);
        let opened = {
            let mut state = lock(&self.state);
            state.lifecycle = ConnectionState::Closed;
            state.opened
        };
        self.fire_shutdown_listeners(&signal);
        if opened {
            metrics::dec_connections();
        }
        info!(
            "connection closed: peer={}, reason={}",
            self.peer,
            signal.reason()
        );
        self.finished.cancel();
    }

    fn fire_shutdown_listeners(&self, signal: &ShutdownSignal) {
        if self.listeners_fired.swap(true, Ordering::AcqRel) {
            return;
        }
        for listener in self.shutdown_listeners.snapshot() {
            if let Err(error) = guard(|| listener(signal)) {
                self.exception_handler.handle_shutdown_listener_error(&error);
            }
        }
    }
}

impl Connection {
    /// Close the connection with `200 OK`, waiting up to the configured
    /// closing timeout for the broker to confirm.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyClosed`] if the connection had already begun
    /// shutting down and [`Error::TimedOut`] if the broker does not answer
    /// in time. The transport is closed either way.
    pub async fn close(&self) -> Result<()> {
        let timeout = self.core.config.closing_timeout_value();
        self.close_with(reply_code::REPLY_SUCCESS, "OK", Some(timeout))
            .await
    }

    /// Close the connection with the given reply code and text.
    ///
    /// `None` waits for `connection.close-ok` without limit.
    ///
    /// # Errors
    ///
    /// See [`Connection::close`].
    pub async fn close_with(
        &self,
        reply_code: u16,
        reply_text: &str,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let signal = ShutdownSignal::connection(
            ShutdownReason::Application {
                reply_code,
                reply_text: reply_text.to_owned(),
            },
            true,
        );
        let signal = self.core.shutdown(signal).map_err(Error::AlreadyClosed)?;
        let channel0 = self.core.channel0();
        let exchange = async {
            tokio::select! {
                biased;
                reply = channel0.quiescing_rpc(signal.connection_close()) => reply.map(drop),
                () = self.core.finished.cancelled() => Ok(()),
            }
        };
        let outcome = match timeout {
            Some(limit) => tokio::time::timeout(limit, exchange)
                .await
                .unwrap_or(Err(Error::TimedOut("connection.close-ok"))),
            None => exchange.await,
        };
        self.core.transport_close.cancel();
        self.core.finished.cancelled().await;
        match outcome {
            Err(Error::AlreadyClosed(cause)) if cause.same_as(&signal) => Ok(()),
            other => other,
        }
    }

    /// Close the connection with `200 OK`, ignoring failures.
    pub async fn abort(&self) {
        let timeout = self.core.config.closing_timeout_value();
        self.abort_with(reply_code::REPLY_SUCCESS, "OK", Some(timeout))
            .await;
    }

    /// Close the connection with the given reply code and text, ignoring
    /// failures.
    pub async fn abort_with(&self, reply_code: u16, reply_text: &str, timeout: Option<Duration>) {
        if let Err(error) = self.close_with(reply_code, reply_text, timeout).await {
            tracing::debug!(peer = %self, %error, "abort swallowed error");
        }
    }
}
