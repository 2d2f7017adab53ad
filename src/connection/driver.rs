//! The connection driver: the one task that reads from the broker.
//!
//! The driver owns the read half of the stream. It routes channel-0 commands
//! itself and hands every other frame to its channel. It never runs
//! application code while frames are still flowing; callbacks go to the work
//! pool.

use std::sync::Arc;

use log::warn;
use tracing::debug;

use super::{Connection, ConnectionCore};
use crate::{
    channel::{BlockedEvent, Channel},
    command::Command,
    error::{ShutdownReason, ShutdownSignal},
    frame::{Frame, FrameType},
    metrics,
    panic::guard,
    protocol::{
        Method,
        method::{ConnectionClose, ConnectionCloseOk},
    },
    transport::FrameReader,
};

/// Whether the read loop should keep going.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// Drive the connection until the transport closes, then finish shutdown.
pub(super) async fn run(core: Arc<ConnectionCore>, mut reader: FrameReader) {
    let exit = read_loop(&core, &mut reader).await;
    drop(reader);
    handle_exit(&core, exit).await;
    core.finish().await;
}

async fn read_loop(core: &Arc<ConnectionCore>, reader: &mut FrameReader) -> Result<(), ShutdownReason> {
    loop {
        let next = tokio::select! {
            biased;
            () = core.transport_close.cancelled() => return Ok(()),
            next = reader.read_frame(core.heartbeat.read_timeout()) => next,
        };
        match next? {
            Some(frame) => {
                core.heartbeat.reset_missed();
                if route_frame(core, frame).await? == Flow::Stop {
                    return Ok(());
                }
            }
            None if core.heartbeat.record_timeout() => return Err(ShutdownReason::MissedHeartbeat),
            None => {}
        }
        maybe_send_heartbeat(core).await?;
    }
}

async fn route_frame(core: &Arc<ConnectionCore>, frame: Frame) -> Result<Flow, ShutdownReason> {
    if frame.frame_type() == FrameType::Heartbeat {
        return Ok(Flow::Continue);
    }
    match frame.channel() {
        0 => match core.channel0.assemble(frame)? {
            Some(command) => process_control_command(core, command).await,
            None => Ok(Flow::Continue),
        },
        number if core.is_quiescing() => {
            debug!(channel = number, "discarding frame while quiescing");
            Ok(Flow::Continue)
        }
        number => {
            let inner = core.manager.get(number).ok_or_else(|| {
                ShutdownReason::Protocol(format!("frame received for unknown channel {number}"))
            })?;
            Channel::new(core.clone(), inner).handle_frame(frame).await?;
            Ok(Flow::Continue)
        }
    }
}

async fn process_control_command(core: &Arc<ConnectionCore>, command: Command) -> Result<Flow, ShutdownReason> {
    let (method, content) = command.into_parts();
    if core.is_quiescing() {
        return match method {
            Method::ConnectionClose(_) => {
                answer_close(core).await;
                Ok(Flow::Continue)
            }
            Method::ConnectionCloseOk(_) => {
                if let Err(reason) = core.channel0().complete_rpc(Command::from_parts(method, content)) {
                    debug!(%reason, "connection.close-ok without a pending close");
                }
                Ok(Flow::Stop)
            }
            other => {
                debug!(method = other.name(), "discarding control command while quiescing");
                Ok(Flow::Continue)
            }
        };
    }
    match method {
        Method::ConnectionClose(close) => {
            handle_broker_close(core, close).await;
            Ok(Flow::Continue)
        }
        Method::ConnectionBlocked(blocked) => {
            notify_blocked(core, BlockedEvent::Blocked {
                reason: blocked.reason,
            });
            Ok(Flow::Continue)
        }
        Method::ConnectionUnblocked(_) => {
            notify_blocked(core, BlockedEvent::Unblocked);
            Ok(Flow::Continue)
        }
        other => {
            core.channel0()
                .complete_rpc(Command::from_parts(other, content))?;
            Ok(Flow::Continue)
        }
    }
}

async fn answer_close(core: &Arc<ConnectionCore>) {
    if let Err(error) = core.channel0().quiescing_transmit(ConnectionCloseOk).await {
        debug!(%error, "could not send connection.close-ok");
    }
}

/// The broker closed the connection: shut down, confirm, then give the
/// broker the closing timeout to drop the stream.
async fn handle_broker_close(core: &Arc<ConnectionCore>, close: ConnectionClose) {
    warn!(
        "connection closed by broker: peer={}, reply_code={}, reply_text={}",
        core.peer, close.reply_code, close.reply_text
    );
    core.set_broker_initiated();
    let signal = ShutdownSignal::connection(ShutdownReason::ConnectionException(close), false);
    let _ = core.shutdown(signal);
    answer_close(core).await;
    core.heartbeat.disable();

    let waiter = core.clone();
    tokio::spawn(async move {
        let limit = waiter.config.closing_timeout_value();
        tokio::select! {
            () = waiter.finished.cancelled() => {}
            () = tokio::time::sleep(limit) => {
                debug!("broker did not close the stream; closing it");
                waiter.transport_close.cancel();
            }
        }
    });
}

fn notify_blocked(core: &Arc<ConnectionCore>, event: BlockedEvent) {
    debug!(?event, "connection blocked state changed");
    if core.blocked_listeners.is_empty() {
        return;
    }
    let job_core = core.clone();
    core.channel0().enqueue(async move {
        let connection = Connection::from_core(job_core.clone());
        for listener in job_core.blocked_listeners.snapshot() {
            if let Err(error) = guard(|| listener(&event)) {
                job_core
                    .exception_handler
                    .handle_blocked_listener_error(&connection, &error);
            }
        }
    });
}

async fn maybe_send_heartbeat(core: &ConnectionCore) -> Result<(), ShutdownReason> {
    let Some(interval) = core.heartbeat.interval() else {
        return Ok(());
    };
    if core.writer.last_write().elapsed() >= interval {
        core.writer.write_frame(Frame::heartbeat()).await?;
        metrics::inc_heartbeats_sent();
    }
    Ok(())
}

/// Shut down for whatever ended the read loop.
async fn handle_exit(core: &Arc<ConnectionCore>, exit: Result<(), ShutdownReason>) {
    let reason = match exit {
        Ok(()) => return,
        Err(ShutdownReason::EndOfStream) if core.broker_initiated() => return,
        Err(reason) => reason,
    };
    match &reason {
        ShutdownReason::EndOfStream => {
            debug!(peer = %core.peer, "broker closed the stream");
        }
        ShutdownReason::MissedHeartbeat => {
            warn!("missed heartbeats from broker: peer={}", core.peer);
            metrics::inc_errors();
        }
        other => {
            metrics::inc_errors();
            let report_core = core.clone();
            let report_reason = other.clone();
            core.channel0().enqueue(async move {
                let connection = Connection::from_core(report_core.clone());
                report_core
                    .exception_handler
                    .handle_unexpected_connection_driver_error(&connection, &report_reason);
            });
        }
    }
    let protocol_error = matches!(reason, ShutdownReason::Protocol(_));
    let Ok(signal) = core.shutdown(ShutdownSignal::connection(reason, false)) else {
        return;
    };
    if protocol_error {
        let close = signal.connection_close();
        let limit = core.config.closing_timeout_value();
        let sent = tokio::time::timeout(limit, core.channel0().quiescing_transmit(close)).await;
        if !matches!(sent, Ok(Ok(()))) {
            debug!("could not tell the broker about the protocol error");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::duplex;

    use super::*;
    use crate::{
        connection::ConnectionConfig,
        frame::AmqpFrameCodec,
        transport,
    };

    fn core() -> (Arc<ConnectionCore>, FrameReader, tokio::io::DuplexStream) {
        let (client, server) = duplex(4096);
        let codec = AmqpFrameCodec::new(0);
        let (reader, writer) = transport::split(client, &codec);
        let core = Arc::new(ConnectionCore::new(ConnectionConfig::default(), codec, writer));
        (core, reader, server)
    }

    #[tokio::test(start_paused = true)]
    async fn idle_writer_sends_heartbeat() {
        let (core, _reader, _server) = core();
        core.heartbeat.set_interval(2);
        maybe_send_heartbeat(&core).await.expect("nothing due");
        let before = core.writer.last_write();
        tokio::time::advance(Duration::from_secs(2)).await;
        maybe_send_heartbeat(&core).await.expect("heartbeat");
        assert!(core.writer.last_write() > before);
    }

    #[tokio::test]
    async fn unknown_channel_is_fatal() {
        let (core, _reader, _server) = core();
        let frame = Frame::new(FrameType::Method, 9, bytes::Bytes::from_static(&[0, 20, 0, 11]));
        let reason = route_frame(&core, frame).await.expect_err("unknown channel");
        assert!(matches!(reason, ShutdownReason::Protocol(message) if message.contains("9")));
    }

    #[tokio::test]
    async fn quiescing_drops_channel_frames() {
        let (core, _reader, _server) = core();
        let _ = core.shutdown(ShutdownSignal::connection(ShutdownReason::EndOfStream, false));
        let frame = Frame::new(FrameType::Method, 9, bytes::Bytes::from_static(&[0, 20, 0, 11]));
        assert_eq!(route_frame(&core, frame).await.expect("dropped"), Flow::Continue);
    }
}
