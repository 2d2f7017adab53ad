//! Connection negotiation: start, authentication, tune and open.

use std::sync::Arc;

use log::{info, warn};

use super::{ConnectionCore, ConnectionState};
use crate::{
    channel::{expect_reply, unexpected_reply},
    command::Command,
    error::{Error, Result, ShutdownReason, ShutdownSignal},
    frame::FRAME_MIN_SIZE,
    metrics,
    protocol::{
        Method,
        MethodArgs,
        method::{
            ConnectionOpen,
            ConnectionSecureOk,
            ConnectionStart,
            ConnectionStartOk,
            ConnectionTune,
            ConnectionTuneOk,
        },
        reply_code,
    },
};

const LOCALE: &str = "en_US";

/// Run the whole negotiation under the handshake timeout.
///
/// On failure the connection is shut down and its transport closed before
/// the error is returned.
pub(super) async fn negotiate(core: &Arc<ConnectionCore>) -> Result<()> {
    let limit = core.config.handshake_timeout_value();
    let outcome = tokio::time::timeout(limit, exchange(core))
        .await
        .unwrap_or(Err(Error::TimedOut("handshake")));
    if let Err(error) = &outcome {
        warn!("connection negotiation failed: peer={}, error={error}", core.peer);
        core.abandon(error).await;
    }
    outcome
}

async fn exchange(core: &Arc<ConnectionCore>) -> Result<()> {
    let channel0 = core.channel0();
    let start = channel0
        .expect_after("connection.start", &[ConnectionStart::ID], async {
            core.writer.send_header().await.map_err(Error::from)
        })
        .await
        .map_err(before_start)?;
    let start = expect_reply!(start, ConnectionStart)?;
    if (start.version_major, start.version_minor) != (0, 9) {
        return Err(Error::VersionMismatch {
            server_major: start.version_major,
            server_minor: start.version_minor,
        });
    }
    let _ = core.server_properties.set(start.server_properties);

    let mechanism = core.config.select_mechanism(&start.mechanisms).ok_or_else(|| {
        Error::Handshake(format!(
            "no configured SASL mechanism among those offered ({})",
            String::from_utf8_lossy(&start.mechanisms)
        ))
    })?;
    let username = core.config.username_value();
    let password = core.config.password_value();
    let start_ok = ConnectionStartOk {
        client_properties: core.config.client_properties(),
        mechanism: mechanism.name().to_owned(),
        response: mechanism.respond(None, username, password)?,
        locale: LOCALE.to_owned(),
    };
    let mut reply = channel0
        .rpc(start_ok)
        .await
        .map_err(|error| authentication_error(error, true))?;
    let tune = loop {
        match reply.into_parts() {
            (Method::ConnectionSecure(secure), _) => {
                let response = mechanism.respond(Some(secure.challenge.as_ref()), username, password)?;
                reply = channel0
                    .rpc(ConnectionSecureOk { response })
                    .await
                    .map_err(|error| authentication_error(error, true))?;
            }
            (Method::ConnectionTune(tune), _) => break tune,
            (other, _) => return Err(unexpected_reply(&other)),
        }
    };

    core.set_lifecycle(ConnectionState::Tuning);
    let tune_ok = tune_parameters(core, &tune)?;
    let ConnectionTuneOk {
        channel_max,
        frame_max,
        heartbeat,
    } = tune_ok;
    core.codec.set_frame_max(frame_max);
    core.manager.set_channel_max(channel_max);
    core.heartbeat.set_interval(heartbeat);
    channel0.transmit(Command::new(tune_ok)).await?;

    let open = ConnectionOpen {
        virtual_host: core.config.virtual_host_value().to_owned(),
    };
    let reply = channel0
        .rpc(open)
        .await
        .map_err(|error| authentication_error(error, false))?;
    let open_ok = expect_reply!(reply, ConnectionOpenOk)?;
    let _ = core.known_hosts.set(open_ok.known_hosts);
    core.mark_open()?;
    metrics::inc_connections();
    info!(
        "connection opened: peer={}, channel_max={}, frame_max={}, heartbeat={}",
        core.peer, channel_max, frame_max, heartbeat
    );
    Ok(())
}

/// Pick the smaller value when both sides set a limit, otherwise whichever
/// side set one.
fn negotiated<T: Ord + Default>(client: T, server: T) -> T {
    let unset = T::default();
    if client == unset || server == unset {
        client.max(server)
    } else {
        client.min(server)
    }
}

fn tune_parameters(core: &ConnectionCore, tune: &ConnectionTune) -> Result<ConnectionTuneOk> {
    let channel_max = negotiated(core.config.requested_channel_max_value(), tune.channel_max);
    let frame_max = negotiated(core.config.requested_frame_max_value(), tune.frame_max);
    if frame_max != 0 && frame_max < FRAME_MIN_SIZE {
        return Err(Error::Handshake(format!(
            "negotiated frame-max {frame_max} is below the minimum of {FRAME_MIN_SIZE}"
        )));
    }
    let heartbeat = negotiated(core.config.requested_heartbeat_value(), tune.heartbeat);
    Ok(ConnectionTuneOk {
        channel_max,
        frame_max,
        heartbeat,
    })
}

fn before_start(error: Error) -> Error {
    let stream_closed = matches!(
        error.shutdown_signal().map(ShutdownSignal::reason),
        Some(ShutdownReason::EndOfStream)
    );
    if stream_closed {
        Error::Handshake("broker closed the stream before connection.start".to_owned())
    } else {
        error
    }
}

/// Recognise a refused login among the ways negotiation can end.
///
/// `awaiting_tune` marks the authentication phase, where a bare stream close
/// most likely means the credentials were rejected.
fn authentication_error(error: Error, awaiting_tune: bool) -> Error {
    let refused = match error.shutdown_signal().map(ShutdownSignal::reason) {
        Some(ShutdownReason::ConnectionException(close))
            if close.reply_code == reply_code::ACCESS_REFUSED =>
        {
            Some(Error::AuthenticationFailure(close.reply_text.clone()))
        }
        Some(ShutdownReason::EndOfStream) if awaiting_tune => {
            Some(Error::PossibleAuthenticationFailure)
        }
        _ => None,
    };
    refused.unwrap_or(error)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::protocol::method::ConnectionClose;

    #[rstest]
    #[case::both_set(100_u32, 200_u32, 100_u32)]
    #[case::client_unset(0, 200, 200)]
    #[case::server_unset(100, 0, 100)]
    #[case::neither(0, 0, 0)]
    fn negotiation_takes_min_unless_unset(
        #[case] client: u32,
        #[case] server: u32,
        #[case] expected: u32,
    ) {
        assert_eq!(negotiated(client, server), expected);
    }

    fn closed_by(reason: ShutdownReason) -> Error {
        Error::AlreadyClosed(ShutdownSignal::connection(reason, false))
    }

    #[rstest]
    fn access_refused_is_an_authentication_failure() {
        let error = closed_by(ShutdownReason::ConnectionException(ConnectionClose {
            reply_code: reply_code::ACCESS_REFUSED,
            reply_text: "ACCESS_REFUSED - Login was refused".into(),
            class_id: 0,
            method_id: 0,
        }));
        assert!(matches!(
            authentication_error(error, false),
            Error::AuthenticationFailure(text) if text.starts_with("ACCESS_REFUSED")
        ));
    }

    #[rstest]
    #[case::during_authentication(true, true)]
    #[case::after_tuning(false, false)]
    fn stream_close_may_mean_refused_credentials(#[case] awaiting_tune: bool, #[case] possible: bool) {
        let error = authentication_error(closed_by(ShutdownReason::EndOfStream), awaiting_tune);
        assert_eq!(matches!(error, Error::PossibleAuthenticationFailure), possible);
    }
}
