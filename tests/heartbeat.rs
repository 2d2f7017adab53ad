//! Heartbeat behaviour under tokio's paused clock.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use amqpframe::{
    ConnectionConfig,
    ConnectionState,
    Frame,
    FrameType,
    ShutdownReason,
    protocol::method::ConnectionTune,
};
use amqpframe_testing::{connect, default_tune};

type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

fn tune(heartbeat: u16) -> ConnectionTune {
    ConnectionTune {
        heartbeat,
        ..default_tune()
    }
}

#[tokio::test(start_paused = true)]
async fn silent_broker_is_detected() -> TestResult {
    let config = ConnectionConfig::default().requested_heartbeat(1);
    let (connection, _broker) = connect(config, tune(1)).await;
    assert_eq!(connection.heartbeat(), 1);

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    connection.add_shutdown_listener(move |signal| {
        assert!(matches!(signal.reason(), ShutdownReason::MissedHeartbeat));
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    tokio::time::timeout(Duration::from_secs(9), connection.closed()).await?;
    let signal = connection.close_reason().expect("shutdown recorded");
    assert!(matches!(signal.reason(), ShutdownReason::MissedHeartbeat));
    assert!(signal.is_hard_error());
    assert_eq!(connection.state(), ConnectionState::Closed);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn idle_client_sends_heartbeats() -> TestResult {
    let config = ConnectionConfig::default().requested_heartbeat(2);
    let (connection, mut broker) = connect(config, tune(2)).await;

    // Keep the client's read side busy so only its writer idles.
    for _ in 0..10 {
        broker.send_frame(Frame::heartbeat()).await?;
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    for _ in 0..2 {
        let frame = broker.recv_frame().await?.expect("heartbeat frame");
        assert_eq!(frame.frame_type(), FrameType::Heartbeat);
        assert_eq!(frame.channel(), 0);
    }
    assert!(connection.is_open());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn disabled_heartbeat_never_times_out() -> TestResult {
    let config = ConnectionConfig::default().requested_heartbeat(0);
    let (connection, _broker) = connect(config, tune(0)).await;
    assert_eq!(connection.heartbeat(), 0);
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert!(connection.is_open());
    Ok(())
}
