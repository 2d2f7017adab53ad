#![cfg(feature = "metrics")]
//! Tests for `amqpframe` metrics helpers.
//!
//! These tests verify that counters and gauges update as expected using
//! `metrics_util::debugging::DebuggingRecorder`.
use std::io;

use amqpframe::{
    ConnectionConfig,
    metrics::{self, CONNECTIONS_ACTIVE, Direction, ERRORS_TOTAL, FRAMES_TOTAL, HEARTBEATS_SENT},
    protocol::{
        MethodArgs,
        method::{ConnectionClose, ConnectionCloseOk},
    },
};
use amqpframe_testing::{connect, default_tune};
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use rstest::rstest;
use serial_test::serial;

/// Creates a debugging recorder and snapshotter for metrics testing.
fn debugging_recorder_setup() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

/// Run `test` on a current-thread runtime so spawned driver tasks record
/// into the thread-local recorder.
fn with_runtime<F: Future<Output = ()>>(recorder: &DebuggingRecorder, test: F) {
    ::metrics::with_local_recorder(recorder, || {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime")
            .block_on(test);
    });
}

fn counter(snapshotter: &Snapshotter, name: &str, direction: Option<&str>) -> u64 {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .filter(|(key, _, _, _)| {
            key.key().name() == name
                && direction.is_none_or(|wanted| {
                    key.key()
                        .labels()
                        .any(|l| l.key() == "direction" && l.value() == wanted)
                })
        })
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(c) => c,
            _ => 0,
        })
        .sum()
}

fn gauge(snapshotter: &Snapshotter, name: &str) -> Option<f64> {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .find(|(key, _, _, _)| key.key().name() == name)
        .and_then(|(_, _, _, value)| match value {
            DebugValue::Gauge(g) => Some(g.into_inner()),
            _ => None,
        })
}

#[rstest]
#[case::inbound(Direction::Inbound, "inbound")]
#[case::outbound(Direction::Outbound, "outbound")]
fn frame_metric_is_labelled(#[case] direction: Direction, #[case] label: &str) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    ::metrics::with_local_recorder(&recorder, || metrics::inc_frames(direction));
    assert_eq!(counter(&snapshotter, FRAMES_TOTAL, Some(label)), 1);
}

#[rstest]
#[case(1)]
#[case(3)]
fn error_metric_counts(#[case] expected: u64) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    ::metrics::with_local_recorder(&recorder, || {
        (0..expected).for_each(|_| metrics::inc_errors());
    });
    assert_eq!(counter(&snapshotter, ERRORS_TOTAL, None), expected);
}

#[test]
fn heartbeat_metric_increments() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    ::metrics::with_local_recorder(&recorder, metrics::inc_heartbeats_sent);
    assert_eq!(counter(&snapshotter, HEARTBEATS_SENT, None), 1);
}

#[test]
#[serial]
fn connection_lifecycle_is_recorded() {
    let (snapshotter, recorder) = debugging_recorder_setup();
    with_runtime(&recorder, async {
        let config = ConnectionConfig::default().requested_heartbeat(0);
        let (connection, mut broker) = connect(config, default_tune()).await;
        assert_eq!(gauge(&snapshotter, CONNECTIONS_ACTIVE), Some(1.0));

        let script = tokio::spawn(async move {
            broker.expect(ConnectionClose::ID).await?;
            broker.send(0, ConnectionCloseOk).await?;
            broker.drain().await.map(drop)
        });
        connection.close().await.expect("close");
        script.await.expect("join").map_err(io::Error::other).expect("broker");
    });

    assert_eq!(gauge(&snapshotter, CONNECTIONS_ACTIVE), Some(0.0));
    // start-ok, tune-ok, open and close went out; start, tune, open-ok and
    // close-ok came in.
    assert_eq!(counter(&snapshotter, FRAMES_TOTAL, Some("outbound")), 4);
    assert_eq!(counter(&snapshotter, FRAMES_TOTAL, Some("inbound")), 4);
}
