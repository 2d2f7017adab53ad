//! Registry and argument layout tests.

use bytes::Bytes;
use rstest::rstest;

use super::*;
use crate::codec::FieldTable;

#[test]
fn queue_declare_layout() {
    let method = Method::from(QueueDeclare {
        queue: "q".into(),
        durable: true,
        auto_delete: true,
        ..QueueDeclare::default()
    });
    let payload = method.encode().expect("encode");
    assert_eq!(
        payload.as_ref(),
        &[
            0, 50, 0, 10, // queue.declare
            0, 0, // reserved ticket
            1, b'q', // queue name
            0b0000_1010, // durable, auto-delete
            0, 0, 0, 0, // empty arguments
        ]
    );
}

#[test]
fn connection_open_writes_reserved_fields() {
    let payload = Method::from(ConnectionOpen {
        virtual_host: "/".into(),
    })
    .encode()
    .expect("encode");
    assert_eq!(payload.as_ref(), &[0, 10, 0, 40, 1, b'/', 0, 0]);
}

#[test]
fn decodes_what_it_encodes() {
    let deliver = Method::from(BasicDeliver {
        consumer_tag: "ctag-1".into(),
        delivery_tag: 42,
        redelivered: true,
        exchange: "amq.topic".into(),
        routing_key: "a.b".into(),
    });
    let decoded = Method::decode(deliver.encode().expect("encode")).expect("decode");
    assert_eq!(decoded, deliver);
}

#[test]
fn unknown_method_is_rejected() {
    let err = Method::decode(Bytes::from_static(&[0, 60, 0, 100, 0])).expect_err("unknown");
    assert_eq!(
        err,
        CodecError::UnknownMethod {
            class_id: 60,
            method_id: 100
        }
    );
}

#[test]
fn trailing_bytes_are_rejected() {
    let err = Method::decode(Bytes::from_static(&[0, 90, 0, 10, 0xFF])).expect_err("trailing");
    assert_eq!(err, CodecError::TrailingBytes { extra: 1 });
}

#[rstest]
#[case::publish(BasicPublish::default().into(), true)]
#[case::deliver(BasicDeliver::default().into(), true)]
#[case::get_ok(BasicGetOk::default().into(), true)]
#[case::ret(BasicReturn::default().into(), true)]
#[case::ack(BasicAck::default().into(), false)]
#[case::get(BasicGet::default().into(), false)]
fn content_bearing_methods(#[case] method: Method, #[case] expected: bool) {
    assert_eq!(method.has_content(), expected);
}

#[rstest]
#[case::declare(QueueDeclare::default().into(), &[QueueDeclareOk::ID][..])]
#[case::declare_no_wait(
    QueueDeclare { no_wait: true, ..QueueDeclare::default() }.into(),
    &[][..]
)]
#[case::get(BasicGet::default().into(), &[BasicGetOk::ID, BasicGetEmpty::ID][..])]
#[case::unbind(QueueUnbind::default().into(), &[QueueUnbindOk::ID][..])]
#[case::exchange_unbind(ExchangeUnbind::default().into(), &[ExchangeUnbindOk::ID][..])]
#[case::publish(BasicPublish::default().into(), &[][..])]
#[case::ack(BasicAck::default().into(), &[][..])]
#[case::tune_ok(
    ConnectionTuneOk { channel_max: 0, frame_max: 0, heartbeat: 0 }.into(),
    &[][..]
)]
fn expected_replies(#[case] method: Method, #[case] replies: &[MethodId]) {
    assert_eq!(method.expected_replies(), replies);
    assert_eq!(method.is_synchronous_request(), !replies.is_empty());
}

#[test]
fn exchange_unbind_ok_uses_method_51() {
    assert_eq!(ExchangeUnbindOk::ID, MethodId::new(40, 51));
}

#[test]
fn start_lists_mechanisms() {
    let start = ConnectionStart {
        version_major: 0,
        version_minor: 9,
        server_properties: FieldTable::new(),
        mechanisms: Bytes::from_static(b"AMQPLAIN PLAIN"),
        locales: Bytes::from_static(b"en_US"),
    };
    assert_eq!(
        start.mechanism_names().collect::<Vec<_>>(),
        vec!["AMQPLAIN", "PLAIN"]
    );
}
