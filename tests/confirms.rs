//! Integration tests for publisher confirms.

use std::{collections::BTreeSet, io, time::Duration};

use amqpframe::{
    ConfirmOutcome,
    ConnectionConfig,
    Error,
    channel::ConfirmEvent,
    protocol::{
        BasicProperties,
        MethodArgs,
        method::{BasicAck, BasicNack, BasicPublish, ConfirmSelect, ConfirmSelectOk, QueueDeclare, QueueDeclareOk},
    },
};
use amqpframe_testing::{connect, default_tune};
use tokio::sync::mpsc;

type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

const PUBLISHES: u64 = 1000;

fn publish(queue: &str) -> BasicPublish {
    BasicPublish {
        routing_key: queue.to_owned(),
        ..BasicPublish::default()
    }
}

#[tokio::test]
async fn thousand_publishes_are_all_acked() -> TestResult {
    let (connection, mut broker) = connect(ConnectionConfig::default(), default_tune()).await;
    let script = tokio::spawn(async move {
        let number = broker.accept_channel().await?;
        let (_, declare) = broker.expect_method::<QueueDeclare>().await?;
        assert!(declare.auto_delete);
        broker
            .send(number, QueueDeclareOk {
                queue: "confirmed".into(),
                message_count: 0,
                consumer_count: 0,
            })
            .await?;
        broker.expect(ConfirmSelect::ID).await?;
        broker.send(number, ConfirmSelectOk).await?;
        for _ in 0..PUBLISHES {
            broker.expect(BasicPublish::ID).await?;
        }
        broker
            .send(number, BasicAck {
                delivery_tag: PUBLISHES,
                multiple: true,
            })
            .await?;
        Ok::<_, io::Error>(broker)
    });

    let channel = connection.create_channel().await?;
    let queue = channel
        .queue_declare(QueueDeclare {
            auto_delete: true,
            ..QueueDeclare::default()
        })
        .await?
        .queue;
    assert_eq!(channel.next_publish_seq_no(), 0);
    channel.confirm_select().await?;
    assert_eq!(channel.next_publish_seq_no(), 1);

    for n in 0..PUBLISHES {
        channel
            .basic_publish(publish(&queue), BasicProperties::default(), format!("message {n}"))
            .await?;
    }
    assert_eq!(channel.next_publish_seq_no(), PUBLISHES + 1);

    let outcome = channel.wait_for_confirms(Duration::from_secs(10)).await?;
    assert_eq!(outcome, ConfirmOutcome::AllAcked);
    assert_eq!(channel.unconfirmed_count(), 0);
    script.await??;
    Ok(())
}

#[tokio::test]
async fn nacks_are_reported() -> TestResult {
    let (connection, mut broker) = connect(ConnectionConfig::default(), default_tune()).await;
    let script = tokio::spawn(async move {
        let number = broker.accept_channel().await?;
        broker.expect(ConfirmSelect::ID).await?;
        broker.send(number, ConfirmSelectOk).await?;
        for _ in 0..3 {
            broker.expect(BasicPublish::ID).await?;
        }
        broker
            .send(number, BasicAck {
                delivery_tag: 1,
                multiple: false,
            })
            .await?;
        broker
            .send(number, BasicNack {
                delivery_tag: 3,
                multiple: true,
                requeue: false,
            })
            .await?;
        Ok::<_, io::Error>(broker)
    });

    let channel = connection.create_channel().await?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    channel.add_confirm_listener(move |event| {
        tx.send(event)?;
        Ok(())
    });
    channel.confirm_select().await?;
    for _ in 0..3 {
        channel
            .basic_publish(publish("q"), BasicProperties::default(), "body")
            .await?;
    }

    let outcome = channel.wait_for_confirms(Duration::from_secs(10)).await?;
    assert_eq!(outcome, ConfirmOutcome::Nacked(BTreeSet::from([2, 3])));
    assert_eq!(channel.unconfirmed_count(), 0);
    assert_eq!(
        rx.recv().await,
        Some(ConfirmEvent::Ack {
            delivery_tag: 1,
            multiple: false
        })
    );
    assert_eq!(
        rx.recv().await,
        Some(ConfirmEvent::Nack {
            delivery_tag: 3,
            multiple: true
        })
    );
    script.await??;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn waiting_times_out_without_confirms() -> TestResult {
    let (connection, mut broker) = connect(ConnectionConfig::default(), default_tune()).await;
    let script = tokio::spawn(async move {
        let number = broker.accept_channel().await?;
        broker.expect(ConfirmSelect::ID).await?;
        broker.send(number, ConfirmSelectOk).await?;
        broker.expect(BasicPublish::ID).await?;
        Ok::<_, io::Error>(broker)
    });

    let channel = connection.create_channel().await?;
    channel.confirm_select().await?;
    channel
        .basic_publish(publish("q"), BasicProperties::default(), "body")
        .await?;
    let _broker = script.await??;

    let outcome = channel.wait_for_confirms(Duration::from_secs(5)).await?;
    assert_eq!(outcome, ConfirmOutcome::TimedOut);
    assert_eq!(channel.unconfirmed_count(), 1);
    Ok(())
}

#[tokio::test]
async fn waiting_requires_confirm_mode() -> TestResult {
    let (connection, mut broker) = connect(ConnectionConfig::default(), default_tune()).await;
    let (channel, _) = tokio::join!(connection.create_channel(), broker.accept_channel());
    let channel = channel?;
    let waited = channel.wait_for_confirms(Duration::from_secs(1)).await;
    assert!(matches!(waited, Err(Error::NotInConfirmMode(number)) if number == channel.channel_number()));
    Ok(())
}
