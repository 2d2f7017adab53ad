//! Utilities for driving an [`amqpframe::Connection`] against a scripted
//! broker over in-memory streams during tests.
//!
//! [`connect`] runs both sides of the handshake on a `tokio::io::duplex`
//! stream and hands back the open connection together with the broker end,
//! which the test then scripts method by method.
//!
//! ```rust
//! use amqpframe::{ConnectionConfig, protocol::method::ChannelOpenOk};
//! use amqpframe_testing::{connect, default_tune};
//!
//! # async fn example() -> std::io::Result<()> {
//! let (connection, mut broker) = connect(ConnectionConfig::default(), default_tune()).await;
//! let (opened, number) = tokio::join!(connection.create_channel(), broker.accept_channel());
//! assert_eq!(opened.expect("channel").channel_number(), number?);
//! # Ok(())
//! # }
//! ```

pub mod broker;
pub mod logging;
pub mod macros;

pub use broker::{ScriptedBroker, connect, default_tune};
pub use logging::{LoggerHandle, logger};
