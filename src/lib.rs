#![doc(html_root_url = "https://docs.rs/amqpframe/latest")]
//! Asynchronous AMQP 0-9-1 client.
//!
//! A [`Connection`] multiplexes [`Channel`]s over one byte stream. One
//! driver task per connection reads frames, reassembles them into
//! [`Command`]s and routes each to its channel; synchronous channel
//! operations await the reply routed back to them, and consumer callbacks
//! run on a per-connection work pool.
//!
//! ```no_run
//! use amqpframe::{
//!     Connection,
//!     ConnectionConfig,
//!     protocol::{BasicProperties, method::{BasicPublish, QueueDeclare}},
//! };
//!
//! # async fn demo() -> amqpframe::Result<()> {
//! let connection = Connection::open(ConnectionConfig::default()).await?;
//! let channel = connection.create_channel().await?;
//! let queue = channel
//!     .queue_declare(QueueDeclare { exclusive: true, ..QueueDeclare::default() })
//!     .await?
//!     .queue;
//! channel
//!     .basic_publish(
//!         BasicPublish { routing_key: queue.clone(), ..BasicPublish::default() },
//!         BasicProperties::default(),
//!         "hello",
//!     )
//!     .await?;
//! connection.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod channel;
mod channel_manager;
pub mod codec;
pub mod command;
pub mod connection;
pub mod consumer;
pub mod error;
pub mod exception;
pub mod frame;
pub mod metrics;
pub mod panic;
pub mod protocol;
pub mod transport;
pub mod work_pool;

pub use channel::{Channel, ConfirmOutcome};
pub use command::Command;
pub use connection::{Connection, ConnectionConfig, ConnectionState};
pub use consumer::{CallbackResult, Consumer, Delivery, Envelope, GetResponse};
pub use error::{Error, Result, ShutdownReason, ShutdownSignal};
pub use exception::{CallbackError, DefaultExceptionHandler, ExceptionHandler};
pub use frame::{Frame, FrameType};
pub use metrics::{CONNECTIONS_ACTIVE, Direction, ERRORS_TOTAL, FRAMES_TOTAL, HEARTBEATS_SENT};

static_assertions::assert_impl_all!(Connection: Clone, Send, Sync);
static_assertions::assert_impl_all!(Channel: Clone, Send, Sync);
static_assertions::assert_impl_all!(ShutdownSignal: Clone, Send, Sync);
