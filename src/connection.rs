//! Connections to an AMQP 0-9-1 broker.
//!
//! A connection owns the byte stream, channel 0, the channel manager and the
//! consumer work pool. One spawned driver task reads every inbound frame and
//! routes it; any task may write. [`Connection`] is a cheap, cloneable handle
//! to that shared state.

mod config;
mod driver;
mod handshake;
mod heartbeat;
mod sasl;
mod shutdown;
mod socket;

use std::{
    fmt,
    sync::{
        Arc,
        Mutex,
        OnceLock,
        atomic::AtomicBool,
    },
};

pub use config::ConnectionConfig;
use heartbeat::Heartbeat;
pub use sasl::{SaslMechanism, SaslMechanismKind};
pub use socket::SocketOptions;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::{
    channel::{
        BlockedEvent,
        BlockedListener,
        Channel,
        ChannelInner,
        Lifecycle,
        ListenerId,
        ListenerSet,
        ShutdownListener,
    },
    channel_manager::ChannelManager,
    codec::FieldTable,
    command::Command,
    consumer::CallbackResult,
    error::{Error, Result, ShutdownSignal},
    exception::ExceptionHandler,
    frame::AmqpFrameCodec,
    panic::lock,
    transport::{self, FrameWriter},
    work_pool::WorkPool,
};

/// Where a connection is in its lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Protocol header sent; authenticating.
    Negotiating,
    /// `connection.tune` received; limits being applied.
    Tuning,
    /// Usable.
    Open,
    /// Shutting down; only the close handshake is honoured.
    Quiescing,
    /// Shut down.
    Closed,
}

struct CoreState {
    lifecycle: ConnectionState,
    shutdown: Option<ShutdownSignal>,
    broker_initiated: bool,
    opened: bool,
}

/// State shared by the driver, channel handles and connection handles.
pub(crate) struct ConnectionCore {
    pub(crate) config: ConnectionConfig,
    peer: String,
    codec: AmqpFrameCodec,
    writer: FrameWriter,
    state: Mutex<CoreState>,
    pub(crate) channel0: Arc<ChannelInner>,
    pub(crate) manager: ChannelManager,
    pub(crate) work: WorkPool,
    pub(crate) exception_handler: Arc<dyn ExceptionHandler>,
    heartbeat: Heartbeat,
    shutdown_listeners: ListenerSet<ShutdownListener>,
    blocked_listeners: ListenerSet<BlockedListener>,
    listeners_fired: AtomicBool,
    transport_close: CancellationToken,
    finished: CancellationToken,
    server_properties: OnceLock<FieldTable>,
    known_hosts: OnceLock<String>,
}

impl ConnectionCore {
    fn new(config: ConnectionConfig, codec: AmqpFrameCodec, writer: FrameWriter) -> Self {
        let work = WorkPool::new(config.consumer_pool_size_value());
        let channel0 = Arc::new(ChannelInner::new(0, Lifecycle::Open, work.register(0)));
        let peer = format!(
            "amqp://{}@{}:{}{}",
            config.username_value(),
            config.host_value(),
            config.port_value(),
            config.virtual_host_value()
        );
        Self {
            peer,
            codec,
            writer,
            state: Mutex::new(CoreState {
                lifecycle: ConnectionState::Negotiating,
                shutdown: None,
                broker_initiated: false,
                opened: false,
            }),
            channel0,
            manager: ChannelManager::new(config.requested_channel_max_value()),
            work,
            exception_handler: config.exception_handler_value(),
            heartbeat: Heartbeat::default(),
            shutdown_listeners: ListenerSet::default(),
            blocked_listeners: ListenerSet::default(),
            listeners_fired: AtomicBool::new(false),
            transport_close: CancellationToken::new(),
            finished: CancellationToken::new(),
            server_properties: OnceLock::new(),
            known_hosts: OnceLock::new(),
            config,
        }
    }

    /// Fail once the connection has begun shutting down.
    pub(crate) fn ensure_open(&self) -> Result<()> {
        match &lock(&self.state).shutdown {
            Some(signal) => Err(Error::AlreadyClosed(signal.clone())),
            None => Ok(()),
        }
    }

    /// Write `command` on `channel` as contiguous frames.
    pub(crate) async fn send(&self, channel: u16, command: &Command) -> Result<()> {
        let frames = command.to_frames(channel, self.codec.frame_max())?;
        tracing::debug!(channel, method = command.method().name(), "sending command");
        self.writer.write_frames(frames).await?;
        Ok(())
    }

    pub(crate) fn channel0(self: &Arc<Self>) -> Channel { Channel::new(self.clone(), self.channel0.clone()) }

    fn lifecycle(&self) -> ConnectionState { lock(&self.state).lifecycle }

    fn set_lifecycle(&self, lifecycle: ConnectionState) {
        let mut state = lock(&self.state);
        if state.shutdown.is_none() {
            state.lifecycle = lifecycle;
        }
    }

    fn is_quiescing(&self) -> bool {
        matches!(
            self.lifecycle(),
            ConnectionState::Quiescing | ConnectionState::Closed
        )
    }

    /// Move to `Open` unless a shutdown got there first.
    fn mark_open(&self) -> Result<()> {
        let mut state = lock(&self.state);
        if let Some(signal) = &state.shutdown {
            return Err(Error::AlreadyClosed(signal.clone()));
        }
        state.lifecycle = ConnectionState::Open;
        state.opened = true;
        Ok(())
    }

    /// Allocate and register a channel; refused once shutdown has begun.
    fn register_channel(&self, number: Option<u16>) -> Result<Arc<ChannelInner>> {
        let state = lock(&self.state);
        if let Some(signal) = &state.shutdown {
            return Err(Error::AlreadyClosed(signal.clone()));
        }
        self.manager.create(number, &self.work)
    }
}

/// Handle to an open connection.
///
/// Clones share the connection. Dropping every handle does not close it;
/// call [`Connection::close`].
#[derive(Clone)]
pub struct Connection {
    core: Arc<ConnectionCore>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.core.peer)
            .field("state", &self.core.lifecycle())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.core.peer) }
}

impl Connection {
    pub(crate) fn from_core(core: Arc<ConnectionCore>) -> Self { Self { core } }

    /// Connect over TCP and negotiate the connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the broker cannot be reached and the
    /// negotiation errors described for [`Connection::open_with_stream`].
    pub async fn open(config: ConnectionConfig) -> Result<Self> {
        let stream = socket::connect(
            config.host_value(),
            config.port_value(),
            config.socket_options_value(),
            config.connection_timeout_value(),
        )
        .await?;
        Self::open_with_stream(stream, config).await
    }

    /// Negotiate a connection over an already established byte stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::VersionMismatch`] if the broker speaks another
    /// protocol version, [`Error::AuthenticationFailure`] or
    /// [`Error::PossibleAuthenticationFailure`] if the credentials are
    /// refused, [`Error::Handshake`] for unusable tuning or mechanisms and
    /// [`Error::TimedOut`] if negotiation exceeds the handshake timeout.
    pub async fn open_with_stream<S>(stream: S, config: ConnectionConfig) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let codec = AmqpFrameCodec::new(0);
        let (reader, writer) = transport::split(stream, &codec);
        let core = Arc::new(ConnectionCore::new(config, codec, writer));
        tokio::spawn(driver::run(core.clone(), reader));
        handshake::negotiate(&core).await?;
        Ok(Self { core })
    }

    /// Open a channel on the lowest free number.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoChannelsAvailable`] when every number is taken and
    /// [`Error::AlreadyClosed`] once the connection has shut down.
    pub async fn create_channel(&self) -> Result<Channel> { self.open_channel(None).await }

    /// Open a channel on a specific number.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelNumberInUse`] if `number` is taken or out of
    /// range, otherwise as [`Connection::create_channel`].
    pub async fn create_channel_with_number(&self, number: u16) -> Result<Channel> {
        self.open_channel(Some(number)).await
    }

    async fn open_channel(&self, number: Option<u16>) -> Result<Channel> {
        let inner = self.core.register_channel(number)?;
        let channel = Channel::new(self.core.clone(), inner);
        if let Err(error) = channel.open().await {
            channel.release();
            return Err(error);
        }
        tracing::debug!(channel = channel.channel_number(), "channel opened");
        Ok(channel)
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState { self.core.lifecycle() }

    /// Whether the connection is open and not shutting down.
    #[must_use]
    pub fn is_open(&self) -> bool { self.core.lifecycle() == ConnectionState::Open }

    /// Why the connection shut down, once it has begun to.
    #[must_use]
    pub fn close_reason(&self) -> Option<ShutdownSignal> { lock(&self.core.state).shutdown.clone() }

    /// Properties the broker sent in `connection.start`.
    #[must_use]
    pub fn server_properties(&self) -> FieldTable {
        self.core.server_properties.get().cloned().unwrap_or_default()
    }

    /// The reserved known-hosts field of `connection.open-ok`.
    #[must_use]
    pub fn known_hosts(&self) -> &str { self.core.known_hosts.get().map_or("", String::as_str) }

    /// Negotiated channel-max.
    #[must_use]
    pub fn channel_max(&self) -> u16 { self.core.manager.channel_max() }

    /// Negotiated frame-max; zero for no limit.
    #[must_use]
    pub fn frame_max(&self) -> u32 { self.core.codec.frame_max() }

    /// Negotiated heartbeat interval in seconds; zero when disabled.
    #[must_use]
    pub fn heartbeat(&self) -> u16 { self.core.heartbeat.interval_secs() }

    /// The settings this connection was opened with.
    #[must_use]
    pub fn config(&self) -> &ConnectionConfig { &self.core.config }

    /// Register a listener fired once, on the driver task, when the
    /// connection has shut down.
    pub fn add_shutdown_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ShutdownSignal) -> CallbackResult + Send + Sync + 'static,
    {
        self.core.shutdown_listeners.add(Arc::new(listener))
    }

    /// Remove a shutdown listener; returns whether it was registered.
    pub fn remove_shutdown_listener(&self, id: ListenerId) -> bool {
        self.core.shutdown_listeners.remove(id)
    }

    /// Register a listener for `connection.blocked` and
    /// `connection.unblocked`.
    pub fn add_blocked_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&BlockedEvent) -> CallbackResult + Send + Sync + 'static,
    {
        self.core.blocked_listeners.add(Arc::new(listener))
    }

    /// Remove a blocked listener; returns whether it was registered.
    pub fn remove_blocked_listener(&self, id: ListenerId) -> bool {
        self.core.blocked_listeners.remove(id)
    }

    /// Resolve once the driver has stopped and the transport is closed.
    pub async fn closed(&self) { self.core.finished.cancelled().await; }
}
