//! Connection settings.

use std::{fmt, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};

use super::{
    sasl::{self, SaslMechanism, SaslMechanismKind},
    socket::SocketOptions,
};
use crate::{
    codec::FieldTable,
    exception::{DefaultExceptionHandler, ExceptionHandler},
    protocol::constants::DEFAULT_PORT,
};

const DEFAULT_CHANNEL_MAX: u16 = 2047;
const DEFAULT_HEARTBEAT_SECS: u16 = 60;
const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 60_000;
const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_CLOSING_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 10_000;

fn default_pool_size() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}

/// Everything needed to open a [`Connection`](super::Connection).
///
/// Setters consume and return the config so calls chain:
///
/// ```
/// use std::time::Duration;
///
/// use amqpframe::connection::ConnectionConfig;
///
/// let config = ConnectionConfig::default()
///     .host("broker.internal")
///     .virtual_host("orders")
///     .credentials("app", "s3cret")
///     .requested_heartbeat(30)
///     .handshake_timeout(Duration::from_secs(5));
/// assert_eq!(config.host_value(), "broker.internal");
/// assert_eq!(config.requested_heartbeat_value(), 30);
/// ```
///
/// Durations serialise as milliseconds. Custom SASL mechanisms, extra client
/// properties and the exception handler are not serialised.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    host: String,
    port: u16,
    virtual_host: String,
    username: String,
    password: String,
    requested_channel_max: u16,
    requested_frame_max: u32,
    requested_heartbeat_sec: u16,
    connection_timeout_ms: u64,
    handshake_timeout_ms: u64,
    connection_closing_timeout_ms: u64,
    shutdown_grace_ms: u64,
    consumer_pool_size: usize,
    socket_options: SocketOptions,
    sasl_mechanisms: Vec<SaslMechanismKind>,
    #[serde(skip)]
    custom_mechanism: Option<Arc<dyn SaslMechanism>>,
    #[serde(skip)]
    client_properties: FieldTable,
    #[serde(skip)]
    exception_handler: Option<Arc<dyn ExceptionHandler>>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_owned(),
            port: DEFAULT_PORT,
            virtual_host: "/".to_owned(),
            username: "guest".to_owned(),
            password: "guest".to_owned(),
            requested_channel_max: DEFAULT_CHANNEL_MAX,
            requested_frame_max: 0,
            requested_heartbeat_sec: DEFAULT_HEARTBEAT_SECS,
            connection_timeout_ms: DEFAULT_CONNECTION_TIMEOUT_MS,
            handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT_MS,
            connection_closing_timeout_ms: DEFAULT_CLOSING_TIMEOUT_MS,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
            consumer_pool_size: default_pool_size(),
            socket_options: SocketOptions::default(),
            sasl_mechanisms: vec![SaslMechanismKind::Plain],
            custom_mechanism: None,
            client_properties: FieldTable::new(),
            exception_handler: None,
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("virtual_host", &self.virtual_host)
            .field("username", &self.username)
            .field("requested_channel_max", &self.requested_channel_max)
            .field("requested_frame_max", &self.requested_frame_max)
            .field("requested_heartbeat_sec", &self.requested_heartbeat_sec)
            .field("sasl_mechanisms", &self.sasl_mechanisms)
            .field("custom_mechanism", &self.custom_mechanism)
            .finish_non_exhaustive()
    }
}

fn millis(duration: Duration) -> u64 { u64::try_from(duration.as_millis()).unwrap_or(u64::MAX) }

impl ConnectionConfig {
    /// Broker host name or address.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Broker port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Virtual host to open.
    #[must_use]
    pub fn virtual_host(mut self, virtual_host: impl Into<String>) -> Self {
        self.virtual_host = virtual_host.into();
        self
    }

    /// Username and password handed to the SASL mechanism.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Channel-max to request; zero leaves the choice to the broker.
    #[must_use]
    pub fn requested_channel_max(mut self, channel_max: u16) -> Self {
        self.requested_channel_max = channel_max;
        self
    }

    /// Frame-max to request; zero asks for no limit.
    #[must_use]
    pub fn requested_frame_max(mut self, frame_max: u32) -> Self {
        self.requested_frame_max = frame_max;
        self
    }

    /// Heartbeat interval to request in seconds; zero disables heartbeats.
    #[must_use]
    pub fn requested_heartbeat(mut self, secs: u16) -> Self {
        self.requested_heartbeat_sec = secs;
        self
    }

    /// Limit on establishing the TCP connection.
    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout_ms = millis(timeout);
        self
    }

    /// Limit on the whole protocol negotiation.
    #[must_use]
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout_ms = millis(timeout);
        self
    }

    /// How long a close waits for the broker's `close-ok`.
    #[must_use]
    pub fn closing_timeout(mut self, timeout: Duration) -> Self {
        self.connection_closing_timeout_ms = millis(timeout);
        self
    }

    /// How long shutdown waits for queued consumer callbacks.
    #[must_use]
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace_ms = millis(grace);
        self
    }

    /// Callbacks allowed to run at once across channels.
    #[must_use]
    pub fn consumer_pool_size(mut self, size: usize) -> Self {
        self.consumer_pool_size = size.max(1);
        self
    }

    /// Options applied to the TCP socket before connecting.
    #[must_use]
    pub fn socket_options(mut self, options: SocketOptions) -> Self {
        self.socket_options = options;
        self
    }

    /// Built-in mechanisms to try, in order of preference.
    #[must_use]
    pub fn sasl_mechanisms(mut self, mechanisms: impl IntoIterator<Item = SaslMechanismKind>) -> Self {
        self.sasl_mechanisms = mechanisms.into_iter().collect();
        self
    }

    /// Prefer a custom mechanism over the built-in list.
    #[must_use]
    pub fn with_sasl_mechanism(mut self, mechanism: Arc<dyn SaslMechanism>) -> Self {
        self.custom_mechanism = Some(mechanism);
        self
    }

    /// Add or override a client property sent in `connection.start-ok`.
    #[must_use]
    pub fn client_property(mut self, key: impl Into<String>, value: impl Into<crate::codec::FieldValue>) -> Self {
        self.client_properties.insert(key, value);
        self
    }

    /// Receive failures of application callbacks.
    #[must_use]
    pub fn exception_handler(mut self, handler: Arc<dyn ExceptionHandler>) -> Self {
        self.exception_handler = Some(handler);
        self
    }

    #[must_use]
    pub fn host_value(&self) -> &str { &self.host }

    #[must_use]
    pub fn port_value(&self) -> u16 { self.port }

    #[must_use]
    pub fn virtual_host_value(&self) -> &str { &self.virtual_host }

    #[must_use]
    pub fn username_value(&self) -> &str { &self.username }

    pub(crate) fn password_value(&self) -> &str { &self.password }

    #[must_use]
    pub fn requested_channel_max_value(&self) -> u16 { self.requested_channel_max }

    #[must_use]
    pub fn requested_frame_max_value(&self) -> u32 { self.requested_frame_max }

    #[must_use]
    pub fn requested_heartbeat_value(&self) -> u16 { self.requested_heartbeat_sec }

    /// Connect limit; `None` when set to zero.
    #[must_use]
    pub fn connection_timeout_value(&self) -> Option<Duration> {
        (self.connection_timeout_ms > 0).then(|| Duration::from_millis(self.connection_timeout_ms))
    }

    #[must_use]
    pub fn handshake_timeout_value(&self) -> Duration { Duration::from_millis(self.handshake_timeout_ms) }

    #[must_use]
    pub fn closing_timeout_value(&self) -> Duration {
        Duration::from_millis(self.connection_closing_timeout_ms)
    }

    #[must_use]
    pub fn shutdown_grace_value(&self) -> Duration { Duration::from_millis(self.shutdown_grace_ms) }

    #[must_use]
    pub fn consumer_pool_size_value(&self) -> usize { self.consumer_pool_size.max(1) }

    #[must_use]
    pub fn socket_options_value(&self) -> SocketOptions { self.socket_options }

    pub(crate) fn exception_handler_value(&self) -> Arc<dyn ExceptionHandler> {
        self.exception_handler
            .clone()
            .unwrap_or_else(|| Arc::new(DefaultExceptionHandler))
    }

    /// The first configured mechanism the broker offers, the custom one
    /// first.
    pub(crate) fn select_mechanism(&self, offered: &[u8]) -> Option<Arc<dyn SaslMechanism>> {
        let custom = self
            .custom_mechanism
            .iter()
            .filter(|mechanism| sasl::is_offered(offered, mechanism.name()))
            .cloned();
        let builtin = self
            .sasl_mechanisms
            .iter()
            .copied()
            .filter(|kind| sasl::is_offered(offered, kind.name()))
            .map(|kind| Arc::new(kind) as Arc<dyn SaslMechanism>);
        custom.chain(builtin).next()
    }

    /// Properties sent in `connection.start-ok`, overrides applied last.
    pub(crate) fn client_properties(&self) -> FieldTable {
        let capabilities = FieldTable::new()
            .with("publisher_confirms", true)
            .with("exchange_exchange_bindings", true)
            .with("basic.nack", true)
            .with("consumer_cancel_notify", true)
            .with("connection.blocked", true)
            .with("authentication_failure_close", true);
        let mut properties = FieldTable::new()
            .with("product", env!("CARGO_PKG_NAME"))
            .with("version", env!("CARGO_PKG_VERSION"))
            .with("platform", "Rust")
            .with("copyright", "The amqpframe authors")
            .with("information", "Licensed under the ISC licence")
            .with("capabilities", capabilities);
        properties.merge(&self.client_properties);
        properties
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::codec::FieldValue;

    #[rstest]
    fn defaults_match_a_local_broker() {
        let config = ConnectionConfig::default();
        assert_eq!(config.host_value(), "localhost");
        assert_eq!(config.port_value(), 5672);
        assert_eq!(config.virtual_host_value(), "/");
        assert_eq!(config.username_value(), "guest");
        assert_eq!(config.handshake_timeout_value(), Duration::from_secs(10));
        assert_eq!(config.closing_timeout_value(), Duration::from_secs(10));
        assert!(config.consumer_pool_size_value() >= 1);
    }

    #[rstest]
    fn client_properties_advertise_capabilities() {
        let properties = ConnectionConfig::default().client_properties();
        for key in ["product", "version", "platform", "copyright", "information"] {
            assert!(properties.get(key).is_some(), "missing {key}");
        }
        let Some(FieldValue::Table(capabilities)) = properties.get("capabilities") else {
            panic!("capabilities table missing");
        };
        for key in [
            "publisher_confirms",
            "exchange_exchange_bindings",
            "basic.nack",
            "consumer_cancel_notify",
            "connection.blocked",
            "authentication_failure_close",
        ] {
            assert_eq!(capabilities.get(key), Some(&FieldValue::Bool(true)), "{key}");
        }
    }

    #[rstest]
    fn overrides_replace_mandatory_properties() {
        let properties = ConnectionConfig::default()
            .client_property("product", "orders-service")
            .client_property("connection_name", "worker-1")
            .client_properties();
        assert_eq!(properties.get("product"), Some(&FieldValue::from("orders-service")));
        assert_eq!(properties.get("connection_name"), Some(&FieldValue::from("worker-1")));
    }

    #[rstest]
    #[case::first_preference(b"PLAIN AMQPLAIN", "AMQPLAIN")]
    #[case::fallback(b"PLAIN", "PLAIN")]
    fn preference_order_is_honoured(#[case] offered: &[u8], #[case] chosen: &str) {
        let config = ConnectionConfig::default()
            .sasl_mechanisms([SaslMechanismKind::AmqPlain, SaslMechanismKind::Plain]);
        let mechanism = config.select_mechanism(offered).expect("offered");
        assert_eq!(mechanism.name(), chosen);
    }

    #[rstest]
    fn no_common_mechanism() {
        let config = ConnectionConfig::default();
        assert!(config.select_mechanism(b"EXTERNAL").is_none());
    }

    #[test]
    fn loads_from_partial_json() {
        let config: ConnectionConfig = serde_json::from_str(
            r#"{"host":"rabbit","requested_heartbeat_sec":5,"sasl_mechanisms":["EXTERNAL"]}"#,
        )
        .expect("config");
        assert_eq!(config.host_value(), "rabbit");
        assert_eq!(config.requested_heartbeat_value(), 5);
        assert_eq!(config.port_value(), 5672);
        assert_eq!(
            config.select_mechanism(b"PLAIN EXTERNAL").map(|m| m.name().to_owned()),
            Some("EXTERNAL".to_owned())
        );
    }
}
