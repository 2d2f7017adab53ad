//! TCP connection setup.

use std::{io, net::SocketAddr, time::Duration};

use serde::{Deserialize, Serialize};
use socket2::{SockRef, TcpKeepalive};
use tokio::net::{TcpSocket, TcpStream, lookup_host};

/// Socket options applied before connecting to the broker.
///
/// ```
/// use std::time::Duration;
///
/// use amqpframe::connection::SocketOptions;
///
/// let options = SocketOptions::default()
///     .nodelay(true)
///     .keepalive(Some(Duration::from_secs(30)));
/// assert_eq!(options.nodelay_setting(), Some(true));
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketOptions {
    nodelay: Option<bool>,
    #[serde(with = "keepalive_secs")]
    keepalive: Option<Option<Duration>>,
}

impl SocketOptions {
    /// Configure `TCP_NODELAY`.
    #[must_use]
    pub fn nodelay(mut self, enabled: bool) -> Self {
        self.nodelay = Some(enabled);
        self
    }

    /// Enable `SO_KEEPALIVE` with the given idle time, or disable it with
    /// `None`.
    #[must_use]
    pub fn keepalive(mut self, idle: Option<Duration>) -> Self {
        self.keepalive = Some(idle);
        self
    }

    /// The configured `TCP_NODELAY` value, if any.
    #[must_use]
    pub fn nodelay_setting(&self) -> Option<bool> { self.nodelay }

    fn apply(&self, socket: &TcpSocket) -> io::Result<()> {
        if let Some(enabled) = self.nodelay {
            socket.set_nodelay(enabled)?;
        }
        match self.keepalive {
            Some(Some(idle)) => {
                socket.set_keepalive(true)?;
                SockRef::from(socket).set_tcp_keepalive(&TcpKeepalive::new().with_time(idle))?;
            }
            Some(None) => socket.set_keepalive(false)?,
            None => {}
        }
        Ok(())
    }
}

mod keepalive_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    // `Some(0)` stands for explicitly disabled keepalive.
    pub(super) fn serialize<S: Serializer>(
        value: &Option<Option<Duration>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        value
            .map(|idle| idle.map_or(0, |idle| idle.as_secs()))
            .serialize(serializer)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Option<Duration>>, D::Error> {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(|secs| (secs > 0).then(|| Duration::from_secs(secs))))
    }
}

/// Resolve `host`, then connect to the first address that accepts within
/// `timeout`.
pub(crate) async fn connect(
    host: &str,
    port: u16,
    options: SocketOptions,
    timeout: Option<Duration>,
) -> io::Result<TcpStream> {
    let mut last_error = None;
    for addr in lookup_host((host, port)).await? {
        match connect_addr(addr, options, timeout).await {
            Ok(stream) => return Ok(stream),
            Err(error) => {
                tracing::debug!(%addr, %error, "connect attempt failed");
                last_error = Some(error);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, format!("{host} resolved to no addresses"))
    }))
}

async fn connect_addr(
    addr: SocketAddr,
    options: SocketOptions,
    timeout: Option<Duration>,
) -> io::Result<TcpStream> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    options.apply(&socket)?;
    let connecting = socket.connect(addr);
    match timeout {
        Some(limit) => tokio::time::timeout(limit, connecting)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, format!("connect to {addr} timed out")))?,
        None => connecting.await,
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;

    #[tokio::test]
    async fn connects_with_options_applied() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let options = SocketOptions::default()
            .nodelay(true)
            .keepalive(Some(Duration::from_secs(30)));
        let stream = connect("127.0.0.1", port, options, Some(Duration::from_secs(5)))
            .await
            .expect("connect");
        assert!(stream.nodelay().expect("nodelay"));
    }

    #[test]
    fn disabled_keepalive_survives_serde() {
        let options = SocketOptions::default().keepalive(None);
        let json = serde_json::to_string(&options).expect("serialize");
        let back: SocketOptions = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, options);
    }
}
