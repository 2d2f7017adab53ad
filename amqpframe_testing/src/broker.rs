//! A broker stand-in that speaks just enough AMQP for tests to script.
//!
//! The broker reads raw frames off the server end of a duplex stream,
//! reassembles them into [`Command`]s per channel and lets the test decide
//! every reply. Nothing is answered automatically apart from the handshake
//! helpers.

use std::{collections::HashMap, io};

use amqpframe::{
    Command,
    Connection,
    ConnectionConfig,
    Frame,
    FrameType,
    codec::FieldTable,
    command::CommandAssembler,
    frame::{AmqpFrameCodec, PROTOCOL_HEADER},
    protocol::{
        BasicProperties,
        Method,
        MethodArgs,
        MethodId,
        method::{
            ChannelOpen,
            ChannelOpenOk,
            ConnectionOpen,
            ConnectionOpenOk,
            ConnectionStart,
            ConnectionStartOk,
            ConnectionTune,
            ConnectionTuneOk,
        },
    },
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, DuplexStream, duplex};
use tokio_util::codec::Framed;

/// Capacity of the in-memory stream between client and broker.
pub const DUPLEX_CAPACITY: usize = 256 * 1024;

/// Tuning offered by [`connect`] when a test has no preference.
#[must_use]
pub fn default_tune() -> ConnectionTune {
    ConnectionTune {
        channel_max: 2047,
        frame_max: 131_072,
        heartbeat: 0,
    }
}

fn invalid(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}

/// Server end of a client connection.
pub struct ScriptedBroker {
    framed: Framed<DuplexStream, AmqpFrameCodec>,
    assemblers: HashMap<u16, CommandAssembler>,
    heartbeats: usize,
}

impl ScriptedBroker {
    /// Wait for the client's protocol header.
    ///
    /// # Errors
    ///
    /// Fails if the stream closes or the header is not AMQP 0-9-1.
    pub async fn accept(mut stream: DuplexStream) -> io::Result<Self> {
        let mut header = [0_u8; 8];
        stream.read_exact(&mut header).await?;
        if header != PROTOCOL_HEADER {
            return Err(invalid(format!("unexpected protocol header {header:?}")));
        }
        Ok(Self {
            framed: Framed::new(stream, AmqpFrameCodec::new(0)),
            assemblers: HashMap::new(),
            heartbeats: 0,
        })
    }

    /// Heartbeat frames received so far.
    #[must_use]
    pub fn heartbeats_received(&self) -> usize { self.heartbeats }

    /// Write one frame.
    ///
    /// # Errors
    ///
    /// Fails if the client end has gone away.
    pub async fn send_frame(&mut self, frame: Frame) -> io::Result<()> {
        self.framed.send(frame).await.map_err(io::Error::other)
    }

    /// Write `command` on `channel` as method, header and body frames.
    ///
    /// # Errors
    ///
    /// Fails if the command cannot be encoded or the client end has gone
    /// away.
    pub async fn send_command(&mut self, channel: u16, command: &Command) -> io::Result<()> {
        let frames = command.to_frames(channel, 0).map_err(io::Error::other)?;
        for frame in frames {
            self.framed.feed(frame).await.map_err(io::Error::other)?;
        }
        self.framed.flush().await.map_err(io::Error::other)
    }

    /// Write a content-less method on `channel`.
    ///
    /// # Errors
    ///
    /// See [`ScriptedBroker::send_command`].
    pub async fn send(&mut self, channel: u16, method: impl Into<Method>) -> io::Result<()> {
        self.send_command(channel, &Command::new(method)).await
    }

    /// Write a method followed by its content on `channel`.
    ///
    /// # Errors
    ///
    /// See [`ScriptedBroker::send_command`].
    pub async fn send_with_content(
        &mut self,
        channel: u16,
        method: impl Into<Method>,
        properties: BasicProperties,
        body: impl Into<Bytes>,
    ) -> io::Result<()> {
        let command = Command::with_content(method, properties, body.into());
        self.send_command(channel, &command).await
    }

    /// Read the next frame; `None` once the client closed the stream.
    ///
    /// # Errors
    ///
    /// Fails on malformed frames.
    pub async fn recv_frame(&mut self) -> io::Result<Option<Frame>> {
        match self.framed.next().await {
            Some(frame) => frame.map(Some).map_err(io::Error::other),
            None => Ok(None),
        }
    }

    /// Read the next complete command, skipping heartbeats.
    ///
    /// # Errors
    ///
    /// Fails on malformed frames or frames out of command order.
    pub async fn recv_command(&mut self) -> io::Result<Option<(u16, Command)>> {
        while let Some(frame) = self.recv_frame().await? {
            if frame.frame_type() == FrameType::Heartbeat {
                self.heartbeats += 1;
                continue;
            }
            let channel = frame.channel();
            let assembled = self
                .assemblers
                .entry(channel)
                .or_default()
                .handle_frame(frame)
                .map_err(io::Error::other)?;
            if let Some(command) = assembled {
                return Ok(Some((channel, command)));
            }
        }
        Ok(None)
    }

    /// Read the next command and check it is the method `expected`.
    ///
    /// # Errors
    ///
    /// Fails if the stream closes first or another method arrives.
    pub async fn expect(&mut self, expected: MethodId) -> io::Result<(u16, Command)> {
        let Some((channel, command)) = self.recv_command().await? else {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("stream closed while expecting method {expected}"),
            ));
        };
        if command.method().id() != expected {
            return Err(invalid(format!(
                "expected method {expected}, got {} on channel {channel}",
                command.method().name()
            )));
        }
        Ok((channel, command))
    }

    /// Read the next command, which must be `M`, and return its arguments.
    ///
    /// # Errors
    ///
    /// See [`ScriptedBroker::expect`].
    pub async fn expect_method<M>(&mut self) -> io::Result<(u16, M)>
    where
        M: MethodArgs + TryFrom<Method>,
    {
        let (channel, command) = self.expect(M::ID).await?;
        let (method, _) = command.into_parts();
        M::try_from(method)
            .map(|args| (channel, args))
            .map_err(|_| invalid(format!("could not unwrap {}", M::NAME)))
    }

    /// Play the server side of connection negotiation, offering `tune`.
    ///
    /// Returns the client's `connection.start-ok` and `connection.tune-ok`.
    ///
    /// # Errors
    ///
    /// Fails if the client deviates from the expected sequence.
    pub async fn negotiate(
        &mut self,
        tune: ConnectionTune,
    ) -> io::Result<(ConnectionStartOk, ConnectionTuneOk)> {
        self.send(0, start_method()).await?;
        let (_, start_ok) = self.expect_method::<ConnectionStartOk>().await?;
        self.send(0, tune).await?;
        let (_, tune_ok) = self.expect_method::<ConnectionTuneOk>().await?;
        let (_, _open) = self.expect_method::<ConnectionOpen>().await?;
        self.send(0, ConnectionOpenOk::default()).await?;
        Ok((start_ok, tune_ok))
    }

    /// Answer the next `channel.open`; returns the channel number.
    ///
    /// # Errors
    ///
    /// Fails if something other than `channel.open` arrives.
    pub async fn accept_channel(&mut self) -> io::Result<u16> {
        let (channel, _) = self.expect(ChannelOpen::ID).await?;
        self.send(channel, ChannelOpenOk).await?;
        Ok(channel)
    }

    /// Read until the client closes the stream, returning what it sent.
    ///
    /// # Errors
    ///
    /// Fails on malformed frames.
    pub async fn drain(&mut self) -> io::Result<Vec<(u16, Command)>> {
        let mut received = Vec::new();
        while let Some(command) = self.recv_command().await? {
            received.push(command);
        }
        Ok(received)
    }
}

/// The `connection.start` a RabbitMQ-like broker sends.
#[must_use]
pub fn start_method() -> ConnectionStart {
    ConnectionStart {
        version_major: 0,
        version_minor: 9,
        server_properties: FieldTable::new()
            .with("product", "scripted-broker")
            .with("capabilities", FieldTable::new().with("publisher_confirms", true)),
        mechanisms: Bytes::from_static(b"PLAIN AMQPLAIN"),
        locales: Bytes::from_static(b"en_US"),
    }
}

/// A connected client and the scripted broker end of its stream.
///
/// # Panics
///
/// Panics if either side of the handshake fails.
pub async fn connect(config: ConnectionConfig, tune: ConnectionTune) -> (Connection, ScriptedBroker) {
    let (client, server) = duplex(DUPLEX_CAPACITY);
    let broker = async move {
        let mut broker = ScriptedBroker::accept(server).await?;
        broker.negotiate(tune).await?;
        Ok::<_, io::Error>(broker)
    };
    let (connection, broker) = tokio::join!(Connection::open_with_stream(client, config), broker);
    (
        connection.expect("client handshake"),
        broker.expect("broker handshake"),
    )
}
