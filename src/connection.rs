//! Connection manager for the controller's stream transport.
//!
//! Owns the single connection to the controller and provides frame-level I/O
//! on top of it: connect, reconnect, send a frame, receive a fixed-size frame,
//! and the graceful end-of-session close.
//!
//! # Transport Seam
//!
//! The manager dials through a [`Connector`], which yields a type-erased
//! [`DynStream`]. Production code uses [`TcpConnector`]; tests hand in
//! `tokio::io::duplex` halves or a loopback listener.
//!
//! # States
//!
//! ```text
//! Disconnected --connect--> Connected --close--> Closed
//!       ^                       |
//!       +------reconnect--------+
//! ```
//!
//! `Closed` is terminal. The manager takes `&mut self` for every I/O method,
//! so the transport can never be used by two callers at once.

use crate::config::{DeviceConfig, LinkConfig};
use crate::error::{LinkError, LinkResult, ProtocolError, TransportError};
use crate::protocol::encode_connection_end;
use crate::recovery::{CancelSignal, Recoverable, RetryPolicy};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::future::BoxFuture;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

/// Trait alias for a bidirectional byte stream.
///
/// Any type implementing `AsyncRead + AsyncWrite + Unpin + Send` can carry the
/// link, including `tokio::net::TcpStream` and `tokio::io::DuplexStream`.
pub trait LinkStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> LinkStream for T {}

/// Type-erased boxed stream.
pub type DynStream = Box<dyn LinkStream>;

/// Opens new transport connections to the controller.
pub trait Connector: Send + Sync {
    /// Dial the controller once.
    fn connect(&self) -> BoxFuture<'_, io::Result<DynStream>>;

    /// Human-readable peer description for diagnostics.
    fn describe(&self) -> String;
}

/// TCP connector for a `host:port` endpoint.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: String,
}

impl TcpConnector {
    /// Connector for a `host:port` address.
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    /// Connector for the configured device.
    pub fn from_config(config: &DeviceConfig) -> Self {
        Self::new(config.addr())
    }
}

impl Connector for TcpConnector {
    fn connect(&self) -> BoxFuture<'_, io::Result<DynStream>> {
        Box::pin(async move {
            let stream = TcpStream::connect(&self.addr).await?;
            // Frames are tiny and latency-bound.
            stream.set_nodelay(true)?;
            Ok(Box::new(stream) as DynStream)
        })
    }

    fn describe(&self) -> String {
        self.addr.clone()
    }
}

/// Connect and I/O timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Applied to each connection attempt.
    pub connect: Duration,
    /// Applied separately to each frame send and each frame receive.
    pub io: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(5),
            io: Duration::from_secs(5),
        }
    }
}

impl From<&DeviceConfig> for Timeouts {
    fn from(config: &DeviceConfig) -> Self {
        Self {
            connect: config.connect_timeout,
            io: config.io_timeout,
        }
    }
}

/// Lifecycle of the managed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No open stream; `connect` or `reconnect` may open one.
    Disconnected,
    /// A stream is open.
    Connected,
    /// Terminal; reached after `close`.
    Closed,
}

/// Owns the transport and performs frame-level I/O on it.
pub struct ConnectionManager {
    connector: Box<dyn Connector>,
    stream: Option<DynStream>,
    state: LinkState,
    timeouts: Timeouts,
    reconnects: u64,
}

impl ConnectionManager {
    /// Manager dialling through `connector`. Starts `Disconnected`.
    pub fn new(connector: impl Connector + 'static, timeouts: Timeouts) -> Self {
        Self {
            connector: Box::new(connector),
            stream: None,
            state: LinkState::Disconnected,
            timeouts,
            reconnects: 0,
        }
    }

    /// TCP connection manager for the configured device.
    pub fn from_config(config: &LinkConfig) -> Self {
        Self::new(
            TcpConnector::from_config(&config.device),
            Timeouts::from(&config.device),
        )
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// True while a stream is open.
    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected
    }

    /// Number of `reconnect` calls so far.
    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }

    /// Description of the dialled peer.
    pub fn peer(&self) -> String {
        self.connector.describe()
    }

    /// Open a new connection. Not retried; the caller decides what to do
    /// with a failure.
    #[instrument(skip(self), fields(addr = %self.connector.describe()), err)]
    pub async fn connect(&mut self) -> Result<(), TransportError> {
        if self.state == LinkState::Closed {
            return Err(TransportError::Closed);
        }

        info!("Connecting to controller");
        let stream = timeout(self.timeouts.connect, self.connector.connect())
            .await
            .map_err(|_| TransportError::Timeout {
                operation: "connect",
                after: self.timeouts.connect,
            })?
            .map_err(|source| TransportError::Connect {
                addr: self.connector.describe(),
                source,
            })?;

        self.stream = Some(stream);
        self.state = LinkState::Connected;
        Ok(())
    }

    /// Drop the current connection, ignoring errors, and open a new one.
    #[instrument(skip(self), fields(addr = %self.connector.describe(), reconnects = self.reconnects), err)]
    pub async fn reconnect(&mut self) -> Result<(), TransportError> {
        if self.state == LinkState::Closed {
            return Err(TransportError::Closed);
        }

        warn!("Closing connection for reconnect");
        self.shutdown_stream().await;
        self.reconnects += 1;
        self.connect().await
    }

    /// Write a whole frame. Either the frame is flushed or an error is
    /// returned.
    #[instrument(skip(self, frame), fields(len = frame.len()), err)]
    pub async fn send_frame(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        let io_timeout = self.timeouts.io;
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;

        debug!(bytes = ?frame, "Sending frame");
        let write = async {
            stream.write_all(frame).await?;
            stream.flush().await
        };

        match timeout(io_timeout, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(TransportError::Send(e)),
            Err(_) => Err(TransportError::Timeout {
                operation: "send",
                after: io_timeout,
            }),
        }
    }

    /// Read exactly `expected_len` bytes.
    ///
    /// # Errors
    /// - `ProtocolError::ShortRead` if the stream ends first
    /// - `TransportError::Recv` / `Timeout` on transport failure
    #[instrument(skip(self), err)]
    pub async fn recv_frame(&mut self, expected_len: usize) -> LinkResult<Bytes> {
        let io_timeout = self.timeouts.io;
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;

        let mut buf = BytesMut::zeroed(expected_len);
        let read = async {
            let mut filled = 0;
            while filled < expected_len {
                let n = stream
                    .read(&mut buf[filled..])
                    .await
                    .map_err(TransportError::Recv)?;
                if n == 0 {
                    return Err(LinkError::from(ProtocolError::ShortRead {
                        expected: expected_len,
                        received: filled,
                    }));
                }
                filled += n;
            }
            Ok::<(), LinkError>(())
        };

        match timeout(io_timeout, read).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(TransportError::Timeout {
                    operation: "recv",
                    after: io_timeout,
                }
                .into())
            }
        }

        debug!(bytes = ?&buf[..], "Received frame");
        Ok(buf.freeze())
    }

    /// Send the end-of-session frame, then close the transport.
    ///
    /// The send is retried according to `policy` until it succeeds; with the
    /// unbounded default this is an at-least-once goodbye that only stops on
    /// success or cancellation. The transport is shut down and the manager
    /// enters `Closed` whatever the outcome.
    ///
    /// Without an open stream (never connected, or the last reconnect was
    /// refused) there is no one to say goodbye to: the frame is skipped and
    /// the manager goes straight to `Closed`.
    #[instrument(skip(self, policy, cancel), err)]
    pub async fn close(&mut self, policy: &RetryPolicy, cancel: &CancelSignal) -> LinkResult<()> {
        if self.state == LinkState::Closed {
            return Ok(());
        }

        if self.stream.is_none() {
            warn!(state = ?self.state, "No open connection, skipping connection end");
            self.state = LinkState::Closed;
            return Ok(());
        }

        let frame = encode_connection_end();
        let mut failures = 0u32;
        let outcome = loop {
            if let Err(e) = cancel.check() {
                break Err(e);
            }

            info!("Sending connection end");
            match self.send_frame(&frame).await {
                Ok(()) => break Ok(()),
                Err(e) => {
                    failures += 1;
                    warn!(error = %e, attempt = failures, "Failed to send connection end");
                    if !policy.allows_retry(failures) {
                        break Err(LinkError::RetriesExhausted {
                            operation: "close",
                            attempts: failures,
                        });
                    }
                    if let Err(e) = cancel.sleep(policy.backoff).await {
                        break Err(e);
                    }
                }
            }
        };

        info!("Closing connection");
        self.shutdown_stream().await;
        self.state = LinkState::Closed;
        outcome
    }

    async fn shutdown_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            // Best effort; the peer may already be gone.
            let _ = timeout(self.timeouts.io, stream.shutdown()).await;
        }
        if self.state == LinkState::Connected {
            self.state = LinkState::Disconnected;
        }
    }
}

#[async_trait]
impl Recoverable<LinkError> for ConnectionManager {
    async fn recover(&mut self) -> Result<(), LinkError> {
        self.reconnect().await.map_err(LinkError::from)
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("peer", &self.connector.describe())
            .field("state", &self.state)
            .field("timeouts", &self.timeouts)
            .field("reconnects", &self.reconnects)
            .finish()
    }
}
