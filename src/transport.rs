//! # MQTT Transport Abstraction
//!
//! This module defines the `MqttTransport` trait, which abstracts the underlying
//! communication channel (like TCP, UART, etc.), allowing the broker session to be
//! hardware and network-stack agnostic.
//!
//! Unlike a one-shot client, the bridge opens and closes the transport every time
//! the uplink comes and goes, so the trait carries `open`/`close` as well.

use crate::error::MqttError;
use embassy_net::IpEndpoint;
use embassy_net::tcp::{Error as TcpError, TcpSocket};
use embassy_time::{Duration, Timer};
use embedded_io_async::Write;

/// A placeholder error type used in contexts where the actual transport error is not known,
/// such as in the `EncodePacket` trait.
#[derive(Debug, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ErrorPlaceHolder;

/// A trait representing a transport for MQTT packets.
#[allow(async_fn_in_trait)]
pub trait MqttTransport {
    /// The error type returned by the transport.
    type Error: core::fmt::Debug;

    /// Establishes the underlying connection. Transports that are always
    /// connected (UART, SPI) keep the default.
    async fn open(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Tears down the underlying connection.
    async fn close(&mut self) {}

    /// Sends a buffer of data over the transport.
    async fn send(&mut self, buf: &[u8]) -> Result<(), Self::Error>;

    /// Receives data from the transport into a buffer.
    ///
    /// Returns the number of bytes read.
    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;
}

// Allow the placeholder to be treated as a transport error for generic contexts.
impl TransportError for ErrorPlaceHolder {}

/// A trait for transport-related errors.
pub trait TransportError: core::fmt::Debug {
    /// Whether the error only means no data arrived in time.
    fn is_timeout(&self) -> bool {
        false
    }
}

impl<T: core::fmt::Debug> TransportError for MqttError<T> {
    fn is_timeout(&self) -> bool {
        matches!(self, MqttError::Timeout)
    }
}

impl TransportError for TcpError {}

/// TCP transport implementation using `embassy-net`.
pub struct TcpTransport<'a> {
    socket: TcpSocket<'a>,
    remote: IpEndpoint,
    timeout: Duration,
}

impl<'a> TcpTransport<'a> {
    /// Creates a new `TcpTransport` that connects `socket` to the broker at `remote`.
    ///
    /// `timeout` bounds every read.
    pub fn new(socket: TcpSocket<'a>, remote: IpEndpoint, timeout: Duration) -> Self {
        Self {
            socket,
            remote,
            timeout,
        }
    }

    /// A helper function to perform a read with a timeout.
    async fn read_with_timeout(&mut self, buf: &mut [u8]) -> Result<usize, MqttError<TcpError>> {
        // Use `select` to race the read operation against a timer.
        let read_fut = self.socket.read(buf);
        let timer = Timer::after(self.timeout);

        match futures::future::select(core::pin::pin!(read_fut), core::pin::pin!(timer)).await {
            futures::future::Either::Left((Ok(0), _)) => {
                // If the peer closes the connection, read returns 0.
                warn!("tcp: connection closed by peer");
                Err(MqttError::Protocol(
                    crate::error::ProtocolError::ConnectionClosed,
                ))
            }
            futures::future::Either::Left((Ok(n), _)) => {
                trace!("tcp: read {} bytes", n);
                Ok(n)
            }
            futures::future::Either::Left((Err(e), _)) => {
                warn!("tcp: read error {:?}", crate::fmt::Dbg(&e));
                Err(MqttError::Transport(e))
            }
            futures::future::Either::Right(((), _)) => Err(MqttError::Timeout),
        }
    }
}

impl<'a> MqttTransport for TcpTransport<'a> {
    type Error = MqttError<TcpError>;

    async fn open(&mut self) -> Result<(), Self::Error> {
        self.socket.connect(self.remote).await.map_err(|e| {
            warn!("tcp: connect failed {:?}", crate::fmt::Dbg(&e));
            MqttError::Unreachable
        })
    }

    async fn close(&mut self) {
        self.socket.abort();
        // Wait until the RST went out so the socket can be reused.
        let _ = self.socket.flush().await;
    }

    async fn send(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
        trace!("tcp: write {} bytes", buf.len());

        self.socket
            .write_all(buf)
            .await
            .map_err(MqttError::Transport)?;

        // Flush to ensure data is actually sent to the network
        self.socket.flush().await.map_err(MqttError::Transport)
    }

    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.read_with_timeout(buf).await
    }
}
