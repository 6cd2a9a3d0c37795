//! Client side of one MQTT 3.1.1 broker session.
//!
//! The session keeps a single receive buffer. A publish handed out by
//! [`MqttSession::poll`] borrows it and is released on the next call. Publishes
//! that arrive while the session waits for an acknowledgement are parked in a
//! one-slot stash and delivered by the following `poll`.

use embassy_time::{Duration, Instant, with_timeout};

use super::client::BrokerClient;
use crate::config::SessionOptions;
use crate::error::{ConnectReasonCode, MqttError, ProtocolError};
use crate::fmt::Dbg;
use crate::packet::{
    self, Ack, AckKind, Connect, DecodePacket, Disconnect, EncodePacket, MqttPacket, PingReq,
    Publish, QoS, SubAck, Subscribe,
};
use crate::transport::{MqttTransport, TransportError};
use crate::util;

type SessionResult<R, E> = Result<R, MqttError<E>>;

/// Owned summary of a received packet, so the receive buffer can be
/// released before replying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    ConnAck(u8),
    Publish { qos: QoS, packet_id: Option<u16> },
    Ack(Ack),
    SubAck { packet_id: u16, rejected: bool },
    PingResp,
}

fn classify<E: TransportError>(buf: &[u8]) -> SessionResult<Frame, E> {
    let packet =
        packet::decode::<E>(buf)?.ok_or(MqttError::Protocol(ProtocolError::MalformedPacket))?;
    Ok(match packet {
        MqttPacket::ConnAck(ack) => Frame::ConnAck(ack.reason_code),
        MqttPacket::Publish(publish) => Frame::Publish {
            qos: publish.qos,
            packet_id: publish.packet_id,
        },
        MqttPacket::Ack(ack) => Frame::Ack(ack),
        MqttPacket::SubAck(ack) => Frame::SubAck {
            packet_id: ack.packet_id,
            rejected: ack.reason_codes.contains(&SubAck::FAILURE),
        },
        MqttPacket::PingResp => Frame::PingResp,
    })
}

/// Frame handed out by the last `poll`.
#[derive(Debug, Clone, Copy)]
enum Held {
    Nothing,
    Rx(usize),
    Stash,
}

/// A broker session over transport `T` with `BUF`-byte packet buffers.
pub struct MqttSession<'a, T, const BUF: usize> {
    transport: T,
    options: SessionOptions<'a>,
    tx: [u8; BUF],
    rx: [u8; BUF],
    rx_len: usize,
    stash: [u8; BUF],
    stash_len: usize,
    held: Held,
    connected: bool,
    next_packet_id: u16,
    last_tx: Instant,
}

impl<'a, T, const BUF: usize> MqttSession<'a, T, BUF>
where
    T: MqttTransport,
    T::Error: TransportError,
{
    pub fn new(transport: T, options: SessionOptions<'a>) -> Self {
        Self {
            transport,
            options,
            tx: [0; BUF],
            rx: [0; BUF],
            rx_len: 0,
            stash: [0; BUF],
            stash_len: 0,
            held: Held::Nothing,
            connected: false,
            next_packet_id: 1,
            last_tx: Instant::now(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Opens the transport and performs the CONNECT/CONNACK handshake.
    pub async fn connect(&mut self) -> SessionResult<(), T::Error> {
        if self.connected {
            return Ok(());
        }
        self.reset_buffers();
        self.transport.open().await.map_err(MqttError::Transport)?;

        match self.handshake().await {
            Ok(()) => {
                self.connected = true;
                info!("mqtt: connected as {}", self.options.client_id);
                Ok(())
            }
            Err(e) => {
                warn!("mqtt: connect failed: {:?}", Dbg(&e));
                self.transport.close().await;
                self.reset_buffers();
                Err(e)
            }
        }
    }

    pub async fn disconnect(&mut self) {
        self.release();
        if self.connected {
            if let Err(e) = self.send_packet(&Disconnect).await {
                debug!("mqtt: disconnect not sent: {:?}", Dbg(&e));
            }
            info!("mqtt: disconnected");
        }
        self.drop_link().await;
    }

    /// Subscribes to one topic and waits for the SUBACK.
    ///
    /// A broker refusal is reported as [`MqttError::Rejected`] and leaves the
    /// session up.
    pub async fn subscribe(&mut self, topic: &str, qos: QoS) -> SessionResult<(), T::Error> {
        self.release();
        if !self.connected {
            return Err(MqttError::NotConnected);
        }
        let result = self.subscribe_flow(topic, qos).await;
        self.settle(result).await
    }

    /// Publishes and, for QoS 1 and 2, waits until the broker acknowledged.
    ///
    /// A payload that does not fit the transmit buffer is reported as
    /// [`MqttError::BufferTooSmall`] and leaves the session up.
    pub async fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
    ) -> SessionResult<(), T::Error> {
        self.release();
        if !self.connected {
            return Err(MqttError::NotConnected);
        }
        let result = self.publish_flow(topic, payload, qos).await;
        self.settle(result).await
    }

    /// Waits up to `timeout` for an inbound publish, sending keep-alive pings
    /// and answering the broker's acknowledgements meanwhile.
    pub async fn poll(&mut self, timeout: Duration) -> SessionResult<Option<Publish<'_>>, T::Error> {
        self.release();
        if !self.connected {
            return Err(MqttError::NotConnected);
        }
        if self.stash_len > 0 {
            self.held = Held::Stash;
            return Publish::decode(&self.stash[..self.stash_len])
                .map(Some)
                .map_err(MqttError::from_packet);
        }

        let result = self.next_publish(Instant::now() + timeout).await;
        match self.settle(result).await? {
            Some(len) => {
                self.held = Held::Rx(len);
                Publish::decode(&self.rx[..len])
                    .map(Some)
                    .map_err(MqttError::from_packet)
            }
            None => Ok(None),
        }
    }

    async fn handshake(&mut self) -> SessionResult<(), T::Error> {
        let options = self.options.clone();
        let mut connect = Connect::new(
            options.client_id,
            options.keep_alive_secs,
            options.clean_session,
        );
        connect.username = options.username;
        connect.password = options.password;
        self.send_packet(&connect).await?;

        let deadline = Instant::now() + options.ack_timeout;
        match self
            .wait_for(deadline, |f| matches!(f, Frame::ConnAck(_)))
            .await?
        {
            Frame::ConnAck(0) => Ok(()),
            Frame::ConnAck(code) => Err(MqttError::ConnectionRefused(ConnectReasonCode::from(
                code,
            ))),
            _ => Err(MqttError::Protocol(ProtocolError::InvalidResponse)),
        }
    }

    async fn subscribe_flow(&mut self, topic: &str, qos: QoS) -> SessionResult<(), T::Error> {
        let id = self.next_id();
        self.send_packet(&Subscribe::new(id, topic, qos)).await?;

        let deadline = Instant::now() + self.options.ack_timeout;
        let frame = self
            .wait_for(
                deadline,
                |f| matches!(f, Frame::SubAck { packet_id, .. } if *packet_id == id),
            )
            .await?;
        if let Frame::SubAck { rejected: true, .. } = frame {
            return Err(MqttError::Rejected);
        }
        debug!("mqtt: subscribed to {}", topic);
        Ok(())
    }

    async fn publish_flow(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
    ) -> SessionResult<(), T::Error> {
        let packet_id = (qos != QoS::AtMostOnce).then(|| self.next_id());
        self.send_packet(&Publish {
            topic,
            qos,
            payload,
            packet_id,
        })
        .await?;
        let Some(id) = packet_id else {
            return Ok(());
        };

        let deadline = Instant::now() + self.options.ack_timeout;
        if qos == QoS::ExactlyOnce {
            self.wait_for(deadline, |f| is_ack(f, AckKind::PubRec, id))
                .await?;
            self.send_packet(&Ack::new(AckKind::PubRel, id)).await?;
            self.wait_for(deadline, |f| is_ack(f, AckKind::PubComp, id))
                .await?;
        } else {
            self.wait_for(deadline, |f| is_ack(f, AckKind::PubAck, id))
                .await?;
        }
        Ok(())
    }

    /// Reads frames until an inbound publish is at the start of the receive
    /// buffer and returns its length.
    async fn next_publish(&mut self, deadline: Instant) -> SessionResult<Option<usize>, T::Error> {
        self.keep_alive().await?;
        loop {
            let Some(len) = self.read_frame(deadline).await? else {
                return Ok(None);
            };
            match classify::<T::Error>(&self.rx[..len])? {
                Frame::Publish { qos, packet_id } => {
                    self.acknowledge(qos, packet_id).await?;
                    return Ok(Some(len));
                }
                frame => {
                    self.consume(len);
                    self.answer(frame).await?;
                }
            }
        }
    }

    /// Reads frames until one satisfies `want`. Publishes met on the way are
    /// acknowledged and stashed.
    async fn wait_for(
        &mut self,
        deadline: Instant,
        want: impl Fn(&Frame) -> bool,
    ) -> SessionResult<Frame, T::Error> {
        loop {
            let Some(len) = self.read_frame(deadline).await? else {
                return Err(MqttError::Timeout);
            };
            let frame = classify::<T::Error>(&self.rx[..len])?;
            if let Frame::Publish { qos, packet_id } = frame {
                self.acknowledge(qos, packet_id).await?;
                self.stash_frame(len);
                continue;
            }
            self.consume(len);
            if want(&frame) {
                return Ok(frame);
            }
            self.answer(frame).await?;
        }
    }

    /// Handles a frame nobody is waiting for.
    async fn answer(&mut self, frame: Frame) -> SessionResult<(), T::Error> {
        match frame {
            Frame::Ack(Ack {
                kind: AckKind::PubRel,
                packet_id,
            }) => self.send_packet(&Ack::new(AckKind::PubComp, packet_id)).await,
            Frame::PingResp => {
                trace!("mqtt: pong");
                Ok(())
            }
            other => {
                debug!("mqtt: ignoring {:?}", Dbg(&other));
                Ok(())
            }
        }
    }

    async fn acknowledge(&mut self, qos: QoS, packet_id: Option<u16>) -> SessionResult<(), T::Error> {
        let kind = match qos {
            QoS::AtMostOnce => return Ok(()),
            QoS::AtLeastOnce => AckKind::PubAck,
            QoS::ExactlyOnce => AckKind::PubRec,
        };
        let id = packet_id.ok_or(MqttError::Protocol(ProtocolError::MalformedPacket))?;
        self.send_packet(&Ack::new(kind, id)).await
    }

    async fn keep_alive(&mut self) -> SessionResult<(), T::Error> {
        if self.options.keep_alive_secs == 0 {
            return Ok(());
        }
        let interval = Duration::from_secs(u64::from(self.options.keep_alive_secs)) / 2;
        if self.last_tx.elapsed() >= interval {
            trace!("mqtt: ping");
            self.send_packet(&PingReq).await?;
        }
        Ok(())
    }

    async fn send_packet(&mut self, packet: &impl EncodePacket) -> SessionResult<(), T::Error> {
        let len = packet.encode(&mut self.tx).map_err(MqttError::from_packet)?;
        self.transport
            .send(&self.tx[..len])
            .await
            .map_err(MqttError::Transport)?;
        self.last_tx = Instant::now();
        Ok(())
    }

    /// Returns the length of the complete frame at the start of the receive
    /// buffer, reading more bytes as needed. `None` means nothing complete
    /// arrived before `deadline`.
    async fn read_frame(&mut self, deadline: Instant) -> SessionResult<Option<usize>, T::Error> {
        loop {
            if let Some(len) =
                util::frame_len(&self.rx[..self.rx_len]).map_err(MqttError::from_packet)?
            {
                if len > BUF {
                    return Err(MqttError::Protocol(ProtocolError::PayloadTooLarge));
                }
                return Ok(Some(len));
            }
            if self.rx_len == BUF {
                return Err(MqttError::Protocol(ProtocolError::PayloadTooLarge));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let read = self.transport.recv(&mut self.rx[self.rx_len..]);
            match with_timeout(deadline - now, read).await {
                Err(_) => return Ok(None),
                Ok(Ok(0)) => {
                    return Err(MqttError::Protocol(ProtocolError::ConnectionClosed));
                }
                Ok(Ok(n)) => self.rx_len += n,
                Ok(Err(e)) if e.is_timeout() => return Ok(None),
                Ok(Err(e)) => return Err(MqttError::Transport(e)),
            }
        }
    }

    fn stash_frame(&mut self, len: usize) {
        if self.stash_len == 0 {
            self.stash[..len].copy_from_slice(&self.rx[..len]);
            self.stash_len = len;
        } else {
            warn!("mqtt: inbound message dropped while awaiting ack");
        }
        self.consume(len);
    }

    fn consume(&mut self, len: usize) {
        self.rx.copy_within(len..self.rx_len, 0);
        self.rx_len -= len;
    }

    /// Drops the frame handed out by the previous `poll`.
    fn release(&mut self) {
        match self.held {
            Held::Nothing => {}
            Held::Rx(len) => self.consume(len),
            Held::Stash => self.stash_len = 0,
        }
        self.held = Held::Nothing;
    }

    fn reset_buffers(&mut self) {
        self.rx_len = 0;
        self.stash_len = 0;
        self.held = Held::Nothing;
    }

    fn next_id(&mut self) -> u16 {
        let id = self.next_packet_id;
        self.next_packet_id = self.next_packet_id.checked_add(1).unwrap_or(1);
        id
    }

    /// Marks the session lost on every error except the ones that leave the
    /// stream intact.
    async fn settle<R>(
        &mut self,
        result: SessionResult<R, T::Error>,
    ) -> SessionResult<R, T::Error> {
        if let Err(e) = &result {
            if !matches!(e, MqttError::BufferTooSmall | MqttError::Rejected) {
                warn!("mqtt: session lost: {:?}", Dbg(e));
                self.drop_link().await;
            }
        }
        result
    }

    async fn drop_link(&mut self) {
        self.connected = false;
        self.transport.close().await;
        self.reset_buffers();
    }
}

fn is_ack(frame: &Frame, kind: AckKind, id: u16) -> bool {
    matches!(frame, Frame::Ack(ack) if ack.kind == kind && ack.packet_id == id)
}

impl<T, const BUF: usize> BrokerClient for MqttSession<'_, T, BUF>
where
    T: MqttTransport,
    T::Error: TransportError,
{
    type Error = MqttError<T::Error>;

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn connect(&mut self) -> Result<(), Self::Error> {
        MqttSession::connect(self).await
    }

    async fn disconnect(&mut self) {
        MqttSession::disconnect(self).await
    }

    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), Self::Error> {
        MqttSession::subscribe(self, topic, qos).await
    }

    async fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS) -> Result<(), Self::Error> {
        MqttSession::publish(self, topic, payload, qos).await
    }

    async fn poll(&mut self, timeout: Duration) -> Result<Option<Publish<'_>>, Self::Error> {
        MqttSession::poll(self, timeout).await
    }
}
