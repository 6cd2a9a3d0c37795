//! # MQTT Packet Structures and Serialization
//!
//! This module defines the MQTT 3.1.1 control packets the broker session needs and
//! the traits for encoding and decoding them to and from a byte buffer. Only the
//! client side of each exchange is implemented: packets the session sends are
//! `EncodePacket`, packets the broker sends are `DecodePacket`.

use crate::error::{MqttError, ProtocolError};
use crate::transport;
use crate::util::{self, read_u16, read_utf8_string, write_utf8_string};
use heapless::Vec;

type WireResult<T> = Result<T, MqttError<transport::ErrorPlaceHolder>>;

/// Protocol level byte for MQTT 3.1.1.
const PROTOCOL_LEVEL: u8 = 4;

/// Represents the Quality of Service (QoS) levels for MQTT messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum QoS {
    #[default]
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl QoS {
    fn from_bits(bits: u8) -> WireResult<Self> {
        match bits {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            _ => Err(MqttError::Protocol(ProtocolError::MalformedPacket)),
        }
    }
}

/// A trait for packets that can be encoded into a byte buffer.
pub trait EncodePacket {
    fn encode(&self, buf: &mut [u8]) -> WireResult<usize>;
}

/// A trait for packets that can be decoded from a byte buffer.
pub trait DecodePacket<'a>: Sized {
    fn decode(buf: &'a [u8]) -> WireResult<Self>;
}

/// An enumeration of the MQTT control packets a client can receive.
#[derive(Debug)]
pub enum MqttPacket<'a> {
    ConnAck(ConnAck),
    Publish(Publish<'a>),
    Ack(Ack),
    SubAck(SubAck),
    PingResp,
}

/// Decodes one complete packet from the start of `buf`.
pub fn decode<'a, T>(buf: &'a [u8]) -> Result<Option<MqttPacket<'a>>, MqttError<T>>
where
    T: transport::TransportError,
{
    let Some(&first) = buf.first() else {
        return Ok(None);
    };

    let packet_type = first >> 4;
    let packet = match packet_type {
        2 => MqttPacket::ConnAck(ConnAck::decode(buf).map_err(MqttError::from_packet)?),
        3 => MqttPacket::Publish(Publish::decode(buf).map_err(MqttError::from_packet)?),
        4..=7 => MqttPacket::Ack(Ack::decode(buf).map_err(MqttError::from_packet)?),
        9 => MqttPacket::SubAck(SubAck::decode(buf).map_err(MqttError::from_packet)?),
        13 => MqttPacket::PingResp,
        _ => {
            return Err(MqttError::Protocol(ProtocolError::InvalidPacketType(
                packet_type,
            )));
        }
    };

    Ok(Some(packet))
}

/// Copies `bytes` into `buf` at `cursor`, advancing it.
fn put(buf: &mut [u8], cursor: &mut usize, bytes: &[u8]) -> WireResult<()> {
    let end = *cursor + bytes.len();
    buf.get_mut(*cursor..end)
        .ok_or(MqttError::BufferTooSmall)?
        .copy_from_slice(bytes);
    *cursor = end;
    Ok(())
}

/// Writes the fixed header for a packet whose variable part was staged at
/// `content_start..cursor`, then moves the content right behind the header.
fn finish(buf: &mut [u8], header: u8, content_start: usize, cursor: usize) -> WireResult<usize> {
    let remaining_len = cursor - content_start;
    *buf.first_mut().ok_or(MqttError::BufferTooSmall)? = header;
    let len_bytes = util::write_variable_byte_integer_len(&mut buf[1..], remaining_len)?;
    let header_len = 1 + len_bytes;
    buf.copy_within(content_start..cursor, header_len);
    Ok(header_len + remaining_len)
}

/// Returns the byte range of the variable header and payload of `buf`.
fn body(buf: &[u8]) -> WireResult<(usize, usize)> {
    let mut cursor = 1;
    let remaining_len = util::read_variable_byte_integer(&mut cursor, buf)?;
    let end = cursor + remaining_len;
    if end > buf.len() {
        return Err(MqttError::Protocol(ProtocolError::MalformedPacket));
    }
    Ok((cursor, end))
}

// Variable-length content is staged after a 5-byte gap (header byte plus the
// longest remaining-length encoding) and compacted by `finish`.
const CONTENT_START: usize = 5;

// --- CONNECT Packet ---
#[derive(Debug)]
pub struct Connect<'a> {
    pub clean_session: bool,
    pub keep_alive: u16,
    pub client_id: &'a str,
    pub username: Option<&'a str>,
    pub password: Option<&'a [u8]>,
}

impl<'a> Connect<'a> {
    pub fn new(client_id: &'a str, keep_alive: u16, clean_session: bool) -> Self {
        Self {
            client_id,
            keep_alive,
            clean_session,
            username: None,
            password: None,
        }
    }
}

impl EncodePacket for Connect<'_> {
    fn encode(&self, buf: &mut [u8]) -> WireResult<usize> {
        let mut cursor = CONTENT_START;
        if buf.len() < cursor {
            return Err(MqttError::BufferTooSmall);
        }
        cursor += write_utf8_string(&mut buf[cursor..], "MQTT")?;

        let mut flags = 0;
        if self.clean_session {
            flags |= 0x02;
        }
        if self.username.is_some() {
            flags |= 0x80;
        }
        if self.password.is_some() {
            flags |= 0x40;
        }
        put(buf, &mut cursor, &[PROTOCOL_LEVEL, flags])?;
        put(buf, &mut cursor, &self.keep_alive.to_be_bytes())?;

        cursor += write_utf8_string(&mut buf[cursor..], self.client_id)?;
        if let Some(username) = self.username {
            cursor += write_utf8_string(&mut buf[cursor..], username)?;
        }
        if let Some(password) = self.password {
            let len = u16::try_from(password.len())
                .map_err(|_| MqttError::Protocol(ProtocolError::PayloadTooLarge))?;
            put(buf, &mut cursor, &len.to_be_bytes())?;
            put(buf, &mut cursor, password)?;
        }

        finish(buf, 0x10, CONTENT_START, cursor)
    }
}

// --- CONNACK Packet ---
#[derive(Debug)]
pub struct ConnAck {
    pub session_present: bool,
    pub reason_code: u8,
}

impl DecodePacket<'_> for ConnAck {
    fn decode(buf: &[u8]) -> WireResult<Self> {
        let (start, end) = body(buf)?;
        if end - start != 2 {
            return Err(MqttError::Protocol(ProtocolError::MalformedPacket));
        }
        Ok(Self {
            session_present: (buf[start] & 0x01) != 0,
            reason_code: buf[start + 1],
        })
    }
}

// --- PUBLISH Packet ---
#[derive(Debug)]
pub struct Publish<'a> {
    pub topic: &'a str,
    pub qos: QoS,
    pub payload: &'a [u8],
    pub packet_id: Option<u16>,
}

impl<'a> DecodePacket<'a> for Publish<'a> {
    fn decode(buf: &'a [u8]) -> WireResult<Self> {
        let first = *buf
            .first()
            .ok_or(MqttError::Protocol(ProtocolError::MalformedPacket))?;
        let flags = first & 0x0F;
        let qos = QoS::from_bits((flags >> 1) & 0x03)?;

        let (mut cursor, end) = body(buf)?;
        let packet = &buf[..end];

        let topic = read_utf8_string(&mut cursor, packet)?;

        let packet_id = if qos != QoS::AtMostOnce {
            Some(read_u16(&mut cursor, packet)?)
        } else {
            None
        };

        Ok(Publish {
            topic,
            qos,
            payload: &packet[cursor..],
            packet_id,
        })
    }
}

impl EncodePacket for Publish<'_> {
    fn encode(&self, buf: &mut [u8]) -> WireResult<usize> {
        let mut cursor = CONTENT_START;
        if buf.len() < cursor {
            return Err(MqttError::BufferTooSmall);
        }

        // Topic name
        cursor += write_utf8_string(&mut buf[cursor..], self.topic)?;

        // Packet ID (only for QoS > 0)
        if self.qos != QoS::AtMostOnce {
            let id = self
                .packet_id
                .ok_or(MqttError::Protocol(ProtocolError::MalformedPacket))?;
            put(buf, &mut cursor, &id.to_be_bytes())?;
        }

        put(buf, &mut cursor, self.payload)?;

        let header = 0x30 | ((self.qos as u8) << 1);
        finish(buf, header, CONTENT_START, cursor)
    }
}

// --- PUBACK / PUBREC / PUBREL / PUBCOMP Packets ---

/// The four two-byte acknowledgements of the publish flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AckKind {
    PubAck,
    PubRec,
    PubRel,
    PubComp,
}

impl AckKind {
    fn header(self) -> u8 {
        match self {
            AckKind::PubAck => 0x40,
            AckKind::PubRec => 0x50,
            // PUBREL carries the reserved flag bits 0b0010.
            AckKind::PubRel => 0x62,
            AckKind::PubComp => 0x70,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub kind: AckKind,
    pub packet_id: u16,
}

impl Ack {
    pub fn new(kind: AckKind, packet_id: u16) -> Self {
        Self { kind, packet_id }
    }
}

impl DecodePacket<'_> for Ack {
    fn decode(buf: &[u8]) -> WireResult<Self> {
        let first = *buf
            .first()
            .ok_or(MqttError::Protocol(ProtocolError::MalformedPacket))?;
        let kind = match first >> 4 {
            4 => AckKind::PubAck,
            5 => AckKind::PubRec,
            6 => AckKind::PubRel,
            7 => AckKind::PubComp,
            other => {
                return Err(MqttError::Protocol(ProtocolError::InvalidPacketType(other)));
            }
        };
        let (mut cursor, end) = body(buf)?;
        let packet_id = read_u16(&mut cursor, &buf[..end])?;
        Ok(Ack { kind, packet_id })
    }
}

impl EncodePacket for Ack {
    fn encode(&self, buf: &mut [u8]) -> WireResult<usize> {
        let [hi, lo] = self.packet_id.to_be_bytes();
        let mut cursor = 0;
        put(buf, &mut cursor, &[self.kind.header(), 0x02, hi, lo])?;
        Ok(cursor)
    }
}

// --- SUBSCRIBE Packet ---
#[derive(Debug)]
pub struct Subscribe<'a> {
    pub packet_id: u16,
    pub topics: Vec<(&'a str, QoS), 8>,
}

impl<'a> Subscribe<'a> {
    /// Creates a new Subscribe packet with a single topic.
    pub fn new(packet_id: u16, topic: &'a str, qos: QoS) -> Self {
        let mut topics = Vec::new();
        let _ = topics.push((topic, qos));
        Self { packet_id, topics }
    }
}

impl EncodePacket for Subscribe<'_> {
    fn encode(&self, buf: &mut [u8]) -> WireResult<usize> {
        let mut cursor = CONTENT_START;
        if buf.len() < cursor {
            return Err(MqttError::BufferTooSmall);
        }

        // Packet ID
        put(buf, &mut cursor, &self.packet_id.to_be_bytes())?;

        // Topic filters with QoS
        for (topic, qos) in &self.topics {
            cursor += write_utf8_string(&mut buf[cursor..], topic)?;
            put(buf, &mut cursor, &[*qos as u8])?;
        }

        // Fixed header: SUBSCRIBE packet type (8) with reserved bits (0x02)
        finish(buf, 0x82, CONTENT_START, cursor)
    }
}

// --- SUBACK Packet ---
#[derive(Debug)]
pub struct SubAck {
    pub packet_id: u16,
    pub reason_codes: Vec<u8, 8>,
}

impl SubAck {
    /// Return code a broker uses to reject a subscription.
    pub const FAILURE: u8 = 0x80;
}

impl DecodePacket<'_> for SubAck {
    fn decode(buf: &[u8]) -> WireResult<Self> {
        let (mut cursor, end) = body(buf)?;
        let packet = &buf[..end];

        let packet_id = read_u16(&mut cursor, packet)?;

        let mut reason_codes = Vec::new();
        for &code in &packet[cursor..] {
            reason_codes
                .push(code)
                .map_err(|_| MqttError::Protocol(ProtocolError::PayloadTooLarge))?;
        }

        Ok(SubAck {
            packet_id,
            reason_codes,
        })
    }
}

// --- PINGREQ Packet ---
#[derive(Debug)]
pub struct PingReq;

impl EncodePacket for PingReq {
    fn encode(&self, buf: &mut [u8]) -> WireResult<usize> {
        let mut cursor = 0;
        put(buf, &mut cursor, &[0xC0, 0x00])?;
        Ok(cursor)
    }
}

// --- DISCONNECT Packet ---
#[derive(Debug)]
pub struct Disconnect;

impl EncodePacket for Disconnect {
    fn encode(&self, buf: &mut [u8]) -> WireResult<usize> {
        let mut cursor = 0;
        put(buf, &mut cursor, &[0xE0, 0x00])?;
        Ok(cursor)
    }
}
