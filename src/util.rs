//! # MQTT Serialization Utilities
//!
//! This module provides helper functions for reading and writing MQTT-specific data types
//! from and to byte buffers, such as variable-byte integers and length-prefixed strings.

use crate::error::{MqttError, ProtocolError};
use crate::transport;

type WireResult<T> = Result<T, MqttError<transport::ErrorPlaceHolder>>;

/// Reads a variable-byte integer from the buffer, advancing the cursor.
///
/// This is a common encoding scheme in MQTT for packet lengths.
pub fn read_variable_byte_integer(cursor: &mut usize, buf: &[u8]) -> WireResult<usize> {
    let mut multiplier = 1;
    let mut value = 0;
    let mut i = 0;
    loop {
        let encoded_byte = buf
            .get(*cursor + i)
            .ok_or(MqttError::Protocol(ProtocolError::MalformedPacket))?;
        value += (encoded_byte & 127) as usize * multiplier;
        if (encoded_byte & 128) == 0 {
            break;
        }
        multiplier *= 128;
        i += 1;
        if i >= 4 {
            return Err(MqttError::Protocol(ProtocolError::MalformedPacket));
        }
    }
    *cursor += i + 1;
    Ok(value)
}

/// Writes a variable-byte integer at the start of `buf` and returns the byte count.
pub fn write_variable_byte_integer_len(buf: &mut [u8], mut val: usize) -> WireResult<usize> {
    let mut i = 0;
    loop {
        let mut encoded_byte = (val % 128) as u8;
        val /= 128;
        if val > 0 {
            encoded_byte |= 128;
        }
        *buf.get_mut(i).ok_or(MqttError::BufferTooSmall)? = encoded_byte;
        i += 1;
        if val == 0 {
            break;
        }
    }
    Ok(i)
}

/// Returns the total length of the first packet in `buf`, or `None` if the buffer
/// does not hold a complete packet yet.
pub fn frame_len(buf: &[u8]) -> WireResult<Option<usize>> {
    if buf.len() < 2 {
        return Ok(None);
    }
    let mut cursor = 1;
    let mut multiplier = 1;
    let mut remaining = 0;
    loop {
        let Some(byte) = buf.get(cursor) else {
            // Length field itself is still incomplete.
            return Ok(None);
        };
        remaining += (byte & 127) as usize * multiplier;
        cursor += 1;
        if byte & 128 == 0 {
            break;
        }
        multiplier *= 128;
        if cursor > 4 {
            return Err(MqttError::Protocol(ProtocolError::MalformedPacket));
        }
    }
    let total = cursor + remaining;
    Ok((buf.len() >= total).then_some(total))
}

/// Reads a big-endian `u16` from the buffer, advancing the cursor.
pub fn read_u16(cursor: &mut usize, buf: &[u8]) -> WireResult<u16> {
    let bytes = buf
        .get(*cursor..*cursor + 2)
        .ok_or(MqttError::Protocol(ProtocolError::MalformedPacket))?;
    *cursor += 2;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Reads a UTF-8 encoded string (prefixed with a 2-byte length) from the buffer.
pub fn read_utf8_string<'a>(cursor: &mut usize, buf: &'a [u8]) -> WireResult<&'a str> {
    let len = read_u16(cursor, buf)? as usize;
    let s = core::str::from_utf8(
        buf.get(*cursor..*cursor + len)
            .ok_or(MqttError::Protocol(ProtocolError::MalformedPacket))?,
    )
    .map_err(|_| MqttError::Protocol(ProtocolError::InvalidUtf8String))?;
    *cursor += len;
    Ok(s)
}

/// Writes a UTF-8 encoded string (prefixed with a 2-byte length) to the buffer.
pub fn write_utf8_string(buf: &mut [u8], s: &str) -> WireResult<usize> {
    let len = s.len();
    if len > u16::MAX as usize {
        return Err(MqttError::Protocol(ProtocolError::PayloadTooLarge));
    }
    let len_bytes = (len as u16).to_be_bytes();

    let required_space = 2 + len;
    let slice = buf
        .get_mut(0..required_space)
        .ok_or(MqttError::BufferTooSmall)?;

    slice[0..2].copy_from_slice(&len_bytes);
    slice[2..].copy_from_slice(s.as_bytes());
    Ok(required_space)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_len_waits_for_complete_packet() {
        // PUBLISH with remaining length 5, only 4 bytes received so far.
        assert_eq!(frame_len(&[0x30, 0x05, 0x00, 0x01]).unwrap(), None);
        assert_eq!(
            frame_len(&[0x30, 0x05, 0x00, 0x01, b'a', b'x', b'y']).unwrap(),
            Some(7)
        );
    }

    #[test]
    fn frame_len_handles_multi_byte_length() {
        let mut buf = [0u8; 300];
        buf[0] = 0x30;
        let n = write_variable_byte_integer_len(&mut buf[1..], 200).unwrap();
        assert_eq!(n, 2);
        assert_eq!(frame_len(&buf[..100]).unwrap(), None);
        assert_eq!(frame_len(&buf).unwrap(), Some(203));
    }

    #[test]
    fn truncated_string_is_malformed() {
        let mut cursor = 0;
        let err = read_utf8_string(&mut cursor, &[0x00, 0x05, b'a']).unwrap_err();
        assert!(matches!(
            err,
            MqttError::Protocol(ProtocolError::MalformedPacket)
        ));
    }
}
