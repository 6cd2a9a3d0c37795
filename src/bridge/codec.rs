//! Per-topic payload codecs.
//!
//! A publish topic owns exactly one [`Encoder`], a subscribe topic exactly one
//! [`Decoder`]. Closures with the matching signature implement the traits, so
//! small codecs need no named type.

use heapless::String;

use crate::config::MAX_PAYLOAD_LEN;
use crate::device::DeviceId;
use crate::error::CodecError;

/// Text buffer one outgoing payload is rendered into.
pub type Payload = String<MAX_PAYLOAD_LEN>;

/// Facts an encoder may stamp into its payload.
#[derive(Debug, Clone, Copy)]
pub struct EncodeContext<'a> {
    pub device_id: &'a DeviceId,
    /// Unix time in seconds. Publishing only happens once time is synchronized.
    pub timestamp: u64,
}

/// Renders one queued item of a publish topic.
pub trait Encoder<T> {
    fn encode(
        &mut self,
        item: &T,
        ctx: &EncodeContext<'_>,
        out: &mut Payload,
    ) -> Result<(), CodecError>;
}

/// Parses one inbound payload of a subscribe topic.
pub trait Decoder<T> {
    fn decode(&mut self, payload: &[u8]) -> Result<T, CodecError>;
}

impl<T, F> Encoder<T> for F
where
    F: FnMut(&T, &EncodeContext<'_>, &mut Payload) -> Result<(), CodecError>,
{
    fn encode(
        &mut self,
        item: &T,
        ctx: &EncodeContext<'_>,
        out: &mut Payload,
    ) -> Result<(), CodecError> {
        self(item, ctx, out)
    }
}

impl<T, F> Decoder<T> for F
where
    F: FnMut(&[u8]) -> Result<T, CodecError>,
{
    fn decode(&mut self, payload: &[u8]) -> Result<T, CodecError> {
        self(payload)
    }
}

/// The single codec of a topic.
pub enum Codec<'a, T> {
    Encoder(&'a mut (dyn Encoder<T> + Send)),
    Decoder(&'a mut (dyn Decoder<T> + Send)),
}

impl<T> Codec<'_, T> {
    pub fn is_encoder(&self) -> bool {
        matches!(self, Codec::Encoder(_))
    }

    pub fn is_decoder(&self) -> bool {
        matches!(self, Codec::Decoder(_))
    }
}
