//! # Error Types
//!
//! Errors for every layer of the gateway runtime: the supervisor, the shared hub,
//! the connectivity manager, the topic bridge and the MQTT wire layer underneath it.
//!
//! Registration-time errors are returned to the caller with state left untouched.
//! Steady-state errors are logged by the owning task and never escalate further.

use core::fmt;

use crate::transport;

/// Errors returned by the task supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SupervisorError {
    /// The task table has no free slot left.
    Full,
    /// The descriptor is malformed (empty or oversized name, stack too small).
    InvalidArgument,
    /// The launcher failed to create the task at the given table index.
    LaunchFailed(usize),
    /// No task is registered at the given index.
    UnknownTask(usize),
}

impl fmt::Display for SupervisorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => f.write_str("task table is full"),
            Self::InvalidArgument => f.write_str("malformed task descriptor"),
            Self::LaunchFailed(index) => write!(f, "failed to launch task #{index}"),
            Self::UnknownTask(index) => write!(f, "no task registered at #{index}"),
        }
    }
}

/// Errors returned by the shared event/queue hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HubError {
    /// `Hub::initialize` has not been called yet.
    NotInitialized,
    /// A bounded queue stayed full for the whole send timeout.
    QueueFull,
}

impl fmt::Display for HubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInitialized => f.write_str("hub is not initialized"),
            Self::QueueFull => f.write_str("queue is full"),
        }
    }
}

/// Validation failures for station credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CredentialsError {
    EmptySsid,
    EmptyPassword,
    SsidTooLong,
    PasswordTooLong,
}

impl fmt::Display for CredentialsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptySsid => f.write_str("SSID cannot be empty"),
            Self::EmptyPassword => f.write_str("password cannot be empty"),
            Self::SsidTooLong => f.write_str("SSID is too long"),
            Self::PasswordTooLong => f.write_str("password is too long"),
        }
    }
}

/// Errors reported by the radio and wired drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DriverError {
    /// The driver or its network interface could not be allocated.
    NoResources,
    /// The driver rejected the configuration.
    InvalidConfig,
    /// The driver is in a state where the request cannot be served.
    InvalidState,
    /// Vendor-specific error code.
    Other(i32),
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoResources => f.write_str("driver is out of resources"),
            Self::InvalidConfig => f.write_str("driver rejected the configuration"),
            Self::InvalidState => f.write_str("driver is in the wrong state"),
            Self::Other(code) => write!(f, "driver error code {code}"),
        }
    }
}

/// Errors of the network connectivity manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NetworkError {
    /// Access point configuration or start-up failed.
    AccessPoint(DriverError),
    /// Station configuration failed.
    Station(DriverError),
    /// Wired interface bring-up failed.
    Wired(DriverError),
    /// The credential store could not be read or written.
    Storage,
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AccessPoint(e) => write!(f, "access point failure: {e}"),
            Self::Station(e) => write!(f, "station failure: {e}"),
            Self::Wired(e) => write!(f, "wired interface failure: {e}"),
            Self::Storage => f.write_str("credential storage failure"),
        }
    }
}

/// Errors raised by topic encoders and decoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CodecError {
    /// The payload did not have the expected shape.
    Malformed,
    /// The encoded output did not fit into the payload buffer.
    BufferTooSmall,
    /// A required field was missing from the payload.
    MissingField,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => f.write_str("malformed payload"),
            Self::BufferTooSmall => f.write_str("payload buffer is too small"),
            Self::MissingField => f.write_str("missing payload field"),
        }
    }
}

/// Errors of the topic table and the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TopicError {
    /// The topic table already holds the maximum number of topics.
    Full,
    /// The suffix is empty or contains characters not allowed in a topic level.
    InvalidArgument,
    /// The codec does not match the declared direction.
    CodecMismatch,
    /// The suffix or the full namespaced topic exceeds its bounded length.
    NameTooLong,
    /// The bridge has started; the topic set is frozen.
    Sealed,
    /// The handle does not refer to a registered topic.
    UnknownTopic,
    /// The topic mutex could not be acquired within the data-plane timeout.
    Busy,
    /// The topic queue stayed full for the whole timeout.
    QueueFull,
    /// The encoder or decoder failed.
    Codec(CodecError),
}

impl From<CodecError> for TopicError {
    fn from(err: CodecError) -> Self {
        TopicError::Codec(err)
    }
}

impl fmt::Display for TopicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => f.write_str("topic table is full"),
            Self::InvalidArgument => f.write_str("invalid topic suffix"),
            Self::CodecMismatch => f.write_str("codec does not match topic direction"),
            Self::NameTooLong => f.write_str("topic name is too long"),
            Self::Sealed => f.write_str("topic table is sealed"),
            Self::UnknownTopic => f.write_str("unknown topic handle"),
            Self::Busy => f.write_str("topic is busy"),
            Self::QueueFull => f.write_str("topic queue is full"),
            Self::Codec(e) => write!(f, "codec failure: {e}"),
        }
    }
}

/// The error enum for the MQTT wire layer.
///
/// It is generic over the transport error type `T`, allowing it to wrap
/// specific errors from the underlying network transport (e.g., TCP, UART).
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MqttError<T> {
    /// An error occurred in the underlying transport layer.
    Transport(T),
    /// A protocol-level error occurred, indicating a violation of the MQTT specification.
    Protocol(ProtocolError),
    /// The connection was refused by the broker. The enclosed code provides the reason.
    ConnectionRefused(ConnectReasonCode),
    /// The broker could not be reached.
    Unreachable,
    /// The client is not currently connected to the broker.
    NotConnected,
    /// The buffer provided for an operation was too small.
    BufferTooSmall,
    /// An operation timed out.
    Timeout,
    /// The broker refused a subscription.
    Rejected,
}

/// Implements the `From` trait to allow for automatic conversion of any transport
/// error into an `MqttError`. This is what allows the `?` operator to work
/// seamlessly on `Result`s from the transport layer.
impl<T: transport::TransportError> From<T> for MqttError<T> {
    fn from(err: T) -> Self {
        MqttError::Transport(err)
    }
}

impl<T: transport::TransportError> MqttError<T> {
    /// Converts a wire-layer error produced by packet encoding or decoding (which never
    /// carries a transport error) into an error for transport `T`.
    pub fn from_packet(other: MqttError<transport::ErrorPlaceHolder>) -> MqttError<T> {
        match other {
            MqttError::Protocol(p) => MqttError::Protocol(p),
            MqttError::ConnectionRefused(c) => MqttError::ConnectionRefused(c),
            MqttError::Unreachable => MqttError::Unreachable,
            MqttError::NotConnected => MqttError::NotConnected,
            MqttError::BufferTooSmall => MqttError::BufferTooSmall,
            MqttError::Timeout => MqttError::Timeout,
            MqttError::Rejected => MqttError::Rejected,
            // Packet code has no transport underneath it.
            MqttError::Transport(_) => MqttError::Protocol(ProtocolError::MalformedPacket),
        }
    }
}

/// Represents the reason codes for a connection refusal (`CONNACK`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectReasonCode {
    /// The connection was accepted.
    Success,
    /// The broker does not support the requested MQTT protocol version.
    UnacceptableProtocolVersion,
    /// The client identifier is not valid.
    IdentifierRejected,
    /// The broker is unavailable.
    ServerUnavailable,
    /// The username or password is not valid.
    BadUserNameOrPassword,
    /// The client is not authorized to connect.
    NotAuthorized,
    /// An unknown or unspecified error occurred.
    Other(u8),
}

impl From<u8> for ConnectReasonCode {
    fn from(val: u8) -> Self {
        match val {
            0 => Self::Success,
            1 => Self::UnacceptableProtocolVersion,
            2 => Self::IdentifierRejected,
            3 => Self::ServerUnavailable,
            4 => Self::BadUserNameOrPassword,
            5 => Self::NotAuthorized,
            _ => Self::Other(val),
        }
    }
}

/// Enumerates specific MQTT protocol errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    /// An invalid packet type was received.
    InvalidPacketType(u8),
    /// The server sent an invalid or unexpected response.
    InvalidResponse,
    /// The connection was closed by the broker.
    ConnectionClosed,
    /// A packet was received that was not correctly formed.
    MalformedPacket,
    /// The payload of a message exceeds the maximum allowable size.
    PayloadTooLarge,
    /// A string was not valid UTF-8.
    InvalidUtf8String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::string::ToString;

    #[test]
    fn nested_errors_display_their_cause() {
        assert_eq!(
            NetworkError::Station(DriverError::Other(-3)).to_string(),
            "station failure: driver error code -3"
        );
        assert_eq!(
            NetworkError::AccessPoint(DriverError::NoResources).to_string(),
            "access point failure: driver is out of resources"
        );
        assert_eq!(
            TopicError::Codec(CodecError::MissingField).to_string(),
            "codec failure: missing payload field"
        );
        assert_eq!(CodecError::Malformed.to_string(), "malformed payload");
    }
}
