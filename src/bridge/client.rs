use embassy_time::Duration;

use crate::packet::{Publish, QoS};

/// The broker connection the bridge drives.
///
/// [`MqttSession`](super::MqttSession) is the implementation over an
/// [`MqttTransport`](crate::transport::MqttTransport); tests substitute a
/// scripted fake.
#[allow(async_fn_in_trait)]
pub trait BrokerClient {
    type Error: core::fmt::Debug;

    fn is_connected(&self) -> bool;

    async fn connect(&mut self) -> Result<(), Self::Error>;

    /// Closes the session. Never fails; a dead link is simply dropped.
    async fn disconnect(&mut self);

    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), Self::Error>;

    /// Returns once the delivery flow for `qos` completed.
    async fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS) -> Result<(), Self::Error>;

    /// Waits up to `timeout` for one inbound message.
    async fn poll(&mut self, timeout: Duration) -> Result<Option<Publish<'_>>, Self::Error>;
}
