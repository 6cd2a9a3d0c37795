//! Topic Bridge
//!
//! Routes data between local queues and an MQTT broker. Every route is a
//! topic under the device namespace `/{root}/{device-id}/{suffix}` with a
//! direction and exactly one codec:
//!
//! - **publish** topics drain their queue through an [`Encoder`] and send the
//!   result to the broker,
//! - **subscribe** topics decode inbound messages with a [`Decoder`] and queue
//!   the decoded item.
//!
//! Routes are registered at boot into a [`TopicTable`], which is sealed when
//! the [`Bridge`] task starts. The bridge only talks to the broker while the
//! hub reports an uplink, and only publishes once time is synchronized.
//!
//! ```ignore
//! let mut table = TopicTable::<Reading>::for_device(&device_id, &options)?;
//! let sensor = table.register_topic(TopicDescriptor::publish("sensor", QoS::AtMostOnce, &mut encode))?;
//! let config = table.register_topic(TopicDescriptor::subscribe("config", QoS::AtLeastOnce, &mut decode))?;
//!
//! let session = MqttSession::<_, 1024>::new(transport, SessionOptions::new(device_id.as_str()));
//! let mut bridge = Bridge::new(session, &table, options);
//! bridge.run(&ctx).await;
//! ```

mod client;
mod codec;
mod event_loop;
mod namespace;
mod session;
mod table;

pub use client::BrokerClient;
pub use codec::{Codec, Decoder, EncodeContext, Encoder, Payload};
pub use event_loop::{BRIDGE_STACK_SIZE, Bridge};
pub use namespace::{Namespace, TopicName};
pub use session::MqttSession;
pub use table::{Direction, TOPIC_QUEUE_DEPTH, TopicDescriptor, TopicHandle, TopicTable};
