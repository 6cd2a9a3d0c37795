//! # Gateway Runtime for Embedded Devices
//!
//! `myrtio-gateway` is a `no_std` runtime substrate for a connected sensor
//! gateway, built upon the [Embassy](https://embassy.dev/) async ecosystem.
//! It wires four parts together:
//!
//! - **Supervisor** ([`supervisor`]): a static table of long-running tasks,
//!   launched in registration order through a platform launcher.
//! - **Hub** ([`hub`]): the shared connectivity/time facts and the bounded
//!   queues tasks exchange data through.
//! - **Network manager** ([`network`]): keeps the local access point up,
//!   reconnects the station with bounded retries, tracks the wired uplink
//!   and persists working Wi-Fi credentials.
//! - **Topic bridge** ([`bridge`]): routes local queues to and from an MQTT
//!   3.1.1 broker under a per-device topic namespace.
//!
//! ## Core Features
//!
//! - **`no_std` & `no_alloc`:** Every table, queue and buffer has a fixed
//!   capacity. Buffers are managed using `heapless`.
//! - **Fully Async:** Built with `async/await` on Embassy timers, channels and
//!   mutexes. Every blocking wait is bounded by a timeout.
//! - **Rust 2024 Edition:** Uses native `async fn` in traits, removing the need for `async-trait`.
//! - **Hardware Agnostic:** Radios, the wired interface, non-volatile storage
//!   and the broker transport are reached through traits, so the whole
//!   runtime can be exercised on the host.
//!
//! ## Boot Sequence
//!
//! ```ignore
//! static HUB: Hub = Hub::new();
//!
//! HUB.initialize();
//! let device_id = DeviceId::from_mac(mac);
//! let ctx = RuntimeContext::new(&HUB, &device_id);
//!
//! let mut supervisor = Supervisor::<_, _>::new(EmbassyLauncher::new(spawner));
//! supervisor.register(TaskDescriptor::for_runnable(&network, spawn_network))?;
//! supervisor.register(TaskDescriptor::for_runnable(&bridge, spawn_bridge))?;
//! supervisor.start_all()?;
//! ```

#![cfg_attr(not(test), no_std)]

// This mod MUST go first, so that the others see its macros.
mod fmt;

pub mod bridge;
pub mod config;
pub mod device;
pub mod error;
pub mod hub;
pub mod network;
pub mod packet;
pub mod supervisor;
pub mod transport;
pub mod util;

// Re-export key types for easier access at the crate root.
pub use bridge::{Bridge, BrokerClient, MqttSession, TopicDescriptor, TopicTable};
pub use device::DeviceId;
pub use hub::{EventBits, Hub, RuntimeContext};
pub use network::{Credentials, NetworkManager};
pub use packet::QoS;
pub use supervisor::{Runnable, Supervisor, TaskDescriptor};
pub use transport::TcpTransport;
