//! # Configuration
//!
//! Compile-time capacities and the builder-style option structs for the
//! broker session, the topic bridge and the connectivity manager.

use embassy_net::{Ipv4Address, Ipv4Cidr};
use embassy_time::Duration;

/// Maximum number of tasks the supervisor can hold.
pub const MAX_TASKS: usize = 20;
/// Maximum number of topics the bridge can route.
pub const MAX_TOPICS: usize = 10;
/// Maximum length of a fully namespaced topic, e.g. `/titanium/A1B2C3D4E5F6/sensor`.
pub const MAX_TOPIC_LEN: usize = 64;
/// Maximum length of a topic suffix.
pub const MAX_SUFFIX_LEN: usize = 32;
/// Size of the text buffer an encoder renders one payload into.
pub const MAX_PAYLOAD_LEN: usize = 512;
/// Maximum SSID length, exclusive, matching the radio's fixed-size field.
pub const SSID_MAX_LEN: usize = 32;
/// Maximum password length, exclusive, matching the radio's fixed-size field.
pub const PASSWORD_MAX_LEN: usize = 64;

/// Options for an MQTT broker session.
#[derive(Debug, Clone)]
pub struct SessionOptions<'a> {
    pub client_id: &'a str,
    pub keep_alive_secs: u16,
    pub clean_session: bool,
    /// How long to wait for CONNACK, SUBACK and publish acknowledgements.
    pub ack_timeout: Duration,
    pub username: Option<&'a str>,
    pub password: Option<&'a [u8]>,
}

impl<'a> SessionOptions<'a> {
    pub fn new(client_id: &'a str) -> Self {
        Self {
            client_id,
            keep_alive_secs: 60,
            clean_session: true,
            ack_timeout: Duration::from_secs(5),
            username: None,
            password: None,
        }
    }

    pub fn with_keep_alive(mut self, secs: u16) -> Self {
        self.keep_alive_secs = secs;
        self
    }

    pub fn with_clean_session(mut self, clean: bool) -> Self {
        self.clean_session = clean;
        self
    }

    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    pub fn with_credentials(mut self, username: &'a str, password: &'a [u8]) -> Self {
        self.username = Some(username);
        self.password = Some(password);
        self
    }
}

/// Options for the topic bridge.
#[derive(Debug, Clone, Copy)]
pub struct BridgeOptions {
    /// First level of every device topic.
    pub root: &'static str,
    /// Interval between connection polls and publish ticks.
    pub tick: Duration,
    /// Bound for every topic mutex and queue operation.
    pub io_timeout: Duration,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            root: "titanium",
            tick: Duration::from_secs(1),
            io_timeout: Duration::from_millis(100),
        }
    }
}

impl BridgeOptions {
    pub fn with_root(mut self, root: &'static str) -> Self {
        self.root = root;
        self
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }
}

/// Local configuration access point.
#[derive(Debug, Clone, Copy)]
pub struct AccessPointConfig {
    pub ssid: &'static str,
    pub password: &'static str,
    pub channel: u8,
    pub hidden: bool,
    pub max_clients: u8,
    /// Beacon interval in time units (1.024 ms).
    pub beacon_interval: u16,
    /// Static address of the access point; it is also the gateway.
    pub address: Ipv4Cidr,
}

impl Default for AccessPointConfig {
    fn default() -> Self {
        Self {
            ssid: "IoCloud",
            password: "root1234",
            channel: 1,
            hidden: false,
            max_clients: 1,
            beacon_interval: 100,
            address: Ipv4Cidr::new(Ipv4Address::new(192, 168, 0, 1), 24),
        }
    }
}

impl AccessPointConfig {
    pub fn with_ssid(mut self, ssid: &'static str, password: &'static str) -> Self {
        self.ssid = ssid;
        self.password = password;
        self
    }

    pub fn with_channel(mut self, channel: u8) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_max_clients(mut self, max_clients: u8) -> Self {
        self.max_clients = max_clients;
        self
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }
}

/// Options for the connectivity manager.
#[derive(Debug, Clone, Copy)]
pub struct NetworkOptions {
    pub access_point: AccessPointConfig,
    /// Station reconnect attempts before giving up until new credentials arrive.
    pub max_reconnect_attempts: u8,
    pub tick: Duration,
    /// How long each tick waits for new credentials.
    pub credentials_timeout: Duration,
}

impl Default for NetworkOptions {
    fn default() -> Self {
        Self {
            access_point: AccessPointConfig::default(),
            max_reconnect_attempts: 3,
            tick: Duration::from_secs(1),
            credentials_timeout: Duration::from_millis(100),
        }
    }
}

impl NetworkOptions {
    pub fn with_access_point(mut self, config: AccessPointConfig) -> Self {
        self.access_point = config;
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: u8) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn with_credentials_timeout(mut self, timeout: Duration) -> Self {
        self.credentials_timeout = timeout;
        self
    }
}
