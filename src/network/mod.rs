//! Network Connectivity Manager
//!
//! Owns the three interface state machines (station uplink, local access
//! point, wired uplink), reacts to [`LinkEvent`]s, reconnects the station
//! with a bounded number of attempts and publishes the resulting facts to
//! the hub. Downstream tasks only see [`EventBits::UPLINK`], never which
//! interface provides it.
//!
//! [`EventBits::UPLINK`]: crate::hub::EventBits::UPLINK

mod credentials;
mod driver;
mod event;
mod manager;
mod storage;

pub use credentials::Credentials;
pub use driver::{NoWired, WifiDriver, WiredDriver};
pub use event::LinkEvent;
pub use manager::NetworkManager;
pub use storage::{
    CredentialStore, KeyValueStore, PASSWORD_KEY, SSID_KEY, StoredCredentials, WIFI_NAMESPACE,
};

/// Phase of one interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkPhase {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Per-interface connection bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectionState {
    pub phase: LinkPhase,
    /// Attempts since the last successful connection.
    pub retries: u8,
    /// Set when the retry limit was reached; only new credentials clear it.
    pub exhausted: bool,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        self.phase == LinkPhase::Connected
    }

    fn connected(&mut self) {
        self.phase = LinkPhase::Connected;
        self.retries = 0;
    }

    fn disconnected(&mut self) {
        self.phase = LinkPhase::Disconnected;
    }
}
