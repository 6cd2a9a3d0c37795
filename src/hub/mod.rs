//! Shared Event/Queue Hub
//!
//! The only shared mutable state in the runtime: an [`EventRegister`] of
//! connectivity and time facts plus the bounded queues that carry data between
//! tasks. Everything else is owned by exactly one task.
//!
//! A hub is usually a `static`; tasks receive it through a [`RuntimeContext`]
//! instead of reaching for the global directly.
//!
//! ```ignore
//! static HUB: Hub = Hub::new();
//!
//! HUB.initialize();
//! let ctx = RuntimeContext::new(&HUB, &device_id);
//! ```

mod events;
mod queue;

use core::cell::Cell;
use core::fmt::Write;
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_net::Ipv4Address;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::{Duration, Instant};

pub use events::{EventBits, EventRegister};
pub use queue::BoundedQueue;

use crate::device::DeviceId;
use crate::error::HubError;
use crate::network::{Credentials, LinkEvent};

/// Pending credential updates. A newer update waits for the older one.
pub const CREDENTIALS_QUEUE_DEPTH: usize = 1;
/// Link notifications not yet consumed by the connectivity manager.
pub const LINK_EVENT_QUEUE_DEPTH: usize = 8;

/// Process-wide facts and queues.
pub struct Hub {
    events: EventRegister,
    credentials: BoundedQueue<Credentials, CREDENTIALS_QUEUE_DEPTH>,
    link_events: BoundedQueue<LinkEvent, LINK_EVENT_QUEUE_DEPTH>,
    /// Unix seconds at boot, known once time is synchronized.
    epoch_offset: Mutex<CriticalSectionRawMutex, Cell<Option<u64>>>,
    ip_address: Mutex<CriticalSectionRawMutex, Cell<Option<Ipv4Address>>>,
    initialized: AtomicBool,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

impl Hub {
    pub const fn new() -> Self {
        Self {
            events: EventRegister::new(),
            credentials: BoundedQueue::new(),
            link_events: BoundedQueue::new(),
            epoch_offset: Mutex::new(Cell::new(None)),
            ip_address: Mutex::new(Cell::new(None)),
            initialized: AtomicBool::new(false),
        }
    }

    /// Resets every fact and queue and marks the hub ready. Called once at
    /// boot, before the supervisor starts any task.
    pub fn initialize(&self) {
        self.events.clear_bits(!EventBits::NONE);
        self.credentials.clear();
        self.link_events.clear();
        self.epoch_offset.lock(|offset| offset.set(None));
        self.ip_address.lock(|ip| ip.set(None));
        self.initialized.store(true, Ordering::Release);
        debug!("hub: initialized");
    }

    /// Checked by every task right after it starts.
    pub fn validate(&self) -> Result<(), HubError> {
        if self.initialized.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(HubError::NotInitialized)
        }
    }

    pub fn events(&self) -> &EventRegister {
        &self.events
    }

    pub fn credentials(&self) -> &BoundedQueue<Credentials, CREDENTIALS_QUEUE_DEPTH> {
        &self.credentials
    }

    pub fn link_events(&self) -> &BoundedQueue<LinkEvent, LINK_EVENT_QUEUE_DEPTH> {
        &self.link_events
    }

    /// Hands new station credentials to the connectivity manager.
    pub async fn submit_credentials(
        &self,
        credentials: Credentials,
        timeout: Duration,
    ) -> Result<(), HubError> {
        self.validate()?;
        if self.credentials.send(credentials, timeout).await {
            Ok(())
        } else {
            warn!("hub: credentials queue is full");
            Err(HubError::QueueFull)
        }
    }

    /// Posts a link notification without waiting; usable from driver callbacks.
    pub fn post_link_event(&self, event: LinkEvent) -> Result<(), HubError> {
        self.link_events.try_send(event).map_err(|event| {
            warn!("hub: dropped link event {:?}", crate::fmt::Dbg(&event));
            HubError::QueueFull
        })
    }

    /// Records the current Unix time and raises `TIME_SYNCHRONIZED`.
    pub fn synchronize_time(&self, unix_secs: u64) {
        let offset = unix_secs.saturating_sub(Instant::now().as_secs());
        self.epoch_offset.lock(|cell| cell.set(Some(offset)));
        self.events.set_bits(EventBits::TIME_SYNCHRONIZED);
        info!("hub: time synchronized to {}", unix_secs);
    }

    /// Current Unix time in seconds, if time has been synchronized.
    pub fn unix_time(&self) -> Option<u64> {
        self.epoch_offset
            .lock(|cell| cell.get())
            .map(|offset| offset + Instant::now().as_secs())
    }

    pub fn set_ip_address(&self, address: Option<Ipv4Address>) {
        self.ip_address.lock(|cell| cell.set(address));
    }

    /// Address of the interface that currently provides the uplink.
    pub fn ip_address(&self) -> Option<Ipv4Address> {
        self.ip_address.lock(|cell| cell.get())
    }

    pub fn status(&self) -> ConnectivityStatus {
        ConnectivityStatus {
            connected: self.events.is_set(EventBits::UPLINK),
        }
    }
}

/// Dependencies handed to every task entry point.
#[derive(Clone, Copy)]
pub struct RuntimeContext<'a> {
    pub hub: &'a Hub,
    pub device_id: &'a DeviceId,
}

impl<'a> RuntimeContext<'a> {
    pub fn new(hub: &'a Hub, device_id: &'a DeviceId) -> Self {
        Self { hub, device_id }
    }
}

/// Snapshot served by the configuration endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectivityStatus {
    pub connected: bool,
}

impl ConnectivityStatus {
    /// Renders `{"connected": true}` or `{"connected": false}`.
    pub fn write_json(&self, out: &mut impl Write) -> core::fmt::Result {
        write!(out, "{{\"connected\": {}}}", self.connected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;

    #[test]
    fn validate_requires_initialize() {
        let hub = Hub::new();
        assert_eq!(hub.validate(), Err(HubError::NotInitialized));
        hub.initialize();
        assert_eq!(hub.validate(), Ok(()));
    }

    #[test]
    fn initialize_clears_stale_state() {
        let hub = Hub::new();
        hub.events().set_bits(EventBits::UPLINK);
        hub.post_link_event(LinkEvent::WiredLinkUp).unwrap();

        hub.initialize();
        assert!(hub.events().get_bits().is_empty());
        assert!(hub.link_events().is_empty());
    }

    #[test]
    fn credentials_queue_holds_one_update() {
        let hub = Hub::new();
        hub.initialize();
        let credentials = Credentials::new("home", "secret").unwrap();

        let first = block_on(hub.submit_credentials(credentials.clone(), Duration::from_millis(5)));
        let second = block_on(hub.submit_credentials(credentials, Duration::from_millis(5)));
        assert_eq!(first, Ok(()));
        assert_eq!(second, Err(HubError::QueueFull));
    }

    #[test]
    fn time_sync_sets_fact_and_clock() {
        let hub = Hub::new();
        hub.initialize();
        assert_eq!(hub.unix_time(), None);

        hub.synchronize_time(1_700_000_000);
        assert!(hub.events().is_set(EventBits::TIME_SYNCHRONIZED));
        assert!(hub.unix_time().is_some_and(|now| now >= 1_700_000_000));
    }

    #[test]
    fn status_json_follows_uplink() {
        let hub = Hub::new();
        hub.initialize();

        let mut out = heapless::String::<32>::new();
        hub.status().write_json(&mut out).unwrap();
        assert_eq!(out.as_str(), "{\"connected\": false}");

        hub.events().set_bits(EventBits::UPLINK);
        out.clear();
        hub.status().write_json(&mut out).unwrap();
        assert_eq!(out.as_str(), "{\"connected\": true}");
    }
}
