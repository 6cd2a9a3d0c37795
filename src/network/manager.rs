use embassy_net::Ipv4Address;
use embassy_time::Timer;

use crate::config::NetworkOptions;
use crate::error::NetworkError;
use crate::hub::{EventBits, Hub, RuntimeContext};
use crate::supervisor::{Priority, Runnable};

use super::{
    ConnectionState, CredentialStore, Credentials, LinkEvent, LinkPhase, WifiDriver, WiredDriver,
};

/// Drives the station, access point and wired interfaces and publishes the
/// connectivity facts.
pub struct NetworkManager<W, E, S> {
    wifi: W,
    wired: E,
    store: S,
    options: NetworkOptions,
    station: ConnectionState,
    access_point: ConnectionState,
    wired_state: ConnectionState,
    station_ip: Option<Ipv4Address>,
    wired_ip: Option<Ipv4Address>,
    /// Credentials the station is configured with.
    active: Option<Credentials>,
    /// Last credentials known to be in non-volatile storage.
    stored: Option<Credentials>,
    ap_clients: u8,
    uplink: bool,
}

impl<W, E, S> NetworkManager<W, E, S>
where
    W: WifiDriver,
    E: WiredDriver,
    S: CredentialStore,
{
    pub fn new(wifi: W, wired: E, store: S, options: NetworkOptions) -> Self {
        Self {
            wifi,
            wired,
            store,
            options,
            station: ConnectionState::default(),
            access_point: ConnectionState::default(),
            wired_state: ConnectionState::default(),
            station_ip: None,
            wired_ip: None,
            active: None,
            stored: None,
            ap_clients: 0,
            uplink: false,
        }
    }

    pub fn station(&self) -> &ConnectionState {
        &self.station
    }

    pub fn access_point(&self) -> &ConnectionState {
        &self.access_point
    }

    pub fn wired(&self) -> &ConnectionState {
        &self.wired_state
    }

    /// Starts the access point and the wired interface, then configures the
    /// station from storage if credentials were saved on a previous boot.
    ///
    /// Driver failures here are fatal to the manager.
    pub async fn initialize(&mut self, hub: &Hub) -> Result<(), NetworkError> {
        let ap = &self.options.access_point;
        self.wifi.start_access_point(ap).await.map_err(|e| {
            error!("network: failed to start access point: {:?}", e);
            NetworkError::AccessPoint(e)
        })?;
        info!(
            "network: access point {} up on channel {}",
            ap.ssid, ap.channel
        );

        self.wired.start().await.map_err(|e| {
            error!("network: failed to start wired interface: {:?}", e);
            NetworkError::Wired(e)
        })?;
        self.wired_state.phase = LinkPhase::Connecting;

        match self.store.load() {
            Ok(Some(credentials)) => {
                info!("network: loaded stored credentials for {}", credentials.ssid());
                self.stored = Some(credentials.clone());
                if let Err(e) = self.apply_credentials(credentials).await {
                    warn!("network: {}", e);
                }
            }
            Ok(None) => info!("network: no stored credentials"),
            Err(e) => warn!("network: could not load credentials: {:?}", e),
        }

        self.publish(hub);
        Ok(())
    }

    /// One iteration of the manager loop: take new credentials, consume link
    /// events, make at most one station attempt, publish facts.
    pub async fn tick(&mut self, hub: &Hub) {
        if let Some(credentials) = hub
            .credentials()
            .receive(self.options.credentials_timeout)
            .await
        {
            info!("network: new credentials for {}", credentials.ssid());
            if let Err(e) = self.apply_credentials(credentials).await {
                warn!("network: {}", e);
            }
        }

        while let Some(event) = hub.link_events().try_receive() {
            self.handle_event(event).await;
        }

        self.manage_connection().await;
        self.publish(hub);
    }

    /// New credentials always grant a fresh set of attempts. Credentials the
    /// station refuses leave it without any until the next ones arrive.
    async fn apply_credentials(&mut self, credentials: Credentials) -> Result<(), NetworkError> {
        self.station.retries = 0;
        self.station.exhausted = false;
        self.active = None;
        self.wifi
            .configure_station(&credentials)
            .await
            .map_err(NetworkError::Station)?;
        self.active = Some(credentials);
        Ok(())
    }

    async fn handle_event(&mut self, event: LinkEvent) {
        debug!("network: {:?}", event);
        match event {
            LinkEvent::StationConnected => {
                self.station.phase = LinkPhase::Connecting;
            }
            LinkEvent::StationDisconnected => {
                if self.station.is_connected() {
                    warn!("network: station disconnected");
                }
                self.station.disconnected();
                self.station_ip = None;
            }
            LinkEvent::StationGotIp(address) => {
                info!("network: station got {:?}", crate::fmt::Dbg(&address));
                self.station.connected();
                self.station_ip = Some(address);
                self.persist_credentials();
            }
            LinkEvent::AccessPointClientJoined => {
                self.ap_clients = self.ap_clients.saturating_add(1);
                self.access_point.connected();
                info!("network: access point client joined ({})", self.ap_clients);
            }
            LinkEvent::AccessPointClientLeft => {
                self.ap_clients = self.ap_clients.saturating_sub(1);
                if self.ap_clients == 0 {
                    self.access_point.disconnected();
                }
                info!("network: access point client left ({})", self.ap_clients);
            }
            LinkEvent::WiredLinkUp => {
                self.wired_state.phase = LinkPhase::Connecting;
            }
            LinkEvent::WiredLinkDown => {
                warn!("network: wired link down");
                self.wired_state.disconnected();
                self.wired_ip = None;
            }
            LinkEvent::WiredGotIp(address) => {
                info!("network: wired got {:?}", crate::fmt::Dbg(&address));
                self.wired_state.connected();
                self.wired_ip = Some(address);
            }
            LinkEvent::WiredLostIp => {
                warn!("network: wired lost its lease, restarting DHCP");
                self.wired_state.phase = LinkPhase::Connecting;
                self.wired_ip = None;
                if let Err(e) = self.wired.restart_dhcp().await {
                    warn!("network: DHCP restart failed: {:?}", e);
                }
            }
        }
    }

    /// Station retry policy: at most one attempt per tick and at most
    /// `max_reconnect_attempts` in a row. Rejected attempts count too.
    async fn manage_connection(&mut self) {
        if self.station.is_connected() {
            self.station.retries = 0;
            return;
        }
        if self.station.exhausted || self.active.is_none() {
            return;
        }

        let limit = self.options.max_reconnect_attempts;
        if self.station.retries < limit {
            self.station.retries += 1;
            debug!(
                "network: station attempt {} of {}",
                self.station.retries, limit
            );
            self.station.phase = LinkPhase::Connecting;
            if let Err(e) = self.wifi.connect_station().await {
                warn!("network: station attempt rejected: {:?}", e);
                self.station.phase = LinkPhase::Disconnected;
            }
        } else {
            error!(
                "network: station gave up after {} attempts, waiting for new credentials",
                limit
            );
            self.station.exhausted = true;
            self.station.phase = LinkPhase::Disconnected;
        }
    }

    /// Saves the active credentials once they produced an address, unless
    /// storage already holds the same pair.
    fn persist_credentials(&mut self) {
        let Some(active) = &self.active else {
            return;
        };
        if self.stored.as_ref() == Some(active) {
            debug!("network: credentials unchanged, storage write skipped");
            return;
        }
        match self.store.store(active) {
            Ok(()) => {
                info!("network: credentials for {} saved", active.ssid());
                self.stored = Some(active.clone());
            }
            Err(e) => warn!("network: could not save credentials: {:?}", e),
        }
    }

    fn publish(&mut self, hub: &Hub) {
        let events = hub.events();
        events.assign(EventBits::STATION_LINKED, self.station.is_connected());
        events.assign(
            EventBits::ACCESS_POINT_LINKED,
            self.access_point.is_connected(),
        );

        let uplink = self.station.is_connected() || self.wired_state.is_connected();
        events.assign(EventBits::UPLINK, uplink);
        hub.set_ip_address(self.wired_ip.or(self.station_ip));

        if uplink != self.uplink {
            if uplink {
                info!("network: uplink available");
            } else {
                warn!("network: uplink lost");
            }
            self.uplink = uplink;
        }
    }
}

impl<W, E, S> Runnable for NetworkManager<W, E, S>
where
    W: WifiDriver,
    E: WiredDriver,
    S: CredentialStore,
{
    fn name(&self) -> &'static str {
        "network"
    }

    fn priority(&self) -> Priority {
        Priority::NETWORK
    }

    async fn run(&mut self, ctx: &RuntimeContext<'_>) {
        if let Err(e) = ctx.hub.validate() {
            error!("network: {:?}, exiting", e);
            return;
        }
        if self.initialize(ctx.hub).await.is_err() {
            error!("network: initialization failed, exiting");
            return;
        }

        loop {
            self.tick(ctx.hub).await;
            Timer::after(self.options.tick).await;
        }
    }
}
