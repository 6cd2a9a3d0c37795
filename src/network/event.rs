use embassy_net::Ipv4Address;

/// Link notification from the radio or PHY layer.
///
/// Platform glue translates driver callbacks into these and posts them to the
/// hub; the connectivity manager is the only consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// The station associated with the configured network.
    StationConnected,
    /// The station lost its association, or an attempt failed.
    StationDisconnected,
    /// DHCP on the station interface completed.
    StationGotIp(Ipv4Address),
    /// A client joined the local access point.
    AccessPointClientJoined,
    /// A client left the local access point.
    AccessPointClientLeft,
    /// The wired PHY reports carrier.
    WiredLinkUp,
    /// The wired PHY lost carrier.
    WiredLinkDown,
    /// DHCP on the wired interface completed.
    WiredGotIp(Ipv4Address),
    /// The wired interface lost its lease.
    WiredLostIp,
}

#[cfg(feature = "defmt")]
impl defmt::Format for LinkEvent {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{}", crate::fmt::Dbg(self))
    }
}
