//! Radio and PHY driver seams.
//!
//! Drivers only start operations; completion is reported asynchronously as
//! [`LinkEvent`](super::LinkEvent)s posted to the hub.

use crate::config::AccessPointConfig;
use crate::error::DriverError;

use super::Credentials;

/// The WiFi radio, running station and access point side by side.
#[allow(async_fn_in_trait)]
pub trait WifiDriver {
    /// Configures and starts the local access point.
    async fn start_access_point(&mut self, config: &AccessPointConfig) -> Result<(), DriverError>;

    /// Applies station credentials without connecting.
    async fn configure_station(&mut self, credentials: &Credentials) -> Result<(), DriverError>;

    /// Starts one station connection attempt.
    async fn connect_station(&mut self) -> Result<(), DriverError>;
}

/// The wired Ethernet interface.
#[allow(async_fn_in_trait)]
pub trait WiredDriver {
    /// Brings the interface up and starts its DHCP client.
    async fn start(&mut self) -> Result<(), DriverError>;

    /// Stops and restarts the DHCP client after the lease was lost.
    async fn restart_dhcp(&mut self) -> Result<(), DriverError>;
}

/// Stand-in for boards without a wired interface. It never produces link
/// events, so it never contributes to the uplink.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoWired;

impl WiredDriver for NoWired {
    async fn start(&mut self) -> Result<(), DriverError> {
        Ok(())
    }

    async fn restart_dhcp(&mut self) -> Result<(), DriverError> {
        Ok(())
    }
}
