//! Stable device identity.

use core::fmt::Write;
use heapless::String;

/// Length of a MAC-derived identifier: six bytes as upper-case hex.
pub const DEVICE_ID_LEN: usize = 12;

/// Identifier placed in every broker topic of this unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceId(String<DEVICE_ID_LEN>);

impl DeviceId {
    /// Formats `mac` as twelve upper-case hex characters, e.g. `A1B2C3D4E5F6`.
    pub fn from_mac(mac: [u8; 6]) -> Self {
        let mut id = String::new();
        for byte in mac {
            // Six bytes always fit in twelve characters.
            let _ = write!(id, "{byte:02X}");
        }
        Self(id)
    }

    /// Fallback identifier when the MAC cannot be read.
    pub fn unknown() -> Self {
        let mut id = String::new();
        let _ = id.push_str("UNKNOWN");
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_known(&self) -> bool {
        self.0.len() == DEVICE_ID_LEN
    }
}

impl core::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for DeviceId {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{=str}", self.as_str())
    }
}
