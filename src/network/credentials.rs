use heapless::String;

use crate::config::{PASSWORD_MAX_LEN, SSID_MAX_LEN};
use crate::error::CredentialsError;

/// Station SSID and password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    ssid: String<SSID_MAX_LEN>,
    password: String<PASSWORD_MAX_LEN>,
}

impl Credentials {
    /// Validates and copies the pair. Both must be non-empty and strictly
    /// shorter than the radio's fixed-size fields.
    pub fn new(ssid: &str, password: &str) -> Result<Self, CredentialsError> {
        if ssid.is_empty() {
            return Err(CredentialsError::EmptySsid);
        }
        if password.is_empty() {
            return Err(CredentialsError::EmptyPassword);
        }
        if ssid.len() >= SSID_MAX_LEN {
            return Err(CredentialsError::SsidTooLong);
        }
        if password.len() >= PASSWORD_MAX_LEN {
            return Err(CredentialsError::PasswordTooLong);
        }

        let mut credentials = Self {
            ssid: String::new(),
            password: String::new(),
        };
        credentials
            .ssid
            .push_str(ssid)
            .map_err(|_| CredentialsError::SsidTooLong)?;
        credentials
            .password
            .push_str(password)
            .map_err(|_| CredentialsError::PasswordTooLong)?;
        Ok(credentials)
    }

    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

// The password never reaches the log.
impl core::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Credentials")
            .field("ssid", &self.ssid.as_str())
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Credentials {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "Credentials {{ ssid: {=str}, .. }}", self.ssid.as_str())
    }
}
