//! Persistence of known-good station credentials.

use crate::config::{PASSWORD_MAX_LEN, SSID_MAX_LEN};
use crate::error::NetworkError;

use super::Credentials;

/// Namespace holding the station credentials.
pub const WIFI_NAMESPACE: &str = "wifi";
pub const SSID_KEY: &str = "ssid";
pub const PASSWORD_KEY: &str = "pwd";

/// A namespaced key/value store in non-volatile memory.
pub trait KeyValueStore {
    type Error: core::fmt::Debug;

    /// Reads `key` into `buf`. `Ok(None)` means the key does not exist.
    fn read_str<'b>(
        &mut self,
        namespace: &str,
        key: &str,
        buf: &'b mut [u8],
    ) -> Result<Option<&'b str>, Self::Error>;

    fn write_str(&mut self, namespace: &str, key: &str, value: &str) -> Result<(), Self::Error>;

    /// Flushes pending writes of `namespace`.
    fn commit(&mut self, namespace: &str) -> Result<(), Self::Error>;
}

/// Where the connectivity manager keeps its credentials between boots.
pub trait CredentialStore {
    fn load(&mut self) -> Result<Option<Credentials>, NetworkError>;

    /// Writes `credentials` as one record.
    fn store(&mut self, credentials: &Credentials) -> Result<(), NetworkError>;
}

/// [`CredentialStore`] over a [`KeyValueStore`], using namespace `wifi` with
/// keys `ssid` and `pwd`.
pub struct StoredCredentials<S> {
    store: S,
}

impl<S: KeyValueStore> StoredCredentials<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn into_inner(self) -> S {
        self.store
    }

    fn read<'b>(&mut self, key: &str, buf: &'b mut [u8]) -> Result<Option<&'b str>, NetworkError> {
        self.store.read_str(WIFI_NAMESPACE, key, buf).map_err(|e| {
            warn!("storage: failed to read {}: {:?}", key, crate::fmt::Dbg(&e));
            NetworkError::Storage
        })
    }
}

impl<S: KeyValueStore> CredentialStore for StoredCredentials<S> {
    fn load(&mut self) -> Result<Option<Credentials>, NetworkError> {
        let mut ssid_buf = [0u8; SSID_MAX_LEN];
        let mut password_buf = [0u8; PASSWORD_MAX_LEN];

        let ssid = self.read(SSID_KEY, &mut ssid_buf)?;
        let password = self.read(PASSWORD_KEY, &mut password_buf)?;
        let (Some(ssid), Some(password)) = (ssid, password) else {
            return Ok(None);
        };

        match Credentials::new(ssid, password) {
            Ok(credentials) => Ok(Some(credentials)),
            Err(e) => {
                // A half-written or foreign record; behave as if empty.
                warn!("storage: ignoring stored credentials: {:?}", e);
                Ok(None)
            }
        }
    }

    fn store(&mut self, credentials: &Credentials) -> Result<(), NetworkError> {
        let written = self
            .store
            .write_str(WIFI_NAMESPACE, SSID_KEY, credentials.ssid())
            .and_then(|()| {
                self.store
                    .write_str(WIFI_NAMESPACE, PASSWORD_KEY, credentials.password())
            })
            .and_then(|()| self.store.commit(WIFI_NAMESPACE));
        written.map_err(|e| {
            warn!("storage: failed to write credentials: {:?}", crate::fmt::Dbg(&e));
            NetworkError::Storage
        })
    }
}
