//! Persistent key/value store for client identity, backed by `sled`.
//!
//! Keys:
//! - `fleet` → 20 raw bytes (current fleet address).
//! - `fleet_id` → legacy ASCII-hex fleet address; migrated into `fleet`
//!   and deleted on first successful read.
//! - `last_update_at` → big-endian i64 seconds-since-epoch, owned by the
//!   (external, out-of-scope) auto-update collaborator.

use crate::address::Address;
use crate::error::{Error, Result};

pub const KEY_FLEET: &str = "fleet";
pub const KEY_FLEET_ID_LEGACY: &str = "fleet_id";
pub const KEY_LAST_UPDATE_AT: &str = "last_update_at";

/// Thin wrapper around a `sled::Db` opened at a configured path.
pub struct Store {
    db: sled::Db,
}

impl Store {
    pub fn open(path: &std::path::Path) -> Result<Self> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(key)?.map(|v| v.to_vec()))
    }

    pub fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.db.insert(key, value)?;
        Ok(())
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        self.db.remove(key)?;
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Load the fleet address, migrating the legacy `fleet_id` ASCII-hex
    /// key into `fleet` (and deleting it) if `fleet` is not yet present.
    pub fn load_fleet_addr(&self) -> Result<Option<Address>> {
        if let Some(bytes) = self.get(KEY_FLEET)? {
            let arr: [u8; 20] = bytes
                .try_into()
                .map_err(|_| Error::Storage(sled::Error::Corruption { at: None }))?;
            return Ok(Some(Address::from_bytes(arr)));
        }

        if let Some(legacy) = self.get(KEY_FLEET_ID_LEGACY)? {
            let legacy_str = String::from_utf8_lossy(&legacy);
            if let Ok(addr) = Address::from_hex(&legacy_str) {
                self.put(KEY_FLEET, addr.as_bytes())?;
                self.delete(KEY_FLEET_ID_LEGACY)?;
                return Ok(Some(addr));
            }
        }

        Ok(None)
    }

    pub fn save_fleet_addr(&self, addr: Address) -> Result<()> {
        self.put(KEY_FLEET, addr.as_bytes())
    }
}
