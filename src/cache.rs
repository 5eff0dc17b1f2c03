use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::SystemTime,
};
use tracing::{debug, info, warn};

use crate::error::Result;

/// File name of the cached address inside the cache directory
const CACHE_FILE_NAME: &str = "device_address.json";

/// On-disk shape of the cached address
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedAddress {
    address: String,
    saved_at: SystemTime,
}

/// Persistent cache of the last successfully connected device address
///
/// The cache lives at `<platform cache dir>/treadctl/device_address.json`
/// and holds at most one address. A missing or unreadable file is a cache
/// miss, never an error: the caller falls back to a discovery scan.
#[derive(Debug, Clone)]
pub struct AddressCache {
    path: PathBuf,
}

impl AddressCache {
    /// Open the cache at the platform default location
    ///
    /// # Errors
    ///
    /// Returns [`crate::TreadctlError::Io`] if the cache directory cannot
    /// be created.
    pub fn open_default() -> Result<Self> {
        let mut dir = dirs::cache_dir().unwrap_or_else(std::env::temp_dir);
        dir.push("treadctl");
        fs::create_dir_all(&dir)?;
        Ok(Self {
            path: dir.join(CACHE_FILE_NAME),
        })
    }

    /// Open a cache backed by a specific file path
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the cached address, if any
    ///
    /// Corrupt or unreadable cache files are logged and treated as a miss.
    #[must_use]
    pub fn load(&self) -> Option<String> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Failed to read cached address: {}", e);
                return None;
            }
        };

        match serde_json::from_str::<CachedAddress>(&contents) {
            Ok(cached) => {
                debug!("Loaded cached address {}", cached.address);
                Some(cached.address)
            }
            Err(e) => {
                warn!("Cached address file is corrupt, ignoring: {}", e);
                None
            }
        }
    }

    /// Persist an address, overwriting any prior value
    ///
    /// # Errors
    ///
    /// Returns [`crate::TreadctlError::Io`] or [`crate::TreadctlError::Json`]
    /// if the file cannot be written.
    pub fn save(&self, address: &str) -> Result<()> {
        let cached = CachedAddress {
            address: address.to_string(),
            saved_at: SystemTime::now(),
        };
        let json = serde_json::to_string_pretty(&cached)?;
        fs::write(&self.path, json)?;
        info!("Cached device address {}", address);
        Ok(())
    }

    /// Remove the cached address, forcing rediscovery on the next connect
    ///
    /// # Errors
    ///
    /// Returns [`crate::TreadctlError::Io`] if the file exists but cannot
    /// be removed.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Cleared cached device address");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_cache(tag: &str) -> AddressCache {
        let mut path = std::env::temp_dir();
        path.push(format!("treadctl-cache-test-{}-{tag}.json", std::process::id()));
        let cache = AddressCache::at(path);
        let _ = cache.clear();
        cache
    }

    #[test]
    fn test_save_then_load_roundtrip() {
        let cache = scratch_cache("roundtrip");
        cache.save("AA:BB:CC:DD:EE:FF").unwrap();
        assert_eq!(cache.load().as_deref(), Some("AA:BB:CC:DD:EE:FF"));
        cache.clear().unwrap();
    }

    #[test]
    fn test_save_overwrites_prior_value() {
        let cache = scratch_cache("overwrite");
        cache.save("11:11:11:11:11:11").unwrap();
        cache.save("22:22:22:22:22:22").unwrap();
        assert_eq!(cache.load().as_deref(), Some("22:22:22:22:22:22"));
        cache.clear().unwrap();
    }

    #[test]
    fn test_clear_then_load_is_miss() {
        let cache = scratch_cache("clear");
        cache.save("AA:BB:CC:DD:EE:FF").unwrap();
        cache.clear().unwrap();
        assert_eq!(cache.load(), None);
    }

    #[test]
    fn test_clear_missing_file_is_ok() {
        let cache = scratch_cache("clear-missing");
        cache.clear().unwrap();
        cache.clear().unwrap();
    }

    #[test]
    fn test_corrupt_file_is_a_miss() {
        let cache = scratch_cache("corrupt");
        fs::write(cache.path(), "{not json").unwrap();
        assert_eq!(cache.load(), None);
        cache.clear().unwrap();
    }
}
