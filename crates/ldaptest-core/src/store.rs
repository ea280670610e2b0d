//! Process-wide holder for the current directory configuration snapshot.

use crate::config::DirectoryConfig;
use crate::{Error, Result};
use std::io::Read;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

/// Holds at most one validated [`DirectoryConfig`] snapshot.
///
/// Every successful load swaps in a new `Arc` under the write lock; readers clone the `Arc` and
/// keep using their snapshot even if a reload happens afterwards. A failed load never touches
/// the current snapshot.
#[derive(Debug, Default)]
pub struct ConfigStore {
    current: RwLock<Option<Arc<DirectoryConfig>>>,
}

impl ConfigStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store already holding `config`.
    #[must_use]
    pub fn with_config(config: DirectoryConfig) -> Self {
        Self {
            current: RwLock::new(Some(Arc::new(config))),
        }
    }

    /// Loads a configuration from a JSON byte source and publishes it.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the source is malformed or invalid; the current snapshot
    /// is left unchanged.
    pub fn load(&self, source: impl Read) -> Result<Arc<DirectoryConfig>> {
        let config = DirectoryConfig::from_reader(source)?;
        Ok(self.publish(config))
    }

    /// Loads a configuration from JSON bytes and publishes it.
    ///
    /// # Errors
    ///
    /// See [`ConfigStore::load`].
    pub fn load_slice(&self, bytes: &[u8]) -> Result<Arc<DirectoryConfig>> {
        let config = DirectoryConfig::from_json_slice(bytes)?;
        Ok(self.publish(config))
    }

    /// Loads a configuration file and publishes it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read, otherwise see [`ConfigStore::load`].
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<Arc<DirectoryConfig>> {
        let path = path.as_ref();
        let config = DirectoryConfig::from_file(path)?;
        debug!(path = %path.display(), "read directory configuration file");
        Ok(self.publish(config))
    }

    /// Returns the current snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotLoaded`] if no configuration has been loaded yet.
    pub fn current(&self) -> Result<Arc<DirectoryConfig>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(Error::NotLoaded)
    }

    /// Returns true once a configuration has been loaded.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn publish(&self, config: DirectoryConfig) -> Arc<DirectoryConfig> {
        let snapshot = Arc::new(config);
        // The guarded value is a plain pointer swap, so a poisoned lock still holds a
        // consistent snapshot.
        *self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&snapshot));

        info!(
            host = snapshot.host(),
            port = snapshot.port(),
            tls = snapshot.use_tls(),
            start_tls = snapshot.start_tls(),
            "directory configuration loaded"
        );
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIRST: &[u8] = br#"{"host": "ldap-a", "bindDNTemplate": "uid=%s,dc=example"}"#;
    const SECOND: &[u8] = br#"{"host": "ldap-b", "port": 1389, "bindDNTemplate": "cn=%s,dc=example"}"#;

    #[test]
    fn test_current_before_load() {
        let store = ConfigStore::new();
        assert!(!store.is_loaded());
        assert_eq!(store.current().unwrap_err(), Error::NotLoaded);
    }

    #[test]
    fn test_load_publishes_snapshot() {
        let store = ConfigStore::new();
        let loaded = store.load(FIRST).unwrap();
        assert!(store.is_loaded());
        assert!(Arc::ptr_eq(&loaded, &store.current().unwrap()));
        assert_eq!(loaded.host(), "ldap-a");
    }

    #[test]
    fn test_load_is_idempotent() {
        let store = ConfigStore::new();
        let first = store.load_slice(FIRST).unwrap();
        let second = store.load_slice(FIRST).unwrap();
        assert_eq!(*first, *second);
    }

    #[test]
    fn test_failed_load_keeps_snapshot() {
        let store = ConfigStore::new();
        let good = store.load_slice(FIRST).unwrap();

        for bad in [
            &br#"{"bindDNTemplate": "uid=%s,dc=example"}"#[..],
            br#"{"host": "ldap", "port": 0, "bindDNTemplate": "uid=%s,dc=example"}"#,
            br#"{"host": "ldap", "port": 70000, "bindDNTemplate": "uid=%s,dc=example"}"#,
            br#"{"host": "ldap", "bindDNTemplate": "uid=alice,dc=example"}"#,
            b"not json",
        ] {
            let err = store.load_slice(bad).unwrap_err();
            assert!(err.is_config(), "{err}");
            assert!(Arc::ptr_eq(&good, &store.current().unwrap()));
        }
    }

    #[test]
    fn test_reload_does_not_touch_held_snapshot() {
        let store = ConfigStore::new();
        let held = store.load_slice(FIRST).unwrap();
        let replaced = store.load_slice(SECOND).unwrap();

        assert_eq!(held.host(), "ldap-a");
        assert_eq!(replaced.host(), "ldap-b");
        assert_eq!(store.current().unwrap().port(), 1389);
    }

    #[test]
    fn test_with_config() {
        let config = DirectoryConfig::new("ldap", "uid=%s,dc=example").unwrap();
        let store = ConfigStore::with_config(config.clone());
        assert_eq!(*store.current().unwrap(), config);
    }
}
