//! Optional cache of derived store keys, keyed by store identity.
//!
//! The store engine never consults a cache on its own; callers look keys up
//! before prompting and hand a cache to [`StoreFile::rotate_key`] so a stale
//! entry is dropped.
//!
//! [`StoreFile::rotate_key`]: crate::store_file::StoreFile::rotate_key

use keyring::Entry;
use std::cell::RefCell;
use std::collections::HashMap;
use zeroize::Zeroizing;

use crate::crypto::StoreKey;
use crate::error::{Result, StoreError};

pub const SERVICE_NAME: &str = "secrets-guard";

pub trait KeyCache {
    fn get(&self, identity: &str) -> Result<Option<StoreKey>>;
    fn put(&self, identity: &str, key: &StoreKey) -> Result<()>;
    fn invalidate(&self, identity: &str) -> Result<()>;
}

/// Keys kept in the OS credential store.
#[derive(Debug, Clone)]
pub struct KeyringCache {
    service: String,
}

impl Default for KeyringCache {
    fn default() -> Self {
        Self::new(SERVICE_NAME)
    }
}

impl KeyringCache {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, identity: &str) -> Result<Entry> {
        Entry::new(&self.service, identity)
            .map_err(|e| StoreError::KeyCache(format!("keyring init: {e}")))
    }
}

impl KeyCache for KeyringCache {
    fn get(&self, identity: &str) -> Result<Option<StoreKey>> {
        let encoded = match self.entry(identity)?.get_password() {
            Ok(encoded) => Zeroizing::new(encoded),
            Err(keyring::Error::NoEntry) => return Ok(None),
            Err(e) => return Err(StoreError::KeyCache(format!("load key: {e}"))),
        };
        StoreKey::import(&encoded).map(Some)
    }

    fn put(&self, identity: &str, key: &StoreKey) -> Result<()> {
        self.entry(identity)?
            .set_password(&key.export())
            .map_err(|e| StoreError::KeyCache(format!("store key: {e}")))
    }

    fn invalidate(&self, identity: &str) -> Result<()> {
        match self.entry(identity)?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(StoreError::KeyCache(format!("delete key: {e}"))),
        }
    }
}

/// In-process cache, for tests and for embedding the engine in a long-lived
/// process that manages its own lifetime for keys.
#[derive(Debug, Default)]
pub struct MemoryKeyCache {
    entries: RefCell<HashMap<String, Zeroizing<String>>>,
}

impl KeyCache for MemoryKeyCache {
    fn get(&self, identity: &str) -> Result<Option<StoreKey>> {
        self.entries
            .borrow()
            .get(identity)
            .map(|encoded| StoreKey::import(encoded))
            .transpose()
    }

    fn put(&self, identity: &str, key: &StoreKey) -> Result<()> {
        self.entries
            .borrow_mut()
            .insert(identity.to_string(), key.export());
        Ok(())
    }

    fn invalidate(&self, identity: &str) -> Result<()> {
        self.entries.borrow_mut().remove(identity);
        Ok(())
    }
}
