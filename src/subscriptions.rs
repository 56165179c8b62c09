//! Subscription registry: the set of watched addresses.

use std::collections::HashSet;
use std::sync::RwLock;

use crate::error::{Error, Result};

/// Thread-safe set of watched addresses.
///
/// Addresses are opaque strings and are compared byte-for-byte.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    addresses: RwLock<HashSet<String>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Watch `address`. Returns `false` if it was already watched.
    pub fn add(&self, address: &str) -> Result<bool> {
        let mut addresses = self.addresses.write().map_err(|_| Error::Lock)?;
        Ok(addresses.insert(address.to_string()))
    }

    /// Whether `address` is currently watched
    pub fn check(&self, address: &str) -> Result<bool> {
        let addresses = self.addresses.read().map_err(|_| Error::Lock)?;
        Ok(addresses.contains(address))
    }

    /// Stop watching `address`. Returns `false` if it was not watched.
    pub fn remove(&self, address: &str) -> Result<bool> {
        let mut addresses = self.addresses.write().map_err(|_| Error::Lock)?;
        Ok(addresses.remove(address))
    }

    /// Number of watched addresses
    pub fn len(&self) -> Result<usize> {
        let addresses = self.addresses.read().map_err(|_| Error::Lock)?;
        Ok(addresses.len())
    }

    /// Check if nothing is watched
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Sorted copy of the watched set
    pub fn snapshot(&self) -> Result<Vec<String>> {
        let addresses = self.addresses.read().map_err(|_| Error::Lock)?;
        let mut list: Vec<String> = addresses.iter().cloned().collect();
        list.sort();
        Ok(list)
    }
}
