//! Key registry
//!
//! Maps key identifiers to their purposes and key type. The registry is a plain
//! data structure: authorization of who may mutate it lives in the account
//! facade, which consults [`crate::policy::AuthorizationPolicy`] first.
//!
//! Invariants maintained here:
//! - a key with zero purposes is not stored (its type reads back as `NONE`)
//! - the last key holding `MANAGEMENT` cannot lose that purpose

use crate::types::{KeyId, KeyInfo, KeyType, Purpose};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct KeyEntry {
    purposes: Vec<Purpose>,
    key_type: KeyType,
}

/// Registry of keys and the purposes they hold
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRegistry {
    keys: HashMap<KeyId, KeyEntry>,
    /// Purpose -> keys in the order the purpose was granted
    by_purpose: HashMap<Purpose, Vec<KeyId>>,
}

impl KeyRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry seeded with a single management key
    pub fn with_management_key(key: KeyId, key_type: KeyType) -> Self {
        let mut registry = Self::new();
        registry.insert(key, Purpose::MANAGEMENT, key_type);
        registry
    }

    /// Grant `purpose` to `key`, registering the key if it is new
    pub fn add_key(&mut self, key: KeyId, purpose: Purpose, key_type: KeyType) -> Result<()> {
        if let Some(entry) = self.keys.get(&key) {
            if entry.purposes.contains(&purpose) {
                return Err(Error::DuplicatePurpose { key, purpose });
            }
            if entry.key_type != key_type {
                return Err(Error::KeyTypeMismatch {
                    key,
                    registered: entry.key_type,
                    supplied: key_type,
                });
            }
        }

        self.insert(key, purpose, key_type);
        Ok(())
    }

    /// Revoke `purpose` from `key`, deleting the key once it has no purposes
    pub fn remove_key(&mut self, key: KeyId, purpose: Purpose) -> Result<()> {
        if !self.key_has_purpose(&key, purpose) {
            return Err(Error::PurposeNotFound { key, purpose });
        }
        if purpose == Purpose::MANAGEMENT && self.management_key_count() <= 1 {
            return Err(Error::LastManagementKey(key));
        }

        let now_empty = match self.keys.get_mut(&key) {
            Some(entry) => {
                entry.purposes.retain(|p| *p != purpose);
                entry.purposes.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.keys.remove(&key);
        }

        if let Some(holders) = self.by_purpose.get_mut(&purpose) {
            holders.retain(|k| *k != key);
            if holders.is_empty() {
                self.by_purpose.remove(&purpose);
            }
        }
        Ok(())
    }

    /// Look up a key; unknown keys report no purposes and type `NONE`
    pub fn get_key(&self, key: &KeyId) -> KeyInfo {
        match self.keys.get(key) {
            Some(entry) => KeyInfo {
                key: *key,
                purposes: entry.purposes.clone(),
                key_type: entry.key_type,
            },
            None => KeyInfo {
                key: *key,
                purposes: Vec::new(),
                key_type: KeyType::NONE,
            },
        }
    }

    /// Check whether a registered key holds `purpose`
    pub fn key_has_purpose(&self, key: &KeyId, purpose: Purpose) -> bool {
        self.keys
            .get(key)
            .map(|entry| entry.purposes.contains(&purpose))
            .unwrap_or(false)
    }

    /// All keys holding `purpose`, in the order the purpose was granted
    pub fn keys_by_purpose(&self, purpose: Purpose) -> Vec<KeyId> {
        self.by_purpose.get(&purpose).cloned().unwrap_or_default()
    }

    /// Number of keys holding `purpose`
    pub fn purpose_count(&self, purpose: Purpose) -> usize {
        self.by_purpose.get(&purpose).map(Vec::len).unwrap_or(0)
    }

    /// Number of keys holding `MANAGEMENT`
    pub fn management_key_count(&self) -> usize {
        self.purpose_count(Purpose::MANAGEMENT)
    }

    /// Number of registered keys
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    fn insert(&mut self, key: KeyId, purpose: Purpose, key_type: KeyType) {
        self.keys
            .entry(key)
            .or_insert_with(|| KeyEntry {
                purposes: Vec::new(),
                key_type,
            })
            .purposes
            .push(purpose);
        self.by_purpose.entry(purpose).or_default().push(key);
    }
}
