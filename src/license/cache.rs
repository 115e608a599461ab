// LCP Core - Readium LCP package reader
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! In-memory passphrase cache
//!
//! Maps license id to a user key that has already unlocked that license.
//! Keys are only inserted after the key check passed, so every cached entry
//! is known good for its license.

use crate::crypto::UserKey;
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

lazy_static! {
    static ref GLOBAL_CACHE: Arc<PassphraseCache> = Arc::new(PassphraseCache::new());
}

/// Thread-safe license id → user key map
#[derive(Debug, Default)]
pub struct PassphraseCache {
    keys: RwLock<HashMap<String, UserKey>>,
}

impl PassphraseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide cache shared by services that don't bring their own
    pub fn global() -> Arc<PassphraseCache> {
        Arc::clone(&GLOBAL_CACHE)
    }

    pub fn get(&self, license_id: &str) -> Option<UserKey> {
        let keys = self.keys.read().unwrap_or_else(PoisonError::into_inner);
        keys.get(license_id).copied()
    }

    pub(crate) fn insert(&self, license_id: &str, key: UserKey) {
        let mut keys = self.keys.write().unwrap_or_else(PoisonError::into_inner);
        keys.insert(license_id.to_string(), key);
    }

    /// Remove one license's key, or every key when `license_id` is None
    pub fn clear(&self, license_id: Option<&str>) {
        let mut keys = self.keys.write().unwrap_or_else(PoisonError::into_inner);
        match license_id {
            Some(id) => {
                keys.remove(id);
            }
            None => keys.clear(),
        }
    }

    pub fn contains(&self, license_id: &str) -> bool {
        self.get(license_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.keys.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_clear() {
        let cache = PassphraseCache::new();
        cache.insert("a", UserKey::from_passphrase("one"));
        cache.insert("b", UserKey::from_passphrase("two"));
        assert_eq!(cache.get("a"), Some(UserKey::from_passphrase("one")));
        assert_eq!(cache.len(), 2);

        cache.clear(Some("a"));
        assert!(!cache.contains("a"));
        assert!(cache.contains("b"));

        cache.clear(None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_global_is_shared() {
        let first = PassphraseCache::global();
        let second = PassphraseCache::global();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
