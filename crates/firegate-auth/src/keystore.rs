//! In-memory public key table.

use crate::{Result, parse_key_set};

use dashmap::DashMap;
use firegate_api::{KeyId, KeyStore, PublicKey};

/// Concurrent `kid -> PublicKey` table.
///
/// Readers never block each other. A refresh through [`MemoryKeyStore::replace_all`]
/// is applied key by key, so a concurrent lookup sees either the old or the new
/// entry for a given kid.
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    keys: DashMap<KeyId, PublicKey>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, kid: impl Into<KeyId>, key: PublicKey) -> Option<PublicKey> {
        self.keys.insert(kid.into(), key)
    }

    pub fn remove(&self, kid: &str) -> Option<PublicKey> {
        self.keys.remove(kid).map(|(_, key)| key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key ids currently held, sorted.
    pub fn kids(&self) -> Vec<KeyId> {
        let mut kids: Vec<KeyId> = self.keys.iter().map(|e| e.key().clone()).collect();
        kids.sort();
        kids
    }

    /// Make the table hold exactly `keys`.
    ///
    /// New and rotated keys are written first; kids absent from `keys` are dropped after.
    pub fn replace_all(&self, keys: impl IntoIterator<Item = (KeyId, PublicKey)>) {
        let mut fresh = Vec::new();
        for (kid, key) in keys {
            fresh.push(kid.clone());
            self.keys.insert(kid, key);
        }
        self.keys.retain(|kid, _| fresh.contains(kid));
    }

    /// Parse a published key set and replace the table with it.
    ///
    /// On a parse error the table is left untouched.
    pub fn load_json(&self, json: &str) -> Result<usize> {
        let set = parse_key_set(json)?;
        let count = set.keys.len();
        self.replace_all(set.keys);
        tracing::debug!(count, "public key set loaded");
        Ok(count)
    }
}

impl KeyStore for MemoryKeyStore {
    fn lookup(&self, kid: &str) -> Option<PublicKey> {
        self.keys.get(kid).map(|e| e.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn pem(s: &str) -> PublicKey {
        PublicKey::Pem(s.to_string())
    }

    #[test]
    fn insert_lookup_remove() {
        let store = MemoryKeyStore::new();
        assert!(store.is_empty());
        assert!(store.insert("k1", pem("a")).is_none());
        assert_eq!(store.lookup("k1"), Some(pem("a")));
        assert_eq!(store.insert("k1", pem("b")), Some(pem("a")));
        assert_eq!(store.len(), 1);
        assert_eq!(store.remove("k1"), Some(pem("b")));
        assert_eq!(store.lookup("k1"), None);
    }

    #[test]
    fn replace_all_drops_stale_kids() {
        let store = MemoryKeyStore::new();
        store.insert("old", pem("x"));
        store.insert("kept", pem("y"));

        store.replace_all(vec![
            ("kept".to_string(), pem("y2")),
            ("new".to_string(), pem("z")),
        ]);

        assert_eq!(store.kids(), vec!["kept".to_string(), "new".to_string()]);
        assert_eq!(store.lookup("kept"), Some(pem("y2")));
        assert_eq!(store.lookup("old"), None);
    }

    #[test]
    fn failed_load_keeps_previous_keys() {
        let store = MemoryKeyStore::new();
        store.insert("k1", pem("x"));
        assert!(store.load_json("{\"keys\": []}").is_err());
        assert_eq!(store.lookup("k1"), Some(pem("x")));
    }

    #[test]
    fn load_google_certificates() {
        let store = MemoryKeyStore::new();
        let n = store
            .load_json(include_str!("../tests/fixtures/google_x509.json"))
            .unwrap();
        assert_eq!(n, 1);
        assert!(matches!(store.lookup("k1"), Some(PublicKey::Pem(_))));
    }

    #[test]
    fn concurrent_readers_during_refresh() {
        let store = Arc::new(MemoryKeyStore::new());
        store.insert("k1", pem("v1"));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        let seen = store.lookup("k1");
                        assert!(seen == Some(pem("v1")) || seen == Some(pem("v2")));
                    }
                })
            })
            .collect();

        for _ in 0..100 {
            store.replace_all(vec![("k1".to_string(), pem("v2"))]);
            store.replace_all(vec![("k1".to_string(), pem("v1"))]);
        }

        for r in readers {
            r.join().unwrap();
        }
    }
}
