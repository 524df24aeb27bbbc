// 🧊 Result Cache - Opportunistic, keyed by analysis + parameters
//
// Never part of correctness: a hit returns exactly what a fresh run returned
// within the entry's expiry window. Expired entries are evicted on read.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: serde_json::Value,
    expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct ResultCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub keys: Vec<String>,
}

impl ResultCache {
    pub fn new(ttl_secs: u64) -> Self {
        ResultCache {
            entries: RwLock::new(HashMap::new()),
            ttl: Duration::seconds(ttl_secs as i64),
        }
    }

    /// `analysis:sha256(params JSON)`
    pub fn key<P: Serialize>(analysis: &str, params: &P) -> String {
        let json = serde_json::to_string(params).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        format!("{}:{:x}", analysis, hasher.finalize())
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.get_at(key, Utc::now())
    }

    fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<serde_json::Value> {
        {
            let entries = self.entries.read().ok()?;
            match entries.get(key) {
                Some(entry) if entry.expires_at > now => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // Expired
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(key);
        }
        None
    }

    pub fn insert(&self, key: String, value: serde_json::Value) {
        self.insert_at(key, value, Utc::now());
    }

    fn insert_at(&self, key: String, value: serde_json::Value, now: DateTime<Utc>) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(
                key,
                CacheEntry {
                    value,
                    expires_at: now + self.ttl,
                },
            );
        }
    }

    /// Drop every expired entry; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        match self.entries.write() {
            Ok(mut entries) => {
                let before = entries.len();
                entries.retain(|_, e| e.expires_at > now);
                before - entries.len()
            }
            Err(_) => 0,
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }

    pub fn stats(&self) -> CacheStats {
        let entries = match self.entries.read() {
            Ok(entries) => entries,
            Err(_) => return CacheStats { size: 0, keys: vec![] },
        };
        let mut keys: Vec<String> = entries.keys().cloned().collect();
        keys.sort();
        CacheStats {
            size: keys.len(),
            keys,
        }
    }
}
