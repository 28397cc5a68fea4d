//! Canonicalization Cache
//!
//! Bounded in-memory LRU of validated records, keyed by a content hash of the
//! segment, game context, model id and mode. Created once and shared by
//! reference; never persisted.

use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::types::{GameContext, PlateAppearanceCanonical};

pub const CACHE_KEY_VERSION: u32 = 1;
pub const DEFAULT_CACHE_CAPACITY: usize = 200;

/// Hex SHA-256 of the canonical JSON encoding of everything that determines the record.
pub fn cache_key(segment: &str, ctx: &GameContext, model: &str, mode: &str) -> String {
    let material = json!({
        "v": CACHE_KEY_VERSION,
        "seg": segment,
        "ctx": ctx,
        "model": model,
        "mode": mode,
    });
    let mut hasher = Sha256::new();
    hasher.update(material.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

struct Entry {
    value: PlateAppearanceCanonical,
    tick: u64,
}

#[derive(Default)]
struct LruState {
    entries: HashMap<String, Entry>,
    /// Recency order: logical tick to key, oldest first.
    recency: BTreeMap<u64, String>,
    tick: u64,
}

impl LruState {
    fn touch(&mut self, key: &str) {
        self.tick += 1;
        let tick = self.tick;
        if let Some(entry) = self.entries.get_mut(key) {
            self.recency.remove(&entry.tick);
            entry.tick = tick;
            self.recency.insert(tick, key.to_string());
        }
    }
}

#[derive(Clone)]
pub struct CanonCache {
    state: Arc<Mutex<LruState>>,
    capacity: usize,
}

impl CanonCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(LruState::default())),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn get(&self, key: &str) -> Option<PlateAppearanceCanonical> {
        let mut state = self.state.lock().await;
        let value = state.entries.get(key)?.value.clone();
        state.touch(key);
        Some(value)
    }

    pub async fn set(&self, key: &str, value: PlateAppearanceCanonical) {
        let mut state = self.state.lock().await;
        if let Some(entry) = state.entries.get_mut(key) {
            entry.value = value;
            state.touch(key);
            return;
        }

        while state.entries.len() >= self.capacity {
            let Some((_, oldest)) = state.recency.pop_first() else {
                break;
            };
            state.entries.remove(&oldest);
        }

        state.tick += 1;
        let tick = state.tick;
        state.recency.insert(tick, key.to_string());
        state.entries.insert(key.to_string(), Entry { value, tick });
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.entries.clear();
        state.recency.clear();
    }
}

impl Default for CanonCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}
