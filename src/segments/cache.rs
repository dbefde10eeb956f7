//! LRU cache with per-entry expiry for qualified-segment lists.
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use tokio::time::{Duration, Instant};

/// Storage for qualified-segment lists, keyed by user.
///
/// Hosts may supply their own implementation (e.g. backed by a distributed
/// store); the engine ships [`LruCache`].
pub trait SegmentCache: Send + Sync {
    fn save(&self, key: String, value: Vec<String>);
    fn lookup(&self, key: &str) -> Option<Vec<String>>;
    fn remove(&self, key: &str);
    fn reset(&self);
}

const DEFAULT_MAX_SIZE: usize = 100;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

struct Entry {
    value: Vec<String>,
    inserted_at: Instant,
}

struct LruState {
    map: HashMap<String, Entry>,
    // Front is most recently used.
    order: VecDeque<String>,
}

/// A bounded LRU with a fixed per-entry time-to-live.
///
/// `max_size == 0` disables the cache entirely; a zero timeout disables
/// expiry. Lookups promote; inserts evict from the least recently used end.
pub struct LruCache {
    max_size: usize,
    timeout: Duration,
    state: Mutex<LruState>,
}

impl LruCache {
    pub fn new(max_size: usize, timeout: Duration) -> LruCache {
        LruCache {
            max_size,
            timeout,
            state: Mutex::new(LruState {
                map: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    fn expired(&self, entry: &Entry) -> bool {
        !self.timeout.is_zero() && entry.inserted_at.elapsed() > self.timeout
    }
}

impl Default for LruCache {
    fn default() -> LruCache {
        LruCache::new(DEFAULT_MAX_SIZE, DEFAULT_TIMEOUT)
    }
}

impl SegmentCache for LruCache {
    fn save(&self, key: String, value: Vec<String>) {
        if self.max_size == 0 {
            return;
        }
        let mut state = self.state.lock().expect("LruCache lock is poisoned");
        if state.map.contains_key(&key) {
            state.order.retain(|k| k != &key);
        } else {
            while state.map.len() >= self.max_size {
                if let Some(evicted) = state.order.pop_back() {
                    state.map.remove(&evicted);
                } else {
                    break;
                }
            }
        }
        state.order.push_front(key.clone());
        state.map.insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    fn lookup(&self, key: &str) -> Option<Vec<String>> {
        if self.max_size == 0 {
            return None;
        }
        let mut state = self.state.lock().expect("LruCache lock is poisoned");
        let Some(entry) = state.map.get(key) else {
            return None;
        };
        if self.expired(entry) {
            state.map.remove(key);
            state.order.retain(|k| k != key);
            return None;
        }
        let value = entry.value.clone();
        state.order.retain(|k| k != key);
        state.order.push_front(key.to_owned());
        Some(value)
    }

    fn remove(&self, key: &str) {
        let mut state = self.state.lock().expect("LruCache lock is poisoned");
        state.map.remove(key);
        state.order.retain(|k| k != key);
    }

    fn reset(&self) {
        let mut state = self.state.lock().expect("LruCache lock is poisoned");
        state.map.clear();
        state.order.clear();
    }
}
