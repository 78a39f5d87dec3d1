//! In-process store backed by DashMap.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{Counter, SharedStore, StoreError};

#[derive(Debug, Clone)]
enum Value {
    Counter(u64),
    Text(String),
}

#[derive(Debug, Clone)]
struct Slot {
    value: Value,
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Worker-local store. Each key's shard lock makes increments atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: DashMap<String, Slot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<Counter, StoreError> {
        let now = Instant::now();
        let fresh = || Slot {
            value: Value::Counter(1),
            expires_at: Some(now + window),
        };

        match self.inner.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get_mut();
                if !slot.is_live(now) {
                    *slot = fresh();
                    return Ok(Counter {
                        hits: 1,
                        resets_in: window,
                    });
                }
                match &mut slot.value {
                    Value::Counter(hits) => {
                        *hits += 1;
                        let hits = *hits;
                        let resets_in = slot
                            .expires_at
                            .map(|at| at.saturating_duration_since(now))
                            .unwrap_or(window);
                        Ok(Counter { hits, resets_in })
                    }
                    Value::Text(_) => Err(StoreError::Corrupt {
                        key: key.to_string(),
                        reason: "not a counter".to_string(),
                    }),
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(fresh());
                Ok(Counter {
                    hits: 1,
                    resets_in: window,
                })
            }
        }
    }

    async fn release(&self, key: &str) -> Result<(), StoreError> {
        let now = Instant::now();
        if let Some(mut slot) = self.inner.get_mut(key) {
            if slot.is_live(now) {
                if let Value::Counter(hits) = &mut slot.value {
                    *hits = hits.saturating_sub(1);
                }
            }
        }
        Ok(())
    }

    async fn counter(&self, key: &str) -> Result<u64, StoreError> {
        let now = Instant::now();
        match self.inner.get(key) {
            Some(slot) if slot.is_live(now) => match slot.value {
                Value::Counter(hits) => Ok(hits),
                Value::Text(_) => Err(StoreError::Corrupt {
                    key: key.to_string(),
                    reason: "not a counter".to_string(),
                }),
            },
            _ => Ok(0),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        Ok(self.inner.get(key).and_then(|slot| match &slot.value {
            Value::Text(text) if slot.is_live(now) => Some(text.clone()),
            _ => None,
        }))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.inner.insert(
            key.to_string(),
            Slot {
                value: Value::Text(value.to_string()),
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn insert_new(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        let slot = Slot {
            value: Value::Text(value.to_string()),
            expires_at: None,
        };
        match self.inner.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live(now) {
                    Ok(false)
                } else {
                    occupied.insert(slot);
                    Ok(true)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(slot);
                Ok(true)
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.remove(key);
        Ok(())
    }

    async fn sweep(&self) -> Result<usize, StoreError> {
        let now = Instant::now();
        let before = self.inner.len();
        self.inner.retain(|_, slot| slot.is_live(now));
        Ok(before.saturating_sub(self.inner.len()))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
