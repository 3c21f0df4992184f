use bytes::Bytes;
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::rdb::{Record, Snapshot};

/// The Store is responsible for managing key-value pairs, with optional expiration for each key.
///
/// Expiry is lazy: a value whose expiration has passed is treated as absent when read but stays
/// in memory until it is overwritten, removed, or swept by the optional task started with
/// [`Store::spawn_expiry_sweeper`]. The store is shared by every connection and cloned cheaply
/// using reference counting.
#[derive(Clone, Default)]
pub struct Store {
    inner: Arc<InnerStore>,
}

impl Store {
    pub fn new() -> Store {
        Self::default()
    }

    /// Periodically removes expired keys. Reads never depend on this task having run.
    pub fn spawn_expiry_sweeper(&self, period: Duration) -> JoinHandle<()> {
        let store = self.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let removed = store.lock().remove_expired_keys();
                if removed > 0 {
                    debug!(removed, "swept expired keys");
                }
            }
        })
    }
}

#[derive(Default)]
pub struct InnerStore {
    state: Mutex<State>,
}

pub struct InnerStoreLocked<'a> {
    state: MutexGuard<'a, State>,
}

impl<'a> InnerStoreLocked<'a> {
    /// Stores `data` under `key`, dropping any expiration the key previously had.
    pub fn set(&mut self, key: Key, data: Bytes) {
        let value = Value {
            data,
            expires_at: None,
        };
        self.state.keys.insert(key, value);
    }

    pub fn set_with_ttl(&mut self, key: Key, data: Bytes, ttl: Duration) {
        self.set_with_expiry(key, data, SystemTime::now() + ttl);
    }

    pub fn set_with_expiry(&mut self, key: Key, data: Bytes, expires_at: SystemTime) {
        let value = Value {
            data,
            expires_at: Some(expires_at),
        };
        self.state.keys.insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        let now = SystemTime::now();
        self.state
            .keys
            .get(key)
            .filter(|value| value.is_visible(now))
            .map(|value| value.data.clone())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let now = SystemTime::now();
        self.state
            .keys
            .remove(key)
            .filter(|value| value.is_visible(now))
    }

    /// Number of stored entries, including expired ones that were not reclaimed yet.
    pub fn size(&self) -> usize {
        self.state.keys.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.iter().map(|(key, _)| key)
    }

    /// Visible entries, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Value)> {
        let now = SystemTime::now();
        self.state
            .keys
            .iter()
            .filter(move |(_, value)| value.is_visible(now))
    }

    pub fn clear(&mut self) {
        self.state.keys.clear();
    }

    /// Inserts every record of a decoded snapshot, overwriting existing keys.
    pub fn restore(&mut self, snapshot: Snapshot) {
        for record in snapshot.records {
            let value = Value {
                data: record.value,
                expires_at: record.expires_at,
            };
            self.state.keys.insert(record.key, value);
        }
    }

    /// Captures the visible entries as a snapshot, ready to be encoded.
    pub fn snapshot(&self) -> Snapshot {
        let records = self
            .iter()
            .map(|(key, value)| Record {
                key: key.clone(),
                value: value.data.clone(),
                expires_at: value.expires_at,
            })
            .collect();

        Snapshot {
            metadata: vec![
                ("redis-ver".to_string(), REDIS_VERSION.to_string()),
                ("redis-bits".to_string(), "64".to_string()),
            ],
            records,
        }
    }

    pub fn remove_expired_keys(&mut self) -> usize {
        let now = SystemTime::now();
        let before = self.state.keys.len();

        self.state.keys.retain(|_, value| value.is_visible(now));

        before - self.state.keys.len()
    }
}

impl Deref for Store {
    type Target = InnerStore;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl InnerStore {
    pub fn lock(&self) -> InnerStoreLocked<'_> {
        // A panicking writer leaves the map itself in a consistent state.
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        InnerStoreLocked { state }
    }
}

/// Version announced in the metadata of the snapshots this store produces.
const REDIS_VERSION: &str = "7.2.0";

type Key = String;

#[derive(Clone, Debug, PartialEq)]
pub struct Value {
    pub data: Bytes,
    pub expires_at: Option<SystemTime>,
}

impl Value {
    pub fn is_visible(&self, now: SystemTime) -> bool {
        self.expires_at.map_or(true, |expires_at| now < expires_at)
    }
}

#[derive(Default)]
pub struct State {
    keys: HashMap<Key, Value>,
}
