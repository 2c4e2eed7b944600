//! In-memory read cache for the list endpoints.
//!
//! Buildings change rarely, rooms occasionally, bookings constantly, so
//! each list gets its own TTL. Every mutation path clears the affected
//! slot; the TTL only bounds staleness for writes that bypass the API.
//! Conflict-detection reads never go through here.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::models::{Booking, Building, Room};

pub const BUILDINGS_TTL: Duration = Duration::from_secs(600);
pub const ROOMS_TTL: Duration = Duration::from_secs(300);
pub const BOOKINGS_TTL: Duration = Duration::from_secs(60);

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// Mutex-guarded map of values stamped with an expiry instant. Expired
/// entries are evicted on the read that finds them.
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, Entry<V>>>,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    fn get_at(&self, key: &K, now: Instant) -> Option<V> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) if now < entry.expires_at => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: K, value: V) {
        self.put_at(key, value, Instant::now());
    }

    fn put_at(&self, key: K, value: V, now: Instant) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            key,
            Entry {
                value,
                expires_at: now + self.ttl,
            },
        );
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

/// One slot per cached list. Keys carry the query filters so differently
/// filtered responses never alias.
pub struct AppCache {
    /// Key: include_inactive.
    pub buildings: TtlCache<bool, Vec<Building>>,
    /// Key: (building_id filter, include_inactive).
    pub rooms: TtlCache<(Option<i64>, bool), Vec<Room>>,
    /// Key: (status filter, limit).
    pub bookings: TtlCache<(Option<String>, i64), Vec<Booking>>,
}

impl AppCache {
    pub fn new() -> Self {
        Self {
            buildings: TtlCache::new(BUILDINGS_TTL),
            rooms: TtlCache::new(ROOMS_TTL),
            bookings: TtlCache::new(BOOKINGS_TTL),
        }
    }

    /// A building write can change which rooms are bookable, so it clears
    /// the room lists too.
    pub fn invalidate_buildings(&self) {
        self.buildings.clear();
        self.rooms.clear();
    }

    pub fn invalidate_rooms(&self) {
        self.rooms.clear();
    }

    pub fn invalidate_bookings(&self) {
        self.bookings.clear();
    }
}

impl Default for AppCache {
    fn default() -> Self {
        Self::new()
    }
}
