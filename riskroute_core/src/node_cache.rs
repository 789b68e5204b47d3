//! Coordinate → node lookup cache.
//!
//! Keys are coordinates snapped to roughly square buckets of a configured
//! size, so nearby requests (a user's GPS jitter, repeated destinations)
//! share an entry. Entries carry their insertion time and are honored for a
//! TTL; time is passed in by the caller.

use crate::bounded::BoundedMap;
use crate::config::CacheConfig;
use crate::geodesy::{Coordinate, METERS_PER_DEGREE};
use crate::graph::NodeId;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Bucketed coordinate plus the snapping limit it was resolved under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    lat_bucket: i64,
    lon_bucket: i64,
    max_distance_bits: u64,
}

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    node: NodeId,
    inserted_at: Duration,
}

/// Hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub capacity: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Shared, fixed-capacity node lookup cache.
///
/// Concurrent inserts for the same key are harmless: every writer resolves
/// the same bucket to the same node.
#[derive(Debug)]
pub struct NodeLookupCache {
    entries: Mutex<BoundedMap<CacheKey, CacheEntry>>,
    ttl: Duration,
    bucket_deg: f64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl NodeLookupCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: Mutex::new(BoundedMap::new(config.node_cache_capacity)),
            ttl: config.ttl(),
            bucket_deg: config.node_cache_bucket_m / METERS_PER_DEGREE,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Builds the key for `point`.
    ///
    /// Longitude buckets are widened by 1/cos(lat) so buckets stay close to
    /// square away from the equator.
    pub fn key(&self, point: &Coordinate, max_distance_m: f64) -> CacheKey {
        let lat_bucket = (point.lat / self.bucket_deg).floor() as i64;
        let band_lat = (lat_bucket as f64 + 0.5) * self.bucket_deg;
        let cos_lat = band_lat.to_radians().cos().max(1e-6);
        let lon_bucket = (point.lon * cos_lat / self.bucket_deg).floor() as i64;
        CacheKey {
            lat_bucket,
            lon_bucket,
            max_distance_bits: max_distance_m.to_bits(),
        }
    }

    /// Returns the cached node if present and fresh. Counts a hit or a miss.
    pub fn get(&self, key: &CacheKey, now: Duration) -> Option<NodeId> {
        let fresh = {
            let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            entries
                .get(key)
                .filter(|entry| now.saturating_sub(entry.inserted_at) < self.ttl)
                .map(|entry| entry.node)
        };
        match fresh {
            Some(node) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(node)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Stores a resolution. Expired entries for the same key are replaced.
    pub fn insert(&self, key: CacheKey, node: NodeId, now: Duration) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key, CacheEntry { node, inserted_at: now });
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: entries.len(),
            capacity: entries.capacity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geodesy::offset_m;

    fn cache(capacity: usize) -> NodeLookupCache {
        NodeLookupCache::new(&CacheConfig {
            node_cache_capacity: capacity,
            node_cache_ttl_s: 60,
            node_cache_bucket_m: 10.0,
        })
    }

    #[test]
    fn test_hit_within_ttl_miss_after() {
        let cache = cache(16);
        let p = Coordinate::new(14.6, 121.0);
        let key = cache.key(&p, 500.0);

        assert_eq!(cache.get(&key, Duration::ZERO), None);
        cache.insert(key, NodeId(3), Duration::ZERO);
        assert_eq!(cache.get(&key, Duration::from_secs(59)), Some(NodeId(3)));
        assert_eq!(cache.get(&key, Duration::from_secs(60)), None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
    }

    #[test]
    fn test_nearby_points_share_bucket() {
        let cache = cache(16);
        // Centre of the bucket containing (14.6, 121.0)
        let bd = cache.bucket_deg;
        let lat = ((14.6 / bd).floor() + 0.5) * bd;
        let cos_lat = lat.to_radians().cos();
        let lon = ((121.0 * cos_lat / bd).floor() + 0.5) * bd / cos_lat;
        let base = Coordinate::new(lat, lon);
        let a = cache.key(&base, 500.0);
        let b = cache.key(&offset_m(&base, 1.0, 1.0), 500.0);
        let far = cache.key(&offset_m(&base, 50.0, 0.0), 500.0);
        assert_eq!(a, b);
        assert_ne!(a, far);
        // Same place, different snapping limit
        assert_ne!(a, cache.key(&base, 100.0));
    }

    #[test]
    fn test_capacity_is_bounded() {
        let cache = cache(8);
        let origin = Coordinate::new(14.6, 121.0);
        for i in 0..100 {
            let key = cache.key(&offset_m(&origin, i as f64 * 30.0, 0.0), 500.0);
            cache.insert(key, NodeId(i), Duration::ZERO);
        }
        assert_eq!(cache.stats().entries, 8);
    }
}
