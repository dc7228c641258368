//! Memoized API responses for the gateway.
//!
//! Responses are keyed by `(endpoint, parameter signature)`, where the
//! signature renders the request parameters in the order the call declared
//! them. Entries live for the whole process; the only way to drop them is
//! [`ResponseCache::clear`].

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

/// Cache key: endpoint path plus ordered parameter signature.
pub type CacheKey = (String, String);

/// Build the cache key for an endpoint and its ordered parameters.
pub fn cache_key(endpoint: &str, params: &[(String, String)]) -> CacheKey {
    (endpoint.to_string(), param_signature(params))
}

/// Render ordered parameters as `k1=v1&k2=v2`.
pub fn param_signature(params: &[(String, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Process-lifetime response cache with hit/miss counters.
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: HashMap<CacheKey, Value>,
    hits: u64,
    misses: u64,
}

/// Hit/miss counters, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    /// Hit rate as a fraction (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a cached response, counting the hit or miss.
    pub fn get(&mut self, key: &CacheKey) -> Option<Value> {
        match self.entries.get(key) {
            Some(value) => {
                self.hits += 1;
                Some(value.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Look up without touching the counters.
    pub fn peek(&self, key: &CacheKey) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn put(&mut self, key: CacheKey, value: Value) {
        self.entries.insert(key, value);
    }

    /// Drop every entry. Counters are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits,
            misses: self.misses,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn put_and_get() {
        let mut cache = ResponseCache::new();
        let key = cache_key("files/abc", &params(&[("depth", "2")]));
        cache.put(key.clone(), json!({"name": "Design"}));

        assert_eq!(cache.get(&key), Some(json!({"name": "Design"})));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn miss_is_counted() {
        let mut cache = ResponseCache::new();
        assert!(cache.get(&cache_key("files/abc", &[])).is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn parameters_distinguish_entries() {
        let mut cache = ResponseCache::new();
        cache.put(cache_key("files/abc", &params(&[("depth", "1")])), json!(1));
        cache.put(cache_key("files/abc", &params(&[("depth", "2")])), json!(2));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn parameter_order_is_part_of_signature() {
        let a = param_signature(&params(&[("ids", "1:2"), ("scale", "2")]));
        let b = param_signature(&params(&[("scale", "2"), ("ids", "1:2")]));
        assert_eq!(a, "ids=1:2&scale=2");
        assert_ne!(a, b);
    }

    #[test]
    fn clear_drops_entries_keeps_counters() {
        let mut cache = ResponseCache::new();
        let key = cache_key("files/abc", &[]);
        cache.put(key.clone(), json!({}));
        cache.get(&key);
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.peek(&key).is_none());
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn hit_rate_computation() {
        let mut cache = ResponseCache::new();
        let key = cache_key("t", &[]);
        cache.put(key.clone(), json!(null));
        cache.get(&key);
        cache.get(&cache_key("u", &[]));
        assert!((cache.stats().hit_rate() - 0.5).abs() < 0.01);
    }
}
