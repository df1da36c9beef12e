//! Content hashes and caches keyed by the identity of a shared JSON value.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Caches one `V` per distinct `Arc<Value>` allocation.
///
/// Entries hold a [`Weak`] to their key and are dropped once the key is gone, so a schema or a
/// document can be freed while the cache lives on. The cache is a plain value: give each
/// concurrent build its own.
pub struct IdentityCache<V> {
    entries: HashMap<usize, (Weak<Value>, V)>,
}

impl<V> Default for IdentityCache<V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<V: Clone> IdentityCache<V> {
    /// The cached value for `key`, computing and storing it on a miss.
    ///
    /// Errors are returned as-is and nothing is stored for them.
    pub fn get_or_try_insert<E>(
        &mut self,
        key: &Arc<Value>,
        compute: impl FnOnce(&Value) -> Result<V, E>,
    ) -> Result<V, E> {
        let id = Arc::as_ptr(key) as usize;
        if let Some((weak, value)) = self.entries.get(&id) {
            if weak.strong_count() > 0 && Weak::as_ptr(weak) == Arc::as_ptr(key) {
                return Ok(value.clone());
            }
        }

        let value = compute(&**key)?;
        self.evict_dropped();
        self.entries
            .insert(id, (Arc::downgrade(key), value.clone()));
        Ok(value)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries
            .values()
            .filter(|(weak, _)| weak.strong_count() > 0)
            .count()
    }

    /// Whether no entry is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops entries whose key was freed.
    pub fn evict_dropped(&mut self) {
        self.entries.retain(|_, (weak, _)| weak.strong_count() > 0);
    }
}

/// SHA-256 of the canonical JSON form of `value`: object keys sorted, no whitespace.
pub fn calculate_object_hash(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical(value).to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonical(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn hash_ignores_key_order() {
        let a = json!({ "a": 1, "b": { "c": [1, 2], "d": null } });
        let b = json!({ "b": { "d": null, "c": [1, 2] }, "a": 1 });
        assert_eq!(calculate_object_hash(&a), calculate_object_hash(&b));
        assert_ne!(
            calculate_object_hash(&a),
            calculate_object_hash(&json!({ "a": 2 }))
        );
        assert_eq!(calculate_object_hash(&a).len(), 64);
    }

    #[test]
    fn identity_not_equality() {
        let mut cache = IdentityCache::<usize>::default();
        let mut calls = 0;
        let first = Arc::new(json!({ "type": "string" }));
        let twin = Arc::new(json!({ "type": "string" }));

        for key in [&first, &first, &twin] {
            let _ = cache.get_or_try_insert::<()>(key, |_| {
                calls += 1;
                Ok(calls)
            });
        }
        assert_eq!(calls, 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn dropped_keys_are_evicted() {
        let mut cache = IdentityCache::<u8>::default();
        let key = Arc::new(json!(1));
        cache.get_or_try_insert::<()>(&key, |_| Ok(1)).unwrap();
        assert_eq!(cache.len(), 1);
        drop(key);
        assert!(cache.is_empty());
        cache.evict_dropped();
        assert!(cache.entries.is_empty());
    }

    #[test]
    fn errors_are_not_cached() {
        let mut cache = IdentityCache::<u8>::default();
        let key = Arc::new(json!(1));
        assert!(cache.get_or_try_insert(&key, |_| Err("boom")).is_err());
        assert_eq!(cache.get_or_try_insert::<()>(&key, |_| Ok(7)), Ok(7));
    }
}
