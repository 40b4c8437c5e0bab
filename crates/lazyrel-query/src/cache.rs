//! Statement fingerprints.
//!
//! Two base queries that render to the same SQL with the same bound values
//! share a fingerprint, which is how a batch scope finds the registry that
//! already owns a relationship/query lineage.

use lazyrel_core::{KeyValue, Value};
use std::hash::{Hash, Hasher};

/// Compute a hash key from any hashable value.
pub fn cache_key(value: &impl Hash) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Fingerprint a rendered statement together with its parameters.
pub fn fingerprint(sql: &str, params: &[Value]) -> u64 {
    let keys: Vec<KeyValue> = params.iter().map(Value::key).collect();
    cache_key(&(sql, keys))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_function() {
        let key1 = cache_key(&"SELECT * FROM posts");
        let key2 = cache_key(&"SELECT * FROM posts");
        let key3 = cache_key(&"SELECT * FROM comments");

        assert_eq!(key1, key2);
        assert_ne!(key1, key3);
    }

    #[test]
    fn test_fingerprint_includes_params() {
        let sql = "SELECT * FROM posts WHERE \"published\" = $1";
        let a = fingerprint(sql, &[Value::Bool(true)]);
        let b = fingerprint(sql, &[Value::Bool(true)]);
        let c = fingerprint(sql, &[Value::Bool(false)]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
