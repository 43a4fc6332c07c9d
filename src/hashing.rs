//! This module provides a deterministic hasher and `HashMap` and `HashSet` variants that use
//! it. The hashing data structures in the standard library are randomly seeded, which would make
//! any iteration over them differ from run to run.
//!
//! `HashMap<K, V, S>` does not have a `new` method for a custom hasher. Use `HashMap::default()`
//! instead, or bring the `HashMapExt` / `HashSetExt` traits into scope.
//!
//! The `hash_str` free function is used in `crate::random` to derive per-stream seeds.

use xxhash_rust::xxh3::xxh3_64;

pub use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};

/// Provides `HashMap::new()` for the deterministic map.
pub trait HashMapExt {
    fn new() -> Self;
}

impl<K, V> HashMapExt for HashMap<K, V> {
    fn new() -> Self {
        HashMap::default()
    }
}

/// Provides `HashSet::new()` for the deterministic set.
pub trait HashSetExt {
    fn new() -> Self;
}

impl<T> HashSetExt for HashSet<T> {
    fn new() -> Self {
        HashSet::default()
    }
}

/// A convenience method to compute the hash of a `&str`. Stable across platforms and runs.
pub fn hash_str(data: &str) -> u64 {
    xxh3_64(data.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_strings() {
        let a = hash_str("hello");
        let b = hash_str("hello");
        let c = hash_str("world");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn map_ext_new() {
        let mut map: HashMap<u32, &str> = HashMap::new();
        map.insert(1, "one");
        assert_eq!(map.get(&1), Some(&"one"));
        let mut set: HashSet<u32> = HashSet::new();
        assert!(set.insert(3));
        assert!(!set.insert(3));
    }
}
