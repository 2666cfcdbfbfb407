//! Hashed names for nodes and metadata facts.

use lazy_static::lazy_static;
use std::{
    cmp,
    collections::HashMap,
    fmt,
    hash::{Hash, Hasher},
    sync::Mutex,
};

/// A 64-bit FNV-1a hash of a name.
///
/// The hash remembers the name it was computed from, either directly (for
/// string literals) or through a global registry (for owned strings), so that
/// diagnostics can print the original name.
#[derive(Copy, Clone, Debug)]
pub struct StringHash {
    string_hash: u64,
    string: Option<&'static str>,
}

lazy_static! {
    static ref NAME_REGISTRY: Mutex<HashMap<u64, String>> = Mutex::new(HashMap::new());
}

impl StringHash {
    /// Creates a hash of the given string literal. This method
    /// is evaluated at compile time.
    pub const fn of_literal(string: &'static str) -> Self {
        Self {
            string_hash: Self::compute_hash(string),
            string: Some(string),
        }
    }

    /// Creates a hash of the given [`String`] and records the string in the
    /// global name registry.
    ///
    /// # Concurrency
    /// Temporarily acquires the lock on the global registry.
    pub fn of_owned(string: String) -> Self {
        let string_hash = Self::compute_hash(string.as_str());

        if let Ok(mut registry) = NAME_REGISTRY.lock() {
            registry.entry(string_hash).or_insert(string);
        }

        Self {
            string_hash,
            string: None,
        }
    }

    /// Returns the raw 64-bit hash.
    pub const fn raw_hash(&self) -> u64 {
        self.string_hash
    }

    const fn compute_hash(string: &str) -> u64 {
        const_fnv1a_hash::fnv1a_hash_str_64(string)
    }
}

impl fmt::Display for StringHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(string) = self.string {
            return write!(f, "{}", string);
        }
        let registered = NAME_REGISTRY
            .lock()
            .ok()
            .and_then(|registry| registry.get(&self.string_hash).cloned());
        match registered {
            Some(string) => write!(f, "{}", string),
            None => write!(f, "<{:016x}>", self.string_hash),
        }
    }
}

impl PartialEq for StringHash {
    fn eq(&self, other: &Self) -> bool {
        self.string_hash == other.string_hash
    }
}

impl Eq for StringHash {}

impl Ord for StringHash {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        self.string_hash.cmp(&other.string_hash)
    }
}

impl PartialOrd for StringHash {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Hash for StringHash {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.string_hash.hash(state);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hash_remembers_string_literal() {
        let hash = StringHash::of_literal("has_billboard");
        assert_eq!(hash.to_string(), "has_billboard");
    }

    #[test]
    fn hash_remembers_owned_string() {
        let hash = StringHash::of_owned("follow_emitter".to_string());
        assert_eq!(hash.to_string(), "follow_emitter");
    }

    #[test]
    fn literal_and_owned_hashes_of_same_name_are_equal() {
        assert_eq!(
            StringHash::of_literal("uv"),
            StringHash::of_owned("uv".to_string())
        );
    }
}
