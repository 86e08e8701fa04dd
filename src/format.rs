//! Formatter Module
//!
//! Codec between the mirror's domain key/value types and the string wire
//! representation used by the backing store.

use std::fmt::Display;
use std::hash::Hash;
use std::marker::PhantomData;
use std::str::FromStr;

use crate::error::{MirrorError, Result};

// == Formatter Trait ==
/// Bidirectional, stateless codec for keys and values.
///
/// Decoding is fallible: a key the formatter cannot parse is reported as
/// [`MirrorError::InvalidKey`], a value as [`MirrorError::Decode`]. Either
/// rejects the operation that carried it.
pub trait Formatter: Send + Sync + 'static {
    /// Domain key type held by the store
    type Key: Eq + Hash + Clone + Send + Sync + 'static;
    /// Domain value type held by the store
    type Value: Clone + Send + Sync + 'static;

    /// Decodes a wire key.
    fn to_key(&self, wire: &str) -> Result<Self::Key>;

    /// Encodes a domain key for the wire.
    fn from_key(&self, key: &Self::Key) -> String;

    /// Decodes a wire value.
    fn to_value(&self, wire: &str) -> Result<Self::Value>;

    /// Encodes a domain value for the wire.
    fn from_value(&self, value: &Self::Value) -> String;
}

// == Identity Formatter ==
/// Default formatter: keys and values are the wire strings themselves.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityFormatter;

impl Formatter for IdentityFormatter {
    type Key = String;
    type Value = String;

    fn to_key(&self, wire: &str) -> Result<String> {
        Ok(wire.to_string())
    }

    fn from_key(&self, key: &String) -> String {
        key.clone()
    }

    fn to_value(&self, wire: &str) -> Result<String> {
        Ok(wire.to_string())
    }

    fn from_value(&self, value: &String) -> String {
        value.clone()
    }
}

// == Parse Formatter ==
/// Formatter for typed mirrors, backed by `FromStr` and `Display`.
///
/// ```
/// use redis_mirror::format::{Formatter, ParseFormatter};
///
/// let formatter = ParseFormatter::<String, i64>::new();
/// assert_eq!(formatter.to_value("42").unwrap(), 42);
/// assert!(formatter.to_value("forty-two").is_err());
/// ```
pub struct ParseFormatter<K, V> {
    _types: PhantomData<fn() -> (K, V)>,
}

impl<K, V> ParseFormatter<K, V> {
    pub fn new() -> Self {
        Self {
            _types: PhantomData,
        }
    }
}

impl<K, V> Default for ParseFormatter<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Clone for ParseFormatter<K, V> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<K, V> Formatter for ParseFormatter<K, V>
where
    K: FromStr + Display + Eq + Hash + Clone + Send + Sync + 'static,
    K::Err: Display,
    V: FromStr + Display + Clone + Send + Sync + 'static,
    V::Err: Display,
{
    type Key = K;
    type Value = V;

    fn to_key(&self, wire: &str) -> Result<K> {
        wire.parse().map_err(|e: K::Err| MirrorError::invalid_key(wire, e))
    }

    fn from_key(&self, key: &K) -> String {
        key.to_string()
    }

    fn to_value(&self, wire: &str) -> Result<V> {
        wire.parse().map_err(|e: V::Err| MirrorError::decode(wire, e))
    }

    fn from_value(&self, value: &V) -> String {
        value.to_string()
    }
}
