//! Typed, lazy pointers to stored values.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use arbor_types::ContentHash;

use crate::cache::ObjectCache;
use crate::error::StoreResult;
use crate::object::StoredValue;

/// A content hash that knows the type of the value it addresses.
///
/// A `HashRef` owns no data. Resolving it fetches and decodes the value
/// through an [`ObjectCache`], so repeated resolution of the same hash in one
/// session costs nothing. Equality and hashing look at the content hash only.
/// On the wire a `HashRef` is just the hex hash.
pub struct HashRef<T> {
    hash: ContentHash,
    _value: PhantomData<fn() -> T>,
}

impl<T> HashRef<T> {
    pub const fn new(hash: ContentHash) -> Self {
        Self {
            hash,
            _value: PhantomData,
        }
    }

    pub fn hash(&self) -> ContentHash {
        self.hash
    }
}

impl<T: StoredValue> HashRef<T> {
    /// Store `value` and return a reference to it.
    pub fn write(value: T, cache: &ObjectCache) -> StoreResult<Self> {
        cache.put(value).map(Self::new)
    }

    /// The reference `value` would get if it were stored.
    pub fn of(value: &T) -> StoreResult<Self> {
        value.content_hash().map(Self::new)
    }

    /// Fetch and decode the value. A missing value is an error.
    pub fn resolve(&self, cache: &ObjectCache) -> StoreResult<Arc<T>> {
        cache.require(&self.hash)
    }

    /// Fetch and decode the value, or `None` if the store lacks it.
    pub fn try_resolve(&self, cache: &ObjectCache) -> StoreResult<Option<Arc<T>>> {
        cache.get(&self.hash)
    }
}

impl<T> Clone for HashRef<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for HashRef<T> {}

impl<T> PartialEq for HashRef<T> {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl<T> Eq for HashRef<T> {}

impl<T> Hash for HashRef<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

impl<T> fmt::Debug for HashRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HashRef({})", self.hash.short_hex())
    }
}

impl<T> fmt::Display for HashRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.hash, f)
    }
}

impl<T> Serialize for HashRef<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.hash.serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for HashRef<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        ContentHash::deserialize(deserializer).map(Self::new)
    }
}
