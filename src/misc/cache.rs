use lru::LruCache;
use std::cell::RefCell;
use std::num::NonZeroUsize;

/// Exact key built from the bit patterns of a sequence of floats.
///
/// Two keys are equal only when every value is bitwise identical, so a
/// hyperparameter vector that moved by one ulp is a cache miss.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey(Vec<u64>);

impl CacheKey {
    /// Build a key from the given values, in order
    pub fn new<I>(values: I) -> Self
    where
        I: IntoIterator<Item = f64>,
    {
        CacheKey(values.into_iter().map(f64::to_bits).collect())
    }
}

impl From<&[f64]> for CacheKey {
    fn from(values: &[f64]) -> Self {
        Self::new(values.iter().copied())
    }
}

/// Memo holding at most one entry.
///
/// Putting a new key evicts whatever was stored before. Lookups and inserts
/// are separate operations, so the cache must not be shared between threads
/// without external synchronization (it is `Send` but not `Sync`).
#[derive(Debug)]
pub struct SingleEntryCache<V> {
    entry: RefCell<LruCache<CacheKey, V>>,
}

impl<V: Clone> SingleEntryCache<V> {
    pub fn new() -> Self {
        Self {
            entry: RefCell::new(LruCache::new(NonZeroUsize::MIN)),
        }
    }

    /// Return a clone of the cached value if `key` matches the stored key
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        self.entry.borrow_mut().get(key).cloned()
    }

    /// Store `value` under `key`, dropping any previous entry
    pub fn put(&self, key: CacheKey, value: V) {
        let mut entry = self.entry.borrow_mut();
        entry.clear();
        entry.put(key, value);
    }

    /// Return the cached value for `key`, computing and storing it on a miss
    pub fn get_or_try_insert_with<F, E>(&self, key: CacheKey, f: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let value = f()?;
        self.put(key, value.clone());
        Ok(value)
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entry.borrow().contains(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entry.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.entry.borrow_mut().clear();
    }
}

impl<V: Clone> Default for SingleEntryCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

// Cloned engines start cold.
impl<V: Clone> Clone for SingleEntryCache<V> {
    fn clone(&self) -> Self {
        Self::new()
    }
}
