//! Per-stage maps from locator to realized artifact.

use crate::locator::Locator;
use std::{
    collections::HashMap,
    fmt::{self, Formatter, Display},
};


/// A lookup for a locator that hasn't been cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotInCache {
    pub locator: Locator,
}

impl Display for NotInCache {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "image not in cache: {}", self.locator)
    }
}

impl std::error::Error for NotInCache {}


/// Grows until flushed. Entries are never evicted individually.
#[derive(Debug, Clone)]
pub struct Cache<T> {
    entries: HashMap<Locator, T>,
}

impl<T> Cache<T> {
    pub fn new() -> Self {
        Cache {
            entries: HashMap::new(),
        }
    }

    pub fn in_cache(&self, locator: &Locator) -> bool {
        self.entries.contains_key(locator)
    }

    pub fn locate_in_cache(&self, locator: &Locator) -> Result<&T, NotInCache> {
        self.entries
            .get(locator)
            .ok_or_else(|| NotInCache {
                locator: locator.clone(),
            })
    }

    /// Get the entry, inserting a default value if there is none.
    pub fn access_in_cache(&mut self, locator: &Locator) -> &mut T
    where
        T: Default,
    {
        self.entries
            .entry(locator.clone())
            .or_default()
    }

    /// Insert or overwrite.
    pub fn add_to_cache(&mut self, locator: &Locator, value: T) {
        self.entries.insert(locator.clone(), value);
    }

    pub fn flush(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Default for Cache<T> {
    fn default() -> Self {
        Self::new()
    }
}


#[test]
fn test_flush_forgets_everything() {
    let mut cache = Cache::new();
    let keys = ["a.png", "b.png~GS()", "c.png~FL()"]
        .map(Locator::new);
    for (i, key) in keys.iter().enumerate() {
        cache.add_to_cache(key, i);
    }
    assert_eq!(cache.len(), 3);
    assert_eq!(cache.locate_in_cache(&keys[1]), Ok(&1));
    cache.flush();
    for key in &keys {
        assert!(!cache.in_cache(key));
    }
    assert!(cache.is_empty());
}

#[test]
fn test_locate_miss_and_access_default() {
    let mut cache: Cache<Vec<u32>> = Cache::new();
    let key = Locator::new("a.png");
    assert_eq!(
        cache.locate_in_cache(&key),
        Err(NotInCache { locator: key.clone() }),
    );
    cache.access_in_cache(&key).push(7);
    cache.access_in_cache(&key).push(8);
    assert_eq!(cache.locate_in_cache(&key).map(|v| v.len()), Ok(2));
}
