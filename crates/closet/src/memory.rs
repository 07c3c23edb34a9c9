use std::any::Any;
use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

type Value = Box<dyn Any + Send + Sync>;

/// Store that filters use to remember values between tags, passes and (when
/// the caller opts in) render calls.
///
/// Cloning the handle shares the underlying map, so one store can back several
/// filter managers, including ones rendering on other threads.
#[derive(Clone, Default)]
pub struct Memory(Arc<DashMap<String, Value>>);

impl Memory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Returns a copy of the value under `key` if it holds a `T`.
    #[must_use]
    pub fn get<T: Any + Clone>(&self, key: &str) -> Option<T> {
        self.0
            .get(key)
            .and_then(|value| value.downcast_ref::<T>().cloned())
    }

    /// Stores `value`, returning whether something was replaced.
    pub fn insert<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) -> bool {
        self.0.insert(key.into(), Box::new(value)).is_some()
    }

    pub fn remove(&self, key: &str) -> bool {
        self.0.remove(key).is_some()
    }

    /// Returns the `T` under `key`, storing the result of `init` first if the
    /// key is missing or holds another type. `init` runs without any lock held,
    /// so it may use the store itself.
    pub fn fetch_or_insert_with<T, F>(&self, key: impl Into<String>, init: F) -> T
    where
        T: Any + Clone + Send + Sync,
        F: FnOnce() -> T,
    {
        let key = key.into();
        if let Some(value) = self.get::<T>(&key) {
            return value;
        }

        let value = init();
        match self.0.entry(key) {
            Entry::Occupied(mut entry) => {
                if let Some(stored) = entry.get().downcast_ref::<T>() {
                    return stored.clone();
                }
                entry.insert(Box::new(value.clone()));
            }
            Entry::Vacant(entry) => {
                entry.insert(Box::new(value.clone()));
            }
        }
        value
    }

    pub fn clear(&self) {
        self.0.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether both handles point at the same store.
    #[must_use]
    pub fn shares(&self, other: &Memory) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memory").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_access() {
        let memory = Memory::new();
        assert!(!memory.insert("count", 3_usize));
        assert!(memory.has("count"));
        assert_eq!(memory.get::<usize>("count"), Some(3));
        assert_eq!(memory.get::<String>("count"), None);
        assert_eq!(memory.get::<usize>("missing"), None);
    }

    #[test]
    fn test_fetch_or_insert_with() {
        let memory = Memory::new();
        let first = memory.fetch_or_insert_with("list", || vec!["a".to_string()]);
        let second = memory.fetch_or_insert_with("list", || vec!["b".to_string()]);
        assert_eq!(first, second);
        assert_eq!(memory.len(), 1);
    }

    #[test]
    fn test_fetch_init_can_use_the_store() {
        let memory = Memory::new();
        memory.insert("a", 1_u8);
        let handle = memory.clone();
        let next = memory.fetch_or_insert_with("next_id", || handle.len());
        assert_eq!(next, 1);
        assert_eq!(memory.get::<usize>("next_id"), Some(1));
    }

    #[test]
    fn test_fetch_replaces_other_type() {
        let memory = Memory::new();
        memory.insert("k", "text".to_string());
        assert_eq!(memory.fetch_or_insert_with("k", || 7_u32), 7);
        assert_eq!(memory.get::<u32>("k"), Some(7));
    }

    #[test]
    fn test_clones_share_storage() {
        let memory = Memory::new();
        let handle = memory.clone();
        handle.insert("x", 1_i32);
        assert_eq!(memory.get::<i32>("x"), Some(1));
        assert!(memory.shares(&handle));
        assert!(!memory.shares(&Memory::new()));

        assert!(memory.remove("x"));
        assert!(handle.is_empty());
        memory.insert("y", 2_i32);
        handle.clear();
        assert!(memory.is_empty());
    }
}
