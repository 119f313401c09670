//! Shared, string-keyed application state.

use dashmap::DashMap;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

type Value = Arc<dyn Any + Send + Sync>;

/// Application state shared by hooks, providers and handlers.
///
/// Values are stored behind `Arc` and looked up by key and type.
#[derive(Default)]
pub struct State {
  values: DashMap<String, Value>,
}

impl State {
  pub fn new() -> Self {
    Self::default()
  }

  /// Returns the value under `key` if it exists and is a `T`.
  pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
    let value = self.values.get(key)?.value().clone();
    value.downcast::<T>().ok()
  }

  pub fn contains(&self, key: &str) -> bool {
    self.values.contains_key(key)
  }

  /// Inserts a value, returning `true` if a previous value was replaced.
  pub fn insert<T: Any + Send + Sync>(&self, key: impl Into<String>, value: Arc<T>) -> bool {
    self.values.insert(key.into(), value).is_some()
  }

  /// Inserts every entry of `entries`.
  pub fn update<I>(&self, entries: I)
  where
    I: IntoIterator<Item = (String, Value)>,
  {
    for (key, value) in entries {
      self.values.insert(key, value);
    }
  }

  pub fn remove(&self, key: &str) -> bool {
    self.values.remove(key).is_some()
  }

  pub fn len(&self) -> usize {
    self.values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }
}

impl fmt::Debug for State {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let keys: Vec<String> = self.values.iter().map(|e| e.key().clone()).collect();
    f.debug_struct("State").field("keys", &keys).finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn get_checks_key_and_type() {
    let state = State::new();
    assert!(!state.insert("answer", Arc::new(42_u32)));

    assert_eq!(state.get::<u32>("answer").as_deref(), Some(&42));
    assert!(state.get::<String>("answer").is_none());
    assert!(state.get::<u32>("question").is_none());
  }

  #[test]
  fn update_overwrites() {
    let state = State::new();
    state.insert("name", Arc::new("old".to_string()));
    state.update([("name".to_string(), Arc::new("new".to_string()) as Value)]);

    assert_eq!(state.get::<String>("name").as_deref().map(String::as_str), Some("new"));
    assert_eq!(state.len(), 1);
  }
}
