//! Core, non-public data structures shared by the registry and containers.

use crate::container::Container;
use crate::error::{BoxError, Error, Result};
use futures_util::future::BoxFuture;
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

thread_local! {
  // The (container, service) pairs currently being built on this thread.
  static RESOLVING_STACK: RefCell<HashSet<(usize, TypeId)>> = RefCell::new(HashSet::new());
}

/// An RAII guard to detect circular dependencies.
///
/// Entering adds the `(owner, key)` pair to the thread-local resolution stack
/// and fails if it is already there. `owner` identifies the container, so a
/// factory may look the same type up in another container. Dropping the guard
/// removes the pair again.
pub(crate) struct ResolutionGuard {
  entry: (usize, TypeId),
}

impl ResolutionGuard {
  pub(crate) fn enter(owner: usize, key: ServiceKey) -> Result<Self> {
    let entry = (owner, key.type_id);
    let inserted = RESOLVING_STACK.with(|stack| stack.borrow_mut().insert(entry));
    if !inserted {
      return Err(Error::CircularDependency {
        type_name: key.type_name,
      });
    }
    Ok(Self { entry })
  }
}

impl Drop for ResolutionGuard {
  fn drop(&mut self) {
    RESOLVING_STACK.with(|stack| {
      stack.borrow_mut().remove(&self.entry);
    });
  }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ServiceKey {
  pub(crate) type_id: TypeId,
  pub(crate) type_name: &'static str,
}

impl ServiceKey {
  pub(crate) fn of<T: ?Sized + Any>() -> Self {
    Self {
      type_id: TypeId::of::<T>(),
      type_name: std::any::type_name::<T>(),
    }
  }
}

impl fmt::Debug for ServiceKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Key({})", self.type_name)
  }
}

pub(crate) type AnyService = Arc<dyn Any + Send + Sync>;

/// A deferred async action, run exactly once.
pub(crate) type Callback = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

pub(crate) type FactoryFn =
  Arc<dyn Fn(&Container) -> std::result::Result<AnyService, BoxError> + Send + Sync>;
pub(crate) type CleanupFn = Arc<dyn Fn(AnyService) -> BoxFuture<'static, ()> + Send + Sync>;

/// Runs callbacks that missed their owner's `close`, newest first.
///
/// They are spawned on the current tokio runtime. Outside a runtime they are
/// dropped and a warning is logged.
pub(crate) fn spawn_detached(what: &'static str, callbacks: Vec<(&'static str, Callback)>) {
  if callbacks.is_empty() {
    return;
  }
  match tokio::runtime::Handle::try_current() {
    Ok(handle) => {
      handle.spawn(async move {
        for (_, callback) in callbacks.into_iter().rev() {
          callback().await;
        }
      });
    }
    Err(_) => {
      let pending: Vec<&'static str> = callbacks.iter().map(|(name, _)| *name).collect();
      warn!(what, ?pending, "no async runtime available, cleanups were skipped");
    }
  }
}

#[derive(Clone)]
pub(crate) enum Provider {
  Value(AnyService),
  Factory {
    factory: FactoryFn,
    cleanup: Option<CleanupFn>,
  },
}

impl Provider {
  pub(crate) fn kind(&self) -> &'static str {
    match self {
      Provider::Value(_) => "value",
      Provider::Factory { cleanup: None, .. } => "factory",
      Provider::Factory {
        cleanup: Some(_), ..
      } => "factory+cleanup",
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn guard_rejects_reentry_until_dropped() {
    let key = ServiceKey::of::<u8>();
    let guard = ResolutionGuard::enter(1, key).unwrap();
    assert!(matches!(
      ResolutionGuard::enter(1, key),
      Err(Error::CircularDependency { .. })
    ));
    drop(guard);
    assert!(ResolutionGuard::enter(1, key).is_ok());
  }

  #[test]
  fn guard_is_scoped_to_its_owner() {
    let key = ServiceKey::of::<u16>();
    let _outer = ResolutionGuard::enter(1, key).unwrap();
    assert!(ResolutionGuard::enter(2, key).is_ok());
  }
}
