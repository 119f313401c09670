//! The `Container` struct: a per-scope view over a `Registry`.

use crate::core::{spawn_detached, AnyService, Callback, Provider, ResolutionGuard, ServiceKey};
use crate::error::{Error, Result};
use crate::registry::Registry;
use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// A container resolves services for one unit of work.
///
/// Instances are cached for the container's lifetime, so two lookups of the
/// same type return the same `Arc`. Cleanups queued by factories run when the
/// container is closed. `Container` is a cheap handle: clones share the same
/// cache and cleanup stack.
#[derive(Clone)]
pub struct Container {
  inner: Arc<ContainerInner>,
}

struct ContainerInner {
  registry: Arc<Registry>,
  instances: Mutex<HashMap<TypeId, AnyService>>,
  cleanups: Mutex<Vec<(&'static str, Callback)>>,
  closed: AtomicBool,
}

impl Container {
  /// Opens a new container over `registry`.
  pub fn new(registry: Arc<Registry>) -> Self {
    debug!("container opened");
    Self {
      inner: Arc::new(ContainerInner {
        registry,
        instances: Mutex::new(HashMap::new()),
        cleanups: Mutex::new(Vec::new()),
        closed: AtomicBool::new(false),
      }),
    }
  }

  /// The registry this container resolves from.
  pub fn registry(&self) -> &Arc<Registry> {
    &self.inner.registry
  }

  /// Returns `true` if the backing registry knows `T`.
  pub fn contains<T: ?Sized + Any>(&self) -> bool {
    self.inner.registry.contains::<T>()
  }

  /// Resolves a service by type.
  ///
  /// The first lookup builds the instance (or takes the registered value) and
  /// caches it in this container.
  pub fn get<T: Any + Send + Sync>(&self) -> Result<Arc<T>> {
    let key = ServiceKey::of::<T>();
    if self.is_closed() {
      return Err(Error::Closed);
    }

    // The lock is released before any factory runs, factories may call `get`.
    let cached = self.inner.instances.lock().get(&key.type_id).cloned();
    if let Some(instance) = cached {
      return downcast(instance, key);
    }

    let owner = Arc::as_ptr(&self.inner) as usize;
    let _guard = ResolutionGuard::enter(owner, key)?;
    let provider = self
      .inner
      .registry
      .provider(&key)
      .ok_or(Error::ServiceNotFound {
        type_name: key.type_name,
      })?;

    let instance = match provider {
      Provider::Value(instance) => instance,
      Provider::Factory { factory, cleanup } => {
        let instance = factory(self).map_err(|source| match source.downcast::<Error>() {
          Ok(nested) => *nested,
          Err(source) => Error::Factory {
            type_name: key.type_name,
            source,
          },
        })?;
        if let Some(cleanup) = cleanup {
          let queued = instance.clone();
          let callback: Callback = Box::new(move || cleanup(queued));
          let mut cleanups = self.inner.cleanups.lock();
          // `close` flips the flag under this lock, so a late push would never run.
          if self.is_closed() {
            drop(cleanups);
            spawn_detached("closed container", vec![(key.type_name, callback)]);
            return Err(Error::Closed);
          }
          cleanups.push((key.type_name, callback));
        }
        instance
      }
    };

    let instance = self
      .inner
      .instances
      .lock()
      .entry(key.type_id)
      .or_insert(instance)
      .clone();
    downcast(instance, key)
  }

  /// Returns `true` once `close` has started.
  pub fn is_closed(&self) -> bool {
    self.inner.closed.load(Ordering::Acquire)
  }

  /// Closes the container.
  ///
  /// Runs queued cleanups in reverse order and drops cached instances.
  /// Closing twice is a no-op. A container whose last handle is dropped
  /// without being closed spawns its cleanups on the current tokio runtime.
  pub async fn close(&self) {
    let cleanups = {
      let mut cleanups = self.inner.cleanups.lock();
      if self.inner.closed.swap(true, Ordering::AcqRel) {
        return;
      }
      std::mem::take(&mut *cleanups)
    };
    for (service, cleanup) in cleanups.into_iter().rev() {
      debug!(service, "running cleanup");
      cleanup().await;
    }
    self.inner.instances.lock().clear();
    debug!("container closed");
  }
}

impl fmt::Debug for Container {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Container")
      .field("instances", &self.inner.instances.lock().len())
      .field("pending_cleanups", &self.inner.cleanups.lock().len())
      .field("closed", &self.is_closed())
      .finish_non_exhaustive()
  }
}

impl Drop for ContainerInner {
  // A container dropped without `close` (a cancelled or panicking scope) still
  // releases what it built.
  fn drop(&mut self) {
    let pending = std::mem::take(self.cleanups.get_mut());
    if !pending.is_empty() {
      debug!(pending = pending.len(), "container dropped without close, releasing in background");
    }
    spawn_detached("dropped container", pending);
  }
}

fn downcast<T: Any + Send + Sync>(instance: AnyService, key: ServiceKey) -> Result<Arc<T>> {
  instance.downcast::<T>().map_err(|_| Error::ServiceNotFound {
    type_name: key.type_name,
  })
}
