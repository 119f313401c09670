//! The `Registry` struct: long-lived service registrations.

use crate::container::Container;
use crate::core::{AnyService, Callback, CleanupFn, FactoryFn, Provider, ServiceKey};
use crate::error::BoxError;
use dashmap::DashMap;
use futures_util::FutureExt;
use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

/// A registry of services, keyed by type.
///
/// A registry only knows how to obtain services. Instances live in the
/// [`Container`]s opened from it. Registration takes `&self`, so a registry can
/// be shared as `Arc<Registry>` and extended at any point before it is closed.
#[derive(Default)]
pub struct Registry {
  providers: DashMap<TypeId, (ServiceKey, Provider)>,
  on_close: Mutex<Vec<(String, Callback)>>,
}

impl Registry {
  /// Creates a new, empty `Registry`.
  pub fn new() -> Self {
    Self::default()
  }

  fn insert(&self, key: ServiceKey, provider: Provider) {
    let kind = provider.kind();
    let replaced = self.providers.insert(key.type_id, (key, provider)).is_some();
    debug!(service = key.type_name, kind, replaced, "registered service");
  }

  // --- Registration ---

  /// Registers a fixed value. Every container returns the same `Arc<T>`.
  pub fn register_value<T: Any + Send + Sync>(&self, value: T) {
    let instance: AnyService = Arc::new(value);
    self.insert(ServiceKey::of::<T>(), Provider::Value(instance));
  }

  /// Registers a factory, called at most once per container.
  ///
  /// The factory receives the container it builds for and may resolve other
  /// services from it. Errors from nested lookups propagate with `?`.
  pub fn register_factory<T, F>(&self, factory: F)
  where
    T: Any + Send + Sync,
    F: Fn(&Container) -> Result<T, BoxError> + Send + Sync + 'static,
  {
    self.insert(
      ServiceKey::of::<T>(),
      Provider::Factory {
        factory: erase_factory(factory),
        cleanup: None,
      },
    );
  }

  /// Registers a factory whose instances must be released when the owning
  /// container closes.
  pub fn register_factory_with_cleanup<T, F, C, Fut>(&self, factory: F, cleanup: C)
  where
    T: Any + Send + Sync,
    F: Fn(&Container) -> Result<T, BoxError> + Send + Sync + 'static,
    C: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
  {
    let cleanup: CleanupFn = Arc::new(move |instance: AnyService| match instance.downcast::<T>() {
      Ok(instance) => cleanup(instance).boxed(),
      Err(_) => async {}.boxed(),
    });
    self.insert(
      ServiceKey::of::<T>(),
      Provider::Factory {
        factory: erase_factory(factory),
        cleanup: Some(cleanup),
      },
    );
  }

  /// Registers a callback awaited when the registry is closed.
  ///
  /// Use it to release resources the registry's services share, such as a
  /// connection pool handed out by a factory.
  pub fn on_close<F, Fut>(&self, name: impl Into<String>, callback: F)
  where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
  {
    let name = name.into();
    debug!(callback = %name, "registered on_close callback");
    let boxed: Callback = Box::new(move || callback().boxed());
    self.on_close.lock().push((name, boxed));
  }

  // --- Inspection ---

  /// Returns `true` if a service is registered for `T`.
  pub fn contains<T: ?Sized + Any>(&self) -> bool {
    self.providers.contains_key(&TypeId::of::<T>())
  }

  /// The number of registered services.
  pub fn len(&self) -> usize {
    self.providers.len()
  }

  pub fn is_empty(&self) -> bool {
    self.providers.is_empty()
  }

  pub(crate) fn provider(&self, key: &ServiceKey) -> Option<Provider> {
    self
      .providers
      .get(&key.type_id)
      .map(|entry| entry.value().1.clone())
  }

  // --- Teardown ---

  /// Closes the registry.
  ///
  /// Awaits every `on_close` callback in reverse registration order, then
  /// removes all registrations. Closing twice is a no-op.
  pub async fn close(&self) {
    let callbacks = std::mem::take(&mut *self.on_close.lock());
    for (name, callback) in callbacks.into_iter().rev() {
      debug!(callback = %name, "running on_close callback");
      callback().await;
    }

    let services = self.providers.len();
    self.providers.clear();
    info!(services, "registry closed");
  }
}

impl fmt::Debug for Registry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let services: Vec<&'static str> = self
      .providers
      .iter()
      .map(|entry| entry.value().0.type_name)
      .collect();
    f.debug_struct("Registry")
      .field("services", &services)
      .field("on_close", &self.on_close.lock().len())
      .finish()
  }
}

fn erase_factory<T, F>(factory: F) -> FactoryFn
where
  T: Any + Send + Sync,
  F: Fn(&Container) -> Result<T, BoxError> + Send + Sync + 'static,
{
  Arc::new(move |container: &Container| {
    factory(container).map(|instance| Arc::new(instance) as AnyService)
  })
}
