//! Configuration for the [`SvcsPlugin`](crate::SvcsPlugin).

use fibre_host::{BoxError, HostError};
use fibre_ioc::Registry;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::Deserialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

pub const DEFAULT_CONTAINER_DEPENDENCY_KEY: &str = "svcs_container";
pub const DEFAULT_REGISTRY_STATE_KEY: &str = "svcs_registry";

/// The names the plugin publishes under.
///
/// These are plain data and can be read from a configuration file; missing
/// fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct KeySettings {
  /// The dependency key the container is injected under.
  pub container_dependency_key: String,
  /// The application state key the registry is stored under.
  pub registry_state_key: String,
}

impl Default for KeySettings {
  fn default() -> Self {
    Self {
      container_dependency_key: DEFAULT_CONTAINER_DEPENDENCY_KEY.to_string(),
      registry_state_key: DEFAULT_REGISTRY_STATE_KEY.to_string(),
    }
  }
}

type SyncFactoryFn = Arc<dyn Fn() -> Result<Registry, BoxError> + Send + Sync>;
type AsyncFactoryFn =
  Arc<dyn Fn() -> BoxFuture<'static, Result<Registry, BoxError>> + Send + Sync>;

/// Builds the registry on application startup, synchronously or asynchronously.
#[derive(Clone)]
pub enum RegistryFactory {
  Sync(SyncFactoryFn),
  Async(AsyncFactoryFn),
}

impl RegistryFactory {
  pub fn new<F>(factory: F) -> Self
  where
    F: Fn() -> Result<Registry, BoxError> + Send + Sync + 'static,
  {
    RegistryFactory::Sync(Arc::new(factory))
  }

  pub fn new_async<F, Fut>(factory: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Registry, BoxError>> + Send + 'static,
  {
    RegistryFactory::Async(Arc::new(move || factory().boxed()))
  }

  pub fn is_async(&self) -> bool {
    matches!(self, RegistryFactory::Async(_))
  }

  pub(crate) async fn produce(&self) -> Result<Registry, BoxError> {
    match self {
      RegistryFactory::Sync(factory) => factory(),
      RegistryFactory::Async(factory) => factory().await,
    }
  }
}

impl fmt::Debug for RegistryFactory {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RegistryFactory::Sync(_) => f.write_str("RegistryFactory::Sync"),
      RegistryFactory::Async(_) => f.write_str("RegistryFactory::Async"),
    }
  }
}

/// Where the plugin gets its registry from.
#[derive(Debug, Clone)]
pub enum RegistrySource {
  /// A registry built by the caller, used as is.
  Fixed(Arc<Registry>),
  /// A factory called once, on application startup.
  Factory(RegistryFactory),
}

/// The immutable configuration of a [`SvcsPlugin`](crate::SvcsPlugin).
#[derive(Debug, Clone)]
pub struct SvcsPluginConfig {
  source: RegistrySource,
  keys: KeySettings,
}

impl SvcsPluginConfig {
  pub fn builder() -> SvcsPluginConfigBuilder {
    SvcsPluginConfigBuilder::default()
  }

  /// A config around an existing registry, with default keys.
  pub fn with_registry(registry: impl Into<Arc<Registry>>) -> Self {
    Self {
      source: RegistrySource::Fixed(registry.into()),
      keys: KeySettings::default(),
    }
  }

  /// A config around a registry factory, with default keys.
  pub fn with_factory(factory: RegistryFactory) -> Self {
    Self {
      source: RegistrySource::Factory(factory),
      keys: KeySettings::default(),
    }
  }

  pub fn source(&self) -> &RegistrySource {
    &self.source
  }

  pub fn registry(&self) -> Option<&Arc<Registry>> {
    match &self.source {
      RegistrySource::Fixed(registry) => Some(registry),
      RegistrySource::Factory(_) => None,
    }
  }

  pub fn registry_factory(&self) -> Option<&RegistryFactory> {
    match &self.source {
      RegistrySource::Fixed(_) => None,
      RegistrySource::Factory(factory) => Some(factory),
    }
  }

  pub fn container_dependency_key(&self) -> &str {
    &self.keys.container_dependency_key
  }

  pub fn registry_state_key(&self) -> &str {
    &self.keys.registry_state_key
  }

  pub fn keys(&self) -> &KeySettings {
    &self.keys
  }
}

/// A builder for [`SvcsPluginConfig`].
///
/// Exactly one of `registry` and `registry_factory` must be set before
/// calling `build`.
#[derive(Default)]
pub struct SvcsPluginConfigBuilder {
  registry: Option<Arc<Registry>>,
  registry_factory: Option<RegistryFactory>,
  keys: KeySettings,
}

impl SvcsPluginConfigBuilder {
  pub fn registry(mut self, registry: impl Into<Arc<Registry>>) -> Self {
    self.registry = Some(registry.into());
    self
  }

  pub fn registry_factory(mut self, factory: RegistryFactory) -> Self {
    self.registry_factory = Some(factory);
    self
  }

  pub fn container_dependency_key(mut self, key: impl Into<String>) -> Self {
    self.keys.container_dependency_key = key.into();
    self
  }

  pub fn registry_state_key(mut self, key: impl Into<String>) -> Self {
    self.keys.registry_state_key = key.into();
    self
  }

  /// Replaces both keys, typically with values read from a config file.
  pub fn keys(mut self, keys: KeySettings) -> Self {
    self.keys = keys;
    self
  }

  pub fn build(self) -> Result<SvcsPluginConfig, HostError> {
    let source = match (self.registry, self.registry_factory) {
      (None, None) => {
        return Err(HostError::ImproperlyConfigured(
          "either `registry` or `registry_factory` must be provided".to_string(),
        ))
      }
      (Some(_), Some(_)) => {
        return Err(HostError::ImproperlyConfigured(
          "only one of `registry` and `registry_factory` must be provided".to_string(),
        ))
      }
      (Some(registry), None) => RegistrySource::Fixed(registry),
      (None, Some(factory)) => RegistrySource::Factory(factory),
    };

    for (field, value) in [
      ("container_dependency_key", &self.keys.container_dependency_key),
      ("registry_state_key", &self.keys.registry_state_key),
    ] {
      if value.trim().is_empty() {
        return Err(HostError::ImproperlyConfigured(format!(
          "`{field}` must not be empty"
        )));
      }
    }

    Ok(SvcsPluginConfig {
      source,
      keys: self.keys,
    })
  }
}

impl fmt::Debug for SvcsPluginConfigBuilder {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SvcsPluginConfigBuilder")
      .field("has_registry", &self.registry.is_some())
      .field("registry_factory", &self.registry_factory)
      .field("keys", &self.keys)
      .finish()
  }
}
