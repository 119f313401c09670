//! The plugin wiring a registry into the application lifecycle.

use crate::config::{RegistrySource, SvcsPluginConfig};
use crate::error::{Result, SvcsError};
use fibre_host::{
  App, AppConfig, BoxError, HostError, InitPlugin, LifecycleHook, Provide, Provided, Scope, State,
  TypeName,
};
use fibre_ioc::{Container, Registry};
use futures_util::FutureExt;
use once_cell::sync::OnceCell;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, info};

/// The dependency key the registry itself is injected under.
pub const REGISTRY_DEPENDENCY_KEY: &str = "svcs_registry";

const STARTUP_HOOK: &str = "svcs_startup";
const SHUTDOWN_HOOK: &str = "svcs_shutdown";

/// Integrates a [`Registry`] with an [`App`].
///
/// Register it with [`AppConfig::plugin`]. `SvcsPlugin` is a cheap handle, keep
/// a clone around to reach the registry from outside the dependency system,
/// e.g. with [`SvcsPlugin::get_container`].
#[derive(Clone)]
pub struct SvcsPlugin {
  inner: Arc<PluginInner>,
}

struct PluginInner {
  config: SvcsPluginConfig,
  registry: OnceCell<Arc<Registry>>,
}

impl SvcsPlugin {
  pub fn new(config: SvcsPluginConfig) -> Self {
    Self {
      inner: Arc::new(PluginInner {
        config,
        registry: OnceCell::new(),
      }),
    }
  }

  pub fn config(&self) -> &SvcsPluginConfig {
    &self.inner.config
  }

  /// The registry, once the application has started.
  ///
  /// Fails with [`SvcsError::NotReady`] before the startup hook ran.
  pub fn registry(&self) -> Result<Arc<Registry>> {
    self.inner.registry.get().cloned().ok_or(SvcsError::NotReady)
  }

  /// Runs `work` with a fresh container and closes the container afterwards.
  ///
  /// For places the dependency system does not reach, such as middleware. A
  /// panic in `work` resumes after the container is closed. If the returned
  /// future is dropped early, the container's cleanups are spawned on the
  /// current tokio runtime once its last handle goes away.
  pub async fn get_container<F, Fut, R>(&self, work: F) -> Result<R>
  where
    F: FnOnce(Container) -> Fut,
    Fut: Future<Output = R>,
  {
    let container = Container::new(self.registry()?);
    let outcome = AssertUnwindSafe(work(container.clone())).catch_unwind().await;
    container.close().await;
    match outcome {
      Ok(outcome) => Ok(outcome),
      Err(panic) => std::panic::resume_unwind(panic),
    }
  }

  fn provide_registry(&self, state: &State) -> Result<Arc<Registry>> {
    let key = self.inner.config.registry_state_key();
    state
      .get::<Registry>(key)
      .ok_or_else(|| SvcsError::RegistryMissing {
        key: key.to_owned(),
      })
  }

  async fn on_app_startup(&self, app: &App) -> Result<()> {
    let registry = match self.inner.config.source() {
      RegistrySource::Fixed(registry) => registry.clone(),
      RegistrySource::Factory(factory) => {
        debug!(asynchronous = factory.is_async(), "building svcs registry");
        Arc::new(factory.produce().await.map_err(SvcsError::Factory)?)
      }
    };

    self.inner.registry.set(registry.clone()).map_err(|_| {
      HostError::ImproperlyConfigured("the svcs plugin has already been started".to_string())
    })?;
    let key = self.inner.config.registry_state_key();
    app.state().insert(key, registry.clone());
    info!(state_key = key, services = registry.len(), "svcs registry ready");
    Ok(())
  }

  async fn on_app_shutdown(&self, app: &App) -> Result<()> {
    let registry = self.provide_registry(app.state())?;
    registry.close().await;
    info!("svcs registry closed");
    Ok(())
  }
}

async fn provide_container(scope: Scope) -> std::result::Result<Provided, BoxError> {
  let registry = scope.resolve::<Registry>(REGISTRY_DEPENDENCY_KEY).await?;
  let container = Container::new(registry);
  let release = container.clone();
  Ok(Provided::scoped(Arc::new(container), move || async move {
    release.close().await;
  }))
}

impl InitPlugin for SvcsPlugin {
  fn on_app_init(&self, mut config: AppConfig) -> std::result::Result<AppConfig, HostError> {
    let container_key = self.inner.config.container_dependency_key();
    if container_key == REGISTRY_DEPENDENCY_KEY {
      return Err(HostError::ImproperlyConfigured(format!(
        "`container_dependency_key` must differ from `{REGISTRY_DEPENDENCY_KEY}`"
      )));
    }
    for key in [container_key, REGISTRY_DEPENDENCY_KEY] {
      if config.dependencies.contains_key(key) {
        return Err(HostError::ImproperlyConfigured(format!(
          "dependency key `{key}` is already registered"
        )));
      }
    }

    let plugin = self.clone();
    config.dependencies.insert(
      REGISTRY_DEPENDENCY_KEY.to_string(),
      Provide::sync(move |scope| {
        plugin
          .provide_registry(scope.state())
          .map(Provided::value)
          .map_err(BoxError::from)
      })
      .use_cache(true),
    );
    config
      .dependencies
      .insert(container_key.to_string(), Provide::new(provide_container));

    let plugin = self.clone();
    config.on_startup.insert(
      0,
      LifecycleHook::new(STARTUP_HOOK, move |app| {
        let plugin = plugin.clone();
        async move { plugin.on_app_startup(&app).await.map_err(BoxError::from) }
      }),
    );
    let plugin = self.clone();
    config.on_shutdown.push(LifecycleHook::new(SHUTDOWN_HOOK, move |app| {
      let plugin = plugin.clone();
      async move { plugin.on_app_shutdown(&app).await.map_err(BoxError::from) }
    }));

    config
      .signature_namespace
      .insert("Container".to_string(), TypeName::of::<Container>());
    config
      .signature_namespace
      .insert("Registry".to_string(), TypeName::of::<Registry>());

    debug!(container_key, "svcs plugin registered");
    Ok(config)
  }
}

impl fmt::Debug for SvcsPlugin {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SvcsPlugin")
      .field("config", &self.inner.config)
      .field("started", &self.inner.registry.get().is_some())
      .finish()
  }
}
