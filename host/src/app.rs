//! The `App` handle, its config and the plugin/lifecycle hook contracts.

use crate::error::{BoxError, HostError, Result};
use crate::provide::Provide;
use crate::scope::Scope;
use crate::state::State;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, info};

/// The lifecycle phase of an [`App`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
  Built,
  Running,
  Stopped,
}

/// A type registered in the app's signature namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeName {
  pub id: TypeId,
  pub name: &'static str,
}

impl TypeName {
  pub fn of<T: ?Sized + Any>() -> Self {
    Self {
      id: TypeId::of::<T>(),
      name: std::any::type_name::<T>(),
    }
  }
}

type HookFn = Arc<dyn Fn(App) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// A named startup or shutdown hook.
#[derive(Clone)]
pub struct LifecycleHook {
  name: String,
  hook: HookFn,
}

impl LifecycleHook {
  pub fn new<F, Fut>(name: impl Into<String>, hook: F) -> Self
  where
    F: Fn(App) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
  {
    Self {
      name: name.into(),
      hook: Arc::new(move |app: App| hook(app).boxed()),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }
}

impl fmt::Debug for LifecycleHook {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("LifecycleHook").field(&self.name).finish()
  }
}

/// A plugin that rewrites the [`AppConfig`] before the [`App`] is built.
pub trait InitPlugin: Send + Sync {
  fn on_app_init(&self, config: AppConfig) -> Result<AppConfig>;
}

/// Everything an [`App`] is built from.
///
/// The fields are public so plugins can edit them in `on_app_init`.
#[derive(Default)]
pub struct AppConfig {
  pub dependencies: HashMap<String, Provide>,
  pub on_startup: Vec<LifecycleHook>,
  pub on_shutdown: Vec<LifecycleHook>,
  pub signature_namespace: HashMap<String, TypeName>,
  pub plugins: Vec<Arc<dyn InitPlugin>>,
}

impl AppConfig {
  pub fn new() -> Self {
    Self::default()
  }

  /// Registers a dependency provider under `key`.
  pub fn dependency(mut self, key: impl Into<String>, provide: Provide) -> Self {
    self.dependencies.insert(key.into(), provide);
    self
  }

  pub fn on_startup(mut self, hook: LifecycleHook) -> Self {
    self.on_startup.push(hook);
    self
  }

  pub fn on_shutdown(mut self, hook: LifecycleHook) -> Self {
    self.on_shutdown.push(hook);
    self
  }

  pub fn plugin(mut self, plugin: impl InitPlugin + 'static) -> Self {
    self.plugins.push(Arc::new(plugin));
    self
  }
}

impl fmt::Debug for AppConfig {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut dependencies: Vec<&String> = self.dependencies.keys().collect();
    dependencies.sort();
    f.debug_struct("AppConfig")
      .field("dependencies", &dependencies)
      .field("on_startup", &self.on_startup)
      .field("on_shutdown", &self.on_shutdown)
      .field("plugins", &self.plugins.len())
      .finish_non_exhaustive()
  }
}

/// A built application.
///
/// `App` is a cheap handle; hooks and scopes hold clones of it.
#[derive(Clone)]
pub struct App {
  inner: Arc<AppInner>,
}

struct AppInner {
  state: State,
  dependencies: HashMap<String, Provide>,
  on_startup: Vec<LifecycleHook>,
  on_shutdown: Vec<LifecycleHook>,
  signature_namespace: HashMap<String, TypeName>,
  phase: Mutex<Phase>,
}

impl App {
  /// Builds the app, letting each plugin rewrite the config in order.
  pub fn new(mut config: AppConfig) -> Result<Self> {
    let plugins = std::mem::take(&mut config.plugins);
    for plugin in &plugins {
      config = plugin.on_app_init(config)?;
    }

    info!(
      dependencies = config.dependencies.len(),
      startup_hooks = config.on_startup.len(),
      shutdown_hooks = config.on_shutdown.len(),
      "application built"
    );
    Ok(Self {
      inner: Arc::new(AppInner {
        state: State::new(),
        dependencies: config.dependencies,
        on_startup: config.on_startup,
        on_shutdown: config.on_shutdown,
        signature_namespace: config.signature_namespace,
        phase: Mutex::new(Phase::Built),
      }),
    })
  }

  pub fn state(&self) -> &State {
    &self.inner.state
  }

  pub fn phase(&self) -> Phase {
    *self.inner.phase.lock()
  }

  /// Returns `true` if a provider is registered under `key`.
  pub fn has_dependency(&self, key: &str) -> bool {
    self.inner.dependencies.contains_key(key)
  }

  pub(crate) fn dependency(&self, key: &str) -> Option<Provide> {
    self.inner.dependencies.get(key).cloned()
  }

  /// Looks a type up in the signature namespace.
  pub fn resolve_type(&self, name: &str) -> Option<TypeName> {
    self.inner.signature_namespace.get(name).copied()
  }

  pub fn startup_hooks(&self) -> impl Iterator<Item = &str> {
    self.inner.on_startup.iter().map(LifecycleHook::name)
  }

  pub fn shutdown_hooks(&self) -> impl Iterator<Item = &str> {
    self.inner.on_shutdown.iter().map(LifecycleHook::name)
  }

  fn expect_phase(&self, expected: Phase) -> Result<()> {
    let actual = self.phase();
    if actual != expected {
      return Err(HostError::InvalidPhase { expected, actual });
    }
    Ok(())
  }

  async fn run_hooks(&self, hooks: &[LifecycleHook]) -> Result<()> {
    for hook in hooks {
      debug!(hook = %hook.name, "running lifecycle hook");
      (hook.hook)(self.clone())
        .await
        .map_err(|source| HostError::Hook {
          hook: hook.name.clone(),
          source,
        })?;
    }
    Ok(())
  }

  /// Runs the startup hooks in order. The first failure aborts startup and
  /// leaves the app in the `Built` phase.
  pub async fn startup(&self) -> Result<()> {
    self.expect_phase(Phase::Built)?;
    self.run_hooks(&self.inner.on_startup).await?;
    *self.inner.phase.lock() = Phase::Running;
    info!("application started");
    Ok(())
  }

  /// Runs the shutdown hooks in order. The app is `Stopped` afterwards, even
  /// when a hook fails.
  pub async fn shutdown(&self) -> Result<()> {
    self.expect_phase(Phase::Running)?;
    *self.inner.phase.lock() = Phase::Stopped;
    self.run_hooks(&self.inner.on_shutdown).await?;
    info!("application stopped");
    Ok(())
  }

  /// Runs one unit of work inside a fresh [`Scope`].
  ///
  /// The scope is closed once the handler's future completes, so every
  /// finalizer runs whether the handler succeeded or failed. A panicking
  /// handler closes its scope before the panic resumes. If the returned future
  /// is dropped early, the finalizers are spawned on the current tokio runtime.
  pub async fn handle<F, Fut, R, E>(&self, handler: F) -> std::result::Result<R, E>
  where
    F: FnOnce(Scope) -> Fut,
    Fut: Future<Output = std::result::Result<R, E>>,
    E: From<HostError>,
  {
    self.expect_phase(Phase::Running)?;
    let scope = Scope::new(self.clone());
    let guard = CloseOnDrop {
      scope: Some(scope.clone()),
    };
    let outcome = AssertUnwindSafe(handler(scope.clone())).catch_unwind().await;
    scope.close().await;
    drop(guard);
    match outcome {
      Ok(outcome) => outcome,
      Err(panic) => std::panic::resume_unwind(panic),
    }
  }
}

/// Closes a scope in the background if it is still open when dropped.
struct CloseOnDrop {
  scope: Option<Scope>,
}

impl Drop for CloseOnDrop {
  fn drop(&mut self) {
    if let Some(scope) = self.scope.take().filter(|scope| !scope.is_closed()) {
      debug!("unit of work cancelled, closing its scope in the background");
      scope.close_detached();
    }
  }
}

impl fmt::Debug for App {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("App")
      .field("phase", &self.phase())
      .field("state", &self.inner.state)
      .field("on_startup", &self.inner.on_startup)
      .field("on_shutdown", &self.inner.on_shutdown)
      .finish_non_exhaustive()
  }
}
