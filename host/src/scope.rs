//! Per-call dependency scopes.

use crate::app::App;
use crate::error::{HostError, Result};
use crate::provide::{Finalizer, Provide, Resolved};
use crate::state::State;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, trace, warn};

/// The dependency scope of one unit of work.
///
/// Opened by [`App::handle`] and closed when the handler returns, panics or is
/// cancelled. `Scope` is a cheap handle, providers receive a clone of it.
#[derive(Clone)]
pub struct Scope {
  inner: Arc<ScopeInner>,
}

struct ScopeInner {
  app: App,
  cache: Mutex<HashMap<String, Arc<OnceCell<Resolved>>>>,
  finalizers: Mutex<Vec<(String, Finalizer)>>,
  closed: AtomicBool,
}

impl Scope {
  pub(crate) fn new(app: App) -> Self {
    Self {
      inner: Arc::new(ScopeInner {
        app,
        cache: Mutex::new(HashMap::new()),
        finalizers: Mutex::new(Vec::new()),
        closed: AtomicBool::new(false),
      }),
    }
  }

  pub fn app(&self) -> &App {
    &self.inner.app
  }

  /// Shortcut for `self.app().state()`.
  pub fn state(&self) -> &State {
    self.inner.app.state()
  }

  /// Resolves the dependency registered under `key` as a `T`.
  pub async fn resolve<T: Any + Send + Sync>(&self, key: &str) -> Result<Arc<T>> {
    let value = self.resolve_any(key).await?;
    value
      .downcast::<T>()
      .map_err(|_| HostError::DependencyType {
        key: key.to_owned(),
        expected: std::any::type_name::<T>(),
      })
  }

  async fn resolve_any(&self, key: &str) -> Result<Resolved> {
    if self.is_closed() {
      return Err(HostError::ScopeClosed);
    }
    let provide = self
      .inner
      .app
      .dependency(key)
      .ok_or_else(|| HostError::MissingDependency(key.to_owned()))?;

    if !provide.is_cached() {
      return self.build(key, &provide).await;
    }

    // One cell per key, concurrent resolves in this scope wait on the first build.
    let cell = self
      .inner
      .cache
      .lock()
      .entry(key.to_owned())
      .or_default()
      .clone();
    if let Some(value) = cell.get() {
      trace!(dependency = key, "dependency served from scope cache");
      return Ok(value.clone());
    }
    let value = cell.get_or_try_init(|| self.build(key, &provide)).await?;
    Ok(value.clone())
  }

  async fn build(&self, key: &str, provide: &Provide) -> Result<Resolved> {
    let provided = provide
      .call(self.clone())
      .await
      .map_err(|source| match source.downcast::<HostError>() {
        Ok(nested) => *nested,
        Err(source) => HostError::Provider {
          key: key.to_owned(),
          source,
        },
      })?;

    if let Some(finalizer) = provided.finalizer {
      let mut finalizers = self.inner.finalizers.lock();
      // `close` flips the flag under this lock, a late finalizer would never run.
      if self.is_closed() {
        drop(finalizers);
        spawn_detached(vec![(key.to_owned(), finalizer)]);
        return Err(HostError::ScopeClosed);
      }
      finalizers.push((key.to_owned(), finalizer));
    }
    debug!(dependency = key, "dependency resolved");
    Ok(provided.value)
  }

  pub(crate) fn is_closed(&self) -> bool {
    self.inner.closed.load(Ordering::Acquire)
  }

  /// Marks the scope closed and hands back its finalizers, newest last.
  /// Returns `None` if the scope was already closed.
  fn take_finalizers(&self) -> Option<Vec<(String, Finalizer)>> {
    let mut finalizers = self.inner.finalizers.lock();
    if self.inner.closed.swap(true, Ordering::AcqRel) {
      return None;
    }
    Some(std::mem::take(&mut *finalizers))
  }

  /// Runs the finalizers of every resolved dependency, newest first.
  pub(crate) async fn close(&self) {
    let Some(finalizers) = self.take_finalizers() else {
      return;
    };
    for (dependency, finalizer) in finalizers.into_iter().rev() {
      trace!(dependency = %dependency, "releasing dependency");
      finalizer().await;
    }
    self.inner.cache.lock().clear();
  }

  /// Closes the scope without awaiting it: finalizers are spawned on the
  /// current tokio runtime. Used when the unit of work was cancelled.
  pub(crate) fn close_detached(&self) {
    if let Some(finalizers) = self.take_finalizers() {
      spawn_detached(finalizers);
    }
    self.inner.cache.lock().clear();
  }
}

fn spawn_detached(finalizers: Vec<(String, Finalizer)>) {
  if finalizers.is_empty() {
    return;
  }
  match tokio::runtime::Handle::try_current() {
    Ok(handle) => {
      debug!(pending = finalizers.len(), "releasing scope in background");
      handle.spawn(async move {
        for (_, finalizer) in finalizers.into_iter().rev() {
          finalizer().await;
        }
      });
    }
    Err(_) => {
      let pending: Vec<String> = finalizers.into_iter().map(|(key, _)| key).collect();
      warn!(?pending, "no async runtime available, scope finalizers were skipped");
    }
  }
}

impl fmt::Debug for Scope {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Scope")
      .field("cached", &self.inner.cache.lock().len())
      .field("pending_finalizers", &self.inner.finalizers.lock().len())
      .field("closed", &self.is_closed())
      .finish_non_exhaustive()
  }
}

impl Drop for ScopeInner {
  fn drop(&mut self) {
    spawn_detached(std::mem::take(self.finalizers.get_mut()));
  }
}
