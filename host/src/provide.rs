//! Named dependency providers.

use crate::error::BoxError;
use crate::scope::Scope;
use futures_util::future::{self, BoxFuture};
use futures_util::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

pub(crate) type Resolved = Arc<dyn Any + Send + Sync>;
pub(crate) type Finalizer = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

type ResolverFn =
  Arc<dyn Fn(Scope) -> BoxFuture<'static, Result<Provided, BoxError>> + Send + Sync>;

/// The value produced by a provider, with an optional release step.
pub struct Provided {
  pub(crate) value: Resolved,
  pub(crate) finalizer: Option<Finalizer>,
}

impl Provided {
  /// A plain value with nothing to release.
  pub fn value<T: Any + Send + Sync>(value: Arc<T>) -> Self {
    let value: Resolved = value;
    Self {
      value,
      finalizer: None,
    }
  }

  /// A value whose `release` step runs when the owning scope ends.
  pub fn scoped<T, F, Fut>(value: Arc<T>, release: F) -> Self
  where
    T: Any + Send + Sync,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
  {
    let value: Resolved = value;
    let finalizer: Finalizer = Box::new(move || release().boxed());
    Self {
      value,
      finalizer: Some(finalizer),
    }
  }
}

/// A dependency provider, registered under a name in [`AppConfig`](crate::AppConfig).
#[derive(Clone)]
pub struct Provide {
  resolver: ResolverFn,
  use_cache: bool,
  sync: bool,
}

impl Provide {
  /// An async provider. It receives the scope it resolves for, so it can
  /// depend on other named providers.
  pub fn new<F, Fut>(resolver: F) -> Self
  where
    F: Fn(Scope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Provided, BoxError>> + Send + 'static,
  {
    Self {
      resolver: Arc::new(move |scope: Scope| resolver(scope).boxed()),
      use_cache: false,
      sync: false,
    }
  }

  /// A synchronous, non-blocking provider.
  pub fn sync<F>(resolver: F) -> Self
  where
    F: Fn(&Scope) -> Result<Provided, BoxError> + Send + Sync + 'static,
  {
    Self {
      resolver: Arc::new(move |scope: Scope| future::ready(resolver(&scope)).boxed()),
      use_cache: false,
      sync: true,
    }
  }

  /// Caches the first value for the rest of the owning scope.
  pub fn use_cache(mut self, use_cache: bool) -> Self {
    self.use_cache = use_cache;
    self
  }

  pub fn is_cached(&self) -> bool {
    self.use_cache
  }

  pub fn is_sync(&self) -> bool {
    self.sync
  }

  pub(crate) fn call(&self, scope: Scope) -> BoxFuture<'static, Result<Provided, BoxError>> {
    (self.resolver)(scope)
  }
}

impl fmt::Debug for Provide {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Provide")
      .field("use_cache", &self.use_cache)
      .field("sync", &self.sync)
      .finish_non_exhaustive()
  }
}
