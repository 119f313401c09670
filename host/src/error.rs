use crate::app::Phase;
use thiserror::Error;

/// A boxed, thread-safe error returned by hooks and providers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The main error type for the `fibre_host` library.
#[derive(Debug, Error)]
pub enum HostError {
  /// The application or one of its plugins was configured incorrectly.
  #[error("improperly configured: {0}")]
  ImproperlyConfigured(String),

  #[error("no dependency registered under `{0}`")]
  MissingDependency(String),

  #[error("dependency `{key}` does not provide a `{expected}`")]
  DependencyType { key: String, expected: &'static str },

  #[error("provider for `{key}` failed: {source}")]
  Provider {
    key: String,
    #[source]
    source: BoxError,
  },

  #[error("{hook} hook failed: {source}")]
  Hook {
    hook: String,
    #[source]
    source: BoxError,
  },

  #[error("application is {actual:?}, expected {expected:?}")]
  InvalidPhase { expected: Phase, actual: Phase },

  #[error("the scope has already been closed")]
  ScopeClosed,
}

/// A specialized `Result` type for `fibre_host` operations.
pub type Result<T, E = HostError> = std::result::Result<T, E>;
