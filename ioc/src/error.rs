use thiserror::Error;

/// A boxed, thread-safe error returned by user supplied factories.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors produced while resolving services from a `Container`.
#[derive(Debug, Error)]
pub enum Error {
  /// No registration exists for the requested type.
  #[error("no service registered for `{type_name}`")]
  ServiceNotFound { type_name: &'static str },

  /// A factory asked for a service that is already being built on this thread.
  #[error("circular dependency detected while resolving `{type_name}`")]
  CircularDependency { type_name: &'static str },

  /// The container has already been closed.
  #[error("the container has been closed")]
  Closed,

  /// A factory returned an error of its own.
  #[error("factory for `{type_name}` failed: {source}")]
  Factory {
    type_name: &'static str,
    #[source]
    source: BoxError,
  },
}

/// A specialized `Result` type for `fibre_ioc` operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
