use fibre_host::{BoxError, HostError};
use thiserror::Error;

/// Errors raised by the svcs plugin.
#[derive(Debug, Error)]
pub enum SvcsError {
  #[error(transparent)]
  Host(#[from] HostError),

  #[error(transparent)]
  Ioc(#[from] fibre_ioc::Error),

  /// The registry was requested before the application started.
  #[error("the svcs registry has not been setup yet")]
  NotReady,

  /// The application state lost the registry the plugin stored at startup.
  /// This is an integration bug, never a user-recoverable condition.
  #[error("no svcs registry in application state under `{key}`")]
  RegistryMissing { key: String },

  #[error("registry factory failed: {0}")]
  Factory(#[source] BoxError),
}

/// A specialized `Result` type for `fibre_svcs` operations.
pub type Result<T, E = SvcsError> = std::result::Result<T, E>;
