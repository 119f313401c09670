//! # Fibre Svcs
//!
//! Integrates a [`fibre_ioc::Registry`] with a [`fibre_host::App`].
//!
//! - On startup the plugin takes the configured registry, or builds one with
//!   the configured factory (sync or async), and publishes it into the app
//!   state.
//! - Each unit of work can depend on a fresh [`fibre_ioc::Container`], which
//!   is closed when the work's scope ends.
//! - On shutdown the registry is closed.
//!
//! ```
//! use fibre_host::{App, AppConfig, BoxError};
//! use fibre_ioc::{Container, Registry};
//! use fibre_svcs::{SvcsPlugin, SvcsPluginConfig};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), BoxError> {
//! let registry = Registry::new();
//! registry.register_value(10_i32);
//!
//! let plugin = SvcsPlugin::new(SvcsPluginConfig::with_registry(Arc::new(registry)));
//! let app = App::new(AppConfig::new().plugin(plugin.clone()))?;
//! app.startup().await?;
//!
//! let number = app
//!   .handle(|scope| async move {
//!     let container = scope.resolve::<Container>("svcs_container").await?;
//!     Ok::<_, BoxError>(*container.get::<i32>()?)
//!   })
//!   .await?;
//! assert_eq!(number, 10);
//!
//! app.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod plugin;

pub use config::{KeySettings, RegistryFactory, RegistrySource, SvcsPluginConfig, SvcsPluginConfigBuilder};
pub use error::{Result, SvcsError};
pub use plugin::{SvcsPlugin, REGISTRY_DEPENDENCY_KEY};
