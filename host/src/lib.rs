//! # Fibre Host
//!
//! The application host contract that integrations plug into.
//!
//! An [`App`] is built from an [`AppConfig`]. Before the app exists, every
//! registered [`InitPlugin`] gets a chance to rewrite the config: add named
//! dependency providers, lifecycle hooks and type names. The app then moves
//! through three phases:
//!
//! - **Built**: providers registered, nothing started.
//! - **Running**: startup hooks completed; units of work run through
//!   [`App::handle`], each inside its own [`Scope`].
//! - **Stopped**: shutdown hooks completed.
//!
//! A [`Scope`] resolves dependencies by name. Cached providers are built once
//! per scope. Providers may return a finalizer, and every finalizer of a scope
//! runs when the scope ends, whether the unit of work succeeded or not.

mod app;
mod error;
mod provide;
mod scope;
mod state;

pub use app::{App, AppConfig, InitPlugin, LifecycleHook, Phase, TypeName};
pub use error::{BoxError, HostError, Result};
pub use provide::{Provide, Provided};
pub use scope::Scope;
pub use state::State;
