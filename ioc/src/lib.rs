//! # Fibre IoC
//!
//! A thread-safe service registry with per-scope containers.
//!
//! A [`Registry`] is built once and describes *how* to obtain services: fixed
//! values, factories, and factories whose instances need an async cleanup. A
//! [`Container`] is opened from the registry for a unit of work (a request, a
//! job, a test), caches the instances it creates, and runs their cleanups when
//! it is closed.
//!
//! ## Core Concepts
//!
//! - **Registry**: Long-lived, shared as `Arc<Registry>`. Closing it awaits the
//!   registered `on_close` callbacks and removes every registration.
//! - **Container**: Short-lived, cheap to clone. Services are resolved by type
//!   with [`Container::get`].
//! - **Cleanups**: Factories registered with a cleanup queue it on the container
//!   that built the instance. They run in reverse order on [`Container::close`].
//!
//! ## Quick Start
//!
//! ```
//! use fibre_ioc::{Container, Registry};
//! use std::sync::Arc;
//!
//! # async fn run() -> fibre_ioc::Result<()> {
//! let registry = Arc::new(Registry::new());
//! registry.register_value(10_i32);
//! registry.register_factory(|container| {
//!   let number = container.get::<i32>()?;
//!   Ok(format!("number is {number}"))
//! });
//!
//! let container = Container::new(registry.clone());
//! assert_eq!(*container.get::<String>()?, "number is 10");
//! container.close().await;
//!
//! registry.close().await;
//! assert!(!registry.contains::<i32>());
//! # Ok(())
//! # }
//! ```

mod container;
mod core;
mod error;
mod registry;

pub use container::Container;
pub use error::{BoxError, Error, Result};
pub use registry::Registry;
