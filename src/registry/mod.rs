//! Registry module for resolving, fetching and pushing through the registry management API
//!
//! The registry is reached through the [`EcrApi`] capability rather than the
//! Docker Registry HTTP API. [`Resolver`] turns references into descriptors and
//! hands out a [`Fetcher`] or [`Pusher`] bound to one repository.

pub mod api;
pub mod base;
pub mod fetcher;
pub mod pusher;
pub mod resolver;

#[cfg(test)]
pub(crate) mod fake;

pub use api::{ApiError, EcrApi, Session};
pub use base::RegistryBase;
pub use fetcher::Fetcher;
pub use pusher::Pusher;
pub use resolver::{Resolver, ResolverBuilder};
