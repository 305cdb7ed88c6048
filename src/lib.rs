//! ECR Resolver Library
//!
//! Resolves, pulls and pushes container images stored in Amazon ECR through
//! the registry's management API. References name repositories by ARN:
//!
//! ```text
//! ecr.aws/arn:aws:ecr:us-west-2:123456789012:repository/team/app:latest
//! ```
//!
//! [`Resolver`] is the entry point. It resolves a reference to a
//! [`Descriptor`], and creates a [`Fetcher`] for reading content or a
//! [`Pusher`] for writing it.

pub mod config;
pub mod descriptor;
pub mod digest;
pub mod download;
pub mod error;
pub mod manifest;
pub mod media_types;
pub mod reference;
pub mod registry;
pub mod upload;

pub use config::ResolverConfig;
pub use descriptor::Descriptor;
pub use digest::{Digest, Digester};
pub use download::BlobReader;
pub use error::{RegistryError, Result};
pub use reference::RegistryReference;
pub use registry::{ApiError, EcrApi, Fetcher, Pusher, Resolver, ResolverBuilder, Session};
pub use upload::{CommitOutcome, ContentWriter, InMemoryTracker, PushWriter, Status, StatusTracker};
