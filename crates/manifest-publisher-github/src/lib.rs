//! GitHub and artifact registry adapters for manifest-publisher.
//!
//! - [`GitHubClient`]: git data API ([`GitObjectStore`]) and release
//!   archive downloads ([`ArchiveSource`])
//! - [`RegistryClient`]: artifact registration ([`ArtifactRegistry`])
//!
//! [`GitObjectStore`]: manifest_publisher_core::GitObjectStore
//! [`ArchiveSource`]: manifest_publisher_core::ArchiveSource
//! [`ArtifactRegistry`]: manifest_publisher_core::ArtifactRegistry

pub mod client;
pub mod config;
pub mod error;
pub mod registry;
mod wire;

#[cfg(test)]
mod test_support;

pub use client::GitHubClient;
pub use config::{GitHubConfig, RegistryConfig, DEFAULT_API_URL};
pub use error::{GitHubError, Result};
pub use registry::RegistryClient;
