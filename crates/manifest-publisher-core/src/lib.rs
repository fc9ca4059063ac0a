//! Manifest Publisher Core
//!
//! Turns a published release into deploy manifests committed to a
//! deployment repository.
//!
//! ## Pipeline
//!
//! 1. The release archive is downloaded into a private staging area and
//!    extracted ([`archive`]).
//! 2. The `.viaops.yml` descriptor is parsed ([`descriptor`]). A missing
//!    file or namespace prefix skips the release without touching git.
//! 3. The chart is rendered once per environment, concurrently and
//!    all-or-nothing ([`render`], [`builder`]).
//! 4. Every manifest becomes a blob; one tree and one commit are composed
//!    on top of the current head ([`blobs`], [`compose`]).
//! 5. The ref is moved with up to three fresh attempts ([`ref_update`]).
//!
//! The artifact registration ([`registry`]) runs beside steps 3 to 5 and
//! never influences the commit outcome.
//!
//! ## Key Components
//!
//! - [`PublishPipeline`]: orchestrates one publish run
//! - [`GitObjectStore`], [`ChartRenderer`], [`ArchiveSource`],
//!   [`ArtifactRegistry`]: the external seams, with in-memory
//!   implementations in [`fakes`]

pub mod archive;
pub mod blobs;
pub mod builder;
pub mod compose;
pub mod config;
pub mod descriptor;
pub mod domain;
pub mod fakes;
pub mod git_store;
pub mod obs;
pub mod pipeline;
pub mod ref_update;
pub mod registry;
pub mod render;
pub mod report;
pub mod telemetry;

pub use archive::{ArchiveSource, StagingArea};
pub use config::PublisherConfig;
pub use descriptor::{parse_descriptor, DeployDescriptor, DESCRIPTOR_FILE};
pub use domain::{
    ArchiveError, ConfigurationGap, Environment, GitError, ObjectSha, PublishError, ReleaseEvent,
    ReleasePayload, RenderError, RenderedArtifact, RepoId, Result,
};
pub use git_store::{GitObjectStore, GitResult};
pub use pipeline::{render_tree, PublishPipeline, RenderedTree};
pub use ref_update::{commit_with_retry, MAX_ATTEMPTS};
pub use registry::{ArtifactRegistration, ArtifactRegistry, NotificationError, NotificationStatus};
pub use render::{ChartRenderer, HelmRenderer};
pub use report::{PublishOutcome, PublishReport};
pub use telemetry::init_tracing;
