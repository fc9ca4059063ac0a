//! Domain types for the manifest publishing pipeline.

pub mod environment;
pub mod error;
pub mod event;
pub mod objects;

pub use environment::{Environment, UnknownEnvironment};
pub use error::{ArchiveError, ConfigurationGap, GitError, PublishError, RenderError, Result};
pub use event::{ReleaseEvent, ReleasePayload};
pub use objects::{
    artifact_path, CommitAttempt, CommitInfo, ObjectSha, RemoteBlob, RenderedArtifact, RepoId,
    TreeEntry,
};
