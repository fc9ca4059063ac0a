//! Git object store abstraction.
//!
//! The pipeline only needs the five low-level git data operations plus blob
//! creation. Implementations must honour git's content addressing and reject
//! non-fast-forward ref updates by status rather than by error.

use async_trait::async_trait;

use crate::domain::{CommitInfo, GitError, ObjectSha, RepoId, TreeEntry};

/// Result type for git object store operations.
pub type GitResult<T> = std::result::Result<T, GitError>;

/// Remote git object API of the target repository host.
#[async_trait]
pub trait GitObjectStore: Send + Sync {
    /// Create a blob from base64-encoded content and return its sha.
    async fn create_blob(&self, repo: &RepoId, content_base64: &str) -> GitResult<ObjectSha>;

    /// Resolve a ref such as `heads/main` to the commit it points at.
    async fn get_ref(&self, repo: &RepoId, reference: &str) -> GitResult<ObjectSha>;

    /// Read a commit to learn its tree.
    async fn get_commit(&self, repo: &RepoId, sha: &ObjectSha) -> GitResult<CommitInfo>;

    /// Create a tree layered over `base_tree`; paths not in `entries` are kept.
    async fn create_tree(
        &self,
        repo: &RepoId,
        base_tree: &ObjectSha,
        entries: &[TreeEntry],
    ) -> GitResult<ObjectSha>;

    /// Create a commit object.
    async fn create_commit(
        &self,
        repo: &RepoId,
        message: &str,
        tree: &ObjectSha,
        parents: &[ObjectSha],
    ) -> GitResult<ObjectSha>;

    /// Move `reference` to `sha` without forcing.
    ///
    /// Returns the HTTP status of the update; only `200` means the ref moved.
    /// `Err` is reserved for requests that produced no response at all.
    async fn update_ref(&self, repo: &RepoId, reference: &str, sha: &ObjectSha) -> GitResult<u16>;
}
