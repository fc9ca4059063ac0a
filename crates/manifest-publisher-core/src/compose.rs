//! Tree/commit composer.

use crate::domain::{ObjectSha, PublishError, RemoteBlob, RepoId, Result, TreeEntry};
use crate::git_store::GitObjectStore;

/// Objects produced by one composition against a given head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedCommit {
    pub base_tree_sha: ObjectSha,
    pub tree_sha: ObjectSha,
    pub commit_sha: ObjectSha,
}

/// Tree entries for a set of blobs, one per blob, in blob order.
pub fn tree_entries(blobs: &[RemoteBlob]) -> Vec<TreeEntry> {
    blobs.iter().map(TreeEntry::from).collect()
}

/// Layer `entries` over `head`'s tree and commit the result with `head` as
/// the sole parent.
pub async fn compose_commit(
    store: &dyn GitObjectStore,
    repo: &RepoId,
    head: &ObjectSha,
    entries: &[TreeEntry],
    message: &str,
) -> Result<ComposedCommit> {
    let head_commit = store
        .get_commit(repo, head)
        .await
        .map_err(PublishError::CommitRead)?;

    let tree_sha = store
        .create_tree(repo, &head_commit.tree_sha, entries)
        .await
        .map_err(PublishError::TreeCreate)?;

    let commit_sha = store
        .create_commit(repo, message, &tree_sha, std::slice::from_ref(head))
        .await
        .map_err(PublishError::CommitCreate)?;

    Ok(ComposedCommit {
        base_tree_sha: head_commit.tree_sha,
        tree_sha,
        commit_sha,
    })
}
