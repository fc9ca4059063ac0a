//! Ref updater with conflict retry.
//!
//! Moving the branch is a compare-and-swap over an append-only,
//! content-addressed history. Every attempt re-reads the ref and recomposes
//! the tree and commit against that head; no sha survives across attempts.

use tracing::warn;

use crate::compose::compose_commit;
use crate::domain::{CommitAttempt, ObjectSha, PublishError, RepoId, Result, TreeEntry};
use crate::git_store::GitObjectStore;
use crate::obs;

/// Attempts made before a ref conflict becomes fatal.
pub const MAX_ATTEMPTS: u32 = 3;

/// Only this ref-update status counts as success.
pub const SUCCESS_STATUS: u16 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefUpdateState {
    Attempting(u32),
    Succeeded,
    Failed,
}

impl RefUpdateState {
    /// Transition after attempt `attempt` finished with `status`.
    pub fn next(attempt: u32, status: Option<u16>, max_attempts: u32) -> Self {
        if status == Some(SUCCESS_STATUS) {
            RefUpdateState::Succeeded
        } else if attempt < max_attempts {
            RefUpdateState::Attempting(attempt + 1)
        } else {
            RefUpdateState::Failed
        }
    }
}

/// A commit that the target ref now points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedCommit {
    pub commit_sha: ObjectSha,
    pub attempts: Vec<CommitAttempt>,
}

/// Commit `entries` onto `reference`, retrying ref-update races.
///
/// A failed ref update (any status but 200, or no response) is retried from
/// a fresh ref read until `max_attempts` is exhausted. Failures of the
/// read/compose steps are not retried.
pub async fn commit_with_retry(
    store: &dyn GitObjectStore,
    repo: &RepoId,
    reference: &str,
    entries: &[TreeEntry],
    message: &str,
    max_attempts: u32,
) -> Result<PublishedCommit> {
    let mut attempts: Vec<CommitAttempt> = Vec::new();
    let mut last_error = String::new();
    let mut state = RefUpdateState::Attempting(1);

    while let RefUpdateState::Attempting(attempt) = state {
        let head = store
            .get_ref(repo, reference)
            .await
            .map_err(|source| PublishError::RefRead {
                reference: reference.to_string(),
                source,
            })?;

        let composed = compose_commit(store, repo, &head, entries, message).await?;

        let status = match store
            .update_ref(repo, reference, &composed.commit_sha)
            .await
        {
            Ok(status) => {
                last_error = format!("HTTP {status}");
                Some(status)
            }
            Err(e) => {
                last_error = e.to_string();
                None
            }
        };

        obs::emit_commit_attempted(reference, attempt, composed.commit_sha.as_str(), status);
        let commit_sha = composed.commit_sha.clone();
        attempts.push(CommitAttempt {
            attempt,
            base_ref_sha: head,
            base_tree_sha: composed.base_tree_sha,
            new_tree_sha: composed.tree_sha,
            new_commit_sha: composed.commit_sha,
            status,
        });

        state = RefUpdateState::next(attempt, status, max_attempts);
        if state == RefUpdateState::Succeeded {
            return Ok(PublishedCommit {
                commit_sha,
                attempts,
            });
        }
        warn!(
            reference = %reference,
            attempt = attempt,
            error = %last_error,
            "Ref update rejected"
        );
    }

    Err(PublishError::RefConflict {
        reference: reference.to_string(),
        attempts: attempts.len() as u32,
        last_status: attempts.last().and_then(|a| a.status),
        last_error,
        history: attempts,
        notification: None,
    })
}
