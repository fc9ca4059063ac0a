//! Structured result of a publish run.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{
    CommitAttempt, ConfigurationGap, Environment, ObjectSha, RemoteBlob, RenderedArtifact, RepoId,
};
use crate::registry::NotificationStatus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PublishOutcome {
    /// The target ref now points at `commit_sha`.
    Committed { commit_sha: ObjectSha },
    /// Nothing was published because the project is not configured for it.
    Skipped { gap: ConfigurationGap },
}

/// One published manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactSummary {
    pub environment: Environment,
    pub path: String,
    pub bytes: usize,
    pub sha256: String,
    pub blob_sha: ObjectSha,
}

impl ArtifactSummary {
    pub fn new(artifact: &RenderedArtifact, blob: &RemoteBlob) -> Self {
        Self {
            environment: artifact.environment(),
            path: artifact.path().to_string(),
            bytes: artifact.content().len(),
            sha256: artifact.digest(),
            blob_sha: blob.sha.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishReport {
    pub run_id: String,
    pub repository: String,
    pub tag: String,
    pub target: RepoId,
    pub reference: String,
    pub outcome: PublishOutcome,
    pub artifacts: Vec<ArtifactSummary>,
    pub attempts: Vec<CommitAttempt>,
    pub notification: NotificationStatus,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl PublishReport {
    pub fn committed(&self) -> bool {
        matches!(self.outcome, PublishOutcome::Committed { .. })
    }

    pub fn commit_sha(&self) -> Option<&ObjectSha> {
        match &self.outcome {
            PublishOutcome::Committed { commit_sha } => Some(commit_sha),
            PublishOutcome::Skipped { .. } => None,
        }
    }
}
