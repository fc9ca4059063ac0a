//! Data-transfer types exchanged with the git object store.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use super::environment::Environment;
use super::error::GitError;

/// Git object id (SHA-1 or SHA-256 hex).
///
/// The inner field is private so the string is always lowercase hex of a
/// valid length.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectSha(String);

impl ObjectSha {
    pub fn parse(raw: &str) -> std::result::Result<Self, GitError> {
        Self::try_from(raw.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 7 hex chars), as git prints it.
    pub fn short(&self) -> &str {
        &self.0[..7.min(self.0.len())]
    }
}

impl TryFrom<String> for ObjectSha {
    type Error = GitError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        let valid_len = s.len() == 40 || s.len() == 64;
        if !valid_len || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(GitError::InvalidSha(s));
        }
        Ok(ObjectSha(s.to_ascii_lowercase()))
    }
}

impl From<ObjectSha> for String {
    fn from(sha: ObjectSha) -> Self {
        sha.0
    }
}

impl fmt::Display for ObjectSha {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a repository on the git host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoId {
    pub owner: String,
    pub name: String,
}

impl RepoId {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Path of an environment's manifest inside the target repository.
pub fn artifact_path(project: &str, environment: Environment) -> String {
    format!("{project}/deploy-{environment}.yaml")
}

/// Fully rendered manifest for one environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedArtifact {
    environment: Environment,
    path: String,
    content: Vec<u8>,
}

impl RenderedArtifact {
    pub fn new(project: &str, environment: Environment, content: impl Into<Vec<u8>>) -> Self {
        Self {
            environment,
            path: artifact_path(project, environment),
            content: content.into(),
        }
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// SHA-256 of the content, for logs and reports.
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(&self.content))
    }
}

/// A blob created in the target repository's object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteBlob {
    pub sha: ObjectSha,
    pub path: String,
    pub size: usize,
}

/// One entry of a tree creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    pub mode: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub sha: ObjectSha,
}

impl TreeEntry {
    /// Regular (non-executable) file mode.
    pub const FILE_MODE: &'static str = "100644";

    pub fn blob(path: impl Into<String>, sha: ObjectSha) -> Self {
        Self {
            path: path.into(),
            mode: Self::FILE_MODE.to_string(),
            kind: "blob".to_string(),
            sha,
        }
    }
}

impl From<&RemoteBlob> for TreeEntry {
    fn from(blob: &RemoteBlob) -> Self {
        TreeEntry::blob(blob.path.clone(), blob.sha.clone())
    }
}

/// Commit metadata needed to layer a new tree on top of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub sha: ObjectSha,
    pub tree_sha: ObjectSha,
}

/// Record of one compose-and-update attempt against a freshly read ref.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitAttempt {
    pub attempt: u32,
    pub base_ref_sha: ObjectSha,
    pub base_tree_sha: ObjectSha,
    pub new_tree_sha: ObjectSha,
    pub new_commit_sha: ObjectSha,
    /// HTTP status of the ref update, `None` when the request itself failed.
    pub status: Option<u16>,
}

impl CommitAttempt {
    pub fn succeeded(&self) -> bool {
        self.status == Some(200)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHA: &str = "3A0F6C1E2D4B5A69788796A5B4C3D2E1F0A1B2C3";

    #[test]
    fn test_object_sha_normalizes_case() {
        let sha = ObjectSha::parse(SHA).unwrap();
        assert_eq!(sha.as_str(), SHA.to_ascii_lowercase());
        assert_eq!(sha.short(), "3a0f6c1");
    }

    #[test]
    fn test_object_sha_rejects_garbage() {
        assert!(ObjectSha::parse("").is_err());
        assert!(ObjectSha::parse("abc").is_err());
        assert!(ObjectSha::parse(&"z".repeat(40)).is_err());
        assert!(ObjectSha::parse(&"a".repeat(64)).is_ok());
    }

    #[test]
    fn test_artifact_path_is_deterministic() {
        let artifact = RenderedArtifact::new("svc", Environment::Hlg, "kind: Service\n");
        assert_eq!(artifact.path(), "svc/deploy-hlg.yaml");
        assert_eq!(artifact.digest().len(), 64);
    }

    #[test]
    fn test_tree_entry_wire_shape() {
        let entry = TreeEntry::blob("svc/deploy-stg.yaml", ObjectSha::parse(SHA).unwrap());
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["mode"], "100644");
        assert_eq!(json["type"], "blob");
        assert_eq!(json["path"], "svc/deploy-stg.yaml");
        assert_eq!(json["sha"], SHA.to_ascii_lowercase());
    }
}
