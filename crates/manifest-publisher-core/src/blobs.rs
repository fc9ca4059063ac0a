//! Blob uploader: turns rendered artifacts into remote blobs.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::future::try_join_all;

use crate::domain::{PublishError, RemoteBlob, RenderedArtifact, RepoId, Result};
use crate::git_store::GitObjectStore;
use crate::obs;

/// Upload one artifact as a base64 blob.
pub async fn upload_blob(
    store: &dyn GitObjectStore,
    repo: &RepoId,
    artifact: &RenderedArtifact,
) -> Result<RemoteBlob> {
    let encoded = STANDARD.encode(artifact.content());
    let sha = store
        .create_blob(repo, &encoded)
        .await
        .map_err(|source| PublishError::BlobCreate {
            path: artifact.path().to_string(),
            source,
        })?;

    obs::emit_blob_created(artifact.path(), sha.as_str());
    Ok(RemoteBlob {
        sha,
        path: artifact.path().to_string(),
        size: artifact.content().len(),
    })
}

/// Upload all artifacts concurrently; the first failure aborts the rest.
/// Blobs come back in artifact order.
pub async fn upload_blobs(
    store: &dyn GitObjectStore,
    repo: &RepoId,
    artifacts: &[RenderedArtifact],
) -> Result<Vec<RemoteBlob>> {
    try_join_all(
        artifacts
            .iter()
            .map(|artifact| upload_blob(store, repo, artifact)),
    )
    .await
}
