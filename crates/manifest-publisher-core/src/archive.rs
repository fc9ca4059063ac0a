//! Release archive staging.
//!
//! A staging area is a private directory under the configured work dir. The
//! downloaded zipball is written there, extracted into `unzip/`, and the
//! whole directory is removed once the pipeline has finished.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::domain::{ArchiveError, ReleaseEvent};

/// Source of release archives.
#[async_trait]
pub trait ArchiveSource: Send + Sync {
    /// Download the archive behind `url`.
    async fn fetch(&self, url: &str) -> std::result::Result<Vec<u8>, ArchiveError>;
}

/// Scratch directory holding one release's extracted source tree.
#[derive(Debug)]
pub struct StagingArea {
    dir: PathBuf,
}

impl StagingArea {
    pub async fn create(
        work_dir: &Path,
        event: &ReleaseEvent,
    ) -> std::result::Result<Self, ArchiveError> {
        let run = uuid::Uuid::new_v4().simple().to_string();
        let dir = work_dir.join(format!(
            "{}-{}-{}-{}",
            event.owner(),
            event.repository(),
            sanitize(event.tag_name()),
            &run[..8]
        ));
        tokio::fs::create_dir_all(&dir).await?;
        debug!(path = %dir.display(), "Created staging area");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Persist `bytes` as the release zipball, extract it and return the
    /// archive's top-level folder.
    pub async fn unpack(
        &self,
        event: &ReleaseEvent,
        bytes: Vec<u8>,
    ) -> std::result::Result<PathBuf, ArchiveError> {
        let archive_path = self.dir.join(format!(
            "asset-{}-release{}-{}.zip",
            event.repository(),
            sanitize(event.tag_name()),
            event.owner()
        ));
        tokio::fs::write(&archive_path, bytes).await?;

        let dest = self.dir.join("unzip");
        let extract_from = archive_path.clone();
        let extract_to = dest.clone();
        let top = tokio::task::spawn_blocking(move || extract_zip(&extract_from, &extract_to))
            .await
            .map_err(|e| ArchiveError::Extract(e.to_string()))??;

        tokio::fs::remove_file(&archive_path).await?;
        Ok(dest.join(top))
    }

    /// Remove the staging directory. Failures are logged, not returned.
    pub async fn cleanup(self) {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => debug!(path = %self.dir.display(), "Removed staging area"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %self.dir.display(),
                error = %e,
                "Failed to remove staging area"
            ),
        }
    }
}

fn sanitize(tag: &str) -> String {
    tag.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Extract a zip archive and return the top-level folder of its first entry.
pub fn extract_zip(archive: &Path, dest: &Path) -> std::result::Result<String, ArchiveError> {
    let file = std::fs::File::open(archive)?;
    let mut zip =
        zip::ZipArchive::new(file).map_err(|e| ArchiveError::Extract(e.to_string()))?;
    if zip.len() == 0 {
        return Err(ArchiveError::Empty);
    }

    let first = {
        let entry = zip
            .by_index(0)
            .map_err(|e| ArchiveError::Extract(e.to_string()))?;
        entry.name().to_string()
    };
    let top = first
        .split('/')
        .next()
        .filter(|s| !s.is_empty() && *s != "..")
        .ok_or_else(|| ArchiveError::Extract(format!("unexpected first entry '{first}'")))?
        .to_string();

    std::fs::create_dir_all(dest)?;
    zip.extract(dest)
        .map_err(|e| ArchiveError::Extract(e.to_string()))?;
    Ok(top)
}
