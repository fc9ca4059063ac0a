//! Error taxonomy for the publishing pipeline.

use std::path::PathBuf;

use serde::Serialize;

use super::objects::CommitAttempt;
use crate::registry::NotificationStatus;

/// A missing piece of project configuration that makes publishing a no-op.
///
/// This is not a failure: the pipeline stops before touching the target
/// repository and reports the gap to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "gap", rename_all = "snake_case")]
pub enum ConfigurationGap {
    #[error("deploy descriptor {path} does not exist")]
    MissingDescriptor { path: PathBuf },

    #[error("deploy descriptor does not define deploy.namespace-prefix")]
    MissingNamespacePrefix,
}

/// Failures of the external chart renderer.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with code {code}: {stderr}")]
    NonZeroExit {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("`{command}` wrote diagnostics: {stderr}")]
    Diagnostics { command: String, stderr: String },

    #[error("`{command}` produced non UTF-8 output")]
    InvalidOutput { command: String },

    #[error("`{command}` timed out after {timeout_secs}s")]
    TimedOut { command: String, timeout_secs: u64 },
}

/// Failures of the remote git object API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GitError {
    #[error("{operation} returned HTTP {status}: {message}")]
    Status {
        operation: String,
        status: u16,
        message: String,
    },

    #[error("{operation} request failed: {message}")]
    Transport { operation: String, message: String },

    #[error("{operation} timed out")]
    TimedOut { operation: String },

    #[error("{operation} returned an unexpected body: {message}")]
    Decode { operation: String, message: String },

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("invalid object sha: {0}")]
    InvalidSha(String),
}

impl GitError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, GitError::TimedOut { .. })
    }
}

/// Failures while fetching or unpacking the release archive.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("archive download failed: {0}")]
    Fetch(String),

    #[error("archive download timed out")]
    TimedOut,

    #[error("archive could not be extracted: {0}")]
    Extract(String),

    #[error("archive is empty")]
    Empty,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Pipeline-level errors. Everything except [`ConfigurationGap`] aborts the
/// publish without committing anything.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid release event: {0}")]
    InvalidEvent(String),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("deploy descriptor is malformed: {0}")]
    Descriptor(String),

    #[error("chart dependency update failed: {0}")]
    DependencyUpdate(#[source] RenderError),

    #[error("render failed for {environment}: {source}")]
    Render {
        environment: String,
        #[source]
        source: RenderError,
    },

    #[error("values overlay {} for flag group '{group}' in {environment} does not exist", path.display())]
    MissingValues {
        group: String,
        environment: String,
        path: PathBuf,
    },

    #[error("blob creation failed for {path}: {source}")]
    BlobCreate {
        path: String,
        #[source]
        source: GitError,
    },

    #[error("reading ref {reference} failed: {source}")]
    RefRead {
        reference: String,
        #[source]
        source: GitError,
    },

    #[error("reading head commit failed: {0}")]
    CommitRead(#[source] GitError),

    #[error("tree creation failed: {0}")]
    TreeCreate(#[source] GitError),

    #[error("commit creation failed: {0}")]
    CommitCreate(#[source] GitError),

    #[error("ref {reference} was not updated after {attempts} attempts: {last_error}")]
    RefConflict {
        reference: String,
        attempts: u32,
        last_status: Option<u16>,
        last_error: String,
        /// Every compose-and-update attempt, in order.
        history: Vec<CommitAttempt>,
        /// Registration outcome, once the run has resolved it.
        notification: Option<NotificationStatus>,
    },

    #[error("{operation} timed out after {timeout_secs}s")]
    Timeout {
        operation: String,
        timeout_secs: u64,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PublishError {
    /// Attach the environment to a renderer failure, lifting timeouts into
    /// [`PublishError::Timeout`].
    pub fn render(environment: impl Into<String>, source: RenderError) -> Self {
        match source {
            RenderError::TimedOut {
                command,
                timeout_secs,
            } => PublishError::Timeout {
                operation: command,
                timeout_secs,
            },
            source => PublishError::Render {
                environment: environment.into(),
                source,
            },
        }
    }

    /// Record the registration outcome on failures that carry one.
    pub fn with_notification(mut self, status: NotificationStatus) -> Self {
        if let PublishError::RefConflict { notification, .. } = &mut self {
            *notification = Some(status);
        }
        self
    }

    /// Whether the failure was caused by an expired timeout anywhere in the chain.
    pub fn is_timeout(&self) -> bool {
        match self {
            PublishError::Timeout { .. } => true,
            PublishError::Archive(ArchiveError::TimedOut) => true,
            PublishError::DependencyUpdate(RenderError::TimedOut { .. }) => true,
            PublishError::BlobCreate { source, .. } | PublishError::RefRead { source, .. } => {
                source.is_timeout()
            }
            PublishError::CommitRead(source)
            | PublishError::TreeCreate(source)
            | PublishError::CommitCreate(source) => source.is_timeout(),
            _ => false,
        }
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PublishError>;
