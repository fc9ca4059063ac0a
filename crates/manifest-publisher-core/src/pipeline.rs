//! Publish pipeline orchestration.
//!
//! archive staged → descriptor parsed → dependency update → registration
//! dispatched → environments rendered → blobs uploaded → tree/commit
//! composed and ref updated with retry → staging removed.

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{info, warn, Instrument};

use crate::archive::{ArchiveSource, StagingArea};
use crate::blobs::upload_blobs;
use crate::builder::build_artifacts;
use crate::compose::tree_entries;
use crate::config::PublisherConfig;
use crate::descriptor::{read_descriptor, DeployDescriptor, DescriptorError};
use crate::domain::{
    CommitAttempt, ConfigurationGap, ObjectSha, PublishError, ReleaseEvent, RenderError,
    RenderedArtifact, RepoId, Result,
};
use crate::git_store::GitObjectStore;
use crate::obs;
use crate::ref_update::commit_with_retry;
use crate::registry::{
    await_registration, dispatch_registration, ArtifactRegistration, ArtifactRegistry,
    NotificationStatus,
};
use crate::render::{ChartRenderer, ChartSource};
use crate::report::{ArtifactSummary, PublishOutcome, PublishReport};

/// Read the descriptor, separating configuration gaps from real failures.
pub async fn load_descriptor(
    root: &Path,
) -> Result<std::result::Result<DeployDescriptor, ConfigurationGap>> {
    match read_descriptor(root).await {
        Ok(descriptor) => Ok(Ok(descriptor)),
        Err(DescriptorError::Gap(gap)) => Ok(Err(gap)),
        Err(DescriptorError::Io(e)) => Err(PublishError::Io(e)),
        Err(e) => Err(PublishError::Descriptor(e.to_string())),
    }
}

/// Run the renderer's dependency update for a chart.
pub async fn update_dependencies(renderer: &dyn ChartRenderer, chart: &Path) -> Result<()> {
    renderer.dependency_update(chart).await.map_err(|e| match e {
        RenderError::TimedOut {
            command,
            timeout_secs,
        } => PublishError::Timeout {
            operation: command,
            timeout_secs,
        },
        other => PublishError::DependencyUpdate(other),
    })
}

/// Rendered manifests of a source tree, without publishing them.
#[derive(Debug, Clone)]
pub enum RenderedTree {
    Rendered {
        descriptor: DeployDescriptor,
        artifacts: Vec<RenderedArtifact>,
    },
    Skipped(ConfigurationGap),
}

/// Render every configured environment of an extracted source tree.
pub async fn render_tree(
    renderer: &dyn ChartRenderer,
    config: &PublisherConfig,
    project: &str,
    root: &Path,
) -> Result<RenderedTree> {
    let descriptor = match load_descriptor(root).await? {
        Ok(descriptor) => descriptor,
        Err(gap) => return Ok(RenderedTree::Skipped(gap)),
    };

    let chart = root.join(&config.chart_dir);
    update_dependencies(renderer, &chart).await?;

    let source = ChartSource::new(project, chart, &descriptor);
    let artifacts = build_artifacts(renderer, &source, project, &config.environments).await?;
    Ok(RenderedTree::Rendered {
        descriptor,
        artifacts,
    })
}

enum PendingNotification {
    Dispatched(JoinHandle<NotificationStatus>),
    Ready(NotificationStatus),
}

impl PendingNotification {
    async fn resolve(self) -> NotificationStatus {
        match self {
            PendingNotification::Dispatched(handle) => await_registration(handle).await,
            PendingNotification::Ready(status) => status,
        }
    }
}

struct Published {
    artifacts: Vec<ArtifactSummary>,
    attempts: Vec<CommitAttempt>,
    commit_sha: ObjectSha,
}

/// Manifest publishing pipeline for one target repository configuration.
pub struct PublishPipeline {
    config: PublisherConfig,
    archives: Arc<dyn ArchiveSource>,
    renderer: Arc<dyn ChartRenderer>,
    git: Arc<dyn GitObjectStore>,
    registry: Option<Arc<dyn ArtifactRegistry>>,
}

impl PublishPipeline {
    /// Build a pipeline; the configuration is validated here, once.
    pub fn new(
        config: PublisherConfig,
        archives: Arc<dyn ArchiveSource>,
        renderer: Arc<dyn ChartRenderer>,
        git: Arc<dyn GitObjectStore>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            archives,
            renderer,
            git,
            registry: None,
        })
    }

    /// Enable artifact registration notifications.
    pub fn with_registry(mut self, registry: Arc<dyn ArtifactRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    /// Fetch the release archive and publish its manifests.
    ///
    /// The staging area is removed whatever the outcome.
    pub async fn publish(&self, event: &ReleaseEvent) -> Result<PublishReport> {
        let staging = StagingArea::create(&self.config.work_dir, event).await?;
        let result = self.publish_staged(&staging, event).await;
        staging.cleanup().await;
        result
    }

    async fn publish_staged(
        &self,
        staging: &StagingArea,
        event: &ReleaseEvent,
    ) -> Result<PublishReport> {
        let bytes = self.archives.fetch(event.archive_url()).await?;
        let root = staging.unpack(event, bytes).await?;
        info!(root = %root.display(), "Release archive extracted");
        self.publish_tree(event, &root).await
    }

    /// Publish from an already extracted source tree rooted at `root`.
    pub async fn publish_tree(&self, event: &ReleaseEvent, root: &Path) -> Result<PublishReport> {
        let span = obs::publish_span(
            &format!("{}/{}", event.owner(), event.repository()),
            event.tag_name(),
        );
        self.run_tree(event, root).instrument(span).await
    }

    async fn run_tree(&self, event: &ReleaseEvent, root: &Path) -> Result<PublishReport> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let started = Instant::now();
        let target = self.config.target_for(event);
        let repository = format!("{}/{}", event.owner(), event.repository());
        obs::emit_publish_started(&run_id, &repository, event.tag_name(), &target.to_string());

        let report = |outcome: PublishOutcome,
                      artifacts: Vec<ArtifactSummary>,
                      attempts: Vec<CommitAttempt>,
                      notification: NotificationStatus| PublishReport {
            run_id: run_id.clone(),
            repository: repository.clone(),
            tag: event.tag_name().to_string(),
            target: target.clone(),
            reference: self.config.target_ref.clone(),
            outcome,
            artifacts,
            attempts,
            notification,
            started_at,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        let descriptor = match load_descriptor(root).await {
            Ok(Ok(descriptor)) => descriptor,
            Ok(Err(gap)) => {
                obs::emit_publish_skipped(&run_id, &gap);
                return Ok(report(
                    PublishOutcome::Skipped { gap },
                    Vec::new(),
                    Vec::new(),
                    NotificationStatus::Skipped {
                        reason: "nothing published".to_string(),
                    },
                ));
            }
            Err(e) => {
                obs::emit_publish_failed(&run_id, &e, None);
                return Err(e);
            }
        };

        let chart = root.join(&self.config.chart_dir);
        if let Err(e) = update_dependencies(self.renderer.as_ref(), &chart).await {
            obs::emit_publish_failed(&run_id, &e, None);
            return Err(e);
        }

        let notification = self.dispatch_notification(event, &target, &descriptor);
        let published = self.render_and_commit(event, &target, chart, &descriptor).await;
        let notification = notification.resolve().await;

        match published {
            Ok(published) => {
                let report = report(
                    PublishOutcome::Committed {
                        commit_sha: published.commit_sha,
                    },
                    published.artifacts,
                    published.attempts,
                    notification,
                );
                obs::emit_publish_finished(&run_id, report.duration_ms, true);
                Ok(report)
            }
            Err(e) => {
                obs::emit_publish_failed(&run_id, &e, Some(&notification));
                obs::emit_publish_finished(&run_id, started.elapsed().as_millis() as u64, false);
                Err(e.with_notification(notification))
            }
        }
    }

    async fn render_and_commit(
        &self,
        event: &ReleaseEvent,
        target: &RepoId,
        chart: PathBuf,
        descriptor: &DeployDescriptor,
    ) -> Result<Published> {
        let project = event.repository();
        let source = ChartSource::new(project, chart, descriptor);
        let artifacts = build_artifacts(
            self.renderer.as_ref(),
            &source,
            project,
            &self.config.environments,
        )
        .await?;

        let blobs = upload_blobs(self.git.as_ref(), target, &artifacts).await?;
        let entries = tree_entries(&blobs);

        let published = commit_with_retry(
            self.git.as_ref(),
            target,
            &self.config.target_ref,
            &entries,
            event.tag_name(),
            self.config.max_attempts,
        )
        .await?;

        let summaries = artifacts
            .iter()
            .zip(&blobs)
            .map(|(artifact, blob)| ArtifactSummary::new(artifact, blob))
            .collect();
        Ok(Published {
            artifacts: summaries,
            attempts: published.attempts,
            commit_sha: published.commit_sha,
        })
    }

    fn dispatch_notification(
        &self,
        event: &ReleaseEvent,
        target: &RepoId,
        descriptor: &DeployDescriptor,
    ) -> PendingNotification {
        let Some(registry) = &self.registry else {
            return PendingNotification::Ready(NotificationStatus::Disabled);
        };

        let url = self.config.artifact_url(target, event.repository());
        match ArtifactRegistration::from_descriptor(event.repository(), url, descriptor) {
            Ok(registration) => PendingNotification::Dispatched(dispatch_registration(
                Arc::clone(registry),
                registration,
            )),
            Err(reason) => {
                warn!(reason = %reason, "Skipping artifact registration");
                PendingNotification::Ready(NotificationStatus::Skipped { reason })
            }
        }
    }
}
