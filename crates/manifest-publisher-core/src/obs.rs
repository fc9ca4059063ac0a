//! Structured observability hooks for the publish lifecycle.
//!
//! This module provides:
//! - A release-scoped tracing span via [`publish_span`]
//! - Emission functions for key lifecycle events: start, render, blob,
//!   commit attempt, finish and notification outcome
//!
//! Events are emitted at `info!` level (filter with `RUST_LOG`).

use tracing::{info, warn, Span};

use crate::registry::NotificationStatus;

/// Release-scoped span for a publish run.
///
/// Attach it with `tracing::Instrument` so it follows the future across
/// await points:
///
/// ```ignore
/// run_publish().instrument(publish_span("acme/svc", "v1.2.3")).await
/// ```
pub fn publish_span(repository: &str, tag: &str) -> Span {
    tracing::info_span!("publish", repository = %repository, tag = %tag)
}

/// Emit event: publish started for a release.
pub fn emit_publish_started(run_id: &str, repository: &str, tag: &str, target: &str) {
    info!(
        event = "publish.started",
        run_id = %run_id,
        repository = %repository,
        tag = %tag,
        target = %target,
    );
}

/// Emit event: publish skipped because project configuration is missing.
pub fn emit_publish_skipped(run_id: &str, reason: &dyn std::fmt::Display) {
    info!(event = "publish.skipped", run_id = %run_id, reason = %reason);
}

pub fn emit_artifact_rendered(environment: &str, path: &str, bytes: usize) {
    info!(
        event = "artifact.rendered",
        environment = %environment,
        path = %path,
        bytes = bytes,
    );
}

pub fn emit_blob_created(path: &str, sha: &str) {
    info!(event = "blob.created", path = %path, sha = %sha);
}

/// Emit event: one compose-and-update attempt finished.
pub fn emit_commit_attempted(reference: &str, attempt: u32, commit_sha: &str, status: Option<u16>) {
    info!(
        event = "commit.attempted",
        reference = %reference,
        attempt = attempt,
        commit_sha = %commit_sha,
        status = status.map(i64::from).unwrap_or(-1),
    );
}

/// Emit event: publish finished with duration and outcome.
pub fn emit_publish_finished(run_id: &str, duration_ms: u64, success: bool) {
    info!(
        event = "publish.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        success = success,
    );
}

/// Emit event: publish failed (warning level), with the registration
/// outcome when one was resolved.
pub fn emit_publish_failed(
    run_id: &str,
    error: &dyn std::fmt::Display,
    notification: Option<&NotificationStatus>,
) {
    warn!(
        event = "publish.failed",
        run_id = %run_id,
        error = %error,
        notification = notification.map(NotificationStatus::as_str),
    );
}

pub fn emit_notification_sent(name: &str, version: &str) {
    info!(event = "notification.sent", name = %name, version = %version);
}

/// Emit event: registration failed (warning level, never escalated).
pub fn emit_notification_failed(name: &str, error: &dyn std::fmt::Display) {
    warn!(event = "notification.failed", name = %name, error = %error);
}
