//! Artifact registration notification.
//!
//! Registration is a side channel: it runs as its own task, independently of
//! the commit outcome, and its failures are logged and reported but never
//! turn into pipeline errors.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{warn, Instrument};

use crate::descriptor::DeployDescriptor;
use crate::obs;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotificationError {
    #[error("token exchange failed: {0}")]
    Token(String),

    #[error("registry request failed: {0}")]
    Request(String),

    #[error("registry returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("registry request timed out")]
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub product_name: String,
}

/// Body of the registration call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactRegistration {
    pub name: String,
    pub url: String,
    pub version: String,
    pub products: Vec<Product>,
    #[serde(rename = "type")]
    pub kind: String,
}

impl ArtifactRegistration {
    pub const HELM: &'static str = "Helm";

    /// Build the registration for a project, or explain why it cannot be sent.
    pub fn from_descriptor(
        project: &str,
        url: String,
        descriptor: &DeployDescriptor,
    ) -> std::result::Result<Self, String> {
        let version = descriptor
            .version
            .clone()
            .ok_or_else(|| "descriptor has no version".to_string())?;
        if descriptor.components.is_empty() {
            return Err("descriptor has no component-of entries".to_string());
        }

        Ok(Self {
            name: project.to_string(),
            url,
            version,
            products: descriptor
                .components
                .iter()
                .map(|c| Product {
                    product_name: c.name.clone(),
                })
                .collect(),
            kind: Self::HELM.to_string(),
        })
    }
}

/// Receiver of artifact registrations.
#[async_trait]
pub trait ArtifactRegistry: Send + Sync {
    async fn register(
        &self,
        registration: &ArtifactRegistration,
    ) -> std::result::Result<(), NotificationError>;
}

/// What happened to the registration call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NotificationStatus {
    Sent,
    Failed { error: String },
    Skipped { reason: String },
    Disabled,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Sent => "sent",
            NotificationStatus::Failed { .. } => "failed",
            NotificationStatus::Skipped { .. } => "skipped",
            NotificationStatus::Disabled => "disabled",
        }
    }
}

/// Spawn the registration call on its own task, inside the caller's span.
pub fn dispatch_registration(
    registry: Arc<dyn ArtifactRegistry>,
    registration: ArtifactRegistration,
) -> JoinHandle<NotificationStatus> {
    tokio::spawn(async move {
        match registry.register(&registration).await {
            Ok(()) => {
                obs::emit_notification_sent(&registration.name, &registration.version);
                NotificationStatus::Sent
            }
            Err(e) => {
                obs::emit_notification_failed(&registration.name, &e);
                NotificationStatus::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
    .in_current_span())
}

/// Wait for a dispatched registration, folding task panics into `Failed`.
pub async fn await_registration(handle: JoinHandle<NotificationStatus>) -> NotificationStatus {
    match handle.await {
        Ok(status) => status,
        Err(e) => {
            warn!(error = %e, "Registration task did not complete");
            NotificationStatus::Failed {
                error: e.to_string(),
            }
        }
    }
}
