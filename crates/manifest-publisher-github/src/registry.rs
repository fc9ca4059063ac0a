//! Artifact registry client.
//!
//! Every registration first exchanges the configured password-grant
//! credentials for a bearer token, then posts the artifact.

use async_trait::async_trait;
use tracing::debug;

use manifest_publisher_core::{ArtifactRegistration, ArtifactRegistry, NotificationError};

use crate::config::RegistryConfig;
use crate::error::Result;
use crate::wire::TokenResponse;

fn request_error(err: reqwest::Error) -> NotificationError {
    if err.is_timeout() {
        NotificationError::TimedOut
    } else {
        NotificationError::Request(err.to_string())
    }
}

pub struct RegistryClient {
    config: RegistryConfig,
    http_client: reqwest::Client,
}

impl RegistryClient {
    pub fn new(config: RegistryConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(format!("manifest-publisher/{}", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout())
            .build()?;
        Ok(RegistryClient {
            config,
            http_client,
        })
    }

    /// Exchange the configured credentials for an access token.
    pub async fn access_token(&self) -> std::result::Result<String, NotificationError> {
        let response = self
            .http_client
            .post(&self.config.login_url)
            .form(&self.config.token_form())
            .send()
            .await
            .map_err(|e| match request_error(e) {
                NotificationError::Request(message) => NotificationError::Token(message),
                other => other,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotificationError::Token(format!(
                "login returned HTTP {status}"
            )));
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| NotificationError::Token(e.to_string()))?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl ArtifactRegistry for RegistryClient {
    async fn register(
        &self,
        registration: &ArtifactRegistration,
    ) -> std::result::Result<(), NotificationError> {
        let token = self.access_token().await?;
        let url = self.config.artifacts_url();
        debug!(url = %url, name = %registration.name, "Registering artifact");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(token)
            .json(registration)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(NotificationError::Status {
            status: status.as_u16(),
            body,
        })
    }
}
