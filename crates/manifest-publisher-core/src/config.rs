//! Pipeline configuration.
//!
//! Built once by the caller (the CLI maps flags and environment variables
//! into it) and validated before the pipeline starts. Components never read
//! the process environment themselves.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::domain::{artifact_path, Environment, PublishError, ReleaseEvent, RepoId, Result};
use crate::ref_update::MAX_ATTEMPTS;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublisherConfig {
    /// Owner of the target repository; the release owner when unset.
    pub target_owner: Option<String>,
    /// Repository receiving the rendered manifests.
    pub target_repo: String,
    /// Branch ref in git data API form, e.g. `heads/main`.
    pub target_ref: String,
    /// Environments rendered on every publish, in output order.
    pub environments: Vec<Environment>,
    /// Directory under which per-release staging areas are created.
    pub work_dir: PathBuf,
    /// Chart directory relative to the archive root.
    pub chart_dir: String,
    /// Renderer executable.
    pub helm_bin: PathBuf,
    pub render_timeout_secs: u64,
    pub max_attempts: u32,
    /// Web base used for the registered artifact URL.
    pub web_base_url: String,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            target_owner: None,
            target_repo: "spinnaker".to_string(),
            target_ref: "heads/main".to_string(),
            environments: Environment::ALL.to_vec(),
            work_dir: std::env::temp_dir().join("manifest-publisher"),
            chart_dir: "chart".to_string(),
            helm_bin: PathBuf::from("helm"),
            render_timeout_secs: 120,
            max_attempts: MAX_ATTEMPTS,
            web_base_url: "https://github.com".to_string(),
        }
    }
}

impl PublisherConfig {
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(PublishError::InvalidConfig(msg));

        if self.target_repo.trim().is_empty() || self.target_repo.contains('/') {
            return invalid(format!(
                "target repository '{}' must be a bare repository name",
                self.target_repo
            ));
        }
        if let Some(owner) = &self.target_owner {
            if owner.trim().is_empty() {
                return invalid("target owner must not be empty".to_string());
            }
        }
        if self.target_ref.starts_with("refs/") {
            return invalid(format!(
                "target ref '{}' must omit the refs/ prefix (e.g. heads/main)",
                self.target_ref
            ));
        }
        if self.target_ref.split('/').count() < 2 || self.target_ref.ends_with('/') {
            return invalid(format!(
                "target ref '{}' must look like heads/<branch>",
                self.target_ref
            ));
        }
        if self.environments.is_empty() {
            return invalid("at least one environment is required".to_string());
        }
        let unique: HashSet<_> = self.environments.iter().collect();
        if unique.len() != self.environments.len() {
            return invalid("environments must not repeat".to_string());
        }
        if self.chart_dir.trim().is_empty() || self.chart_dir.contains("..") {
            return invalid(format!("invalid chart directory '{}'", self.chart_dir));
        }
        if self.render_timeout_secs == 0 {
            return invalid("render timeout must be positive".to_string());
        }
        if self.max_attempts == 0 {
            return invalid("max attempts must be at least 1".to_string());
        }
        Ok(())
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }

    /// Target repository for a release.
    pub fn target_for(&self, event: &ReleaseEvent) -> RepoId {
        RepoId::new(
            self.target_owner.as_deref().unwrap_or(event.owner()),
            self.target_repo.as_str(),
        )
    }

    /// Branch name behind `target_ref` (`heads/main` → `main`).
    pub fn branch_name(&self) -> &str {
        self.target_ref
            .split_once('/')
            .map(|(_, branch)| branch)
            .unwrap_or(&self.target_ref)
    }

    /// Environment whose manifest is registered: `sit` when rendered,
    /// otherwise the first configured environment.
    pub fn registered_environment(&self) -> Environment {
        if self.environments.contains(&Environment::Sit) {
            Environment::Sit
        } else {
            self.environments.first().copied().unwrap_or(Environment::Sit)
        }
    }

    /// Browsable URL of the registered manifest, sent to the registry.
    pub fn artifact_url(&self, target: &RepoId, project: &str) -> String {
        format!(
            "{}/{}/{}/blob/{}/{}",
            self.web_base_url.trim_end_matches('/'),
            target.owner,
            target.name,
            self.branch_name(),
            artifact_path(project, self.registered_environment())
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> ReleaseEvent {
        ReleaseEvent::new("acme", "svc", "v1.2.3", "https://example.invalid/zip").unwrap()
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = PublisherConfig::default();
        config.validate().unwrap();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.environments, Environment::ALL.to_vec());
    }

    #[test]
    fn test_target_defaults_to_event_owner() {
        let mut config = PublisherConfig::default();
        assert_eq!(config.target_for(&event()), RepoId::new("acme", "spinnaker"));

        config.target_owner = Some("platform".to_string());
        assert_eq!(
            config.target_for(&event()),
            RepoId::new("platform", "spinnaker")
        );
    }

    #[test]
    fn test_artifact_url() {
        let config = PublisherConfig::default();
        let target = config.target_for(&event());
        assert_eq!(
            config.artifact_url(&target, "svc"),
            "https://github.com/acme/spinnaker/blob/main/svc/deploy-sit.yaml"
        );
    }

    #[test]
    fn test_artifact_url_follows_rendered_environments() {
        let config = PublisherConfig {
            environments: vec![Environment::Hlg, Environment::Prd],
            ..PublisherConfig::default()
        };
        let target = config.target_for(&event());
        assert_eq!(config.registered_environment(), Environment::Hlg);
        assert_eq!(
            config.artifact_url(&target, "svc"),
            "https://github.com/acme/spinnaker/blob/main/svc/deploy-hlg.yaml"
        );
    }

    #[test]
    fn test_invalid_configs_are_rejected() {
        let cases: Vec<Box<dyn Fn(&mut PublisherConfig)>> = vec![
            Box::new(|c| c.target_repo = "acme/spinnaker".to_string()),
            Box::new(|c| c.target_ref = "refs/heads/main".to_string()),
            Box::new(|c| c.target_ref = "main".to_string()),
            Box::new(|c| c.environments.clear()),
            Box::new(|c| c.environments = vec![Environment::Stg, Environment::Stg]),
            Box::new(|c| c.max_attempts = 0),
            Box::new(|c| c.render_timeout_secs = 0),
            Box::new(|c| c.chart_dir = "../chart".to_string()),
        ];
        for mutate in cases {
            let mut config = PublisherConfig::default();
            mutate(&mut config);
            assert!(matches!(
                config.validate(),
                Err(PublishError::InvalidConfig(_))
            ));
        }
    }
}
