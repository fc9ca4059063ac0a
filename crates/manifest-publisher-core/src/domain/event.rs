//! Release events that trigger a publish.

use serde::{Deserialize, Serialize};

use super::error::{PublishError, Result};

/// A published release of a source repository.
///
/// Fields are validated once at construction; every downstream identifier
/// (artifact paths, commit message) derives from them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseEvent {
    owner: String,
    repository: String,
    tag_name: String,
    archive_url: String,
}

impl ReleaseEvent {
    pub fn new(
        owner: impl Into<String>,
        repository: impl Into<String>,
        tag_name: impl Into<String>,
        archive_url: impl Into<String>,
    ) -> Result<Self> {
        let event = Self {
            owner: owner.into(),
            repository: repository.into(),
            tag_name: tag_name.into(),
            archive_url: archive_url.into(),
        };

        for (field, value) in [
            ("repository owner", &event.owner),
            ("repository name", &event.repository),
            ("tag name", &event.tag_name),
            ("archive url", &event.archive_url),
        ] {
            if value.trim().is_empty() {
                return Err(PublishError::InvalidEvent(format!("{field} is empty")));
            }
        }
        if event.repository.contains('/') {
            return Err(PublishError::InvalidEvent(format!(
                "repository name '{}' must not contain '/'",
                event.repository
            )));
        }

        Ok(event)
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Short repository name; doubles as the project name in the target repo.
    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag_name(&self) -> &str {
        &self.tag_name
    }

    pub fn archive_url(&self) -> &str {
        &self.archive_url
    }
}

/// Subset of a GitHub `release` webhook payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ReleasePayload {
    pub action: String,
    pub release: ReleaseBody,
    pub repository: RepositoryBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseBody {
    pub tag_name: String,
    #[serde(default)]
    pub zipball_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryBody {
    pub name: String,
    pub owner: OwnerBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OwnerBody {
    pub login: String,
}

impl ReleasePayload {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| PublishError::InvalidEvent(e.to_string()))
    }

    /// Only `released` actions publish manifests; drafts and pre-releases do not.
    pub fn is_released(&self) -> bool {
        self.action == "released"
    }

    pub fn into_event(self) -> Result<ReleaseEvent> {
        let archive_url = self.release.zipball_url.ok_or_else(|| {
            PublishError::InvalidEvent("release has no zipball_url".to_string())
        })?;
        ReleaseEvent::new(
            self.repository.owner.login,
            self.repository.name,
            self.release.tag_name,
            archive_url,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &str = r#"{
        "action": "released",
        "release": {
            "tag_name": "v1.2.3",
            "zipball_url": "https://api.github.com/repos/acme/svc/zipball/v1.2.3",
            "draft": false
        },
        "repository": {
            "name": "svc",
            "full_name": "acme/svc",
            "owner": { "login": "acme", "id": 7 }
        },
        "sender": { "login": "octocat" }
    }"#;

    #[test]
    fn test_payload_into_event() {
        let payload = ReleasePayload::from_json(PAYLOAD).unwrap();
        assert!(payload.is_released());

        let event = payload.into_event().unwrap();
        assert_eq!(event.owner(), "acme");
        assert_eq!(event.repository(), "svc");
        assert_eq!(event.tag_name(), "v1.2.3");
        assert!(event.archive_url().ends_with("/zipball/v1.2.3"));
    }

    #[test]
    fn test_non_released_action_is_not_published() {
        let raw = PAYLOAD.replace("\"released\"", "\"prereleased\"");
        let payload = ReleasePayload::from_json(&raw).unwrap();
        assert!(!payload.is_released());
    }

    #[test]
    fn test_missing_zipball_is_rejected() {
        let raw = PAYLOAD.replace(
            "\"zipball_url\": \"https://api.github.com/repos/acme/svc/zipball/v1.2.3\",",
            "",
        );
        let payload = ReleasePayload::from_json(&raw).unwrap();
        assert!(matches!(
            payload.into_event(),
            Err(PublishError::InvalidEvent(_))
        ));
    }

    #[test]
    fn test_empty_fields_are_rejected() {
        assert!(ReleaseEvent::new("acme", "", "v1", "https://x").is_err());
        assert!(ReleaseEvent::new("acme", "svc", "  ", "https://x").is_err());
        assert!(ReleaseEvent::new("acme", "a/b", "v1", "https://x").is_err());
    }
}
