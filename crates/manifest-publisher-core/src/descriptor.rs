//! Deploy descriptor (`.viaops.yml`) parsing.
//!
//! The descriptor lives at the root of the release archive and declares the
//! namespace prefix used for every environment, the optional flag groups
//! that switch rendering into grouped mode, and the version/product data
//! sent to the artifact registry.
//!
//! Registry fields (`version`, `component-of`) only feed the registration
//! call: when they have the wrong shape they are dropped with a warning and
//! the manifests are still published.

use serde::Deserialize;
use serde_yaml_ng::Value;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::domain::ConfigurationGap;

/// File name of the descriptor, relative to the extracted archive root.
pub const DESCRIPTOR_FILE: &str = ".viaops.yml";

/// A product the released component belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    pub name: String,
}

/// Validated deploy descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployDescriptor {
    pub components: Vec<Component>,
    pub version: Option<String>,
    pub namespace_prefix: String,
    /// `Some` only when at least one flag group is declared.
    pub flag_groups: Option<Vec<String>>,
}

impl DeployDescriptor {
    pub fn is_grouped(&self) -> bool {
        self.flag_groups.is_some()
    }

    /// Namespace for one environment: `{prefix}-{environment}`.
    pub fn namespace_for(&self, environment: &str) -> String {
        format!("{}-{}", self.namespace_prefix, environment)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error(transparent)]
    Gap(#[from] ConfigurationGap),

    #[error("invalid YAML: {0}")]
    Malformed(#[from] serde_yaml_ng::Error),

    #[error("invalid field {field}: {message}")]
    InvalidField { field: &'static str, message: String },

    #[error("failed to read descriptor: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Default, Deserialize)]
struct RawDescriptor {
    #[serde(rename = "component-of", default)]
    component_of: Option<Value>,
    #[serde(default)]
    version: Option<Value>,
    #[serde(default)]
    deploy: Option<RawDeploy>,
}

#[derive(Debug, Default, Deserialize)]
struct RawDeploy {
    #[serde(rename = "namespace-prefix", default)]
    namespace_prefix: Option<String>,
    #[serde(default)]
    flag: Option<Vec<String>>,
}

/// Parse descriptor text.
pub fn parse_descriptor(raw: &str) -> Result<DeployDescriptor, DescriptorError> {
    // An empty document deserializes to unit, not a mapping.
    let raw: RawDescriptor = if raw.trim().is_empty() {
        RawDescriptor::default()
    } else {
        serde_yaml_ng::from_str::<Option<RawDescriptor>>(raw)?.unwrap_or_default()
    };

    let deploy = raw.deploy.unwrap_or_default();
    let namespace_prefix = deploy
        .namespace_prefix
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .ok_or(ConfigurationGap::MissingNamespacePrefix)?;

    let version = match raw.version {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(other) => {
            warn!(value = ?other, "Ignoring descriptor version that is not a string");
            None
        }
    };

    let flag_groups = deploy.flag.filter(|groups| !groups.is_empty());
    if let Some(groups) = &flag_groups {
        if let Some(bad) = groups
            .iter()
            .find(|g| g.trim().is_empty() || g.contains('/') || g.contains(".."))
        {
            return Err(DescriptorError::InvalidField {
                field: "deploy.flag",
                message: format!("'{bad}' is not a valid flag group directory"),
            });
        }
    }

    Ok(DeployDescriptor {
        components: parse_components(raw.component_of),
        version,
        namespace_prefix,
        flag_groups,
    })
}

fn parse_components(raw: Option<Value>) -> Vec<Component> {
    let entries = match raw {
        None | Some(Value::Null) => return Vec::new(),
        Some(Value::Sequence(entries)) => entries,
        Some(other) => {
            warn!(value = ?other, "Ignoring component-of that is not a list");
            return Vec::new();
        }
    };

    entries
        .iter()
        .filter_map(|entry| match entry.get("name").and_then(Value::as_str) {
            Some(name) if !name.trim().is_empty() => Some(Component {
                name: name.trim().to_string(),
            }),
            _ => {
                warn!(entry = ?entry, "Ignoring component-of entry without a name");
                None
            }
        })
        .collect()
}

/// Location of the descriptor inside an extracted archive.
pub fn descriptor_path(root: &Path) -> PathBuf {
    root.join(DESCRIPTOR_FILE)
}

/// Read and parse the descriptor at the archive root.
pub async fn read_descriptor(root: &Path) -> Result<DeployDescriptor, DescriptorError> {
    let path = descriptor_path(root);
    if !tokio::fs::try_exists(&path).await? {
        return Err(ConfigurationGap::MissingDescriptor { path }.into());
    }
    let raw = tokio::fs::read_to_string(&path).await?;
    parse_descriptor(&raw)
}
