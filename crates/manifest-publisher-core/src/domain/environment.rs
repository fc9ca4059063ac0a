//! Deployment environments targeted by every publish.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Target environment. The declaration order is the publish order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Stg,
    Sit,
    Hlg,
    Prd,
}

impl Environment {
    /// Every environment, in publish order.
    pub const ALL: [Environment; 4] = [
        Environment::Stg,
        Environment::Sit,
        Environment::Hlg,
        Environment::Prd,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Stg => "stg",
            Environment::Sit => "sit",
            Environment::Hlg => "hlg",
            Environment::Prd => "prd",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown environment '{0}' (expected one of stg, sit, hlg, prd)")]
pub struct UnknownEnvironment(pub String);

impl FromStr for Environment {
    type Err = UnknownEnvironment;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Environment::ALL
            .into_iter()
            .find(|env| env.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownEnvironment(s.to_string()))
    }
}
