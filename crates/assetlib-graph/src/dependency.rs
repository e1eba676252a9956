use assetlib_core::AssetId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyType {
    #[default]
    Required,
    Optional,
    Peer,
    Dev,
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DependencyType::Required => "required",
            DependencyType::Optional => "optional",
            DependencyType::Peer => "peer",
            DependencyType::Dev => "dev",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for DependencyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "required" => Ok(DependencyType::Required),
            "optional" => Ok(DependencyType::Optional),
            "peer" => Ok(DependencyType::Peer),
            "dev" => Ok(DependencyType::Dev),
            other => Err(format!("unknown dependency type: {}", other)),
        }
    }
}

/// Directed edge: `asset_id` depends on `depends_on` at `version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    pub asset_id: AssetId,
    pub depends_on: AssetId,
    pub version: String,
    pub required: bool,
    #[serde(rename = "type")]
    pub dep_type: DependencyType,
}

impl Dependency {
    pub fn new(
        asset_id: impl Into<AssetId>,
        depends_on: impl Into<AssetId>,
        version: impl Into<String>,
        dep_type: DependencyType,
    ) -> Self {
        Self {
            asset_id: asset_id.into(),
            depends_on: depends_on.into(),
            version: version.into(),
            required: matches!(dep_type, DependencyType::Required | DependencyType::Peer),
            dep_type,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// Derived on demand by conflict detection; never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub asset_ids: Vec<AssetId>,
    pub reason: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
}
