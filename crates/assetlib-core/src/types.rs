use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

pub type AssetId = String;
pub type VersionId = String;
pub type BranchId = String;

const ID_SUFFIX_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_SUFFIX_LEN: usize = 7;

/// Generate a `{prefix}-{millis}-{suffix}` identifier.
///
/// Collisions are unlikely but possible: the suffix is a short random
/// base36 string, not a cryptographic nonce.
pub fn generate_id(prefix: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| ID_SUFFIX_ALPHABET[fastrand::usize(..ID_SUFFIX_ALPHABET.len())] as char)
        .collect();
    format!("{}-{}-{}", prefix, millis, suffix)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssetCategory {
    DesignTokens,
    Templates,
    Components,
    Prompts,
    Workflows,
    Agents,
    Configs,
    Documentation,
}

impl AssetCategory {
    pub const ALL: [AssetCategory; 8] = [
        AssetCategory::DesignTokens,
        AssetCategory::Templates,
        AssetCategory::Components,
        AssetCategory::Prompts,
        AssetCategory::Workflows,
        AssetCategory::Agents,
        AssetCategory::Configs,
        AssetCategory::Documentation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetCategory::DesignTokens => "design-tokens",
            AssetCategory::Templates => "templates",
            AssetCategory::Components => "components",
            AssetCategory::Prompts => "prompts",
            AssetCategory::Workflows => "workflows",
            AssetCategory::Agents => "agents",
            AssetCategory::Configs => "configs",
            AssetCategory::Documentation => "documentation",
        }
    }
}

impl fmt::Display for AssetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AssetCategory::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s.to_lowercase())
            .ok_or_else(|| format!("unknown asset category: {}", s))
    }
}

/// Lifecycle status. Advisory only; transitions are not enforced.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AssetStatus {
    #[default]
    Draft,
    Review,
    Published,
    Deprecated,
    Archived,
}

impl fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AssetStatus::Draft => "draft",
            AssetStatus::Review => "review",
            AssetStatus::Published => "published",
            AssetStatus::Deprecated => "deprecated",
            AssetStatus::Archived => "archived",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for AssetStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(AssetStatus::Draft),
            "review" => Ok(AssetStatus::Review),
            "published" => Ok(AssetStatus::Published),
            "deprecated" => Ok(AssetStatus::Deprecated),
            "archived" => Ok(AssetStatus::Archived),
            other => Err(format!("unknown asset status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
    Team,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
            Visibility::Team => "team",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            "team" => Ok(Visibility::Team),
            other => Err(format!("unknown visibility: {}", other)),
        }
    }
}

/// How a tag filter is applied. Registry scans and the search engine share
/// this contract and both default to `All`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagMatch {
    Any,
    #[default]
    All,
}

impl TagMatch {
    /// Returns true when `tags` satisfies the `wanted` filter. An empty
    /// filter always matches.
    pub fn matches(&self, tags: &BTreeSet<String>, wanted: &[String]) -> bool {
        if wanted.is_empty() {
            return true;
        }
        match self {
            TagMatch::Any => wanted.iter().any(|t| tags.contains(t)),
            TagMatch::All => wanted.iter().all(|t| tags.contains(t)),
        }
    }
}
