use crate::{Asset, AssetError, AssetId, BranchId, VersionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Components roll over when they reach this value.
pub const VERSION_COMPONENT_LIMIT: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SemVer {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SemVer {
    pub const INITIAL: SemVer = SemVer {
        major: 1,
        minor: 0,
        patch: 0,
    };

    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Next patch version. A patch of 100 rolls into the minor, a minor of
    /// 100 rolls into the major: `1.0.99 -> 1.1.0`, `1.99.99 -> 2.0.0`.
    pub fn next(&self) -> Self {
        let mut next = SemVer::new(self.major, self.minor, self.patch + 1);
        if next.patch >= VERSION_COMPONENT_LIMIT {
            next.patch = 0;
            next.minor += 1;
        }
        if next.minor >= VERSION_COMPONENT_LIMIT {
            next.minor = 0;
            next.major += 1;
        }
        next
    }
}

impl Default for SemVer {
    fn default() -> Self {
        SemVer::INITIAL
    }
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SemVer {
    type Err = AssetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().trim_start_matches('v').split('.').collect();
        if parts.len() != 3 {
            return Err(AssetError::VersionError(format!("invalid version string: {}", s)));
        }
        let parse = |p: &str| {
            p.parse::<u32>()
                .map_err(|_| AssetError::VersionError(format!("invalid version string: {}", s)))
        };
        Ok(SemVer::new(parse(parts[0])?, parse(parts[1])?, parse(parts[2])?))
    }
}

impl TryFrom<String> for SemVer {
    type Error = AssetError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SemVer> for String {
    fn from(value: SemVer) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Removed,
    Modified,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
}

impl Change {
    pub fn added(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            change_type: ChangeType::Added,
            field: field.into(),
            before: None,
            after: Some(value.into()),
        }
    }

    pub fn removed(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            change_type: ChangeType::Removed,
            field: field.into(),
            before: Some(value.into()),
            after: None,
        }
    }

    pub fn modified(
        field: impl Into<String>,
        before: impl Into<String>,
        after: impl Into<String>,
    ) -> Self {
        Self {
            change_type: ChangeType::Modified,
            field: field.into(),
            before: Some(before.into()),
            after: Some(after.into()),
        }
    }
}

/// Immutable snapshot of an asset at a point in its history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    pub id: VersionId,
    pub asset_id: AssetId,
    pub version: SemVer,
    pub changelog: String,
    pub changes: Vec<Change>,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    pub snapshot: Asset,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchStatus {
    Active,
    Merged,
    Abandoned,
}

/// Named pointer into an asset's history. Merging only flips the status;
/// content is never combined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub id: BranchId,
    pub name: String,
    pub asset_id: AssetId,
    pub base_version: VersionId,
    pub head: VersionId,
    pub status: BranchStatus,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionDiff {
    pub from: VersionId,
    pub to: VersionId,
    pub changes: Vec<Change>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_increments_patch() {
        assert_eq!(SemVer::INITIAL.next(), SemVer::new(1, 0, 1));
    }

    #[test]
    fn test_next_rolls_over() {
        assert_eq!(SemVer::new(1, 0, 99).next(), SemVer::new(1, 1, 0));
        assert_eq!(SemVer::new(1, 99, 99).next(), SemVer::new(2, 0, 0));
        assert_eq!(SemVer::new(1, 99, 98).next(), SemVer::new(1, 99, 99));
    }

    #[test]
    fn test_parse_and_display() {
        let v: SemVer = "2.10.3".parse().unwrap();
        assert_eq!(v, SemVer::new(2, 10, 3));
        assert_eq!(v.to_string(), "2.10.3");
        assert!("1.0".parse::<SemVer>().is_err());
        assert!("1.x.0".parse::<SemVer>().is_err());
    }

    #[test]
    fn test_ordering_is_numeric() {
        assert!(SemVer::new(1, 0, 10) > SemVer::new(1, 0, 9));
        assert!(SemVer::new(2, 0, 0) > SemVer::new(1, 99, 99));
    }

    #[test]
    fn test_serializes_as_string() {
        let json = serde_json::to_string(&SemVer::new(1, 2, 3)).unwrap();
        assert_eq!(json, "\"1.2.3\"");
        let back: SemVer = serde_json::from_str(&json).unwrap();
        assert_eq!(back, SemVer::new(1, 2, 3));
    }
}
