use crate::{sha256_hex, AssetCategory, AssetId, AssetStatus, Visibility};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const INITIAL_ASSET_VERSION: &str = "1.0.0";

/// Asset payload. Exactly one interpretation is active per asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssetContent {
    Code { language: String, source: String },
    Config { value: serde_json::Value },
    Data { value: serde_json::Value },
    Documentation { text: String },
    Examples { items: Vec<String> },
}

impl Default for AssetContent {
    fn default() -> Self {
        AssetContent::Documentation {
            text: String::new(),
        }
    }
}

impl AssetContent {
    /// Flatten the payload into text for hashing, indexing and diffing.
    pub fn as_text(&self) -> String {
        match self {
            AssetContent::Code { source, .. } => source.clone(),
            AssetContent::Config { value } | AssetContent::Data { value } => match value {
                serde_json::Value::Null => String::new(),
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            },
            AssetContent::Documentation { text } => text.clone(),
            AssetContent::Examples { items } => items.join("\n"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetFile {
    pub path: String,
    pub content: String,
    #[serde(rename = "type")]
    pub file_type: String,
    pub size: u64,
    pub hash: String,
}

impl AssetFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>, file_type: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            path: path.into(),
            size: content.len() as u64,
            hash: sha256_hex(content.as_bytes()),
            content,
            file_type: file_type.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityFlags {
    pub tested: bool,
    pub documented: bool,
    pub reviewed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetMetadata {
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub downloads: u64,
    pub views: u64,
    pub rating: f64,
    pub rating_count: u64,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_cost: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_time: Option<f64>,
    #[serde(default)]
    pub quality: QualityFlags,
    pub license: String,
}

impl AssetMetadata {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            created: now,
            updated: now,
            downloads: 0,
            views: 0,
            rating: 0.0,
            rating_count: 0,
            size: 0,
            token_cost: None,
            load_time: None,
            quality: QualityFlags::default(),
            license: "MIT".to_string(),
        }
    }
}

impl Default for AssetMetadata {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: AssetId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: AssetCategory,
    #[serde(rename = "type", default)]
    pub asset_type: String,
    pub version: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub keywords: BTreeSet<String>,
    #[serde(default)]
    pub content: AssetContent,
    #[serde(default)]
    pub files: Vec<AssetFile>,
    /// Maintained by the dependency graph; do not edit directly.
    #[serde(default)]
    pub dependencies: Vec<AssetId>,
    /// Maintained by the dependency graph; do not edit directly.
    #[serde(default)]
    pub dependents: Vec<AssetId>,
    #[serde(default)]
    pub metadata: AssetMetadata,
    #[serde(default)]
    pub status: AssetStatus,
    #[serde(default)]
    pub visibility: Visibility,
}

impl Asset {
    pub fn new(id: impl Into<AssetId>, name: impl Into<String>, category: AssetCategory) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            category,
            asset_type: category.as_str().to_string(),
            version: INITIAL_ASSET_VERSION.to_string(),
            author: String::new(),
            tags: BTreeSet::new(),
            keywords: BTreeSet::new(),
            content: AssetContent::default(),
            files: Vec::new(),
            dependencies: Vec::new(),
            dependents: Vec::new(),
            metadata: AssetMetadata::new(),
            status: AssetStatus::default(),
            visibility: Visibility::default(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_type(mut self, asset_type: impl Into<String>) -> Self {
        self.asset_type = asset_type.into();
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_content(mut self, content: AssetContent) -> Self {
        self.content = content;
        self
    }

    pub fn with_file(mut self, file: AssetFile) -> Self {
        self.files.push(file);
        self
    }

    pub fn with_status(mut self, status: AssetStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Stamp `metadata.updated`.
    pub fn touch(&mut self) {
        self.metadata.updated = Utc::now();
    }

    /// Approximate payload size: content text plus attached files.
    pub fn computed_size(&self) -> u64 {
        self.content.as_text().len() as u64 + self.files.iter().map(|f| f.size).sum::<u64>()
    }

    /// Fold a 0..=5 rating into the running average.
    pub fn record_rating(&mut self, rating: f64) {
        let total = self.metadata.rating * self.metadata.rating_count as f64 + rating;
        self.metadata.rating_count += 1;
        self.metadata.rating = total / self.metadata.rating_count as f64;
    }
}

/// Partial update. `None` fields are left untouched.
///
/// Dependencies are deliberately absent: edges change only through the
/// dependency graph so both sides stay consistent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<AssetCategory>,
    pub asset_type: Option<String>,
    pub author: Option<String>,
    pub tags: Option<BTreeSet<String>>,
    pub keywords: Option<BTreeSet<String>>,
    pub content: Option<AssetContent>,
    pub files: Option<Vec<AssetFile>>,
    pub status: Option<AssetStatus>,
    pub visibility: Option<Visibility>,
    pub license: Option<String>,
    pub quality: Option<QualityFlags>,
}

impl AssetPatch {
    /// A patch that restores every patchable field of `snapshot`.
    pub fn from_snapshot(snapshot: &Asset) -> Self {
        Self {
            name: Some(snapshot.name.clone()),
            description: Some(snapshot.description.clone()),
            category: Some(snapshot.category),
            asset_type: Some(snapshot.asset_type.clone()),
            author: Some(snapshot.author.clone()),
            tags: Some(snapshot.tags.clone()),
            keywords: Some(snapshot.keywords.clone()),
            content: Some(snapshot.content.clone()),
            files: Some(snapshot.files.clone()),
            status: Some(snapshot.status),
            visibility: Some(snapshot.visibility),
            license: Some(snapshot.metadata.license.clone()),
            quality: Some(snapshot.metadata.quality.clone()),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == AssetPatch::default()
    }

    /// Merge into `asset` and stamp `metadata.updated`. The id is never touched.
    pub fn apply(&self, asset: &mut Asset) {
        if let Some(name) = &self.name {
            asset.name = name.clone();
        }
        if let Some(description) = &self.description {
            asset.description = description.clone();
        }
        if let Some(category) = self.category {
            asset.category = category;
        }
        if let Some(asset_type) = &self.asset_type {
            asset.asset_type = asset_type.clone();
        }
        if let Some(author) = &self.author {
            asset.author = author.clone();
        }
        if let Some(tags) = &self.tags {
            asset.tags = tags.clone();
        }
        if let Some(keywords) = &self.keywords {
            asset.keywords = keywords.clone();
        }
        if let Some(content) = &self.content {
            asset.content = content.clone();
        }
        if let Some(files) = &self.files {
            asset.files = files.clone();
        }
        if let Some(status) = self.status {
            asset.status = status;
        }
        if let Some(visibility) = self.visibility {
            asset.visibility = visibility;
        }
        if let Some(license) = &self.license {
            asset.metadata.license = license.clone();
        }
        if let Some(quality) = &self.quality {
            asset.metadata.quality = quality.clone();
        }
        asset.metadata.size = asset.computed_size();
        asset.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_as_text() {
        let code = AssetContent::Code {
            language: "tsx".into(),
            source: "export const Button = () => null;".into(),
        };
        assert_eq!(code.as_text(), "export const Button = () => null;");

        let config = AssetContent::Config {
            value: serde_json::json!({"primary": "#fff"}),
        };
        assert_eq!(config.as_text(), r##"{"primary":"#fff"}"##);

        let empty = AssetContent::Data {
            value: serde_json::Value::Null,
        };
        assert!(empty.as_text().is_empty());
    }

    #[test]
    fn test_patch_merges_and_stamps_updated() {
        let mut asset = Asset::new("hero", "Hero", AssetCategory::Components).with_tags(["ui"]);
        let before = asset.metadata.updated;
        std::thread::sleep(std::time::Duration::from_millis(2));

        let patch = AssetPatch {
            description: Some("Landing hero".into()),
            ..Default::default()
        };
        patch.apply(&mut asset);

        assert_eq!(asset.id, "hero");
        assert_eq!(asset.name, "Hero");
        assert_eq!(asset.description, "Landing hero");
        assert!(asset.tags.contains("ui"));
        assert!(asset.metadata.updated > before);
    }

    #[test]
    fn test_record_rating_running_average() {
        let mut asset = Asset::new("a", "A", AssetCategory::Prompts);
        asset.record_rating(4.0);
        asset.record_rating(2.0);
        assert_eq!(asset.metadata.rating_count, 2);
        assert!((asset.metadata.rating - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_asset_json_shape() {
        let asset = Asset::new("tokens", "Tokens", AssetCategory::DesignTokens);
        let value = serde_json::to_value(&asset).unwrap();
        assert_eq!(value["category"], "design-tokens");
        assert_eq!(value["type"], "design-tokens");
        assert_eq!(value["content"]["kind"], "documentation");
        assert!(value["metadata"]["ratingCount"].is_u64());
        let back: Asset = serde_json::from_value(value).unwrap();
        assert_eq!(back, asset);
    }
}
