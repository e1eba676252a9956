use crate::tokenize;
use assetlib_core::{Asset, AssetCategory, AssetId, AssetStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Fields kept from the asset for filtering and sorting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataProjection {
    pub name: String,
    pub category: AssetCategory,
    pub status: AssetStatus,
    pub tags: BTreeSet<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub rating: f64,
    pub downloads: u64,
}

/// Derived index record for one asset. Replaced wholesale on reindex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchIndexEntry {
    pub asset_id: AssetId,
    /// Tokens from name, description and tags, duplicates kept
    pub tokens: Vec<String>,
    /// Lower-cased content text and file bodies
    pub content_blob: String,
    /// The same text in its original case, cut for highlights
    #[serde(default)]
    pub content_text: String,
    pub metadata: MetadataProjection,
    #[serde(skip)]
    frequencies: HashMap<String, usize>,
}

impl SearchIndexEntry {
    pub fn from_asset(asset: &Asset) -> Self {
        let mut source = format!("{} {}", asset.name, asset.description);
        for tag in &asset.tags {
            source.push(' ');
            source.push_str(tag);
        }
        let tokens = tokenize(&source);

        let mut content_blob = asset.content.as_text();
        for file in &asset.files {
            content_blob.push('\n');
            content_blob.push_str(&file.content);
        }

        let mut entry = Self {
            asset_id: asset.id.clone(),
            tokens,
            content_blob: content_blob.to_lowercase(),
            content_text: content_blob,
            metadata: MetadataProjection {
                name: asset.name.clone(),
                category: asset.category,
                status: asset.status,
                tags: asset.tags.clone(),
                created: asset.metadata.created,
                updated: asset.metadata.updated,
                rating: asset.metadata.rating,
                downloads: asset.metadata.downloads,
            },
            frequencies: HashMap::new(),
        };
        entry.count_tokens();
        entry
    }

    fn count_tokens(&mut self) {
        self.frequencies.clear();
        for token in &self.tokens {
            *self.frequencies.entry(token.clone()).or_insert(0) += 1;
        }
    }

    /// Occurrences of `token` among the indexed tokens.
    pub fn frequency(&self, token: &str) -> usize {
        if self.frequencies.is_empty() && !self.tokens.is_empty() {
            return self.tokens.iter().filter(|t| t.as_str() == token).count();
        }
        self.frequencies.get(token).copied().unwrap_or(0)
    }

    /// Original-case text when present, else the lower-cased blob.
    pub fn display_text(&self) -> &str {
        if self.content_text.is_empty() {
            &self.content_blob
        } else {
            &self.content_text
        }
    }

    pub fn distinct_tokens(&self) -> impl Iterator<Item = &String> {
        self.frequencies.keys()
    }
}
