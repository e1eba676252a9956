use assetlib_core::{
    Asset, AssetCategory, AssetError, AssetId, AssetPatch, AssetStatus, Result, TagMatch,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Linear-scan filter over the registry. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegistryQuery {
    pub category: Option<AssetCategory>,
    pub tags: Vec<String>,
    pub tag_match: TagMatch,
    /// Case-insensitive substring of name or description
    pub text: Option<String>,
    pub status: Option<AssetStatus>,
    pub limit: Option<usize>,
}

impl RegistryQuery {
    pub fn category(category: AssetCategory) -> Self {
        Self {
            category: Some(category),
            ..Default::default()
        }
    }

    /// Filter `assets` the way a registry scan does, ordered by id and
    /// capped at `limit`.
    pub fn apply<I>(&self, assets: I) -> Vec<Asset>
    where
        I: IntoIterator<Item = Asset>,
    {
        let needle = self.needle();
        let found = assets
            .into_iter()
            .filter(|a| self.matches(a, needle.as_deref()))
            .collect();
        self.finish(found)
    }

    fn needle(&self) -> Option<String> {
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
    }

    fn finish(&self, mut found: Vec<Asset>) -> Vec<Asset> {
        found.sort_by(|a, b| a.id.cmp(&b.id));
        if let Some(limit) = self.limit {
            found.truncate(limit);
        }
        found
    }

    fn matches(&self, asset: &Asset, needle: Option<&str>) -> bool {
        if self.category.is_some_and(|c| c != asset.category) {
            return false;
        }
        if self.status.is_some_and(|s| s != asset.status) {
            return false;
        }
        if !self.tag_match.matches(&asset.tags, &self.tags) {
            return false;
        }
        match needle {
            Some(needle) => {
                asset.name.to_lowercase().contains(needle)
                    || asset.description.to_lowercase().contains(needle)
            }
            None => true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    pub total: usize,
    pub by_category: BTreeMap<AssetCategory, usize>,
    pub by_status: BTreeMap<AssetStatus, usize>,
    pub total_downloads: u64,
}

/// Authoritative in-memory map of asset id to asset.
#[derive(Default)]
pub struct AssetRegistry {
    assets: RwLock<HashMap<AssetId, Asset>>,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, asset: Asset) -> Result<()> {
        let mut assets = self.assets.write();
        if assets.contains_key(&asset.id) {
            return Err(AssetError::AlreadyExists(asset.id));
        }
        debug!(asset_id = %asset.id, "registered asset");
        assets.insert(asset.id.clone(), asset);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Asset> {
        self.assets
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| AssetError::NotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.assets.read().contains_key(id)
    }

    /// Merge `patch` and stamp `metadata.updated`.
    pub fn update(&self, id: &str, patch: &AssetPatch) -> Result<Asset> {
        let mut assets = self.assets.write();
        let asset = assets
            .get_mut(id)
            .ok_or_else(|| AssetError::NotFound(id.to_string()))?;
        patch.apply(asset);
        Ok(asset.clone())
    }

    /// Overwrite an existing record wholesale. Used for fields a patch cannot
    /// reach, such as dependency lists and counters.
    pub fn replace(&self, mut asset: Asset) -> Result<Asset> {
        let mut assets = self.assets.write();
        let slot = assets
            .get_mut(&asset.id)
            .ok_or_else(|| AssetError::NotFound(asset.id.clone()))?;
        asset.touch();
        *slot = asset;
        Ok(slot.clone())
    }

    pub fn set_version(&self, id: &str, version: &str) -> Result<Asset> {
        let mut assets = self.assets.write();
        let asset = assets
            .get_mut(id)
            .ok_or_else(|| AssetError::NotFound(id.to_string()))?;
        asset.version = version.to_string();
        Ok(asset.clone())
    }

    pub fn delete(&self, id: &str) -> Result<Asset> {
        let removed = self
            .assets
            .write()
            .remove(id)
            .ok_or_else(|| AssetError::NotFound(id.to_string()))?;
        debug!(asset_id = %id, "deleted asset");
        Ok(removed)
    }

    /// Every asset, ordered by id.
    pub fn list(&self) -> Vec<Asset> {
        let mut all: Vec<Asset> = self.assets.read().values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn snapshot(&self) -> HashMap<AssetId, Asset> {
        self.assets.read().clone()
    }

    /// Unindexed scan. Results are ordered by id and capped at `limit`;
    /// there is no offset.
    pub fn search(&self, query: &RegistryQuery) -> Vec<Asset> {
        let needle = query.needle();
        let found = self
            .assets
            .read()
            .values()
            .filter(|a| query.matches(a, needle.as_deref()))
            .cloned()
            .collect();
        query.finish(found)
    }

    pub fn stats(&self) -> RegistryStats {
        let assets = self.assets.read();
        let mut stats = RegistryStats {
            total: assets.len(),
            ..Default::default()
        };
        for asset in assets.values() {
            *stats.by_category.entry(asset.category).or_insert(0) += 1;
            *stats.by_status.entry(asset.status).or_insert(0) += 1;
            stats.total_downloads += asset.metadata.downloads;
        }
        stats
    }

    pub fn len(&self) -> usize {
        self.assets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(assets: Vec<Asset>) -> AssetRegistry {
        let registry = AssetRegistry::new();
        for asset in assets {
            registry.register(asset).unwrap();
        }
        registry
    }

    #[test]
    fn test_register_then_get_is_deep_equal() {
        let asset = Asset::new("hero", "Hero", AssetCategory::Components).with_tags(["ui"]);
        let registry = registry_with(vec![asset.clone()]);
        assert_eq!(registry.get("hero").unwrap(), asset);
    }

    #[test]
    fn test_duplicate_register_fails() {
        let registry = registry_with(vec![Asset::new("a", "A", AssetCategory::Agents)]);
        let err = registry
            .register(Asset::new("a", "Other", AssetCategory::Agents))
            .unwrap_err();
        assert!(matches!(err, AssetError::AlreadyExists(id) if id == "a"));
    }

    #[test]
    fn test_missing_ids_are_not_found() {
        let registry = AssetRegistry::new();
        assert!(matches!(registry.get("x"), Err(AssetError::NotFound(_))));
        assert!(matches!(registry.delete("x"), Err(AssetError::NotFound(_))));
        assert!(matches!(
            registry.update("x", &AssetPatch::default()),
            Err(AssetError::NotFound(_))
        ));
    }

    #[test]
    fn test_update_merges_and_touches() {
        let asset = Asset::new("a", "A", AssetCategory::Agents).with_description("keep");
        let before = asset.metadata.updated;
        let registry = registry_with(vec![asset]);

        let updated = registry
            .update(
                "a",
                &AssetPatch {
                    name: Some("Renamed".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.id, "a");
        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.description, "keep");
        assert!(updated.metadata.updated >= before);
    }

    #[test]
    fn test_search_filters() {
        let registry = registry_with(vec![
            Asset::new("a", "Login form", AssetCategory::Components).with_tags(["form", "auth"]),
            Asset::new("b", "Signup form", AssetCategory::Components).with_tags(["form"]),
            Asset::new("c", "Docs", AssetCategory::Documentation).with_tags(["auth"]),
        ]);

        let all_tags = RegistryQuery {
            tags: vec!["form".into(), "auth".into()],
            ..Default::default()
        };
        assert_eq!(registry.search(&all_tags).len(), 1);

        let any_tags = RegistryQuery {
            tag_match: TagMatch::Any,
            ..all_tags.clone()
        };
        assert_eq!(registry.search(&any_tags).len(), 3);

        let text = RegistryQuery {
            text: Some("FORM".into()),
            limit: Some(1),
            ..RegistryQuery::category(AssetCategory::Components)
        };
        let found = registry.search(&text);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "a");
    }

    #[test]
    fn test_query_applies_to_outside_assets() {
        let query = RegistryQuery {
            text: Some("card".into()),
            limit: Some(1),
            ..RegistryQuery::category(AssetCategory::Components)
        };
        let found = query.apply(vec![
            Asset::new("z", "Card B", AssetCategory::Components),
            Asset::new("y", "Card A", AssetCategory::Components),
            Asset::new("x", "Card", AssetCategory::Templates),
        ]);
        let ids: Vec<_> = found.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["y"]);
    }

    #[test]
    fn test_stats_aggregate() {
        let mut downloaded = Asset::new("a", "A", AssetCategory::Prompts)
            .with_status(AssetStatus::Published);
        downloaded.metadata.downloads = 7;
        let registry = registry_with(vec![
            downloaded,
            Asset::new("b", "B", AssetCategory::Prompts),
            Asset::new("c", "C", AssetCategory::Workflows),
        ]);

        let stats = registry.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_category[&AssetCategory::Prompts], 2);
        assert_eq!(stats.by_status[&AssetStatus::Draft], 2);
        assert_eq!(stats.total_downloads, 7);
    }
}
