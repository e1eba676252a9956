use assetlib_core::{Asset, AssetCategory, AssetError, Branch, Result, Version};
use assetlib_graph::Dependency;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const ASSETS_DIR: &str = "assets";
const VERSIONS_DIR: &str = "versions";
const BRANCHES_DIR: &str = "branches";
const EXPORTS_DIR: &str = "exports";
const PACKAGES_DIR: &str = "packages";
const EDGES_FILE: &str = "dependencies.json";

/// One JSON file per record under a library root:
///
/// ```text
/// assets/{category}/{id}.json
/// versions/{assetId}-{versionId}.json
/// branches/{branchId}.json
/// dependencies.json
/// exports/  packages/
/// ```
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn exports_dir(&self) -> PathBuf {
        self.root.join(EXPORTS_DIR)
    }

    pub fn packages_dir(&self) -> PathBuf {
        self.root.join(PACKAGES_DIR)
    }

    pub async fn init(&self) -> Result<()> {
        for dir in [ASSETS_DIR, VERSIONS_DIR, BRANCHES_DIR, EXPORTS_DIR, PACKAGES_DIR] {
            tokio::fs::create_dir_all(self.root.join(dir)).await?;
        }
        debug!(root = %self.root.display(), "local store initialized");
        Ok(())
    }

    fn asset_path(&self, category: AssetCategory, id: &str) -> PathBuf {
        self.root
            .join(ASSETS_DIR)
            .join(category.as_str())
            .join(format!("{}.json", id))
    }

    fn version_path(&self, version: &Version) -> PathBuf {
        self.root
            .join(VERSIONS_DIR)
            .join(format!("{}-{}.json", version.asset_id, version.id))
    }

    fn branch_path(&self, id: &str) -> PathBuf {
        self.root.join(BRANCHES_DIR).join(format!("{}.json", id))
    }

    /// Writes under the asset's category and drops any copy left under
    /// another category by an earlier save.
    pub async fn save_asset(&self, asset: &Asset) -> Result<()> {
        write_json(&self.asset_path(asset.category, &asset.id), asset).await?;
        for category in AssetCategory::ALL {
            if category != asset.category {
                remove_if_exists(&self.asset_path(category, &asset.id)).await?;
            }
        }
        Ok(())
    }

    pub async fn delete_asset(&self, id: &str) -> Result<bool> {
        let mut removed = false;
        for category in AssetCategory::ALL {
            removed |= remove_if_exists(&self.asset_path(category, id)).await?;
        }
        Ok(removed)
    }

    pub async fn load_assets(&self) -> Result<Vec<Asset>> {
        let mut assets = Vec::new();
        for category in AssetCategory::ALL {
            let dir = self.root.join(ASSETS_DIR).join(category.as_str());
            assets.extend(read_json_dir::<Asset, _>(&dir, |_| true).await?);
        }
        assets.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(assets)
    }

    pub async fn save_version(&self, version: &Version) -> Result<()> {
        write_json(&self.version_path(version), version).await
    }

    /// Every stored version of `asset_id`, oldest first.
    pub async fn load_versions(&self, asset_id: &str) -> Result<Vec<Version>> {
        let prefix = format!("{}-", asset_id);
        let dir = self.root.join(VERSIONS_DIR);
        let mut versions: Vec<Version> =
            read_json_dir::<Version, _>(&dir, |name| name.starts_with(&prefix))
                .await?
                .into_iter()
                .filter(|v| v.asset_id == asset_id)
                .collect();
        versions.sort_by(|a, b| (a.version, a.timestamp).cmp(&(b.version, b.timestamp)));
        Ok(versions)
    }

    /// Locate a version by id alone by scanning file names.
    pub async fn find_version(&self, version_id: &str) -> Result<Option<Version>> {
        let suffix = format!("-{}.json", version_id);
        let dir = self.root.join(VERSIONS_DIR);
        let found = read_json_dir::<Version, _>(&dir, |name| name.ends_with(&suffix)).await?;
        Ok(found.into_iter().find(|v| v.id == version_id))
    }

    pub async fn save_branch(&self, branch: &Branch) -> Result<()> {
        write_json(&self.branch_path(&branch.id), branch).await
    }

    pub async fn load_branches(&self) -> Result<Vec<Branch>> {
        read_json_dir::<Branch, _>(&self.root.join(BRANCHES_DIR), |_| true).await
    }

    pub async fn save_edges(&self, edges: &[Dependency]) -> Result<()> {
        write_json(&self.root.join(EDGES_FILE), &edges).await
    }

    pub async fn load_edges(&self) -> Result<Vec<Dependency>> {
        let path = self.root.join(EDGES_FILE);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(AssetError::Io(e)),
        }
    }
}

/// Write through a temp file and rename so readers never see a torn record.
async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

async fn remove_if_exists(path: &Path) -> Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(AssetError::Io(e)),
    }
}

/// Parse every `*.json` in `dir` whose file name passes `keep`. Unreadable
/// records are logged and skipped; a missing directory reads as empty.
async fn read_json_dir<T, F>(dir: &Path, keep: F) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    F: Fn(&str) -> bool,
{
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(AssetError::Io(e)),
    };

    let mut out = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.ends_with(".json") || !keep(name) {
            continue;
        }
        let bytes = tokio::fs::read(&path).await?;
        match serde_json::from_slice::<T>(&bytes) {
            Ok(value) => out.push(value),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable record"),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assetlib_core::{generate_id, BranchStatus, SemVer};
    use chrono::Utc;
    use tempfile::TempDir;

    fn version_of(asset: &Asset, semver: SemVer) -> Version {
        Version {
            id: generate_id("ver"),
            asset_id: asset.id.clone(),
            version: semver,
            changelog: String::new(),
            changes: Vec::new(),
            author: "tester".into(),
            timestamp: Utc::now(),
            snapshot: asset.clone(),
            tags: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_asset_moves_between_categories() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());
        store.init().await.unwrap();

        let mut asset = Asset::new("card", "Card", AssetCategory::Components);
        store.save_asset(&asset).await.unwrap();
        asset.category = AssetCategory::Templates;
        store.save_asset(&asset).await.unwrap();

        let loaded = store.load_assets().await.unwrap();
        assert_eq!(loaded, vec![asset]);
        assert!(dir.path().join("assets/templates/card.json").exists());
        assert!(!dir.path().join("assets/components/card.json").exists());

        assert!(store.delete_asset("card").await.unwrap());
        assert!(store.load_assets().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_versions_filtered_by_asset_and_ordered() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());

        let a = Asset::new("a", "A", AssetCategory::Prompts);
        let a_long = Asset::new("a-b", "AB", AssetCategory::Prompts);
        let v2 = version_of(&a, SemVer::new(1, 0, 1));
        let v1 = version_of(&a, SemVer::INITIAL);
        store.save_version(&v2).await.unwrap();
        store.save_version(&v1).await.unwrap();
        store
            .save_version(&version_of(&a_long, SemVer::INITIAL))
            .await
            .unwrap();

        let history = store.load_versions("a").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, v1.id);

        let found = store.find_version(&v2.id).await.unwrap().unwrap();
        assert_eq!(found, v2);
        assert!(store.find_version("ver-0-missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_branches_and_edges_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());
        store.init().await.unwrap();

        assert!(store.load_edges().await.unwrap().is_empty());
        let edges = vec![Dependency::new(
            "a",
            "b",
            "1.0.0",
            assetlib_graph::DependencyType::Peer,
        )];
        store.save_edges(&edges).await.unwrap();
        assert_eq!(store.load_edges().await.unwrap(), edges);

        let branch = Branch {
            id: generate_id("branch"),
            name: "experiment".into(),
            asset_id: "a".into(),
            base_version: "ver-1".into(),
            head: "ver-1".into(),
            status: BranchStatus::Active,
            created: Utc::now(),
        };
        store.save_branch(&branch).await.unwrap();
        assert_eq!(store.load_branches().await.unwrap(), vec![branch]);
    }

    #[tokio::test]
    async fn test_corrupt_record_is_skipped() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());
        store.init().await.unwrap();
        tokio::fs::create_dir_all(dir.path().join("assets/prompts"))
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("assets/prompts/bad.json"), b"{not json")
            .await
            .unwrap();
        assert!(store.load_assets().await.unwrap().is_empty());
    }
}
