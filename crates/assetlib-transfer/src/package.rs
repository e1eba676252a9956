use assetlib_core::{generate_id, Asset, AssetError, AssetId, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Version recorded for a dependency that is not in the lookup.
pub const UNRESOLVED_VERSION: &str = "*";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageMetadata {
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub downloads: u64,
    pub rating: f64,
    pub license: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
}

/// References assets by id; payloads are not embedded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    pub id: String,
    pub name: String,
    pub version: String,
    pub description: String,
    pub author: String,
    pub assets: Vec<AssetId>,
    pub dependencies: BTreeMap<AssetId, String>,
    pub metadata: PackageMetadata,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackageSpec {
    pub name: String,
    pub version: String,
    pub description: String,
    pub author: String,
    pub license: Option<String>,
    pub homepage: Option<String>,
    pub repository: Option<String>,
}

impl PackageSpec {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Default::default()
        }
    }
}

/// Build a manifest for `assets`. Each declared dependency is pinned to the
/// version `resolve_version` reports for it.
pub fn create_package<F>(spec: PackageSpec, assets: &[Asset], resolve_version: F) -> PackageManifest
where
    F: Fn(&str) -> Option<String>,
{
    let mut dependencies = BTreeMap::new();
    for asset in assets {
        for dep in &asset.dependencies {
            let version = assets
                .iter()
                .find(|a| &a.id == dep)
                .map(|a| a.version.clone())
                .or_else(|| resolve_version(dep))
                .unwrap_or_else(|| UNRESOLVED_VERSION.to_string());
            dependencies.insert(dep.clone(), version);
        }
    }

    let now = Utc::now();
    PackageManifest {
        id: generate_id("pkg"),
        name: spec.name,
        version: spec.version,
        description: spec.description,
        author: spec.author,
        assets: assets.iter().map(|a| a.id.clone()).collect(),
        dependencies,
        metadata: PackageMetadata {
            created: now,
            updated: now,
            downloads: 0,
            rating: 0.0,
            license: spec.license.unwrap_or_else(|| "MIT".to_string()),
            homepage: spec.homepage,
            repository: spec.repository,
        },
    }
}

/// Persist as `{dir}/{id}.json`.
pub async fn save_package(dir: &Path, manifest: &PackageManifest) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!("{}.json", manifest.id));
    let json = serde_json::to_vec_pretty(manifest)?;
    tokio::fs::write(&path, json).await?;
    info!(package = %manifest.id, path = %path.display(), "saved package manifest");
    Ok(path)
}

pub async fn load_package(path: &Path) -> Result<PackageManifest> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => AssetError::NotFound(path.display().to_string()),
        _ => AssetError::Io(e),
    })?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assetlib_core::AssetCategory;

    #[test]
    fn test_dependency_versions_resolved() {
        let mut page = Asset::new("page", "Page", AssetCategory::Templates);
        page.dependencies = vec!["button".into(), "tokens".into(), "ghost".into()];
        let mut button = Asset::new("button", "Button", AssetCategory::Components);
        button.version = "1.0.4".into();

        let manifest = create_package(
            PackageSpec::new("starter", "0.1.0"),
            &[page, button],
            |id| (id == "tokens").then(|| "2.1.0".to_string()),
        );

        assert!(manifest.id.starts_with("pkg-"));
        assert_eq!(manifest.assets, vec!["page", "button"]);
        assert_eq!(manifest.dependencies["button"], "1.0.4");
        assert_eq!(manifest.dependencies["tokens"], "2.1.0");
        assert_eq!(manifest.dependencies["ghost"], UNRESOLVED_VERSION);
        assert_eq!(manifest.metadata.license, "MIT");
    }

    #[test]
    fn test_manifest_field_names() {
        let manifest = create_package(PackageSpec::new("p", "1.0.0"), &[], |_| None);
        let json = serde_json::to_value(&manifest).unwrap();
        assert!(json["metadata"].get("created").is_some());
        assert!(json["metadata"].get("homepage").is_none());
        assert!(json["assets"].as_array().unwrap().is_empty());
    }
}
