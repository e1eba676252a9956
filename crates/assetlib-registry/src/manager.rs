use crate::{AssetRegistry, LocalStore, RegistryQuery, RegistryStats, VersionStore};
use assetlib_cache::{Cache, CacheConfig, CacheStats, ExpiringCache};
use assetlib_core::{
    generate_id, validate_rating, Asset, AssetCategory, AssetError, AssetId, AssetLibConfig,
    AssetPatch, Branch, RemoteStorage, Result, Validate, Version, VersionDiff,
    INITIAL_ASSET_VERSION,
};
use assetlib_graph::{Conflict, Dependency, DependencyGraph, DependencyTree, DependencyType};
use assetlib_search::{SearchEngine, SearchQuery};
use assetlib_transfer::{
    export_to_dir, import_from_path, save_package, ExportBundle, ExportOptions, PackageManifest,
    PackageSpec,
};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, instrument, warn};

const CACHE_KEY_PREFIX: &str = "asset:";
/// Tag carried by cache entries that were fetched from the remote mirror.
const REMOTE_CACHE_TAG: &str = "remote";

fn cache_key(id: &str) -> String {
    format!("{}{}", CACHE_KEY_PREFIX, id)
}

/// What to do when an imported id already exists locally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    #[default]
    Skip,
    Overwrite,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub imported: Vec<AssetId>,
    pub overwritten: Vec<AssetId>,
    pub skipped: Vec<AssetId>,
    pub checksum_valid: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetSearchResult {
    pub asset: Asset,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    pub results: Vec<AssetSearchResult>,
    pub total: usize,
    pub facets: BTreeMap<AssetCategory, usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ManagerStats {
    pub registry: RegistryStats,
    pub cache: CacheStats,
    pub indexed_assets: usize,
    pub dependency_edges: usize,
    pub branches: usize,
}

/// Wires stores, configuration and an optional remote mirror into an
/// [`AssetManager`].
#[derive(Default)]
pub struct AssetManagerBuilder {
    config: AssetLibConfig,
    store: Option<LocalStore>,
    remote: Option<Arc<dyn RemoteStorage>>,
    cache: Option<Arc<dyn Cache<Asset>>>,
}

impl AssetManagerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: AssetLibConfig) -> Self {
        self.config = config;
        self
    }

    /// Overrides `library.root` from the configuration.
    pub fn store(mut self, store: LocalStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn remote(mut self, remote: Arc<dyn RemoteStorage>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn cache(mut self, cache: Arc<dyn Cache<Asset>>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> AssetManager {
        let library = &self.config.library;
        let store = self
            .store
            .or_else(|| match (&library.root, library.persist) {
                (Some(root), true) => Some(LocalStore::new(root.clone())),
                _ => None,
            })
            .map(Arc::new);

        let versions = match &store {
            Some(store) => VersionStore::with_store(store.clone()),
            None => VersionStore::new(),
        };

        let cache: Arc<dyn Cache<Asset>> = match self.cache {
            Some(cache) => cache,
            None => Arc::new(ExpiringCache::<Asset>::new(CacheConfig::from(
                &self.config.cache,
            ))),
        };

        AssetManager {
            registry: AssetRegistry::new(),
            versions,
            graph: RwLock::new(DependencyGraph::new()),
            search_index: SearchEngine::new(self.config.search.clone()),
            cache,
            store,
            remote: self.remote,
            write_locks: DashMap::new(),
            config: self.config,
        }
    }
}

/// Façade over registry, version store, dependency graph, search index and
/// cache.
///
/// Every write runs under a per-asset lock and follows one order: validate,
/// registry write, reindex, version append, cache invalidation, then local
/// persistence and a best-effort remote mirror. Reads go cache first, then
/// registry, then remote.
pub struct AssetManager {
    config: AssetLibConfig,
    registry: AssetRegistry,
    versions: VersionStore,
    graph: RwLock<DependencyGraph>,
    search_index: SearchEngine,
    cache: Arc<dyn Cache<Asset>>,
    store: Option<Arc<LocalStore>>,
    remote: Option<Arc<dyn RemoteStorage>>,
    write_locks: DashMap<AssetId, Arc<Mutex<()>>>,
}

impl AssetManager {
    pub fn builder() -> AssetManagerBuilder {
        AssetManagerBuilder::new()
    }

    /// In-memory manager with default settings.
    pub fn in_memory() -> Self {
        AssetManagerBuilder::new().build()
    }

    /// Build from `config` and load whatever the local store holds.
    pub async fn open(config: AssetLibConfig) -> Result<Self> {
        let manager = AssetManagerBuilder::new().config(config).build();
        manager.load().await?;
        Ok(manager)
    }

    pub fn config(&self) -> &AssetLibConfig {
        &self.config
    }

    /// Read assets, dependency edges and branches from the local store and
    /// rebuild the search index. Version histories load on first use.
    pub async fn load(&self) -> Result<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        store.init().await?;

        let assets = store.load_assets().await?;
        for asset in assets {
            let id = asset.id.clone();
            if let Err(e) = self.registry.register(asset) {
                warn!(asset_id = %id, error = %e, "skipping duplicate persisted asset");
            }
        }

        let edges = store.load_edges().await?;
        let edge_count = edges.len();
        *self.graph.write() = DependencyGraph::from_edges(edges);
        let branches = self.versions.load_branches().await?;

        let all = self.registry.list();
        self.search_index.rebuild(all.iter());

        info!(
            root = %store.root().display(),
            assets = all.len(),
            edges = edge_count,
            branches,
            "loaded asset library"
        );
        Ok(all.len())
    }

    /// Probe the remote mirror and drop cached copies fetched from it
    /// earlier. A failed probe disables nothing: later calls are still
    /// attempted and their errors logged.
    pub async fn initialize_remote(&self) -> bool {
        let Some(remote) = &self.remote else {
            return false;
        };
        let dropped = self.cache.invalidate_tag(REMOTE_CACHE_TAG).await;
        if dropped > 0 {
            debug!(dropped, "dropped cached remote assets");
        }
        match remote.initialize().await {
            Ok(available) => {
                info!(available, "remote storage initialized");
                available
            }
            Err(e) => {
                warn!(error = %e, "remote storage unavailable, using local library only");
                false
            }
        }
    }

    fn write_lock(&self, id: &str) -> Arc<Mutex<()>> {
        self.write_locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Acquire per-asset locks in sorted order so overlapping multi-asset
    /// writes cannot deadlock.
    async fn lock_ids(&self, mut ids: Vec<AssetId>) -> Vec<OwnedMutexGuard<()>> {
        ids.sort();
        ids.dedup();
        let mut guards = Vec::with_capacity(ids.len());
        for id in ids {
            guards.push(self.write_lock(&id).lock_owned().await);
        }
        guards
    }

    fn author_for(&self, asset: &Asset) -> String {
        if asset.author.trim().is_empty() {
            self.config.library.default_author.clone()
        } else {
            asset.author.clone()
        }
    }

    /// Fire-and-forget remote call. Errors are logged and dropped.
    fn mirror<F, Fut>(&self, operation: &'static str, call: F)
    where
        F: FnOnce(Arc<dyn RemoteStorage>) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let Some(remote) = self.remote.clone() else {
            return;
        };
        let pending = call(remote);
        tokio::spawn(async move {
            if let Err(e) = pending.await {
                warn!(operation, error = %e, "remote storage call failed, local state unaffected");
            }
        });
    }

    fn mirror_save(&self, asset: &Asset) {
        let asset = asset.clone();
        self.mirror("save", move |remote| async move { remote.save(&asset).await });
    }

    async fn persist_asset(&self, asset: &Asset) -> Result<()> {
        match &self.store {
            Some(store) => store.save_asset(asset).await,
            None => Ok(()),
        }
    }

    async fn persist_edges(&self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let edges = self.graph.read().all_edges();
        store.save_edges(&edges).await
    }

    /// Everything after the registry write: reindex, append a version, stamp
    /// the version on the canonical record, invalidate, persist, mirror.
    async fn commit(&self, id: &str, changelog: &str) -> Result<Asset> {
        let asset = self.registry.get(id)?;
        self.search_index.index(&asset);

        let version = self
            .versions
            .create_version(&asset, changelog, &self.author_for(&asset))
            .await?;
        let asset = self.registry.set_version(id, &version.version.to_string())?;

        self.cache.delete(&cache_key(id)).await;
        self.persist_asset(&asset).await?;
        self.mirror_save(&asset);
        Ok(asset)
    }

    /// Write a record whose change does not warrant a version: dependents
    /// lists and usage counters.
    async fn refresh_unversioned(&self, asset: Asset) -> Result<Asset> {
        let asset = self.registry.replace(asset)?;
        self.search_index.index(&asset);
        self.cache.delete(&cache_key(&asset.id)).await;
        self.persist_asset(&asset).await?;
        Ok(asset)
    }

    /// Register a new asset at version `1.0.0`. An empty id is generated.
    /// Ids listed in `dependencies` must already exist and are wired as
    /// required dependencies pinned to their current versions.
    #[instrument(skip(self, asset), fields(asset_id = %asset.id))]
    pub async fn create_asset(&self, mut asset: Asset) -> Result<Asset> {
        if asset.id.trim().is_empty() {
            asset.id = generate_id(asset.category.as_str());
        }
        let id = asset.id.clone();

        let mut requested = std::mem::take(&mut asset.dependencies);
        let mut seen = HashSet::new();
        requested.retain(|dep| seen.insert(dep.clone()));
        asset.dependents.clear();

        let mut lock_set = requested.clone();
        lock_set.push(id.clone());
        let _guards = self.lock_ids(lock_set).await;

        asset.version = INITIAL_ASSET_VERSION.to_string();
        asset.author = self.author_for(&asset);
        asset.metadata.size = asset.computed_size();
        asset.touch();
        asset.validate()?;

        if self.registry.contains(&id) {
            return Err(AssetError::AlreadyExists(id));
        }
        let mut pins = Vec::with_capacity(requested.len());
        for dep in &requested {
            if dep == &id {
                return Err(AssetError::CircularDependency(format!("{} -> {}", id, id)));
            }
            let target = self.registry.get(dep).map_err(|_| {
                AssetError::DependencyError(format!("{} depends on unknown asset {}", id, dep))
            })?;
            pins.push(target);
        }

        asset.dependencies = requested;
        self.registry.register(asset)?;

        if !pins.is_empty() {
            {
                let mut graph = self.graph.write();
                for target in &pins {
                    graph.add_dependency(&id, &target.id, &target.version, DependencyType::Required)?;
                }
            }
            for mut target in pins {
                if !target.dependents.contains(&id) {
                    target.dependents.push(id.clone());
                }
                let target = self.refresh_unversioned(target).await?;
                self.mirror_save(&target);
            }
            self.persist_edges().await?;
        }

        let created = self.commit(&id, "Initial version").await?;
        info!(asset_id = %id, category = %created.category, "created asset");
        Ok(created)
    }

    /// Cache, then registry, then the remote mirror.
    #[instrument(skip(self))]
    pub async fn get_asset(&self, id: &str) -> Result<Asset> {
        let key = cache_key(id);
        if let Some(hit) = self.cache.get(&key).await {
            return Ok(hit);
        }

        match self.registry.get(id) {
            Ok(asset) => {
                self.fill_cache(&key, &asset).await;
                Ok(asset)
            }
            Err(AssetError::NotFound(_)) => match self.load_remote(id).await {
                Some(asset) => {
                    let ttl = Some(Duration::from_secs(self.config.cache.default_ttl_secs));
                    self.cache
                        .set_with(&key, asset.clone(), ttl, vec![REMOTE_CACHE_TAG.to_string()])
                        .await;
                    Ok(asset)
                }
                None => Err(AssetError::NotFound(id.to_string())),
            },
            Err(e) => Err(e),
        }
    }

    /// Cache `asset`, then drop it again if the registry moved on while we
    /// were filling; a writer that lands later invalidates on its own.
    async fn fill_cache(&self, key: &str, asset: &Asset) {
        self.cache.set(key, asset.clone()).await;
        let current = self.registry.get(&asset.id).ok();
        if current.as_ref() != Some(asset) {
            self.cache.delete(key).await;
        }
    }

    async fn load_remote(&self, id: &str) -> Option<Asset> {
        let remote = self.remote.as_ref()?;
        match remote.load(id).await {
            Ok(found) => {
                debug!(asset_id = id, found = found.is_some(), "remote lookup");
                found
            }
            Err(e) => {
                warn!(asset_id = id, error = %e, "remote lookup failed");
                None
            }
        }
    }

    #[instrument(skip(self, patch))]
    pub async fn update_asset(
        &self,
        id: &str,
        patch: &AssetPatch,
        changelog: &str,
    ) -> Result<Asset> {
        let _guards = self.lock_ids(vec![id.to_string()]).await;

        let mut candidate = self.registry.get(id)?;
        patch.apply(&mut candidate);
        candidate.validate()?;

        self.registry.update(id, patch)?;
        let changelog = if changelog.trim().is_empty() {
            "Updated asset"
        } else {
            changelog
        };
        self.commit(id, changelog).await
    }

    /// Remove an asset nothing depends on. Its version history is kept.
    #[instrument(skip(self))]
    pub async fn delete_asset(&self, id: &str) -> Result<()> {
        let (_guards, targets) = loop {
            let targets = self.graph.read().get_dependencies(id, false);
            let mut lock_set = targets.clone();
            lock_set.push(id.to_string());
            let guards = self.lock_ids(lock_set).await;
            if self.graph.read().get_dependencies(id, false) == targets {
                break (guards, targets);
            }
        };

        self.registry.get(id)?;
        let dependents = self.graph.read().get_dependents(id, false);
        if !dependents.is_empty() {
            return Err(AssetError::DependencyError(format!(
                "{} is still required by {}",
                id,
                dependents.join(", ")
            )));
        }

        self.graph.write().remove_asset(id);
        self.registry.delete(id)?;
        self.search_index.remove(id);
        self.cache.delete(&cache_key(id)).await;

        for target_id in &targets {
            if let Ok(mut target) = self.registry.get(target_id) {
                target.dependents.retain(|d| d != id);
                let target = self.refresh_unversioned(target).await?;
                self.mirror_save(&target);
            }
        }

        if let Some(store) = &self.store {
            store.delete_asset(id).await?;
        }
        self.persist_edges().await?;

        let owned = id.to_string();
        self.mirror("delete", move |remote| async move { remote.delete(&owned).await });
        info!(asset_id = %id, "deleted asset");
        Ok(())
    }

    /// Registry scan. A category query with no local match is answered from
    /// the remote mirror's category listing, filtered the same way.
    #[instrument(skip(self))]
    pub async fn list_assets(&self, query: &RegistryQuery) -> Vec<Asset> {
        let found = self.registry.search(query);
        if !found.is_empty() {
            return found;
        }
        let (Some(remote), Some(category)) = (&self.remote, query.category) else {
            return found;
        };
        match remote.list_by_category(category).await {
            Ok(assets) => query.apply(assets),
            Err(e) => {
                warn!(%category, error = %e, "remote category listing failed");
                found
            }
        }
    }

    /// Scored search over the index. With no local match and a text query,
    /// the remote mirror is asked instead.
    #[instrument(skip(self))]
    pub async fn search(&self, query: &SearchQuery) -> SearchPage {
        let found = self.search_index.search(query);

        let results: Vec<AssetSearchResult> = found
            .hits
            .into_iter()
            .filter_map(|hit| {
                self.registry.get(&hit.asset_id).ok().map(|asset| AssetSearchResult {
                    asset,
                    score: hit.score,
                    highlight: hit.highlight,
                })
            })
            .collect();

        if found.total == 0 {
            if let Some(remote_results) = self.search_remote(query).await {
                return remote_results;
            }
        }

        SearchPage {
            results,
            total: found.total,
            facets: found.facets,
        }
    }

    async fn search_remote(&self, query: &SearchQuery) -> Option<SearchPage> {
        let remote = self.remote.as_ref()?;
        let text = query.query.as_deref().map(str::trim).filter(|q| !q.is_empty())?;
        match remote.search(text).await {
            Ok(assets) if !assets.is_empty() => {
                let mut facets = BTreeMap::new();
                for asset in &assets {
                    *facets.entry(asset.category).or_insert(0) += 1;
                }
                Some(SearchPage {
                    total: assets.len(),
                    results: assets
                        .into_iter()
                        .map(|asset| AssetSearchResult {
                            asset,
                            score: 1.0,
                            highlight: None,
                        })
                        .collect(),
                    facets,
                })
            }
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "remote search failed");
                None
            }
        }
    }

    pub fn suggest(&self, prefix: &str, limit: usize) -> Vec<String> {
        self.search_index.suggest(prefix, limit)
    }

    /// Add `from -> to`, pinned to `version` or to `to`'s current version.
    /// Both assets' relation lists are updated and `from` gets a new version.
    #[instrument(skip(self))]
    pub async fn add_dependency(
        &self,
        from: &str,
        to: &str,
        version: Option<&str>,
        dep_type: DependencyType,
    ) -> Result<Dependency> {
        let _guards = self.lock_ids(vec![from.to_string(), to.to_string()]).await;

        let mut source = self.registry.get(from)?;
        let mut target = self.registry.get(to)?;
        let version = version
            .map(str::to_string)
            .unwrap_or_else(|| target.version.clone());
        let dep = Dependency::new(from, to, version, dep_type);

        if !self.graph.write().add(dep.clone())? {
            let existing = self.graph.read().direct_version(from, to).cloned();
            return Ok(existing.unwrap_or(dep));
        }

        if !source.dependencies.iter().any(|d| d == to) {
            source.dependencies.push(to.to_string());
        }
        self.registry.replace(source)?;

        if !target.dependents.iter().any(|d| d == from) {
            target.dependents.push(from.to_string());
        }
        let target = self.refresh_unversioned(target).await?;
        self.mirror_save(&target);

        self.persist_edges().await?;
        self.commit(from, &format!("Added dependency on {}", to)).await?;
        Ok(dep)
    }

    #[instrument(skip(self))]
    pub async fn remove_dependency(&self, from: &str, to: &str) -> Result<Dependency> {
        let _guards = self.lock_ids(vec![from.to_string(), to.to_string()]).await;

        let mut source = self.registry.get(from)?;
        let removed = self
            .graph
            .write()
            .remove_dependency(from, to)
            .ok_or_else(|| AssetError::NotFound(format!("dependency {} -> {}", from, to)))?;

        source.dependencies.retain(|d| d != to);
        self.registry.replace(source)?;

        if let Ok(mut target) = self.registry.get(to) {
            target.dependents.retain(|d| d != from);
            let target = self.refresh_unversioned(target).await?;
            self.mirror_save(&target);
        }

        self.persist_edges().await?;
        self.commit(from, &format!("Removed dependency on {}", to)).await?;
        Ok(removed)
    }

    pub fn dependencies(&self, id: &str, transitive: bool) -> Vec<AssetId> {
        self.graph.read().get_dependencies(id, transitive)
    }

    pub fn dependents(&self, id: &str, transitive: bool) -> Vec<AssetId> {
        self.graph.read().get_dependents(id, transitive)
    }

    pub fn dependency_edges(&self, id: &str) -> Vec<Dependency> {
        self.graph.read().dependency_edges(id).to_vec()
    }

    pub fn dependency_tree(&self, id: &str) -> Result<DependencyTree> {
        if !self.registry.contains(id) {
            return Err(AssetError::NotFound(id.to_string()));
        }
        Ok(self.graph.read().build_graph(id))
    }

    /// Conflicts among `ids`. Every requested id and everything it reaches
    /// must be registered, otherwise the graph holds a broken reference.
    pub fn detect_conflicts(&self, ids: &[AssetId]) -> Result<Vec<Conflict>> {
        let graph = self.graph.read();
        for id in ids {
            if !self.registry.contains(id) {
                return Err(AssetError::DependencyError(format!(
                    "conflict check names unknown asset {}",
                    id
                )));
            }
            if let Some(missing) = graph
                .get_dependencies(id, true)
                .into_iter()
                .find(|dep| !self.registry.contains(dep))
            {
                return Err(AssetError::DependencyError(format!(
                    "{} reaches missing asset {}",
                    id, missing
                )));
            }
        }
        Ok(graph.detect_conflicts(ids))
    }

    pub fn topological_order(&self, ids: &[AssetId]) -> Result<Vec<AssetId>> {
        self.graph.read().topological_order(ids)
    }

    /// Every asset `id` transitively depends on.
    pub fn resolve_dependencies(&self, id: &str) -> Result<Vec<Asset>> {
        let snapshot = self.registry.snapshot();
        self.graph.read().resolve(id, &snapshot)
    }

    pub async fn history(&self, id: &str) -> Result<Vec<Version>> {
        self.versions.history(id).await
    }

    pub async fn get_version(&self, version_id: &str) -> Result<Version> {
        self.versions.get_version(version_id).await
    }

    /// Restore the patchable fields of an earlier snapshot through the
    /// normal update path, producing a new version. Dependency edges are
    /// left as they are.
    #[instrument(skip(self))]
    pub async fn rollback(&self, id: &str, version_id: &str) -> Result<Asset> {
        let snapshot = self.versions.rollback(id, version_id).await?;
        let changelog = format!("Rolled back to {}", snapshot.version);
        self.update_asset(id, &AssetPatch::from_snapshot(&snapshot), &changelog)
            .await
    }

    pub async fn diff_versions(&self, from: &str, to: &str) -> Result<VersionDiff> {
        self.versions.diff(from, to).await
    }

    pub async fn tag_version(&self, version_id: &str, tag: &str) -> Result<Version> {
        self.versions.tag_version(version_id, tag).await
    }

    pub async fn get_by_tag(&self, id: &str, tag: &str) -> Result<Option<Version>> {
        self.versions.get_by_tag(id, tag).await
    }

    pub async fn create_branch(
        &self,
        id: &str,
        name: &str,
        from_version: Option<&str>,
    ) -> Result<Branch> {
        if !self.registry.contains(id) {
            return Err(AssetError::NotFound(id.to_string()));
        }
        self.versions.create_branch(id, name, from_version).await
    }

    pub async fn merge_branch(&self, branch_id: &str) -> Result<Branch> {
        self.versions.merge_branch(branch_id).await
    }

    pub async fn abandon_branch(&self, branch_id: &str) -> Result<Branch> {
        self.versions.abandon_branch(branch_id).await
    }

    pub async fn advance_branch(&self, branch_id: &str, version_id: &str) -> Result<Branch> {
        self.versions.advance_branch(branch_id, version_id).await
    }

    pub fn list_branches(&self, id: &str) -> Vec<Branch> {
        self.versions.list_branches(id)
    }

    /// Bundle `ids`, plus everything they depend on when requested.
    pub fn export_bundle(&self, ids: &[AssetId], options: &ExportOptions) -> Result<ExportBundle> {
        let mut seen = HashSet::new();
        let mut assets = Vec::new();
        for id in ids {
            let asset = self.registry.get(id)?;
            if seen.insert(asset.id.clone()) {
                assets.push(asset);
            }
        }

        if options.include_dependencies {
            let snapshot = self.registry.snapshot();
            let graph = self.graph.read();
            for id in ids {
                for dep in graph.resolve(id, &snapshot)? {
                    if seen.insert(dep.id.clone()) {
                        assets.push(dep);
                    }
                }
            }
        }

        ExportBundle::new(assets, options)
    }

    /// Write an export file into `dir`, or into the store's `exports/`.
    #[instrument(skip(self, options))]
    pub async fn export_assets(
        &self,
        ids: &[AssetId],
        options: &ExportOptions,
        dir: Option<&Path>,
    ) -> Result<PathBuf> {
        let bundle = self.export_bundle(ids, options)?;
        let dir = match (dir, &self.store) {
            (Some(dir), _) => dir.to_path_buf(),
            (None, Some(store)) => store.exports_dir(),
            (None, None) => {
                return Err(AssetError::InvalidOperation(
                    "no export directory and no library root configured".to_string(),
                ))
            }
        };
        let name = match ids {
            [single] => single.clone(),
            _ => generate_id("export"),
        };
        export_to_dir(&dir, &name, &bundle, options.format).await
    }

    /// Import a bundle file. Every asset is validated first, so one invalid
    /// record rejects the bundle with nothing written. New ids are created;
    /// existing ids are skipped or overwritten per `mode`. Dependency edges
    /// named in the payload are re-created where both ends exist; failures
    /// there are logged.
    #[instrument(skip(self))]
    pub async fn import_assets(&self, path: &Path, mode: ImportMode) -> Result<ImportSummary> {
        let report = import_from_path(path).await?;

        // Reject the whole bundle before the first write.
        let mut seen = HashSet::new();
        for incoming in &report.assets {
            if !seen.insert(incoming.id.as_str()) {
                return Err(AssetError::Validation(format!(
                    "bundle lists {} more than once",
                    incoming.id
                )));
            }
            incoming
                .validate()
                .map_err(|e| AssetError::Validation(format!("{}: {}", incoming.id, e)))?;
        }

        let mut summary = ImportSummary {
            checksum_valid: report.checksum_valid,
            ..Default::default()
        };

        for incoming in &report.assets {
            let mut asset = incoming.clone();
            asset.dependencies.clear();
            asset.dependents.clear();

            if self.registry.contains(&asset.id) {
                match mode {
                    ImportMode::Skip => summary.skipped.push(asset.id),
                    ImportMode::Overwrite => {
                        self.update_asset(&asset.id, &AssetPatch::from_snapshot(&asset), "Imported")
                            .await?;
                        summary.overwritten.push(asset.id);
                    }
                }
            } else {
                let created = self.create_asset(asset).await?;
                summary.imported.push(created.id);
            }
        }

        for incoming in &report.assets {
            if summary.skipped.contains(&incoming.id) {
                continue;
            }
            for dep in &incoming.dependencies {
                if !self.registry.contains(dep) {
                    warn!(asset_id = %incoming.id, dependency = %dep, "imported dependency is missing");
                    continue;
                }
                if let Err(e) = self
                    .add_dependency(&incoming.id, dep, None, DependencyType::Required)
                    .await
                {
                    warn!(asset_id = %incoming.id, dependency = %dep, error = %e, "could not restore imported dependency");
                }
            }
        }

        info!(
            imported = summary.imported.len(),
            overwritten = summary.overwritten.len(),
            skipped = summary.skipped.len(),
            checksum_valid = summary.checksum_valid,
            "import finished"
        );
        Ok(summary)
    }

    /// Build a manifest over `ids` and save it under `packages/` when a
    /// library root is configured.
    #[instrument(skip(self, spec))]
    pub async fn create_package(&self, spec: PackageSpec, ids: &[AssetId]) -> Result<PackageManifest> {
        let assets = ids
            .iter()
            .map(|id| self.registry.get(id))
            .collect::<Result<Vec<_>>>()?;
        let manifest = assetlib_transfer::create_package(spec, &assets, |id| {
            self.registry.get(id).ok().map(|a| a.version)
        });

        if let Some(store) = &self.store {
            save_package(&store.packages_dir(), &manifest).await?;
        }
        Ok(manifest)
    }

    pub async fn record_download(&self, id: &str) -> Result<Asset> {
        let _guards = self.lock_ids(vec![id.to_string()]).await;
        let mut asset = self.registry.get(id)?;
        asset.metadata.downloads += 1;
        let asset = self.refresh_unversioned(asset).await?;

        let owned = id.to_string();
        self.mirror("increment_downloads", move |remote| async move {
            remote.increment_downloads(&owned).await
        });
        Ok(asset)
    }

    pub async fn rate_asset(&self, id: &str, rating: f64) -> Result<Asset> {
        validate_rating(rating)?;
        let _guards = self.lock_ids(vec![id.to_string()]).await;
        let mut asset = self.registry.get(id)?;
        asset.record_rating(rating);
        let asset = self.refresh_unversioned(asset).await?;
        self.mirror_save(&asset);
        Ok(asset)
    }

    pub async fn stats(&self) -> ManagerStats {
        ManagerStats {
            registry: self.registry.stats(),
            cache: self.cache.stats().await,
            indexed_assets: self.search_index.len(),
            dependency_edges: self.graph.read().edge_count(),
            branches: self.versions.branch_count(),
        }
    }
}
