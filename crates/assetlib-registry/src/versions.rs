use crate::LocalStore;
use assetlib_core::{
    content_hash, generate_id, Asset, AssetError, AssetId, Branch, BranchId, BranchStatus,
    Change, Result, SemVer, Version, VersionDiff, VersionId,
};
use chrono::Utc;
use parking_lot::RwLock;
use similar::{ChangeTag, TextDiff};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Characters kept on each side of a content change.
pub const DIFF_PREVIEW_CHARS: usize = 200;

#[derive(Default)]
struct VersionState {
    histories: HashMap<AssetId, Vec<Version>>,
    loaded: HashSet<AssetId>,
    branches: HashMap<BranchId, Branch>,
}

impl VersionState {
    fn find(&self, version_id: &str) -> Option<&Version> {
        self.histories
            .values()
            .flat_map(|h| h.iter())
            .find(|v| v.id == version_id)
    }
}

/// Append-only per-asset history with branch pointers.
///
/// With a [`LocalStore`] attached every version and branch is written to its
/// own record, and an asset's history is read from disk the first time it is
/// touched.
#[derive(Default)]
pub struct VersionStore {
    state: RwLock<VersionState>,
    store: Option<Arc<LocalStore>>,
}

impl VersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(store: Arc<LocalStore>) -> Self {
        Self {
            state: RwLock::new(VersionState::default()),
            store: Some(store),
        }
    }

    /// Read every persisted branch. Histories stay lazy.
    pub async fn load_branches(&self) -> Result<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let branches = store.load_branches().await?;
        let count = branches.len();
        let mut state = self.state.write();
        for branch in branches {
            state.branches.insert(branch.id.clone(), branch);
        }
        Ok(count)
    }

    async fn ensure_loaded(&self, asset_id: &str) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        if self.state.read().loaded.contains(asset_id) {
            return Ok(());
        }

        let persisted = store.load_versions(asset_id).await?;

        let mut state = self.state.write();
        if state.loaded.insert(asset_id.to_string()) {
            let history = state.histories.entry(asset_id.to_string()).or_default();
            let known: HashSet<VersionId> = history.iter().map(|v| v.id.clone()).collect();
            history.extend(persisted.into_iter().filter(|v| !known.contains(&v.id)));
            history.sort_by(|a, b| (a.version, a.timestamp).cmp(&(b.version, b.timestamp)));
            debug!(asset_id, versions = history.len(), "loaded version history");
        }
        Ok(())
    }

    async fn persist_version(&self, version: &Version) -> Result<()> {
        match &self.store {
            Some(store) => store.save_version(version).await,
            None => Ok(()),
        }
    }

    async fn persist_branch(&self, branch: &Branch) -> Result<()> {
        match &self.store {
            Some(store) => store.save_branch(branch).await,
            None => Ok(()),
        }
    }

    /// Append a snapshot of `asset`. The first version is `1.0.0`; later ones
    /// follow [`SemVer::next`]. The stored snapshot carries the new version.
    pub async fn create_version(
        &self,
        asset: &Asset,
        changelog: &str,
        author: &str,
    ) -> Result<Version> {
        self.ensure_loaded(&asset.id).await?;

        let version = {
            let mut state = self.state.write();
            let history = state.histories.entry(asset.id.clone()).or_default();
            let previous = history.last();

            let number = previous
                .map(|p| p.version.next())
                .unwrap_or(SemVer::INITIAL);
            if let Some(prev) = previous {
                if number <= prev.version {
                    return Err(AssetError::VersionError(format!(
                        "version {} for {} does not advance past {}",
                        number, asset.id, prev.version
                    )));
                }
            }

            let changes = match previous {
                Some(prev) => diff_assets(&prev.snapshot, asset),
                None => vec![Change::added("asset", asset.name.clone())],
            };

            let mut snapshot = asset.clone();
            snapshot.version = number.to_string();

            let version = Version {
                id: generate_id("ver"),
                asset_id: asset.id.clone(),
                version: number,
                changelog: changelog.to_string(),
                changes,
                author: author.to_string(),
                timestamp: Utc::now(),
                snapshot,
                tags: Vec::new(),
            };
            history.push(version.clone());
            version
        };

        self.persist_version(&version).await?;
        info!(asset_id = %asset.id, version = %version.version, "created version");
        Ok(version)
    }

    async fn find(&self, version_id: &str) -> Result<Option<Version>> {
        if let Some(found) = self.state.read().find(version_id) {
            return Ok(Some(found.clone()));
        }
        let Some(store) = &self.store else {
            return Ok(None);
        };
        match store.find_version(version_id).await? {
            Some(found) => {
                self.ensure_loaded(&found.asset_id).await?;
                Ok(self.state.read().find(version_id).cloned().or(Some(found)))
            }
            None => Ok(None),
        }
    }

    pub async fn get_version(&self, version_id: &str) -> Result<Version> {
        self.find(version_id)
            .await?
            .ok_or_else(|| AssetError::NotFound(format!("version {}", version_id)))
    }

    /// Oldest first.
    pub async fn history(&self, asset_id: &str) -> Result<Vec<Version>> {
        self.ensure_loaded(asset_id).await?;
        Ok(self
            .state
            .read()
            .histories
            .get(asset_id)
            .cloned()
            .unwrap_or_default())
    }

    pub async fn latest(&self, asset_id: &str) -> Result<Option<Version>> {
        self.ensure_loaded(asset_id).await?;
        Ok(self
            .state
            .read()
            .histories
            .get(asset_id)
            .and_then(|h| h.last().cloned()))
    }

    pub async fn get_by_tag(&self, asset_id: &str, tag: &str) -> Result<Option<Version>> {
        self.ensure_loaded(asset_id).await?;
        Ok(self.state.read().histories.get(asset_id).and_then(|h| {
            h.iter()
                .rev()
                .find(|v| v.tags.iter().any(|t| t == tag))
                .cloned()
        }))
    }

    /// Attach `tag` to a version. A tag names one version per asset, so it
    /// moves off any sibling that held it.
    pub async fn tag_version(&self, version_id: &str, tag: &str) -> Result<Version> {
        let target = self
            .find(version_id)
            .await?
            .ok_or_else(|| AssetError::NotFound(format!("version {}", version_id)))?;

        let (tagged, changed) = {
            let mut state = self.state.write();
            let history = state
                .histories
                .get_mut(&target.asset_id)
                .ok_or_else(|| AssetError::NotFound(format!("version {}", version_id)))?;

            let mut changed = Vec::new();
            let mut tagged = None;
            for version in history.iter_mut() {
                if version.id == version_id {
                    if !version.tags.iter().any(|t| t == tag) {
                        version.tags.push(tag.to_string());
                        changed.push(version.clone());
                    }
                    tagged = Some(version.clone());
                } else if version.tags.iter().any(|t| t == tag) {
                    version.tags.retain(|t| t != tag);
                    changed.push(version.clone());
                }
            }
            let tagged =
                tagged.ok_or_else(|| AssetError::NotFound(format!("version {}", version_id)))?;
            (tagged, changed)
        };

        for version in &changed {
            self.persist_version(version).await?;
        }
        debug!(version_id, tag, "tagged version");
        Ok(tagged)
    }

    /// Copy of the snapshot stored for `version_id`. Nothing is written back;
    /// the caller applies it as an ordinary update.
    pub async fn rollback(&self, asset_id: &str, version_id: &str) -> Result<Asset> {
        let version = self.find(version_id).await?.ok_or_else(|| {
            AssetError::VersionError(format!("cannot roll back to unknown version {}", version_id))
        })?;
        if version.asset_id != asset_id {
            return Err(AssetError::VersionError(format!(
                "version {} belongs to {}, not {}",
                version_id, version.asset_id, asset_id
            )));
        }
        Ok(version.snapshot)
    }

    /// Compare two snapshots, whatever assets or branches they come from.
    pub async fn diff(&self, from: &str, to: &str) -> Result<VersionDiff> {
        let missing = |id: &str| AssetError::VersionError(format!("cannot diff unknown version {}", id));
        let a = self.find(from).await?.ok_or_else(|| missing(from))?;
        let b = self.find(to).await?.ok_or_else(|| missing(to))?;
        Ok(VersionDiff {
            from: a.id,
            to: b.id,
            changes: diff_assets(&a.snapshot, &b.snapshot),
        })
    }

    /// Branch from `from_version`, or from the latest version when `None`.
    pub async fn create_branch(
        &self,
        asset_id: &str,
        name: &str,
        from_version: Option<&str>,
    ) -> Result<Branch> {
        let base = match from_version {
            Some(version_id) => {
                let version = self.find(version_id).await?.ok_or_else(|| {
                    AssetError::VersionError(format!("unknown base version {}", version_id))
                })?;
                if version.asset_id != asset_id {
                    return Err(AssetError::VersionError(format!(
                        "version {} belongs to {}",
                        version_id, version.asset_id
                    )));
                }
                version
            }
            None => self.latest(asset_id).await?.ok_or_else(|| {
                AssetError::VersionError(format!("{} has no versions to branch from", asset_id))
            })?,
        };

        let branch = {
            let mut state = self.state.write();
            let taken = state.branches.values().any(|b| {
                b.asset_id == asset_id && b.name == name && b.status == BranchStatus::Active
            });
            if taken {
                return Err(AssetError::AlreadyExists(format!(
                    "branch {} on {}",
                    name, asset_id
                )));
            }
            let branch = Branch {
                id: generate_id("branch"),
                name: name.to_string(),
                asset_id: asset_id.to_string(),
                base_version: base.id.clone(),
                head: base.id,
                status: BranchStatus::Active,
                created: Utc::now(),
            };
            state.branches.insert(branch.id.clone(), branch.clone());
            branch
        };

        self.persist_branch(&branch).await?;
        info!(asset_id, branch = %branch.name, "created branch");
        Ok(branch)
    }

    pub fn get_branch(&self, branch_id: &str) -> Result<Branch> {
        self.state
            .read()
            .branches
            .get(branch_id)
            .cloned()
            .ok_or_else(|| AssetError::NotFound(format!("branch {}", branch_id)))
    }

    pub fn list_branches(&self, asset_id: &str) -> Vec<Branch> {
        let mut branches: Vec<Branch> = self
            .state
            .read()
            .branches
            .values()
            .filter(|b| b.asset_id == asset_id)
            .cloned()
            .collect();
        branches.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
        branches
    }

    fn transition(&self, branch_id: &str, to: BranchStatus) -> Result<Branch> {
        let mut state = self.state.write();
        let branch = state
            .branches
            .get_mut(branch_id)
            .ok_or_else(|| AssetError::NotFound(format!("branch {}", branch_id)))?;
        if branch.status != BranchStatus::Active {
            return Err(AssetError::InvalidOperation(format!(
                "branch {} is {:?}, only active branches can change state",
                branch.name, branch.status
            )));
        }
        branch.status = to;
        Ok(branch.clone())
    }

    /// Marks the branch merged. Content is not combined.
    pub async fn merge_branch(&self, branch_id: &str) -> Result<Branch> {
        let branch = self.transition(branch_id, BranchStatus::Merged)?;
        self.persist_branch(&branch).await?;
        info!(branch = %branch.name, "merged branch");
        Ok(branch)
    }

    pub async fn abandon_branch(&self, branch_id: &str) -> Result<Branch> {
        let branch = self.transition(branch_id, BranchStatus::Abandoned)?;
        self.persist_branch(&branch).await?;
        info!(branch = %branch.name, "abandoned branch");
        Ok(branch)
    }

    /// Point an active branch's head at another version of the same asset.
    pub async fn advance_branch(&self, branch_id: &str, version_id: &str) -> Result<Branch> {
        let current = self.get_branch(branch_id)?;
        let version = self.find(version_id).await?.ok_or_else(|| {
            AssetError::VersionError(format!("unknown version {}", version_id))
        })?;
        if version.asset_id != current.asset_id {
            return Err(AssetError::VersionError(format!(
                "version {} does not belong to {}",
                version_id, current.asset_id
            )));
        }

        let branch = {
            let mut state = self.state.write();
            let branch = state
                .branches
                .get_mut(branch_id)
                .ok_or_else(|| AssetError::NotFound(format!("branch {}", branch_id)))?;
            if branch.status != BranchStatus::Active {
                return Err(AssetError::InvalidOperation(format!(
                    "branch {} is not active",
                    branch.name
                )));
            }
            branch.head = version.id;
            branch.clone()
        };

        self.persist_branch(&branch).await?;
        Ok(branch)
    }

    pub fn branch_count(&self) -> usize {
        self.state.read().branches.len()
    }
}

/// Field-level changes from `before` to `after`: name and description,
/// tag and dependency set differences, and one content entry when the
/// content hash differs.
pub fn diff_assets(before: &Asset, after: &Asset) -> Vec<Change> {
    let mut changes = Vec::new();

    if before.name != after.name {
        changes.push(Change::modified("name", before.name.clone(), after.name.clone()));
    }
    if before.description != after.description {
        changes.push(Change::modified(
            "description",
            before.description.clone(),
            after.description.clone(),
        ));
    }

    set_changes(&mut changes, "tags", before.tags.iter(), after.tags.iter());
    set_changes(
        &mut changes,
        "dependencies",
        before.dependencies.iter(),
        after.dependencies.iter(),
    );

    if content_hash(before) != content_hash(after) {
        changes.push(content_change(before, after));
    }

    changes
}

fn set_changes<'a, I>(changes: &mut Vec<Change>, field: &str, before: I, after: I)
where
    I: Iterator<Item = &'a String>,
{
    let before: BTreeSet<&String> = before.collect();
    let after: BTreeSet<&String> = after.collect();
    for removed in before.difference(&after) {
        changes.push(Change::removed(field, removed.as_str()));
    }
    for added in after.difference(&before) {
        changes.push(Change::added(field, added.as_str()));
    }
}

fn content_change(before: &Asset, after: &Asset) -> Change {
    let old = before.content.as_text();
    let new = after.content.as_text();
    let diff = TextDiff::from_lines(old.as_str(), new.as_str());

    let mut removed = String::new();
    let mut added = String::new();
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Delete => removed.push_str(change.value()),
            ChangeTag::Insert => added.push_str(change.value()),
            ChangeTag::Equal => {}
        }
    }

    Change::modified("content", truncate(&removed), truncate(&added))
}

fn truncate(text: &str) -> String {
    match text.char_indices().nth(DIFF_PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assetlib_core::{AssetCategory, AssetContent, ChangeType};
    use tempfile::TempDir;

    fn doc(text: &str) -> Asset {
        Asset::new("guide", "Guide", AssetCategory::Documentation).with_content(
            AssetContent::Documentation {
                text: text.to_string(),
            },
        )
    }

    #[tokio::test]
    async fn test_first_versions_are_sequential() {
        let store = VersionStore::new();
        let v1 = store.create_version(&doc("a"), "init", "me").await.unwrap();
        let v2 = store.create_version(&doc("b"), "edit", "me").await.unwrap();
        assert_eq!(v1.version.to_string(), "1.0.0");
        assert_eq!(v2.version.to_string(), "1.0.1");
        assert_eq!(v2.snapshot.version, "1.0.1");
        assert_eq!(v1.changes, vec![Change::added("asset", "Guide")]);
    }

    #[tokio::test]
    async fn test_patch_rollover_through_history() {
        let store = VersionStore::new();
        let mut last = None;
        for i in 0..101 {
            last = Some(store.create_version(&doc(&i.to_string()), "", "me").await.unwrap());
        }
        // 1.0.0 ..= 1.0.99 is 100 versions; the 101st rolls the minor.
        assert_eq!(last.unwrap().version, SemVer::new(1, 1, 0));
    }

    #[tokio::test]
    async fn test_diff_reports_field_changes() {
        let before = doc("line one\nline two\n").with_tags(["a", "b"]);
        let mut after = doc("line one\nline 2\n").with_tags(["b", "c"]);
        after.description = "now described".into();
        after.dependencies = vec!["tokens".into()];

        let changes = diff_assets(&before, &after);
        let fields: Vec<(&str, ChangeType)> = changes
            .iter()
            .map(|c| (c.field.as_str(), c.change_type))
            .collect();
        assert_eq!(
            fields,
            vec![
                ("description", ChangeType::Modified),
                ("tags", ChangeType::Removed),
                ("tags", ChangeType::Added),
                ("dependencies", ChangeType::Added),
                ("content", ChangeType::Modified),
            ]
        );

        let content = changes.last().unwrap();
        assert_eq!(content.before.as_deref(), Some("line two\n"));
        assert_eq!(content.after.as_deref(), Some("line 2\n"));
    }

    #[test]
    fn test_unchanged_asset_has_no_changes() {
        assert!(diff_assets(&doc("same"), &doc("same")).is_empty());
    }

    #[test]
    fn test_truncate_is_char_safe() {
        let long: String = std::iter::repeat('é').take(DIFF_PREVIEW_CHARS + 5).collect();
        let cut = truncate(&long);
        assert_eq!(cut.chars().count(), DIFF_PREVIEW_CHARS + 3);
        assert_eq!(truncate("short"), "short");
    }

    #[tokio::test]
    async fn test_rollback_and_diff_need_known_versions() {
        let store = VersionStore::new();
        let v1 = store.create_version(&doc("a"), "", "me").await.unwrap();
        store.create_version(&doc("b"), "", "me").await.unwrap();

        let snapshot = store.rollback("guide", &v1.id).await.unwrap();
        assert_eq!(snapshot.content.as_text(), "a");

        assert!(matches!(
            store.rollback("guide", "ver-missing").await,
            Err(AssetError::VersionError(_))
        ));
        assert!(matches!(
            store.rollback("other", &v1.id).await,
            Err(AssetError::VersionError(_))
        ));
        assert!(matches!(
            store.diff(&v1.id, "ver-missing").await,
            Err(AssetError::VersionError(_))
        ));
    }

    #[tokio::test]
    async fn test_tag_moves_between_versions() {
        let store = VersionStore::new();
        let v1 = store.create_version(&doc("a"), "", "me").await.unwrap();
        let v2 = store.create_version(&doc("b"), "", "me").await.unwrap();

        store.tag_version(&v1.id, "stable").await.unwrap();
        assert_eq!(
            store.get_by_tag("guide", "stable").await.unwrap().unwrap().id,
            v1.id
        );

        store.tag_version(&v2.id, "stable").await.unwrap();
        let history = store.history("guide").await.unwrap();
        assert!(history[0].tags.is_empty());
        assert_eq!(history[1].tags, vec!["stable"]);
    }

    #[tokio::test]
    async fn test_branch_state_machine() {
        let store = VersionStore::new();
        let v1 = store.create_version(&doc("a"), "", "me").await.unwrap();
        let v2 = store.create_version(&doc("b"), "", "me").await.unwrap();

        let branch = store
            .create_branch("guide", "experiment", Some(&v1.id))
            .await
            .unwrap();
        assert_eq!(branch.head, v1.id);
        assert!(matches!(
            store.create_branch("guide", "experiment", None).await,
            Err(AssetError::AlreadyExists(_))
        ));

        let advanced = store.advance_branch(&branch.id, &v2.id).await.unwrap();
        assert_eq!(advanced.head, v2.id);
        assert_eq!(advanced.base_version, v1.id);

        let merged = store.merge_branch(&branch.id).await.unwrap();
        assert_eq!(merged.status, BranchStatus::Merged);
        assert!(matches!(
            store.abandon_branch(&branch.id).await,
            Err(AssetError::InvalidOperation(_))
        ));

        let other = store.create_branch("guide", "experiment", None).await.unwrap();
        assert_eq!(other.head, v2.id);
        let abandoned = store.abandon_branch(&other.id).await.unwrap();
        assert_eq!(abandoned.status, BranchStatus::Abandoned);
        assert_eq!(store.list_branches("guide").len(), 2);
    }

    #[tokio::test]
    async fn test_branch_without_history_fails() {
        let store = VersionStore::new();
        assert!(matches!(
            store.create_branch("nothing", "b", None).await,
            Err(AssetError::VersionError(_))
        ));
    }

    #[tokio::test]
    async fn test_history_loads_lazily_from_disk() {
        let dir = TempDir::new().unwrap();
        let local = Arc::new(LocalStore::new(dir.path()));
        local.init().await.unwrap();

        let (v1, branch) = {
            let store = VersionStore::with_store(local.clone());
            let v1 = store.create_version(&doc("a"), "", "me").await.unwrap();
            store.create_version(&doc("b"), "", "me").await.unwrap();
            let branch = store.create_branch("guide", "b1", None).await.unwrap();
            (v1, branch)
        };

        let reopened = VersionStore::with_store(local);
        assert_eq!(reopened.load_branches().await.unwrap(), 1);
        assert_eq!(reopened.get_branch(&branch.id).unwrap(), branch);

        // Found by id before the asset's history was ever requested.
        assert_eq!(reopened.get_version(&v1.id).await.unwrap().id, v1.id);

        let v3 = reopened.create_version(&doc("c"), "", "me").await.unwrap();
        assert_eq!(v3.version.to_string(), "1.0.2");
        assert_eq!(reopened.history("guide").await.unwrap().len(), 3);
    }
}
