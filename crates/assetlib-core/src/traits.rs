use crate::{Asset, AssetCategory, Result};
use async_trait::async_trait;

/// Optional remote mirror of the library.
///
/// The manager treats every call as best effort: errors are logged and
/// dropped, and the local registry stays authoritative.
#[async_trait]
pub trait RemoteStorage: Send + Sync {
    /// Returns whether the remote is reachable and ready.
    async fn initialize(&self) -> Result<bool>;
    async fn save(&self, asset: &Asset) -> Result<()>;
    async fn load(&self, id: &str) -> Result<Option<Asset>>;
    async fn search(&self, query: &str) -> Result<Vec<Asset>>;
    async fn list_by_category(&self, category: AssetCategory) -> Result<Vec<Asset>>;
    async fn delete(&self, id: &str) -> Result<()>;
    async fn increment_downloads(&self, id: &str) -> Result<()>;
}
