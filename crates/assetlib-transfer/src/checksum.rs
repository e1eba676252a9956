use assetlib_core::{sha256_hex, Asset, AssetContent, Result};
use serde::Serialize;

/// Reduced projection hashed for bundle integrity.
#[derive(Serialize)]
struct ChecksumItem<'a> {
    id: &'a str,
    version: &'a str,
    content: &'a AssetContent,
}

/// sha-256 over the JSON of `[{id, version, content}, ...]` in bundle order.
pub fn bundle_checksum(assets: &[Asset]) -> Result<String> {
    let projection: Vec<ChecksumItem<'_>> = assets
        .iter()
        .map(|a| ChecksumItem {
            id: &a.id,
            version: &a.version,
            content: &a.content,
        })
        .collect();
    let bytes = serde_json::to_vec(&projection)?;
    Ok(sha256_hex(&bytes))
}
