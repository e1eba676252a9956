use crate::Asset;
use sha2::{Digest, Sha256};

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Hash of the fields that make up an asset's identity-relevant content:
/// name, description, content text and tags.
pub fn content_hash(asset: &Asset) -> String {
    let mut hasher = Sha256::new();
    hasher.update(asset.name.as_bytes());
    hasher.update(asset.description.as_bytes());
    hasher.update(asset.content.as_text().as_bytes());
    for tag in &asset.tags {
        hasher.update(tag.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AssetCategory, AssetContent};

    #[test]
    fn test_sha256_hex_known_value() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_content_hash_ignores_metadata() {
        let a = Asset::new("a", "A", AssetCategory::Templates).with_tags(["x"]);
        let mut b = a.clone();
        b.metadata.downloads = 42;
        assert_eq!(content_hash(&a), content_hash(&b));

        b.content = AssetContent::Documentation { text: "changed".into() };
        assert_ne!(content_hash(&a), content_hash(&b));
    }
}
