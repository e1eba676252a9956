use crate::bundle_checksum;
use assetlib_core::{Asset, AssetError, ExportSettings, Result};
use chrono::{DateTime, Utc};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Version stamped into export metadata.
pub const EXPORT_FORMAT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// On-disk encoding. `Zip` is a single gzip stream over the JSON payload,
/// written with a `.zip` extension; it is not an archive container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Zip,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Zip => "zip",
        }
    }

    /// `.zip` and `.gz` files are treated as gzip; everything else as JSON.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("zip") | Some("gz") => ExportFormat::Zip,
            _ => ExportFormat::Json,
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = AssetError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "zip" | "gzip" | "gz" => Ok(ExportFormat::Zip),
            other => Err(AssetError::InvalidFormat(format!(
                "unknown export format: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportOptions {
    pub format: ExportFormat,
    /// Pull the transitive dependencies of the requested assets into the bundle
    pub include_dependencies: bool,
    pub exporter: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self::from(&ExportSettings::default())
    }
}

impl From<&ExportSettings> for ExportOptions {
    fn from(settings: &ExportSettings) -> Self {
        Self {
            format: settings.default_format.parse().unwrap_or_default(),
            include_dependencies: false,
            exporter: settings.exporter.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetadata {
    pub format: ExportFormat,
    pub dependencies: bool,
    pub exporter: String,
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub checksum: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportBundle {
    pub assets: Vec<Asset>,
    pub metadata: ExportMetadata,
}

impl ExportBundle {
    pub fn new(assets: Vec<Asset>, options: &ExportOptions) -> Result<Self> {
        let checksum = bundle_checksum(&assets)?;
        Ok(Self {
            metadata: ExportMetadata {
                format: options.format,
                dependencies: options.include_dependencies,
                exporter: options.exporter.clone(),
                version: EXPORT_FORMAT_VERSION.to_string(),
                exported_at: Utc::now(),
                checksum,
            },
            assets,
        })
    }
}

/// Result of reading a bundle. A checksum mismatch is reported here, not
/// raised as an error.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportReport {
    pub assets: Vec<Asset>,
    pub checksum_valid: bool,
    pub expected: Option<String>,
    pub actual: String,
}

/// Pretty JSON, gzip-wrapped for [`ExportFormat::Zip`].
pub fn encode(bundle: &ExportBundle, format: ExportFormat) -> Result<Vec<u8>> {
    let json = serde_json::to_vec_pretty(bundle)?;
    match format {
        ExportFormat::Json => Ok(json),
        ExportFormat::Zip => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&json)?;
            Ok(encoder.finish()?)
        }
    }
}

pub fn decode(bytes: &[u8], format: ExportFormat) -> Result<ImportReport> {
    let json = match format {
        ExportFormat::Json => bytes.to_vec(),
        ExportFormat::Zip => {
            let mut decoder = GzDecoder::new(bytes);
            let mut out = Vec::new();
            decoder.read_to_end(&mut out)?;
            out
        }
    };

    let mut value: serde_json::Value = serde_json::from_slice(&json)?;
    let assets_value = match value.get_mut("assets") {
        Some(v) if v.is_array() => v.take(),
        _ => {
            return Err(AssetError::InvalidFormat(
                "import payload has no assets array".to_string(),
            ))
        }
    };
    let assets: Vec<Asset> = serde_json::from_value(assets_value)?;

    let expected = value
        .get("metadata")
        .and_then(|m| m.get("checksum"))
        .and_then(|c| c.as_str())
        .map(str::to_string);
    let actual = bundle_checksum(&assets)?;
    let checksum_valid = expected.as_deref() == Some(actual.as_str());

    if !checksum_valid {
        let err = AssetError::ChecksumMismatch {
            expected: expected.clone().unwrap_or_else(|| "<none>".to_string()),
            actual: actual.clone(),
        };
        warn!(error = %err, "import integrity check failed, continuing with payload");
    }

    debug!(assets = assets.len(), checksum_valid, "decoded import payload");
    Ok(ImportReport {
        assets,
        checksum_valid,
        expected,
        actual,
    })
}

/// Write `bundle` to `{dir}/{name}.{ext}`, creating `dir` if needed.
pub async fn export_to_dir(
    dir: &Path,
    name: &str,
    bundle: &ExportBundle,
    format: ExportFormat,
) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!("{}.{}", name, format.extension()));

    let bytes = {
        let bundle = bundle.clone();
        tokio::task::spawn_blocking(move || encode(&bundle, format))
            .await
            .map_err(|e| AssetError::Storage(e.to_string()))??
    };

    tokio::fs::write(&path, bytes).await?;
    info!(path = %path.display(), assets = bundle.assets.len(), %format, "exported assets");
    Ok(path)
}

/// Read a bundle, picking the format from the file extension.
pub async fn import_from_path(path: &Path) -> Result<ImportReport> {
    let format = ExportFormat::from_path(path);
    let bytes = tokio::fs::read(path).await?;

    let report = tokio::task::spawn_blocking(move || decode(&bytes, format))
        .await
        .map_err(|e| AssetError::Storage(e.to_string()))??;

    info!(
        path = %path.display(),
        assets = report.assets.len(),
        checksum_valid = report.checksum_valid,
        "imported assets"
    );
    Ok(report)
}
