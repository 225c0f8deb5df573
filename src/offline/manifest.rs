use super::CacheError;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One static asset the offline cache must hold
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetEntry {
    pub path: String,
    /// Hex SHA-256 of the expected body; checked at install time when present
    #[serde(default)]
    pub sha256: Option<String>,
}

impl AssetEntry {
    pub fn new(path: impl Into<String>) -> Self {
        AssetEntry {
            path: path.into(),
            sha256: None,
        }
    }

    pub fn with_hash(path: impl Into<String>, sha256: impl Into<String>) -> Self {
        AssetEntry {
            path: path.into(),
            sha256: Some(sha256.into()),
        }
    }
}

/// The application shell cached for offline use
pub fn default_assets() -> Vec<AssetEntry> {
    [
        "/",
        "/index.html",
        "/styles.css",
        "/app.js",
        "/manifest.json",
        "/icon-192.png",
        "/icon-512.png",
    ]
    .into_iter()
    .map(AssetEntry::new)
    .collect()
}

/// Lowercase hex SHA-256 of `bytes`
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// A versioned asset list bound to an origin
#[derive(Debug, Clone)]
pub struct Manifest {
    app_name: String,
    version: String,
    origin: Url,
    assets: Vec<AssetEntry>,
}

impl Manifest {
    /// Builds a manifest. Without an explicit version the tag is derived from
    /// the asset list, so any change to it yields a new cache generation.
    pub fn new(
        app_name: &str,
        origin: &str,
        version: Option<&str>,
        assets: Vec<AssetEntry>,
    ) -> Result<Self, CacheError> {
        if app_name.trim().is_empty() {
            return Err(CacheError::InvalidManifest("app name is empty".to_string()));
        }
        if assets.is_empty() {
            return Err(CacheError::InvalidManifest("asset list is empty".to_string()));
        }

        let origin = Url::parse(origin)
            .map_err(|e| CacheError::InvalidManifest(format!("origin {:?}: {}", origin, e)))?;

        let version = match version.map(str::trim) {
            Some(v) if !v.is_empty() => v.to_string(),
            _ => format!("v{}", &fingerprint(&assets)[..12]),
        };

        Ok(Manifest {
            app_name: app_name.to_string(),
            version,
            origin,
            assets,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn assets(&self) -> &[AssetEntry] {
        &self.assets
    }

    /// Cache bucket for this generation: `<app-name>-<version>`
    pub fn bucket_name(&self) -> String {
        format!("{}-{}", self.app_name, self.version)
    }

    /// Absolute URL an asset is fetched from and stored under
    pub fn asset_url(&self, entry: &AssetEntry) -> Result<String, CacheError> {
        self.origin
            .join(&entry.path)
            .map(|mut url| {
                url.set_fragment(None);
                url.to_string()
            })
            .map_err(|e| CacheError::InvalidManifest(format!("asset {:?}: {}", entry.path, e)))
    }
}

/// Cache key for a request URL: parsed, normalized and without fragment
///
/// Unparseable input is used as-is.
pub fn normalize_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => raw.to_string(),
    }
}

/// Digest over every entry's path and declared hash
pub fn fingerprint(assets: &[AssetEntry]) -> String {
    let mut hasher = Sha256::new();
    for entry in assets {
        hasher.update(entry.path.as_bytes());
        hasher.update([0u8]);
        hasher.update(entry.sha256.as_deref().unwrap_or("").as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}
