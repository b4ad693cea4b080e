//! Boot asset resolution.
//!
//! Maps each [`AssetKey`] to a local file. An existing local file is used as
//! is and never re-fetched; otherwise the asset is downloaded from its
//! configured source. Downloads land in a `.part` file that is renamed only
//! after the transfer (and optional checksum) succeeds, so an interrupted
//! download can never pass for a resolved asset.

pub mod checksum;
pub mod download;

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ProvisionError, Result};
use crate::progress::ProgressSink;

pub use download::{DownloadOptions, Downloader, HttpDownloader};

/// The fixed set of assets a provisioning run needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssetKey {
    /// Primary OS image (Ubuntu ISO).
    PrimaryImage,
    /// Persistence-capable OS image (Kali ISO).
    PersistenceImage,
    /// Windows installer image.
    WindowsImage,
    /// Raw Windows To Go image for the live-install partition.
    RawBootImage,
}

impl AssetKey {
    pub const ALL: [AssetKey; 4] = [
        AssetKey::PrimaryImage,
        AssetKey::PersistenceImage,
        AssetKey::WindowsImage,
        AssetKey::RawBootImage,
    ];

    /// Key used in the `paths`, `urls` and `checksums` config sections.
    pub fn config_name(self) -> &'static str {
        match self {
            AssetKey::PrimaryImage => "ubuntu_iso",
            AssetKey::PersistenceImage => "kali_iso",
            AssetKey::WindowsImage => "windows_iso",
            AssetKey::RawBootImage => "wtg_img",
        }
    }

    /// Name shown in prompts.
    pub fn title(self) -> &'static str {
        match self {
            AssetKey::PrimaryImage => "Ubuntu ISO",
            AssetKey::PersistenceImage => "Kali ISO",
            AssetKey::WindowsImage => "Windows ISO",
            AssetKey::RawBootImage => "Windows To Go image",
        }
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AssetKey::PrimaryImage => "primary-image",
            AssetKey::PersistenceImage => "persistence-image",
            AssetKey::WindowsImage => "windows-image",
            AssetKey::RawBootImage => "raw-boot-image",
        })
    }
}

/// A resolved asset. Read-only once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRef {
    pub key: AssetKey,
    pub path: PathBuf,
    pub source_url: Option<String>,
    pub resolved: bool,
}

impl AssetRef {
    /// File name the asset keeps when staged.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// All assets for one run, keyed by [`AssetKey`].
#[derive(Debug, Clone, Default)]
pub struct ResolvedAssets {
    assets: BTreeMap<AssetKey, AssetRef>,
}

impl ResolvedAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, asset: AssetRef) {
        self.assets.insert(asset.key, asset);
    }

    pub fn get(&self, key: AssetKey) -> Option<&AssetRef> {
        self.assets.get(&key)
    }

    /// Look up an asset the pipeline cannot proceed without.
    pub fn require(&self, key: AssetKey) -> Result<&AssetRef> {
        self.get(key).ok_or_else(|| ProvisionError::AssetUnavailable {
            key,
            reason: "not resolved for this run".to_string(),
        })
    }

    /// Every asset except `key`, in key order.
    pub fn all_except(&self, key: AssetKey) -> Vec<&AssetRef> {
        self.assets.values().filter(|a| a.key != key).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AssetRef> {
        self.assets.values()
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

/// Resolves asset keys to local files, downloading when needed.
pub struct AssetResolver<'a> {
    downloader: &'a dyn Downloader,
    progress: &'a dyn ProgressSink,
    download_dir: PathBuf,
}

impl<'a> AssetResolver<'a> {
    pub fn new(
        downloader: &'a dyn Downloader,
        progress: &'a dyn ProgressSink,
        download_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            downloader,
            progress,
            download_dir: download_dir.into(),
        }
    }

    /// Resolve an asset without checksum verification.
    pub fn resolve(
        &self,
        key: AssetKey,
        local_path_hint: Option<&Path>,
        source_url: Option<&str>,
    ) -> Result<AssetRef> {
        self.resolve_verified(key, local_path_hint, source_url, None)
    }

    /// Resolve an asset, verifying a fresh download against `sha256`.
    ///
    /// An existing file at `local_path_hint` resolves immediately without
    /// touching the network or re-hashing.
    pub fn resolve_verified(
        &self,
        key: AssetKey,
        local_path_hint: Option<&Path>,
        source_url: Option<&str>,
        sha256: Option<&str>,
    ) -> Result<AssetRef> {
        if let Some(hint) = local_path_hint {
            if hint.is_file() {
                log::debug!("{} already present at {}", key, hint.display());
                return Ok(AssetRef {
                    key,
                    path: hint.to_path_buf(),
                    source_url: source_url.map(str::to_string),
                    resolved: true,
                });
            }
        }

        let unavailable = |reason: String| ProvisionError::AssetUnavailable { key, reason };

        let url = source_url.ok_or_else(|| {
            unavailable(match local_path_hint {
                Some(hint) => format!("{} does not exist and no URL is configured", hint.display()),
                None => "no local path or URL configured".to_string(),
            })
        })?;

        let dest = match local_path_hint {
            Some(hint) => hint.to_path_buf(),
            None => {
                let name = file_name_from_url(url)
                    .ok_or_else(|| unavailable(format!("cannot derive a file name from {}", url)))?;
                let candidate = self.download_dir.join(name);
                if candidate.is_file() {
                    log::debug!("{} already downloaded to {}", key, candidate.display());
                    return Ok(AssetRef {
                        key,
                        path: candidate,
                        source_url: Some(url.to_string()),
                        resolved: true,
                    });
                }
                candidate
            }
        };

        println!("Fetching {} from {}", key.title(), url);
        self.fetch(url, &dest, sha256)
            .map_err(|e| unavailable(format!("{:#}", e)))?;
        println!("  {} [OK]", dest.display());

        Ok(AssetRef {
            key,
            path: dest,
            source_url: Some(url.to_string()),
            resolved: true,
        })
    }

    /// Download `url` to `dest` through a `.part` file, creating parent
    /// directories. Shared with icon fetching.
    pub fn fetch(&self, url: &str, dest: &Path, sha256: Option<&str>) -> anyhow::Result<()> {
        use anyhow::Context;

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let partial = partial_path(dest);
        self.downloader.download(url, &partial, self.progress)?;

        if let Some(expected) = sha256 {
            checksum::verify_sha256(&partial, expected)?;
        }

        fs::rename(&partial, dest).with_context(|| {
            format!(
                "Failed to move {} into place at {}",
                partial.display(),
                dest.display()
            )
        })?;
        Ok(())
    }
}

/// `<dest>.part`
fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

/// Last path segment of a URL, without query or fragment.
pub fn file_name_from_url(url: &str) -> Option<&str> {
    let without_query = url.split(['?', '#']).next()?;
    let after_scheme = without_query
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(without_query);
    let (_host, path) = after_scheme.split_once('/')?;
    let name = path.rsplit('/').next()?;
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}
