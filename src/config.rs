//! Configuration management for usbforge.
//!
//! Reads a sectioned TOML file (`[paths]`, `[urls]`, `[checksums]`,
//! `[partition]`, `[bootmenu]`, `[mounts]`, `[icons]`). Every default is a
//! named field here rather than a module-level constant, so the session and
//! pipeline receive one explicit value.
//!
//! The file is located via `--config`, then `USBFORGE_CONFIG` (a `.env` file
//! is honored), then `./config/usbforge.toml`, then the user config dir.
//! A missing file yields the defaults.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::assets::AssetKey;
use crate::error::{ProvisionError, Result};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "USBFORGE_CONFIG";
/// Environment variable overriding the download directory.
pub const DOWNLOAD_DIR_ENV: &str = "USBFORGE_DOWNLOAD_DIR";

/// Default Ventoy release archive.
pub const DEFAULT_BOOTMENU_RELEASE_URL: &str =
    "https://github.com/ventoy/Ventoy/releases/latest/download/ventoy-x86_64.tar.gz";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Local asset paths, keyed by asset config name (`ubuntu_iso`, ...).
    pub paths: BTreeMap<String, PathBuf>,
    /// Fallback download sources, keyed like `paths`.
    pub urls: BTreeMap<String, String>,
    /// Expected SHA256 of downloaded assets, keyed like `paths`.
    pub checksums: BTreeMap<String, String>,
    pub partition: PartitionConfig,
    pub bootmenu: BootMenuConfig,
    pub mounts: MountConfig,
    /// Default boot-menu icons, keyed by icon family (`ubuntu`, `kali`, ...).
    pub icons: BTreeMap<String, String>,
    /// Where downloads without an explicit local path are stored.
    pub download_dir: Option<PathBuf>,

    /// File this configuration was read from, if any.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    /// Persistence partition size.
    pub kali_size_gb: u64,
    /// Windows To Go partition size; computed from the device when absent.
    pub wtg_size_gb: Option<u64>,
    /// Space that must stay free for the boot-menu data partition.
    pub min_free_gb: u64,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            kali_size_gb: 12,
            wtg_size_gb: None,
            min_free_gb: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootMenuConfig {
    /// Pre-installed installer script. Skips the release download.
    pub installer: Option<PathBuf>,
    /// Release tarball fetched when no installer is configured.
    pub release_url: String,
    /// Script name inside the extracted release.
    pub installer_script: String,
    /// Boot menu resolution.
    pub gfxmode: String,
}

impl Default for BootMenuConfig {
    fn default() -> Self {
        Self {
            installer: None,
            release_url: DEFAULT_BOOTMENU_RELEASE_URL.to_string(),
            installer_script: "Ventoy2Disk.sh".to_string(),
            gfxmode: "1024x768".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    pub boot_layer: PathBuf,
    pub persistence: PathBuf,
    pub raw_image: PathBuf,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            boot_layer: PathBuf::from("/mnt/ventoy"),
            persistence: PathBuf::from("/mnt/kali_persistence"),
            raw_image: PathBuf::from("/mnt/wtg"),
        }
    }
}

/// Default icon sources for the boot menu.
pub fn default_icons() -> BTreeMap<String, String> {
    [
        (
            "ubuntu",
            "https://assets.ubuntu.com/v1/29985a98-ubuntu-logo32.png",
        ),
        (
            "kali",
            "https://upload.wikimedia.org/wikipedia/commons/thumb/6/6b/Kali-dragon-icon.svg/256px-Kali-dragon-icon.svg.png",
        ),
        (
            "windows",
            "https://upload.wikimedia.org/wikipedia/commons/thumb/5/5f/Windows_logo_-_2021.svg/256px-Windows_logo_-_2021.svg.png",
        ),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: BTreeMap::new(),
            urls: BTreeMap::new(),
            checksums: BTreeMap::new(),
            partition: PartitionConfig::default(),
            bootmenu: BootMenuConfig::default(),
            mounts: MountConfig::default(),
            icons: default_icons(),
            download_dir: None,
            source: None,
        }
    }
}

impl Config {
    /// Load configuration from the first config file found.
    ///
    /// An explicitly requested file must exist; the implicit locations fall
    /// back to defaults when absent.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match Self::locate(explicit)? {
            Some(path) => Self::from_file(&path)?,
            None => {
                log::info!("No configuration file found, using defaults");
                Self::default()
            }
        };

        if let Ok(dir) = std::env::var(DOWNLOAD_DIR_ENV) {
            if !dir.is_empty() {
                config.download_dir = Some(PathBuf::from(dir));
            }
        }

        Ok(config)
    }

    fn locate(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(ProvisionError::InvalidConfig(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            return Ok(Some(path.to_path_buf()));
        }

        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(path);
            if !path.is_file() {
                return Err(ProvisionError::InvalidConfig(format!(
                    "{} points to a missing file: {}",
                    CONFIG_ENV,
                    path.display()
                )));
            }
            return Ok(Some(path));
        }

        let mut candidates = vec![PathBuf::from("config/usbforge.toml")];
        if let Some(dir) = dirs::config_dir() {
            candidates.push(dir.join("usbforge/config.toml"));
        }
        Ok(candidates.into_iter().find(|p| p.is_file()))
    }

    /// Read and parse a config file. Relative asset paths are resolved
    /// against the file's directory.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| ProvisionError::io(format!("reading {}", path.display()), e))?;
        let mut config = Self::from_toml_str(&content)?;

        if let Some(base) = path.parent() {
            for value in config.paths.values_mut() {
                if value.is_relative() {
                    *value = base.join(&*value);
                }
            }
        }
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Parse configuration text and validate it.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| ProvisionError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the planner or pipeline cannot act on.
    pub fn validate(&self) -> Result<()> {
        if self.partition.kali_size_gb == 0 {
            return Err(ProvisionError::InvalidConfig(
                "partition.kali_size_gb must be greater than zero".to_string(),
            ));
        }
        if self.partition.wtg_size_gb == Some(0) {
            return Err(ProvisionError::InvalidConfig(
                "partition.wtg_size_gb must be greater than zero when set".to_string(),
            ));
        }
        let valid_gfx = self
            .bootmenu
            .gfxmode
            .split_once('x')
            .map(|(w, h)| w.parse::<u32>().is_ok() && h.parse::<u32>().is_ok())
            .unwrap_or(false);
        if !valid_gfx {
            return Err(ProvisionError::InvalidConfig(format!(
                "bootmenu.gfxmode must look like 1024x768, got '{}'",
                self.bootmenu.gfxmode
            )));
        }
        for (key, url) in self.urls.iter().chain(self.icons.iter()) {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ProvisionError::InvalidConfig(format!(
                    "URL for '{}' must be http(s): {}",
                    key, url
                )));
            }
        }
        for (key, sum) in &self.checksums {
            if sum.len() != 64 || !sum.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(ProvisionError::InvalidConfig(format!(
                    "checksum for '{}' must be 64 hex characters",
                    key
                )));
            }
        }
        Ok(())
    }

    /// Configured local path for an asset.
    pub fn asset_path(&self, key: AssetKey) -> Option<&Path> {
        self.paths.get(key.config_name()).map(PathBuf::as_path)
    }

    /// Configured download source for an asset.
    pub fn asset_url(&self, key: AssetKey) -> Option<&str> {
        self.urls.get(key.config_name()).map(String::as_str)
    }

    /// Expected SHA256 of an asset, if configured.
    pub fn asset_checksum(&self, key: AssetKey) -> Option<&str> {
        self.checksums.get(key.config_name()).map(String::as_str)
    }

    /// Directory for downloads without an explicit local path.
    pub fn download_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.download_dir {
            return dir.clone();
        }
        dirs::cache_dir()
            .map(|d| d.join("usbforge/downloads"))
            .unwrap_or_else(|| PathBuf::from("downloads"))
    }

    /// Print configuration for debugging.
    pub fn print(&self) {
        println!("Configuration:");
        match self.source {
            Some(ref path) => println!("  Source: {}", path.display()),
            None => println!("  Source: (defaults)"),
        }
        println!("  Assets:");
        for key in AssetKey::ALL {
            let path = self
                .asset_path(key)
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "-".to_string());
            let url = self.asset_url(key).unwrap_or("-");
            println!("    {:12} path={} url={}", key.config_name(), path, url);
        }
        println!("  Partition:");
        println!("    kali_size_gb: {}", self.partition.kali_size_gb);
        match self.partition.wtg_size_gb {
            Some(size) => println!("    wtg_size_gb: {}", size),
            None => println!("    wtg_size_gb: (auto)"),
        }
        println!("    min_free_gb: {}", self.partition.min_free_gb);
        println!("  Boot menu:");
        match self.bootmenu.installer {
            Some(ref path) => println!("    installer: {}", path.display()),
            None => println!("    release_url: {}", self.bootmenu.release_url),
        }
        println!("    gfxmode: {}", self.bootmenu.gfxmode);
        println!("  Mounts:");
        println!("    boot_layer: {}", self.mounts.boot_layer.display());
        println!("    persistence: {}", self.mounts.persistence.display());
        println!("    raw_image: {}", self.mounts.raw_image.display());
        println!("  Download dir: {}", self.download_dir().display());
    }
}
