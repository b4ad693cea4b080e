//! Boot-menu descriptor (`ventoy/ventoy.json`).
//!
//! Generated once, after staging, from the staged image file names. Each
//! image gets a class key (its lower-cased file stem). Classes that name a
//! known icon family map to that family's icon under `/ventoy/icons`; other
//! classes get no icon entry.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::assets::AssetResolver;
use crate::error::{ProvisionError, Result};

/// Descriptor location relative to the boot-menu partition root.
pub const DESCRIPTOR_PATH: &str = "ventoy/ventoy.json";
/// Icon directory relative to the boot-menu partition root.
pub const ICON_DIR: &str = "ventoy/icons";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootMenuDescriptor {
    pub theme: Theme,
    pub image_class: Vec<ImageClass>,
    pub theme_legacy: ThemeLegacy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    pub gfxmode: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageClass {
    /// Image path on the boot-menu partition, e.g. `/ubuntu.iso`.
    pub image: String,
    pub class: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemeLegacy {
    pub classes: BTreeMap<String, ClassIcon>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassIcon {
    pub icon: String,
}

/// Lower-cased file stem.
pub fn class_key(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// First icon family contained in the class key.
fn icon_family<'f>(key: &str, families: &[&'f str]) -> Option<&'f str> {
    families.iter().copied().find(|family| key.contains(family))
}

/// Build the descriptor for the staged images, in staging order.
pub fn generate_descriptor(
    file_names: &[String],
    gfxmode: &str,
    icon_families: &[&str],
) -> BootMenuDescriptor {
    let mut image_class = Vec::with_capacity(file_names.len());
    let mut classes = BTreeMap::new();

    for name in file_names {
        let key = class_key(name);
        if let Some(family) = icon_family(&key, icon_families) {
            classes.insert(
                key.clone(),
                ClassIcon {
                    icon: format!("/{}/{}.png", ICON_DIR, family),
                },
            );
        }
        image_class.push(ImageClass {
            image: format!("/{}", name),
            class: key,
        });
    }

    BootMenuDescriptor {
        theme: Theme {
            gfxmode: gfxmode.to_string(),
        },
        image_class,
        theme_legacy: ThemeLegacy { classes },
    }
}

/// Write the descriptor under `mount_dir` and fetch any default icon that
/// is not already present.
pub fn write_descriptor(
    mount_dir: &Path,
    descriptor: &BootMenuDescriptor,
    icons: &BTreeMap<String, String>,
    resolver: &AssetResolver<'_>,
) -> Result<PathBuf> {
    let icon_dir = mount_dir.join(ICON_DIR);
    fs::create_dir_all(&icon_dir)
        .map_err(|e| ProvisionError::io(format!("creating {}", icon_dir.display()), e))?;

    for (family, url) in icons {
        let icon_file = icon_dir.join(format!("{}.png", family));
        if icon_file.exists() {
            continue;
        }
        resolver
            .fetch(url, &icon_file, None)
            .map_err(|e| ProvisionError::IconUnavailable {
                name: family.clone(),
                reason: format!("{:#}", e),
            })?;
    }

    let json = serde_json::to_string_pretty(descriptor).map_err(|e| {
        ProvisionError::io(
            "serializing boot-menu descriptor",
            std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        )
    })?;

    let path = mount_dir.join(DESCRIPTOR_PATH);
    fs::write(&path, json + "\n")
        .map_err(|e| ProvisionError::io(format!("writing {}", path.display()), e))?;
    Ok(path)
}
