//! Boot-menu installer (Ventoy) location and invocation.

use std::fs;
use std::path::{Path, PathBuf};

use crate::assets::{file_name_from_url, AssetResolver};
use crate::config::BootMenuConfig;
use crate::drives::Drive;
use crate::error::{ProvisionError, Result};
use crate::process::{Cmd, CommandRunner};

/// Prefix of the directory a release tarball extracts to (`ventoy-1.0.99`).
const RELEASE_DIR_PREFIX: &str = "ventoy-";

/// Find the installer script, downloading and extracting a release into
/// `cache_dir` when nothing usable is present.
///
/// Order: the configured `installer`, an already-extracted release in
/// `cache_dir`, then the release tarball from `release_url`.
pub fn locate_installer(
    config: &BootMenuConfig,
    cache_dir: &Path,
    runner: &dyn CommandRunner,
    resolver: &AssetResolver<'_>,
) -> Result<PathBuf> {
    if let Some(ref installer) = config.installer {
        if installer.is_file() {
            return Ok(installer.clone());
        }
        return Err(ProvisionError::InstallerUnavailable(format!(
            "configured installer {} does not exist",
            installer.display()
        )));
    }

    if let Some(found) = find_extracted(cache_dir, &config.installer_script) {
        log::debug!("Using extracted installer {}", found.display());
        return Ok(found);
    }

    let archive_name = file_name_from_url(&config.release_url).unwrap_or("ventoy.tar.gz");
    let archive = cache_dir.join(archive_name);

    if !archive.is_file() {
        println!("Downloading Ventoy from {}", config.release_url);
        resolver
            .fetch(&config.release_url, &archive, None)
            .map_err(|e| ProvisionError::InstallerUnavailable(format!("{:#}", e)))?;
    }

    Cmd::new("tar")
        .arg("xzf")
        .arg_path(&archive)
        .arg("-C")
        .arg_path(cache_dir)
        .run(runner)?;

    find_extracted(cache_dir, &config.installer_script).ok_or_else(|| {
        ProvisionError::InstallerUnavailable(format!(
            "{} not found after extracting {}",
            config.installer_script,
            archive.display()
        ))
    })
}

/// Newest `ventoy-*/<script>` under `cache_dir`.
fn find_extracted(cache_dir: &Path, script: &str) -> Option<PathBuf> {
    let entries = fs::read_dir(cache_dir).ok()?;

    entries
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            let version = release_version(name.strip_prefix(RELEASE_DIR_PREFIX)?);
            Some((version, e.path().join(script)))
        })
        .filter(|(_, p)| p.is_file())
        .max_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
        .map(|(_, p)| p)
}

/// Numeric components of a release name such as `1.0.100`.
///
/// Non-numeric components compare as zero.
fn release_version(name: &str) -> Vec<u64> {
    name.split(|c: char| c == '.' || c == '-')
        .map(|part| part.parse().unwrap_or(0))
        .collect()
}

/// Install the boot-menu layer on the whole device, leaving
/// `reserved_tail_mb` unallocated at the end for the data partitions.
///
/// The script is run from its own directory, which it requires.
pub fn install(
    runner: &dyn CommandRunner,
    installer: &Path,
    drive: &Drive,
    reserved_tail_mb: u64,
) -> Result<()> {
    let script = installer
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            ProvisionError::InstallerUnavailable(format!(
                "{} is not a script path",
                installer.display()
            ))
        })?;

    let mut cmd = Cmd::new("sh")
        .arg(script)
        .arg("-i")
        .arg_path(&drive.path)
        .arg("-r")
        .arg(reserved_tail_mb.to_string())
        .arg("-y");
    if let Some(dir) = installer.parent().filter(|d| !d.as_os_str().is_empty()) {
        cmd = cmd.dir(dir);
    }

    cmd.run(runner)?;
    Ok(())
}
